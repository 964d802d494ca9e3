use std::{sync::Arc, time::Duration};

use axum::{
    debug_handler,
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    accounts::{parse_user_id, Account, Directory},
    auth::Caller,
    error::{AuthError, DecodeError, RegistryError, StoreError},
    AppState,
};

use super::{
    codec::{self, Frame, Inbound, Outbound},
    registry::{ConnId, Membership, Registrant, Registry},
    store::MessageStore,
    RoomKey,
};

/// How long the writer gets to flush queued frames after the session ends.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Acknowledgment sent to the sender alone when its message was not stored.
pub const NOT_SAVED: &str = "message_not_saved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// `Connecting -> Active -> Closed`. An active session leaves its room exactly
/// once, on whichever path ends it.
pub struct Session {
    state: SessionState,
    me: Account,
    peer: Account,
    room: RoomKey,
    membership: Option<Membership>,
    store: MessageStore,
    registry: Arc<Registry>,
}

impl Session {
    /// Admission. Identity comes from the connection, the peer from the route.
    pub async fn connect(
        caller: Option<Account>,
        peer: &str,
        directory: &Directory,
        store: MessageStore,
        registry: Arc<Registry>,
    ) -> Result<Session, AuthError> {
        let me = caller.ok_or(AuthError::Anonymous)?;
        let peer_id =
            parse_user_id(peer).ok_or_else(|| AuthError::MalformedPeer(peer.to_owned()))?;
        if peer_id == me.id {
            return Err(AuthError::SelfPeer);
        }

        let peer = directory
            .lookup(peer_id)
            .await
            .map_err(|err| {
                tracing::error!(%err, peer_id, "peer lookup failed");
                AuthError::DirectoryUnavailable
            })?
            .ok_or(AuthError::UnknownPeer(peer_id))?;

        Ok(Session {
            state: SessionState::Connecting,
            room: RoomKey::resolve(me.id, peer.id),
            me,
            peer,
            membership: None,
            store,
            registry,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn room(&self) -> RoomKey {
        self.room
    }

    pub fn conn(&self) -> Option<ConnId> {
        self.membership.as_ref().map(Membership::conn)
    }

    /// Joins the room. Failure closes the session.
    pub fn activate(&mut self, registrant: Registrant) -> Result<(), RegistryError> {
        if self.state != SessionState::Connecting {
            return Ok(());
        }

        match Membership::enter(self.registry.clone(), self.room, registrant) {
            Ok(membership) => {
                self.membership = Some(membership);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    /// Handles one inbound text frame. Returns a reply meant for this
    /// connection only, if any.
    ///
    /// Unknown tags and malformed frames are dropped without closing the
    /// session; tightening this would be a protocol change for clients.
    pub async fn handle(&mut self, text: &str) -> Option<Outbound> {
        if self.state != SessionState::Active {
            return None;
        }

        let event = match codec::decode(text) {
            Ok(Frame::Event(event)) => event,
            Ok(Frame::Unknown(tag)) => {
                tracing::debug!(%tag, "ignoring unknown event");
                return None;
            }
            Err(err) => {
                tracing::warn!(%err, "dropping malformed frame");
                return None;
            }
        };
        let tag = event.tag();

        let outbound = match event {
            Inbound::Message { message } => match self.persist(message).await {
                Ok(outbound) => outbound,
                Err(err) => {
                    tracing::error!(%err, "message not stored, not broadcasting");
                    return Some(Outbound::Error {
                        error: NOT_SAVED.to_owned(),
                    });
                }
            },
            Inbound::CallInitiate => Outbound::CallInitiate {
                from_id: self.me.id,
                from_contact: self.me.contact().to_owned(),
                from_name: self.me.full_name.clone(),
            },
            Inbound::CallOffer { offer } => Outbound::CallOffer {
                offer,
                from: self.me.contact().to_owned(),
            },
            Inbound::CallAnswer { answer } => Outbound::CallAnswer { answer },
            Inbound::IceCandidate { candidate } => Outbound::IceCandidate { candidate },
            Inbound::CallEnd => Outbound::CallEnd,
        };

        match outbound.encode() {
            Ok(frame) => {
                let delivered = self.registry.broadcast(self.room, frame);
                tracing::debug!(tag, delivered, "broadcast");
            }
            Err(err) => tracing::error!(%err, tag, "cannot encode outbound event"),
        }
        None
    }

    async fn persist(&self, text: String) -> Result<Outbound, StoreError> {
        let saved = self.store.create(self.me.id, self.peer.id, &text).await?;
        Ok(Outbound::Message {
            message: saved.text,
            sender_id: self.me.id,
            sender_contact: self.me.contact().to_owned(),
            sender_name: self.me.full_name.clone(),
            account_type: self.me.account_type,
            timestamp: saved.created_at.format(&Rfc3339)?,
        })
    }

    /// Idempotent. Leaves the room if the session had joined it.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.membership.take();
    }
}

#[debug_handler(state = AppState)]
pub async fn chat_ws(
    Path(peer): Path<String>,
    Caller(caller): Caller,
    State(state): State<AppState>,

    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let admitted = Session::connect(
            caller,
            &peer,
            &state.directory,
            state.store.clone(),
            state.registry.clone(),
        )
        .await;

        match admitted {
            Ok(session) => {
                let span =
                    tracing::info_span!("chat", room = %session.room(), user_id = session.me.id);
                let (sink, stream) = socket.split();
                run(sink, stream, session, state.config.outbound_buffer)
                    .instrument(span)
                    .await
            }
            Err(err) => refuse(socket, err).await,
        }
    })
}

async fn refuse(mut socket: WebSocket, err: AuthError) {
    tracing::info!(%err, "refusing chat connection");
    let _ = socket.send(Message::Close(None)).await;
}

async fn run<W, R, E>(mut sink: W, mut stream: R, mut session: Session, outbound_buffer: usize)
where
    W: Sink<Message> + Unpin + Send + 'static,
    <W as Sink<Message>>::Error: Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let (tx, mut rx) = mpsc::channel::<Utf8Bytes>(outbound_buffer);
    let evicted = CancellationToken::new();

    if let Err(err) = session.activate(Registrant::new(tx.clone(), evicted.clone())) {
        tracing::error!(%err, "registry refused connection");
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    tracing::info!(conn = ?session.conn(), "joined");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let writer_done = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = session.handle(text.as_str()).await {
                        match reply.encode() {
                            Ok(reply) => {
                                if tx.send(reply).await.is_err() {
                                    break false;
                                }
                            }
                            Err(err) => tracing::error!(%err, "cannot encode reply"),
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!(err = %DecodeError::Binary, "dropping frame");
                }
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(%err, "transport error");
                    break false;
                }
            },
            _ = evicted.cancelled() => break false,
            _ = &mut writer => break true,
        }
    };

    session.close();
    drop(session);
    drop(tx);

    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!("closed");
}
