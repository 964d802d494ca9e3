#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use futures_util::StreamExt;
use ridechat::{
    accounts::{Account, AccountType, NewAccount},
    app,
    chat::RoomKey,
    config::Config,
    db, AppState,
};
use serde_json::Value;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

pub struct User {
    pub account: Account,
    pub token: String,
}

pub async fn spawn() -> TestServer {
    let config = Config {
        database_url: "sqlite::memory:".to_owned(),
        bind_addr: "127.0.0.1:0".to_owned(),
        ..Config::default()
    };
    let db_pool = db::connect(&config.database_url, 1).await.unwrap();
    let state = AppState::new(db_pool, config).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer { addr, state }
}

impl TestServer {
    pub async fn user(&self, email: &str, full_name: &str, account_type: AccountType) -> User {
        let account = self
            .state
            .directory
            .register(NewAccount {
                email: Some(email.to_owned()),
                full_name: full_name.to_owned(),
                account_type,
                ..Default::default()
            })
            .await
            .unwrap();
        let token = self.state.directory.issue_token(account.id).await.unwrap();
        User { account, token }
    }

    pub async fn connect(&self, me: &User, peer: &User) -> Ws {
        let url = format!("ws://{}/ws/chat/{}?token={}", self.addr, peer.account.id, me.token);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    /// Waits until `room` has exactly `n` registrants.
    pub async fn wait_for_registrants(&self, room: RoomKey, n: usize) {
        let registry = self.state.registry.clone();
        timeout(Duration::from_secs(5), async move {
            while registry.registrants(room) != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("room {room} never reached {n} registrants"));
    }
}

pub async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}
