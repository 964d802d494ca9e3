//! Room membership and fan-out.
//!
//! Each room's connection set sits behind its own map entry, so join, leave
//! and broadcast on one room are mutually exclusive while other rooms proceed.
//! Locks are always taken rooms-then-members, never the other way round.

use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Utf8Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::RegistryError;

use super::RoomKey;

pub type ConnId = Uuid;

/// A live connection's outbound side.
#[derive(Debug, Clone)]
pub struct Registrant {
    pub id: ConnId,
    tx: mpsc::Sender<Utf8Bytes>,
    evicted: CancellationToken,
}

impl Registrant {
    pub fn new(tx: mpsc::Sender<Utf8Bytes>, evicted: CancellationToken) -> Registrant {
        Registrant {
            id: Uuid::now_v7(),
            tx,
            evicted,
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    rooms: DashMap<RoomKey, HashMap<ConnId, Registrant>>,
    members: DashMap<ConnId, RoomKey>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a connection. Joining the same room twice is a no-op;
    /// joining a second room is an invariant violation.
    pub fn join(&self, room: RoomKey, registrant: Registrant) -> Result<(), RegistryError> {
        let mut conns = self.rooms.entry(room).or_default();

        let result = match self.members.entry(registrant.id) {
            Entry::Occupied(existing) if *existing.get() == room => Ok(()),
            Entry::Occupied(existing) => Err(RegistryError::AlreadyJoined {
                conn: registrant.id,
                room: *existing.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(room);
                conns.insert(registrant.id, registrant);
                Ok(())
            }
        };

        let empty = conns.is_empty();
        drop(conns);
        if empty {
            self.rooms.remove_if(&room, |_, conns| conns.is_empty());
        }
        result
    }

    /// Removes a connection. Returns whether it was registered; absent is fine.
    pub fn leave(&self, room: RoomKey, conn: ConnId) -> bool {
        let (removed, empty) = {
            let Some(mut conns) = self.rooms.get_mut(&room) else {
                return false;
            };
            let removed = conns.remove(&conn).is_some();
            if removed {
                self.members.remove_if(&conn, |_, joined| *joined == room);
            }
            (removed, conns.is_empty())
        };

        if empty {
            self.rooms.remove_if(&room, |_, conns| conns.is_empty());
        }
        removed
    }

    /// Queues `frame` for every registrant of `room`, the sender included.
    ///
    /// Never waits on a peer. A registrant whose queue is full or closed is
    /// evicted on the spot and its session is told to shut down. Returns the
    /// number of registrants the frame was queued for.
    pub fn broadcast(&self, room: RoomKey, frame: Utf8Bytes) -> usize {
        let mut delivered = 0;
        let empty = {
            let Some(mut conns) = self.rooms.get_mut(&room) else {
                return 0;
            };

            conns.retain(|id, registrant| match registrant.tx.try_send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(err) => {
                    let reason = match err {
                        TrySendError::Full(_) => "outbound queue full",
                        TrySendError::Closed(_) => "connection gone",
                    };
                    tracing::warn!(%room, conn = %id, reason, "evicting registrant");
                    registrant.evicted.cancel();
                    self.members.remove(id);
                    false
                }
            });
            conns.is_empty()
        };

        if empty {
            self.rooms.remove_if(&room, |_, conns| conns.is_empty());
        }
        delivered
    }

    pub fn registrants(&self, room: RoomKey) -> usize {
        self.rooms.get(&room).map_or(0, |conns| conns.len())
    }

    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// A joined connection. Dropping it leaves the room, exactly once.
#[derive(Debug)]
pub struct Membership {
    registry: Arc<Registry>,
    room: RoomKey,
    conn: ConnId,
}

impl Membership {
    pub fn enter(
        registry: Arc<Registry>,
        room: RoomKey,
        registrant: Registrant,
    ) -> Result<Membership, RegistryError> {
        let conn = registrant.id;
        registry.join(room, registrant)?;
        Ok(Membership { registry, room, conn })
    }

    pub fn room(&self) -> RoomKey {
        self.room
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.registry.leave(self.room, self.conn) {
            tracing::debug!(room = %self.room, conn = %self.conn, "left room");
        }
    }
}
