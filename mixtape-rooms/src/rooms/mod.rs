mod room;

use std::sync::Arc;
use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use log::info;
use thiserror::Error;

pub use room::*;

use crate::{
    events::{Events, OutgoingEvent, Recipients},
    util,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Not authorized to perform this action")]
    Unauthorized,
    #[error("Not a member of this room")]
    NotAMember,
    #[error("Already in a room")]
    AlreadyInRoom,
}

/// Owns every live room and is the single source of truth for room
/// existence. Codes are reserved for a room's whole lifetime and free for
/// reuse once it is destroyed.
pub struct RoomRegistry {
    events: Events,
    rooms: DashMap<RoomCode, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new(events: Events) -> Arc<Self> {
        Arc::new(Self {
            events,
            rooms: Default::default(),
        })
    }

    /// Creates and registers a room under a freshly allocated code.
    ///
    /// Candidate codes are rejection-sampled against the live set; the
    /// check-and-reserve happens under the map's entry lock so concurrent
    /// creations can never race into the same code.
    pub fn create_room(&self, new_room: NewRoom) -> Arc<Room> {
        loop {
            let code = util::room_code();

            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    let room = Arc::new(Room::new(code.clone(), new_room));
                    vacant.insert(room.clone());

                    info!("Created room {}", code);
                    break room;
                }
            }
        }
    }

    pub fn get(&self, code: &RoomCode) -> Option<Arc<Room>> {
        self.rooms.get(code).map(|r| r.clone())
    }

    /// Removes a room and frees its code. Destroying an absent code is a
    /// no-op.
    pub fn destroy(&self, code: &RoomCode) {
        let Some(room) = self.get(code) else { return };

        // Close before unregistering, so a join racing the teardown fails
        // on the room it already resolved
        room.close();
        self.rooms.remove(code);

        info!("Destroyed room {}", code);
    }

    /// Tears down rooms that have seen no activity for `max_idle`, notifying
    /// their participants. The registry never calls this on its own; it is
    /// the hook an operator-driven sweeper runs on an interval.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .filter(|r| r.is_idle(max_idle))
            .map(|r| r.value().clone())
            .collect();

        let mut swept = 0;

        for room in idle {
            let notified = room.close();
            self.rooms.remove(room.code());

            // An empty list means the room was already closed elsewhere
            if notified.is_empty() {
                continue;
            }

            info!("Swept idle room {}", room.code());
            swept += 1;

            self.events.emit(
                OutgoingEvent::RoomClosed {
                    room_code: room.code().clone(),
                },
                Recipients::Some(notified),
            );
        }

        swept
    }

    pub fn list(&self) -> Vec<RoomSnapshot> {
        self.rooms.iter().map(|r| r.snapshot()).collect()
    }
}
