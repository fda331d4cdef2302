//! Process-wide authoritative set of rooms and live sessions.
//!
//! The registry is the only component allowed to add or remove rooms. Both
//! collections are mutated by concurrent session tasks, so every
//! read-modify-write happens under one mutex acquisition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::domain::{ConflictKind, DomainError};
use crate::protocol::messages::{RoomSummary, ServerMessage};
use crate::server::room::Room;
use crate::server::session::{Session, SessionId};

pub struct Registry {
    sessions: Mutex<Vec<Arc<Session>>>,
    rooms: Mutex<Vec<Arc<Room>>>,
    next_session_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
            rooms: Mutex::new(Vec::new()),
            next_session_id: AtomicU64::new(0),
        })
    }

    /// Allocate an id and track a freshly accepted connection.
    pub fn register_session(
        &self,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Arc<Session> {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(id, outbound);
        self.sessions.lock().push(session.clone());
        session
    }

    pub fn unregister_session(&self, session: &Arc<Session>) {
        self.sessions
            .lock()
            .retain(|tracked| tracked.id() != session.id());
    }

    /// Create a room with `session` as creator and first roster entry, then
    /// broadcast the updated listing to every connected session. A session
    /// already occupying a room cannot create another.
    pub fn create_room(
        self: &Arc<Self>,
        session: &Arc<Session>,
        name: String,
    ) -> Result<Arc<Room>, DomainError> {
        if session.current_room().is_some() {
            return Err(DomainError::conflict(
                ConflictKind::AlreadyInRoom,
                "session already occupies a room",
            ));
        }
        let room = {
            let mut rooms = self.rooms.lock();
            let room_id = allocate_room_id(&rooms);
            let room = Room::new(room_id, name, session, Arc::downgrade(self));
            rooms.push(room.clone());
            room
        };
        session.set_room(&room);
        info!(room_id = room.id(), session_id = %session.id(), "room created");

        self.broadcast_room_list();
        room.broadcast_settings();
        Ok(room)
    }

    /// Append `session` to an existing room's roster.
    pub fn join_room(
        self: &Arc<Self>,
        session: &Arc<Session>,
        room_id: u32,
    ) -> Result<(), DomainError> {
        if session.current_room().is_some() {
            return Err(DomainError::conflict(
                ConflictKind::AlreadyInRoom,
                "session already occupies a room",
            ));
        }
        let Some(room) = self.find_room(room_id) else {
            return Err(DomainError::not_found(format!("room {room_id}")));
        };

        let match_running = room.add_member(session);
        info!(room_id, session_id = %session.id(), "session joined room");

        self.broadcast_room_list();
        room.broadcast_settings();

        // Joining a running match enrolls the newcomer as a spectator through
        // the same start handshake the other participants already completed.
        if match_running {
            room.enroll_spectator(session);
        }
        Ok(())
    }

    pub fn remove_room(&self, room_id: u32) {
        self.rooms.lock().retain(|room| room.id() != room_id);
    }

    pub fn find_room(&self, room_id: u32) -> Option<Arc<Room>> {
        self.rooms
            .lock()
            .iter()
            .find(|room| room.id() == room_id)
            .cloned()
    }

    /// Ordered snapshot of the room listing.
    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        self.rooms.lock().iter().map(|room| room.summary()).collect()
    }

    /// Push the current room listing to every connected session.
    pub fn broadcast_room_list(&self) {
        let rooms = self.room_summaries();
        for session in self.sessions.lock().iter() {
            session.send(ServerMessage::RoomList {
                rooms: rooms.clone(),
            });
        }
    }
}

/// Random room id with a collision-retry guard against the live map.
fn allocate_room_id(rooms: &[Arc<Room>]) -> u32 {
    let mut rng = rand::rng();
    loop {
        let candidate = rng.random_range(1..10_000);
        if !rooms.iter().any(|room| room.id() == candidate) {
            return candidate;
        }
    }
}
