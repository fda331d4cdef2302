//! Per-connection session: identity, outbound queue, and message dispatch.
//!
//! Each accepted connection gets one receive loop (this module) and one
//! writer task draining the session's outbound queue. All room and registry
//! messages addressed to the peer are routed through [`Session::send`].

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::sync::Weak;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::errors::domain::{ConflictKind, DomainError};
use crate::protocol::codec::{decode_client_message, encode_message, frame_codec};
use crate::protocol::messages::{ClientMessage, ServerMessage};
use crate::server::registry::Registry;
use crate::server::room::Room;

/// Process-wide unique session identity, allocated from a monotonic counter.
/// Displays as the zero-padded ten-digit form used in room summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:010}", self.0)
    }
}

/// One connected peer's server-side handle.
///
/// The room back-reference is weak: the registry owns rooms, a session only
/// points at the one it currently occupies.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    room: Mutex<Weak<Room>>,
}

impl Session {
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<ServerMessage>) -> Arc<Self> {
        Arc::new(Self {
            id,
            outbound,
            room: Mutex::new(Weak::new()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue one message for the peer. A closed queue means the connection is
    /// already torn down; the message is dropped, never an error.
    pub fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            debug!(session_id = %self.id, "dropping message for closed session");
        }
    }

    pub fn current_room(&self) -> Option<Arc<Room>> {
        self.room.lock().upgrade()
    }

    pub fn set_room(&self, room: &Arc<Room>) {
        *self.room.lock() = Arc::downgrade(room);
    }

    pub fn clear_room(&self) {
        *self.room.lock() = Weak::new();
    }
}

/// Drive one accepted connection to completion.
///
/// Registers the session, runs the framed receive loop, and on any exit path
/// (clean close, read error, malformed frame) performs the same implicit
/// leave-room teardown.
pub async fn run_connection(stream: TcpStream, registry: Arc<Registry>) {
    let (read_half, write_half) = stream.into_split();
    let mut frames_in = FramedRead::new(read_half, frame_codec());
    let mut frames_out = FramedWrite::new(write_half, frame_codec());

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let session = registry.register_session(outbound_tx);
    let session_id = session.id();
    info!(%session_id, "session connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let frame = match encode_message(&message) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%session_id, error = %err, "failed to encode outbound message");
                    continue;
                }
            };
            if frames_out.send(frame).await.is_err() {
                break;
            }
        }
    });

    session.send(ServerMessage::Welcome {
        session_id: session_id.to_string(),
    });

    while let Some(frame) = frames_in.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%session_id, error = %err, "transport failure, closing session");
                break;
            }
        };
        let message = match decode_client_message(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(%session_id, error = %err, "malformed frame, closing session");
                break;
            }
        };
        dispatch(&registry, &session, message);
    }

    // A lost connection is handled exactly like an explicit leave request.
    leave_current_room(&session);
    registry.unregister_session(&session);
    writer.abort();
    info!(%session_id, "session disconnected");
}

/// Route one decoded message to the registry or the session's current room.
fn dispatch(registry: &Arc<Registry>, session: &Arc<Session>, message: ClientMessage) {
    match message {
        ClientMessage::CreateRoom { name } => {
            if let Err(err) = registry.create_room(session, name) {
                warn!(session_id = %session.id(), error = %err, "create room rejected");
                session.send(ServerMessage::AlreadyInRoom);
            }
        }
        ClientMessage::JoinRoom { room_id } => {
            if let Err(err) = registry.join_room(session, room_id) {
                warn!(session_id = %session.id(), error = %err, "join room rejected");
                // Unknown rooms stay a silent no-op on the wire; only an
                // affiliation conflict is reported back.
                if matches!(err, DomainError::Conflict(ConflictKind::AlreadyInRoom, _)) {
                    session.send(ServerMessage::AlreadyInRoom);
                }
            }
        }
        ClientMessage::LeaveRoom => leave_current_room(session),
        ClientMessage::GetRoomList => {
            session.send(ServerMessage::RoomList {
                rooms: registry.room_summaries(),
            });
        }

        // Everything below is meaningful only inside a room.
        ClientMessage::StartMatch => with_room(session, |room| {
            if let Err(err) = room.handle_start_request(session) {
                warn!(session_id = %session.id(), error = %err, "match start rejected");
                session.send(ServerMessage::NotEnoughPlayers);
            }
        }),
        ClientMessage::GetBoard => with_room(session, |room| room.send_board(session)),
        ClientMessage::GetColor => with_room(session, |room| room.send_color(session)),
        ClientMessage::GetRevealChances => {
            with_room(session, |room| room.send_reveal_chances(session))
        }
        ClientMessage::UseRevealChance => {
            with_room(session, |room| room.use_reveal_chance(session))
        }
        ClientMessage::Move { row, col } => {
            with_room(session, |room| room.submit_move(session, row, col))
        }
        ClientMessage::ForfeitTurn => with_room(session, |room| room.forfeit_turn(session)),
        ClientMessage::SetBoardSize { size } => {
            with_room(session, |room| room.set_board_size(session, size))
        }
        ClientMessage::SetTurnTimer { millis } => {
            with_room(session, |room| room.set_turn_timer(session, millis))
        }
        ClientMessage::SetRevealChances { chances } => {
            with_room(session, |room| room.set_reveal_chances(session, chances))
        }
        ClientMessage::RematchRequest => with_room(session, |room| room.request_rematch(session)),
        ClientMessage::ExitMatch => with_room(session, |room| room.exit_match(session)),
        ClientMessage::FinishedInitializing => {
            with_room(session, |room| room.finished_initializing(session))
        }
    }
}

fn with_room(session: &Arc<Session>, action: impl FnOnce(Arc<Room>)) {
    match session.current_room() {
        Some(room) => action(room),
        None => warn!(session_id = %session.id(), "room-scoped message from unaffiliated session"),
    }
}

fn leave_current_room(session: &Arc<Session>) {
    if let Some(room) = session.current_room() {
        room.handle_departure(session);
    }
}
