//! Wire message taxonomy.
//!
//! Every frame on the wire is one JSON object tagged with a snake_case
//! `"type"` field. Clients send [`ClientMessage`], the server sends
//! [`ServerMessage`]. The transport framing itself lives in [`super::codec`].

use serde::{Deserialize, Serialize};

use crate::domain::{Board, Move, StoneColor};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom { name: String },
    JoinRoom { room_id: u32 },
    LeaveRoom,
    StartMatch,
    GetRoomList,
    GetBoard,
    GetColor,
    GetRevealChances,
    UseRevealChance,
    Move { row: usize, col: usize },
    /// Sent by a turn holder giving up its turn without placing a stone
    /// (visibility-handicap clients report this after repeated blind
    /// misplacements).
    ForfeitTurn,
    SetBoardSize { size: usize },
    SetTurnTimer { millis: u64 },
    SetRevealChances { chances: i32 },
    RematchRequest,
    ExitMatch,
    FinishedInitializing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect so the peer learns its session id.
    Welcome {
        session_id: String,
    },

    RoomList {
        rooms: Vec<RoomSummary>,
    },
    RoomSettings(RoomSettingsSnapshot),
    AlreadyInRoom,
    NotEnoughPlayers,

    StartSignal,
    MoveRequest {
        remaining_ms: u64,
    },
    MoveTimeout,
    MoveAck {
        accepted: bool,
    },
    /// Broadcast to the whole roster, spectators included, after every
    /// accepted move so local boards can render it.
    MovePlayed {
        mv: Move,
    },
    MatchEnd {
        outcome: MatchOutcome,
        was_abort: bool,
        winning_color: Option<StoneColor>,
    },

    RematchRequested,
    RematchImpossible,

    Board {
        board: Board,
    },
    /// `None` means the peer holds no seat (spectator).
    Color {
        color: Option<StoneColor>,
    },
    RevealChances {
        remaining: i32,
    },

    HostLeftDuringMatch,
    ReturnToRoomList,
}

/// How the match ended, from one recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Winner,
    Loser,
    Spectator,
}

/// One entry of the broadcastable room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: u32,
    pub name: String,
    pub creator_id: String,
    pub board_size: usize,
    pub turn_timer_ms: u64,
    pub reveal_chances: i32,
    pub connected_players: usize,
}

/// Full room configuration plus the recipient's derived role flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettingsSnapshot {
    #[serde(flatten)]
    pub room: RoomSummary,
    pub as_player: bool,
    pub as_spectator: bool,
}
