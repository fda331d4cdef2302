//! Room: lobby plus match state machine.
//!
//! A room owns its roster, configuration, board, and move ledger, all behind
//! one mutex so joins, departures, settings changes, and the match-driving
//! loop cannot interleave unsafely. The match loop runs as its own task and
//! synchronizes with session tasks through single-owner oneshot gates stored
//! in the guarded state:
//!
//! - `pending_init` holds one sender per session currently inside the start
//!   handshake; `finished_initializing` (or that session's departure) fires it.
//! - `pending_turn` is the authoritative "turn resolved" signal. The move
//!   path takes the sender under the lock when it accepts a move; the timeout
//!   path only counts as a timeout if it can still take the sender. Exactly
//!   one of the two advances the turn.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::{Board, Move, MoveLedger, StoneColor};
use crate::errors::domain::{ConflictKind, DomainError};
use crate::protocol::messages::{
    MatchOutcome, RoomSettingsSnapshot, RoomSummary, ServerMessage,
};
use crate::server::registry::Registry;
use crate::server::session::{Session, SessionId};

pub const DEFAULT_BOARD_SIZE: usize = 20;

/// Accepted board-size range. The upper bound keeps a full board snapshot
/// well under the frame limit of the wire codec.
pub const MIN_BOARD_SIZE: usize = 5;
pub const MAX_BOARD_SIZE: usize = 50;

/// Longest accepted per-turn budget (one hour).
const MAX_TURN_TIMER_MS: u64 = 3_600_000;

const MAX_REVEAL_CHANCES: i32 = 100;

/// Sentinel returned for reveal-chance queries from non-seated sessions.
pub const REVEAL_CHANCES_NOT_APPLICABLE: i32 = -1;

/// Delay between `HostLeftDuringMatch` and the final `ReturnToRoomList`, so
/// clients can show a countdown.
const HOST_LEFT_GRACE: Duration = Duration::from_secs(5);

/// Creator-gated lobby configuration. Locked while a match is in progress.
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub board_size: usize,
    /// Per-turn budget in milliseconds; zero means untimed.
    pub turn_timer_ms: u64,
    /// Reveal-chance budget for the visibility-handicap mode.
    pub reveal_chances: i32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            turn_timer_ms: 0,
            reveal_chances: 0,
        }
    }
}

#[derive(Debug)]
struct RoomState {
    /// Insertion order is significant: the first two live entries are the
    /// players, everyone after them spectates. Derived, never cached.
    roster: Vec<Arc<Session>>,
    settings: RoomSettings,
    match_in_progress: bool,
    /// Monotonic per-room match counter. Tasks spawned for one match capture
    /// it and stop once a later match takes over.
    generation: u64,
    board: Option<Board>,
    ledger: MoveLedger,
    black: Option<Arc<Session>>,
    white: Option<Arc<Session>>,
    turn: Option<StoneColor>,
    winner: Option<StoneColor>,
    black_reveal_chances: i32,
    white_reveal_chances: i32,
    black_rematch: bool,
    white_rematch: bool,
    pending_turn: Option<oneshot::Sender<()>>,
    pending_init: HashMap<SessionId, oneshot::Sender<()>>,
}

impl RoomState {
    fn seat_color(&self, id: SessionId) -> Option<StoneColor> {
        if self.black.as_ref().map(|seat| seat.id()) == Some(id) {
            Some(StoneColor::Black)
        } else if self.white.as_ref().map(|seat| seat.id()) == Some(id) {
            Some(StoneColor::White)
        } else {
            None
        }
    }

    fn seat(&self, color: StoneColor) -> Option<&Arc<Session>> {
        match color {
            StoneColor::Black => self.black.as_ref(),
            StoneColor::White => self.white.as_ref(),
        }
    }

    /// Player/spectator role derived from current roster order.
    fn is_player(&self, id: SessionId) -> bool {
        self.roster.iter().take(2).any(|member| member.id() == id)
    }

    fn in_roster(&self, id: SessionId) -> bool {
        self.roster.iter().any(|member| member.id() == id)
    }

    /// Whether the match a task was spawned for is still the live one.
    fn is_current(&self, generation: u64) -> bool {
        self.match_in_progress && self.generation == generation
    }
}

#[derive(Debug)]
pub struct Room {
    id: u32,
    name: String,
    creator_id: SessionId,
    registry: Weak<Registry>,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(
        id: u32,
        name: String,
        creator: &Arc<Session>,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            creator_id: creator.id(),
            registry,
            state: Mutex::new(RoomState {
                roster: vec![creator.clone()],
                settings: RoomSettings::default(),
                match_in_progress: false,
                generation: 0,
                board: None,
                ledger: MoveLedger::new(),
                black: None,
                white: None,
                turn: None,
                winner: None,
                black_reveal_chances: 0,
                white_reveal_chances: 0,
                black_rematch: false,
                white_rematch: false,
                pending_turn: None,
                pending_init: HashMap::new(),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary_of(&self.state.lock())
    }

    fn summary_of(&self, state: &RoomState) -> RoomSummary {
        RoomSummary {
            room_id: self.id,
            name: self.name.clone(),
            creator_id: self.creator_id.to_string(),
            board_size: state.settings.board_size,
            turn_timer_ms: state.settings.turn_timer_ms,
            reveal_chances: state.settings.reveal_chances,
            connected_players: state.roster.len(),
        }
    }

    /// Append a session to the roster. Returns whether a match is running, so
    /// the caller can enroll the newcomer into it.
    pub fn add_member(self: &Arc<Self>, session: &Arc<Session>) -> bool {
        let mut state = self.state.lock();
        if !state.in_roster(session.id()) {
            state.roster.push(session.clone());
        }
        session.set_room(self);
        state.match_in_progress
    }

    /// Push a per-recipient settings snapshot to the whole roster.
    pub fn broadcast_settings(&self) {
        self.broadcast_settings_of(&self.state.lock());
    }

    fn broadcast_settings_of(&self, state: &RoomState) {
        let summary = self.summary_of(state);
        for member in &state.roster {
            let as_player = state.is_player(member.id());
            member.send(ServerMessage::RoomSettings(RoomSettingsSnapshot {
                room: summary.clone(),
                as_player,
                as_spectator: !as_player,
            }));
        }
    }

    // ---- Settings (creator-gated, lobby-only) ----

    pub fn set_board_size(&self, session: &Arc<Session>, size: usize) {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            warn!(room_id = self.id, size, "board size out of range, ignoring");
            return;
        }
        self.update_settings(session, |settings| settings.board_size = size);
    }

    pub fn set_turn_timer(&self, session: &Arc<Session>, millis: u64) {
        if millis > MAX_TURN_TIMER_MS {
            warn!(room_id = self.id, millis, "turn timer out of range, ignoring");
            return;
        }
        self.update_settings(session, |settings| settings.turn_timer_ms = millis);
    }

    pub fn set_reveal_chances(&self, session: &Arc<Session>, chances: i32) {
        if !(0..=MAX_REVEAL_CHANCES).contains(&chances) {
            warn!(room_id = self.id, chances, "reveal budget out of range, ignoring");
            return;
        }
        self.update_settings(session, |settings| settings.reveal_chances = chances);
    }

    fn update_settings(&self, session: &Arc<Session>, apply: impl FnOnce(&mut RoomSettings)) {
        {
            let state = &mut *self.state.lock();
            if session.id() != self.creator_id {
                warn!(
                    room_id = self.id,
                    session_id = %session.id(),
                    "settings change from non-creator ignored"
                );
                return;
            }
            if state.match_in_progress {
                warn!(room_id = self.id, "settings change rejected while match in progress");
                return;
            }
            apply(&mut state.settings);
            self.broadcast_settings_of(state);
        }
        // The listing mirrors the settings; refresh it outside the room lock.
        if let Some(registry) = self.registry.upgrade() {
            registry.broadcast_room_list();
        }
    }

    // ---- Match lifecycle ----

    /// Creator-only start request. Requires at least two roster members and
    /// no match already running.
    pub fn handle_start_request(self: &Arc<Self>, session: &Arc<Session>) -> Result<(), DomainError> {
        if session.id() != self.creator_id {
            warn!(
                room_id = self.id,
                session_id = %session.id(),
                "start request from non-creator ignored"
            );
            return Ok(());
        }
        let can_start = {
            let state = self.state.lock();
            !state.match_in_progress && state.roster.len() >= 2
        };
        if !can_start {
            return Err(DomainError::conflict(
                ConflictKind::NotEnoughPlayers,
                "a match needs two seated players and an idle room",
            ));
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.broadcast_room_list();
        }
        self.start_match();
        Ok(())
    }

    /// Transition Lobby/RematchPending -> Starting: fresh board, reset reveal
    /// budgets, 50/50 color draw over the two earliest roster entries, black
    /// to move first. The spawned task runs the start barrier and turn loop.
    fn start_match(self: &Arc<Self>) {
        let (participants, generation) = {
            let state = &mut *self.state.lock();
            if state.match_in_progress {
                warn!(room_id = self.id, "start requested while match already running");
                return;
            }
            if state.roster.len() < 2 {
                return;
            }

            state.match_in_progress = true;
            state.generation += 1;
            state.board = Some(Board::new(state.settings.board_size));
            state.ledger.clear();
            state.winner = None;
            state.black_rematch = false;
            state.white_rematch = false;
            state.black_reveal_chances = state.settings.reveal_chances;
            state.white_reveal_chances = state.settings.reveal_chances;

            let (first, second) = (state.roster[0].clone(), state.roster[1].clone());
            let (black, white) = if rand::random::<bool>() {
                (first, second)
            } else {
                (second, first)
            };
            state.black = Some(black.clone());
            state.white = Some(white.clone());
            state.turn = Some(StoneColor::Black);

            // Handshake order: the players first, then every spectator.
            let mut participants = vec![black, white];
            participants.extend(
                state
                    .roster
                    .iter()
                    .filter(|member| state.seat_color(member.id()).is_none())
                    .cloned(),
            );
            (participants, state.generation)
        };

        info!(room_id = self.id, "starting match");
        let room = self.clone();
        tokio::spawn(async move {
            room.run_match(participants, generation).await;
        });
    }

    async fn run_match(self: &Arc<Self>, participants: Vec<Arc<Session>>, generation: u64) {
        // Sequential start barrier: signal each participant and block until
        // that specific participant acknowledges before moving to the next.
        for participant in &participants {
            self.start_handshake(participant, generation).await;
        }

        loop {
            // Win check against the most recently ledgered move.
            {
                let state = &mut *self.state.lock();
                if !state.is_current(generation) {
                    break;
                }
                let won = state
                    .board
                    .as_ref()
                    .and_then(|board| state.ledger.winner(board));
                if let Some(color) = won {
                    state.winner = Some(color);
                    self.end_match_of(state);
                    break;
                }
            }

            // Arm the turn gate and request a move from the holder.
            let (holder, budget, resolved) = {
                let state = &mut *self.state.lock();
                if !state.is_current(generation) {
                    break;
                }
                let holder = state.turn.and_then(|color| state.seat(color)).cloned();
                let Some(holder) = holder else {
                    // Seat vacated concurrently; the departure path already
                    // ended the match.
                    break;
                };
                let (tx, rx) = oneshot::channel();
                state.pending_turn = Some(tx);
                (holder, state.settings.turn_timer_ms, rx)
            };
            holder.send(ServerMessage::MoveRequest {
                remaining_ms: budget,
            });

            if budget > 0 {
                match tokio::time::timeout(Duration::from_millis(budget), resolved).await {
                    // Move accepted, or the gate was dropped by an abort; the
                    // loop condition sorts the two apart.
                    Ok(_) => {}
                    Err(_elapsed) => {
                        // Only a timeout if this match is still live and the
                        // gate is still unclaimed.
                        let timed_out = {
                            let state = &mut *self.state.lock();
                            state.is_current(generation) && state.pending_turn.take().is_some()
                        };
                        if timed_out {
                            debug!(room_id = self.id, "turn timed out, passing");
                            holder.send(ServerMessage::MoveTimeout);
                        }
                    }
                }
            } else {
                let _ = resolved.await;
            }

            // Pass the turn.
            {
                let state = &mut *self.state.lock();
                if !state.is_current(generation) {
                    break;
                }
                state.turn = state.turn.map(StoneColor::opponent);
            }
        }

        info!(room_id = self.id, "match task finished");
    }

    async fn start_handshake(&self, session: &Arc<Session>, generation: u64) {
        let ack = {
            let state = &mut *self.state.lock();
            if !state.is_current(generation) || !state.in_roster(session.id()) {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.pending_init.insert(session.id(), tx);
            rx
        };
        session.send(ServerMessage::StartSignal);
        // Released by FinishedInitializing or by the session's departure.
        let _ = ack.await;
    }

    /// Enroll a session that joined mid-match as a spectator: it gets the same
    /// start handshake the other participants already completed.
    pub fn enroll_spectator(self: &Arc<Self>, session: &Arc<Session>) {
        let generation = self.state.lock().generation;
        let room = self.clone();
        let session = session.clone();
        tokio::spawn(async move {
            room.start_handshake(&session, generation).await;
        });
    }

    pub fn finished_initializing(&self, session: &Arc<Session>) {
        if let Some(ack) = self.state.lock().pending_init.remove(&session.id()) {
            let _ = ack.send(());
        }
    }

    /// Validate and apply a move from the current turn holder.
    pub fn submit_move(&self, session: &Arc<Session>, row: usize, col: usize) {
        let state = &mut *self.state.lock();
        if !state.match_in_progress {
            warn!(room_id = self.id, session_id = %session.id(), "move outside a match ignored");
            return;
        }
        let holder = state.turn.and_then(|color| state.seat(color)).map(|s| s.id());
        if holder != Some(session.id()) {
            warn!(
                room_id = self.id,
                session_id = %session.id(),
                "out-of-turn move ignored"
            );
            return;
        }
        if state.pending_turn.is_none() {
            // The turn already resolved (timeout fired); the move is late.
            warn!(room_id = self.id, session_id = %session.id(), "late move ignored");
            return;
        }
        let Some(color) = state.seat_color(session.id()) else {
            return;
        };
        let Some(board) = state.board.as_mut() else {
            return;
        };

        match board.place(row, col, color) {
            Err(err) => {
                debug!(room_id = self.id, %err, "invalid move");
                session.send(ServerMessage::MoveAck { accepted: false });
            }
            Ok(()) => {
                let mv = Move { row, col, color };
                state.ledger.push(mv);
                session.send(ServerMessage::MoveAck { accepted: true });
                for member in &state.roster {
                    member.send(ServerMessage::MovePlayed { mv });
                }
                if let Some(gate) = state.pending_turn.take() {
                    let _ = gate.send(());
                }
            }
        }
    }

    /// Give up the current turn without placing a stone. Clients playing the
    /// visibility handicap report this after repeated blind misplacements;
    /// only the turn holder can forfeit, and only while its gate is armed.
    pub fn forfeit_turn(&self, session: &Arc<Session>) {
        let state = &mut *self.state.lock();
        if !state.match_in_progress {
            return;
        }
        let holder = state.turn.and_then(|color| state.seat(color)).map(|s| s.id());
        if holder != Some(session.id()) {
            warn!(
                room_id = self.id,
                session_id = %session.id(),
                "forfeit from non-holder ignored"
            );
            return;
        }
        if let Some(gate) = state.pending_turn.take() {
            debug!(room_id = self.id, session_id = %session.id(), "turn forfeited");
            let _ = gate.send(());
        }
    }

    /// Transition to Ending: stop the loop, classify win vs abort, and send
    /// each roster member its own view of the result.
    fn end_match_of(&self, state: &mut RoomState) {
        info!(room_id = self.id, "ending match");
        state.match_in_progress = false;
        state.black_rematch = false;
        state.white_rematch = false;
        state.turn = None;
        // Dropping the gates wakes the match task and any handshake waiters.
        state.pending_turn = None;
        state.pending_init.clear();

        let was_abort = state.black.is_none() || state.white.is_none();
        if was_abort {
            // The remaining seated color, if any, wins by default.
            state.winner = match (&state.black, &state.white) {
                (Some(_), None) => Some(StoneColor::Black),
                (None, Some(_)) => Some(StoneColor::White),
                _ => None,
            };
        }

        let winning_color = state.winner;
        let winner_id = winning_color
            .and_then(|color| state.seat(color))
            .map(|seat| seat.id());
        for member in &state.roster {
            let outcome = if winner_id == Some(member.id()) {
                MatchOutcome::Winner
            } else if state.seat_color(member.id()).is_some() {
                MatchOutcome::Loser
            } else {
                MatchOutcome::Spectator
            };
            member.send(ServerMessage::MatchEnd {
                outcome,
                was_abort,
                winning_color,
            });
        }
    }

    // ---- Rematch negotiation ----

    /// Set the requester's rematch flag and notify the other seat; both flags
    /// together restart the match with a freshly reset state.
    pub fn request_rematch(self: &Arc<Self>, session: &Arc<Session>) {
        let restart = {
            let state = &mut *self.state.lock();
            let Some(color) = state.seat_color(session.id()) else {
                debug!(room_id = self.id, session_id = %session.id(), "rematch request from non-seat");
                return;
            };
            match color {
                StoneColor::Black => state.black_rematch = true,
                StoneColor::White => state.white_rematch = true,
            }
            match state.seat(color.opponent()) {
                Some(other) => other.send(ServerMessage::RematchRequested),
                None => session.send(ServerMessage::RematchImpossible),
            }
            state.black_rematch && state.white_rematch
        };
        if restart {
            info!(room_id = self.id, "both seats requested a rematch, restarting");
            self.start_match();
        }
    }

    /// Vacate the sender's seat without leaving the room. Mid-match this
    /// aborts the match; afterwards it only revokes the rematch option of the
    /// other seat, if occupied.
    pub fn exit_match(&self, session: &Arc<Session>) {
        let state = &mut *self.state.lock();
        let Some(color) = state.seat_color(session.id()) else {
            return;
        };
        match color {
            StoneColor::Black => state.black = None,
            StoneColor::White => state.white = None,
        }
        if state.match_in_progress {
            self.end_match_of(state);
        } else if let Some(other) = state.seat(color.opponent()) {
            other.send(ServerMessage::RematchImpossible);
        }
    }

    // ---- Queries ----

    pub fn send_board(&self, session: &Arc<Session>) {
        let state = self.state.lock();
        match &state.board {
            Some(board) => session.send(ServerMessage::Board {
                board: board.clone(),
            }),
            None => debug!(room_id = self.id, "board query before any match"),
        }
    }

    pub fn send_color(&self, session: &Arc<Session>) {
        let color = self.state.lock().seat_color(session.id());
        session.send(ServerMessage::Color { color });
    }

    pub fn send_reveal_chances(&self, session: &Arc<Session>) {
        let state = self.state.lock();
        let remaining = match state.seat_color(session.id()) {
            Some(StoneColor::Black) => state.black_reveal_chances,
            Some(StoneColor::White) => state.white_reveal_chances,
            None => REVEAL_CHANCES_NOT_APPLICABLE,
        };
        session.send(ServerMessage::RevealChances { remaining });
    }

    /// Spend one reveal chance and report the new balance. Non-seated
    /// sessions have no balance to spend.
    pub fn use_reveal_chance(&self, session: &Arc<Session>) {
        let state = &mut *self.state.lock();
        let remaining = match state.seat_color(session.id()) {
            Some(StoneColor::Black) => {
                state.black_reveal_chances -= 1;
                state.black_reveal_chances
            }
            Some(StoneColor::White) => {
                state.white_reveal_chances -= 1;
                state.white_reveal_chances
            }
            None => {
                debug!(room_id = self.id, session_id = %session.id(), "reveal spend from non-seat");
                return;
            }
        };
        session.send(ServerMessage::RevealChances { remaining });
    }

    // ---- Departure ----

    /// Remove a session from the room, whether it asked to leave or its
    /// connection dropped. Vacates its seat (aborting a running match), and
    /// tears the whole room down when the creator departs.
    pub fn handle_departure(self: &Arc<Self>, session: &Arc<Session>) {
        let teardown = {
            let state = &mut *self.state.lock();
            state.roster.retain(|member| member.id() != session.id());
            // Release the start barrier if it is waiting on the departer.
            state.pending_init.remove(&session.id());

            let mut was_in_match = false;
            if let Some(color) = state.seat_color(session.id()) {
                match color {
                    StoneColor::Black => state.black = None,
                    StoneColor::White => state.white = None,
                }
                if state.match_in_progress {
                    was_in_match = true;
                    self.end_match_of(state);
                }
            }

            self.broadcast_settings_of(state);

            if session.id() == self.creator_id {
                let members = std::mem::take(&mut state.roster);
                Some((members, was_in_match))
            } else {
                None
            }
        };
        session.clear_room();
        info!(room_id = self.id, session_id = %session.id(), "session left room");

        let registry = self.registry.upgrade();
        match teardown {
            None => {
                if let Some(registry) = registry {
                    registry.broadcast_room_list();
                }
            }
            Some((members, was_in_match)) => {
                info!(room_id = self.id, "creator left, closing room");
                if let Some(registry) = registry {
                    registry.remove_room(self.id);
                    registry.broadcast_room_list();
                }
                for member in members {
                    member.clear_room();
                    if was_in_match {
                        member.send(ServerMessage::HostLeftDuringMatch);
                        let member = member.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(HOST_LEFT_GRACE).await;
                            member.send(ServerMessage::ReturnToRoomList);
                        });
                    } else {
                        member.send(ServerMessage::ReturnToRoomList);
                    }
                }
            }
        }
    }
}
