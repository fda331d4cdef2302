pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, decode_server_message, encode_message, frame_codec};
pub use messages::{
    ClientMessage, MatchOutcome, RoomSettingsSnapshot, RoomSummary, ServerMessage,
};
