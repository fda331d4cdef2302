pub mod listener;
pub mod registry;
pub mod room;
pub mod session;

pub use listener::{run_listener, Listener};
pub use registry::Registry;
pub use room::Room;
pub use session::{Session, SessionId};
