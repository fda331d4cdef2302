pub mod board;
pub mod ledger;

pub use board::{Board, StoneColor};
pub use ledger::{Move, MoveLedger, WIN_LENGTH};
