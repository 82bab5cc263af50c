//! Remote-control sessions keyed by peer identity and peer-chosen nonce.

mod table;

pub use table::{DEFAULT_SESSIONS, Session, SessionTable, StartOutcome};
