//! Realtime conversational session: wire protocol and session manager.

pub mod protocol;
pub mod session;

pub use protocol::{FunctionCall, FunctionResponse, ServerMessage};
pub use session::{BridgeEvent, SessionManager, SessionState};
