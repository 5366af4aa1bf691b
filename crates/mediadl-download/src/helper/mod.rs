//! External extraction helper: line protocol and subprocess bridge.

mod bridge;
mod protocol;

pub use bridge::HelperCommandExtractor;
pub use protocol::{HelperEvent, ProtocolError, parse_line};
