//! Shared IPC surface between the speak-anywhere daemon and its CLI:
//! the newline-framed JSON command protocol and the XDG path conventions
//! both sides must agree on.

pub mod paths;
pub mod protocol;

pub use protocol::Request;
