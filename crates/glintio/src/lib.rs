//! `glintio`: telnet-aware line transport.
//!
//! The server speaks plain text over TCP, but real MUD clients sprinkle the
//! stream with telnet IAC negotiation. [`line::LineReader`] buffers a socket,
//! strips IAC sequences via [`telnet::TelnetFilter`] (refusing every option),
//! and yields complete lines with the CR/LF terminators already trimmed —
//! exactly the shape the world engine's per-session input queues expect.

pub mod line;
pub mod telnet;

pub use line::LineReader;
pub use telnet::TelnetFilter;
