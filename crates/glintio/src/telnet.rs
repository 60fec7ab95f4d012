//! Telnet IAC stripping.
//!
//! Minimal by intent: the world only wants clean text, so every option a
//! client proposes is refused:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`
//!
//! Subnegotiation blocks (`IAC SB ... IAC SE`) are dropped wholesale, and
//! `IAC IAC` unescapes to a literal 0xff byte.

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FilterState {
    #[default]
    Text,
    Command,
    Option(u8),
    SubnegOpt,
    Subneg,
    SubnegIac,
}

/// Incremental IAC filter. Feed it raw socket chunks; it appends clean text
/// to one buffer and refusal replies to another. State survives chunk
/// boundaries, so negotiation split across reads is handled.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `chunk`, pushing plain text onto `text` and any negotiation
    /// refusals onto `replies`.
    pub fn feed(&mut self, chunk: &[u8], text: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &b in chunk {
            self.state = match self.state {
                FilterState::Text => {
                    if b == IAC {
                        FilterState::Command
                    } else {
                        text.push(b);
                        FilterState::Text
                    }
                }
                FilterState::Command => match b {
                    IAC => {
                        // Escaped literal 0xff.
                        text.push(IAC);
                        FilterState::Text
                    }
                    DO | DONT | WILL | WONT => FilterState::Option(b),
                    SB => FilterState::SubnegOpt,
                    // NOP, GA and friends are two bytes total.
                    _ => FilterState::Text,
                },
                FilterState::Option(cmd) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    FilterState::Text
                }
                FilterState::SubnegOpt => FilterState::Subneg,
                FilterState::Subneg => {
                    if b == IAC {
                        FilterState::SubnegIac
                    } else {
                        FilterState::Subneg
                    }
                }
                FilterState::SubnegIac => {
                    if b == SE {
                        FilterState::Text
                    } else {
                        // IAC IAC inside SB is an escaped byte we discard
                        // along with the rest of the payload.
                        FilterState::Subneg
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&[u8]]) -> (Vec<u8>, Vec<u8>) {
        let mut f = TelnetFilter::new();
        let mut text = Vec::new();
        let mut replies = Vec::new();
        for c in chunks {
            f.feed(c, &mut text, &mut replies);
        }
        (text, replies)
    }

    #[test]
    fn plain_text_passes_through() {
        let (t, r) = run(&[b"look at sword\r\n"]);
        assert_eq!(t, b"look at sword\r\n");
        assert!(r.is_empty());
    }

    #[test]
    fn escaped_iac_becomes_literal() {
        let (t, r) = run(&[&[IAC, IAC, b'q']]);
        assert_eq!(t, vec![IAC, b'q']);
        assert!(r.is_empty());
    }

    #[test]
    fn do_and_will_are_refused() {
        let (t, r) = run(&[&[IAC, DO, 1, IAC, WILL, 3, b'x']]);
        assert_eq!(t, vec![b'x']);
        assert_eq!(r, vec![IAC, WONT, 1, IAC, DONT, 3]);
    }

    #[test]
    fn negotiation_split_across_chunks() {
        let (t, r) = run(&[&[IAC, DO], &[31, b'z']]);
        assert_eq!(t, vec![b'z']);
        assert_eq!(r, vec![IAC, WONT, 31]);
    }

    #[test]
    fn subnegotiation_is_dropped() {
        let (t, r) = run(&[&[b'a', IAC, SB, 24, b'v', b't', IAC, SE, b'b']]);
        assert_eq!(t, vec![b'a', b'b']);
        assert!(r.is_empty());
    }

    #[test]
    fn dont_and_wont_get_no_reply() {
        let (t, r) = run(&[&[IAC, DONT, 1, IAC, WONT, 3]]);
        assert!(t.is_empty());
        assert!(r.is_empty());
    }
}
