use std::collections::{BTreeMap, VecDeque};

use crate::area::{ItemInstance, RoomRef, Slot};
use crate::mode::Mode;
use crate::perms::Permissions;
use crate::personalize::Gender;

/// Connection-scoped session id. Random (assigned by the transport), so ids
/// never collide across reconnects; ordering gives the tick loop its stable
/// iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u128);

impl SessionId {
    pub fn from_be_bytes(b: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(b))
    }

    /// Compact form for logs: XOR of the high/low halves.
    pub fn short(self) -> u64 {
        (self.0 as u64) ^ ((self.0 >> 64) as u64)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.short())
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// One connected human actor. Created on connect (in Login mode), promoted
/// into the player registry after login, destroyed on disconnect or quit at
/// a tick boundary.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Canonical (lowercase) playername; empty until login completes.
    pub name: String,
    pub permissions: Permissions,
    pub gender: Gender,
    pub email: Option<String>,
    pub mode: Mode,
    /// Mode requested by a command this turn; applied when the turn ends.
    pub pending_mode: Option<Mode>,
    inq: VecDeque<String>,
    outq: Vec<String>,
    pub location: Option<RoomRef>,
    pub inventory: Vec<ItemInstance>,
    /// Slot -> uid of the equipped inventory item.
    pub equipped: BTreeMap<Slot, u64>,
    pub channels: BTreeMap<String, bool>,
    pub quit_flag: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert("chat".to_string(), true);
        Self {
            id,
            name: String::new(),
            permissions: Permissions::PLAYER,
            gender: Gender::Neutral,
            email: None,
            mode: Mode::login(),
            pending_mode: None,
            inq: VecDeque::new(),
            outq: Vec::new(),
            location: None,
            inventory: Vec::new(),
            equipped: BTreeMap::new(),
            channels,
            quit_flag: false,
        }
    }

    pub fn fancy_name(&self) -> String {
        if self.name.is_empty() {
            "Someone".to_string()
        } else {
            capitalize(&self.name)
        }
    }

    /// Enqueue outbound text. Never blocks; the server drains the buffer
    /// between ticks.
    pub fn update_output(&mut self, text: impl Into<String>) {
        self.outq.push(text.into());
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outq)
    }

    pub fn push_input(&mut self, line: String) {
        self.inq.push_back(line);
    }

    /// Dequeue exactly one buffered input line, if any.
    pub fn pop_input(&mut self) -> Option<String> {
        self.inq.pop_front()
    }

    pub fn has_input(&self) -> bool {
        !self.inq.is_empty()
    }

    pub fn input_len(&self) -> usize {
        self.inq.len()
    }

    pub fn find_inventory(&self, keyword: &str) -> Option<usize> {
        self.inventory.iter().position(|i| i.matches(keyword))
    }

    pub fn is_equipped(&self, uid: u64) -> bool {
        self.equipped.values().any(|&u| u == uid)
    }

    pub fn channel_on(&self, channel: &str) -> bool {
        self.channels.get(channel).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_queue_is_fifo() {
        let mut s = Session::new(SessionId(1));
        s.push_input("first".to_string());
        s.push_input("second".to_string());
        assert_eq!(s.pop_input().as_deref(), Some("first"));
        assert_eq!(s.pop_input().as_deref(), Some("second"));
        assert_eq!(s.pop_input(), None);
    }

    #[test]
    fn output_buffer_drains_once() {
        let mut s = Session::new(SessionId(1));
        s.update_output("a");
        s.update_output("b");
        assert_eq!(s.take_output(), vec!["a".to_string(), "b".to_string()]);
        assert!(s.take_output().is_empty());
    }

    #[test]
    fn fancy_name_capitalizes() {
        let mut s = Session::new(SessionId(1));
        assert_eq!(s.fancy_name(), "Someone");
        s.name = "alice".to_string();
        assert_eq!(s.fancy_name(), "Alice");
    }
}
