use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::area::{ItemInstance, RoomRef};
use crate::commands::QueuedCommand;
use crate::events::EventTable;
use crate::perms::Permissions;
use crate::personalize::Gender;

/// World-unique id of a live NPC instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NpcId(pub u64);

impl std::fmt::Display for NpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "npc#{}", self.0)
    }
}

/// Lines an NPC instance "remembers" in its output log.
pub const LOG_LINES: usize = 25;

// Default template permissions: PLAYER | DM.
fn default_permission_bits() -> u32 {
    (Permissions::PLAYER | Permissions::DM).bits()
}

/// NPC template: the area-resident prototype edited in build mode. Live
/// copies are stamped out by [`Npc::spawn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub area: String,
    pub name: String,
    pub title: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default = "default_permission_bits")]
    pub permission_bits: u32,
    pub description: String,
    #[serde(default)]
    pub events: EventTable,
}

impl Npc {
    pub fn create(id: String, area: String) -> Self {
        Self {
            id,
            area,
            name: "a new npc".to_string(),
            title: "A new npc is here.".to_string(),
            keywords: vec!["npc".to_string()],
            gender: Gender::Neutral,
            permission_bits: default_permission_bits(),
            description: "Remarkably unremarkable.".to_string(),
            events: EventTable::default(),
        }
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits_truncate(self.permission_bits)
    }

    /// Reset this template's keyword list from its name.
    pub fn default_keywords(&mut self) {
        self.keywords = self
            .name
            .split_whitespace()
            .map(|w| w.to_ascii_lowercase())
            .collect();
        let full = self.name.to_ascii_lowercase();
        if !self.keywords.contains(&full) {
            self.keywords.push(full);
        }
    }

    /// Stamp out a live instance. The event table is snapshotted behind an
    /// `Arc` at spawn time: later template edits never reach instances that
    /// are already alive.
    pub fn spawn(&self, id: NpcId, location: RoomRef) -> NpcInstance {
        NpcInstance {
            id,
            source: (self.area.clone(), self.id.clone()),
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            gender: self.gender,
            permission_bits: self.permission_bits,
            location,
            inventory: Vec::new(),
            cmdq: VecDeque::new(),
            log: VecDeque::new(),
            events: Arc::new(self.events.clone()),
        }
    }

    pub fn describe(&self) -> String {
        let mut s = format!(
            "--- NPC {} from area {} ---\nname: {}\ntitle: {}\ngender: {}\nkeywords: {}\npermissions: {}\ndescription:\n    {}\n",
            self.id,
            self.area,
            self.name,
            self.title,
            self.gender.as_str(),
            self.keywords.join(", "),
            self.permissions().names(),
            self.description,
        );
        s.push_str("NPC EVENTS:\n");
        s.push_str(&self.events.describe());
        s
    }
}

/// Live NPC: an autonomous actor in the world. Holds its own command queue
/// and a bounded output log; the tick loop services the queue one command
/// per tick while the NPC is subscribed.
#[derive(Debug, Clone)]
pub struct NpcInstance {
    pub id: NpcId,
    /// `(area, template id)` this instance was spawned from.
    pub source: (String, String),
    pub name: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub gender: Gender,
    pub permission_bits: u32,
    pub location: RoomRef,
    pub inventory: Vec<ItemInstance>,
    pub cmdq: VecDeque<QueuedCommand>,
    pub log: VecDeque<String>,
    pub events: Arc<EventTable>,
}

impl NpcInstance {
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits_truncate(self.permission_bits)
    }

    pub fn fancy_name(&self) -> String {
        crate::session::capitalize(&self.name)
    }

    pub fn matches(&self, keyword: &str) -> bool {
        let kw = keyword.trim().to_ascii_lowercase();
        if kw.is_empty() {
            return false;
        }
        self.name.to_ascii_lowercase() == kw
            || self.keywords.iter().any(|k| k.to_ascii_lowercase() == kw)
    }

    /// Append to the output log, dropping the oldest lines beyond
    /// [`LOG_LINES`].
    pub fn update_output(&mut self, message: impl Into<String>) {
        self.log.push_back(message.into());
        while self.log.len() > LOG_LINES {
            self.log.pop_front();
        }
    }

    pub fn find_inventory(&self, keyword: &str) -> Option<usize> {
        self.inventory.iter().position(|i| i.matches(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Npc {
        let mut npc = Npc::create("1".to_string(), "moor".to_string());
        npc.name = "gruff bartender".to_string();
        npc.default_keywords();
        npc
    }

    #[test]
    fn output_log_is_bounded() {
        let t = template();
        let mut npc = t.spawn(NpcId(1), RoomRef::new("moor", "1"));
        for i in 0..(LOG_LINES + 10) {
            npc.update_output(format!("line {i}"));
        }
        assert_eq!(npc.log.len(), LOG_LINES);
        assert_eq!(npc.log.front().unwrap(), "line 10");
    }

    #[test]
    fn default_keywords_come_from_name() {
        let t = template();
        assert!(t.keywords.contains(&"gruff".to_string()));
        assert!(t.keywords.contains(&"bartender".to_string()));
        assert!(t.keywords.contains(&"gruff bartender".to_string()));
    }

    #[test]
    fn spawn_snapshots_event_table() {
        let mut t = template();
        let inst = t.spawn(NpcId(2), RoomRef::new("moor", "1"));
        // Template edits after spawn must not reach the live instance.
        t.events = EventTable::default();
        assert!(Arc::strong_count(&inst.events) >= 1);
        assert!(inst.matches("bartender"));
    }
}
