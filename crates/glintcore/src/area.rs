use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::npc::{Npc, NpcId};
use crate::session::SessionId;
use crate::CommandError;

/// Non-owning reference to a room: `(area name, room id)`. Rooms are always
/// resolved through the world at use time, so a stale ref degrades into a
/// "doesn't exist" path instead of dangling memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    pub area: String,
    pub room: String,
}

impl RoomRef {
    pub fn new(area: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            room: room.into(),
        }
    }
}

impl std::fmt::Display for RoomRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.area, self.room)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Some(Direction::North),
            "south" | "s" => Some(Direction::South),
            "east" | "e" => Some(Direction::East),
            "west" | "w" => Some(Direction::West),
            "up" | "u" => Some(Direction::Up),
            "down" | "d" => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub to: RoomRef,
    #[serde(default)]
    pub openable: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub key: Option<String>,
}

impl Exit {
    pub fn to(to: RoomRef) -> Self {
        Self {
            to,
            openable: false,
            closed: false,
            hidden: false,
            locked: false,
            key: None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Head,
    Neck,
    Torso,
    Arms,
    Hands,
    MainHand,
    OffHand,
    Legs,
    Feet,
}

impl Slot {
    pub fn parse(s: &str) -> Option<Slot> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Some(Slot::Head),
            "neck" => Some(Slot::Neck),
            "torso" | "body" => Some(Slot::Torso),
            "arms" => Some(Slot::Arms),
            "hands" => Some(Slot::Hands),
            "mainhand" | "main_hand" | "wield" => Some(Slot::MainHand),
            "offhand" | "off_hand" => Some(Slot::OffHand),
            "legs" => Some(Slot::Legs),
            "feet" => Some(Slot::Feet),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Head => "head",
            Slot::Neck => "neck",
            Slot::Torso => "torso",
            Slot::Arms => "arms",
            Slot::Hands => "hands",
            Slot::MainHand => "mainhand",
            Slot::OffHand => "offhand",
            Slot::Legs => "legs",
            Slot::Feet => "feet",
        }
    }

    /// Message shown when an item lands in this slot; `#item` is replaced
    /// with the item's name.
    pub fn equip_message(self) -> &'static str {
        match self {
            Slot::Head => "You place #item on your head.",
            Slot::Neck => "You hang #item around your neck.",
            Slot::Torso => "You pull #item over your torso.",
            Slot::Arms => "You slide #item onto your arms.",
            Slot::Hands => "You pull #item onto your hands.",
            Slot::MainHand => "You grip #item in your main hand.",
            Slot::OffHand => "You grip #item in your off hand.",
            Slot::Legs => "You pull #item onto your legs.",
            Slot::Feet => "You pull #item onto your feet.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portal {
    pub to: RoomRef,
    #[serde(default = "Portal::default_leave")]
    pub leave_message: String,
    #[serde(default = "Portal::default_entrance")]
    pub entrance_message: String,
    #[serde(default = "Portal::default_emerge")]
    pub emerge_message: String,
}

impl Portal {
    fn default_leave() -> String {
        "#actor steps into a portal and vanishes.".to_string()
    }

    fn default_entrance() -> String {
        "You step through the portal.".to_string()
    }

    fn default_emerge() -> String {
        "#actor steps out of a shimmering portal.".to_string()
    }

    pub fn new(to: RoomRef) -> Self {
        Self {
            to,
            leave_message: Self::default_leave(),
            entrance_message: Self::default_entrance(),
            emerge_message: Self::default_emerge(),
        }
    }
}

/// Item template, owned by an area and edited in build mode. Live copies
/// are stamped out by [`Item::spawn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub base_value: u32,
    #[serde(default = "default_true")]
    pub pickup: bool,
    #[serde(default)]
    pub equip_slot: Option<Slot>,
    #[serde(default)]
    pub portal: Option<Portal>,
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn create(id: String) -> Self {
        Self {
            id,
            name: "a new item".to_string(),
            title: "A new item lies here.".to_string(),
            description: "Nondescript in every way.".to_string(),
            keywords: vec!["item".to_string()],
            weight: 0,
            base_value: 0,
            pickup: true,
            equip_slot: None,
            portal: None,
        }
    }

    pub fn spawn(&self, uid: u64, area: &str) -> ItemInstance {
        ItemInstance {
            uid,
            source: (area.to_string(), self.id.clone()),
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            weight: self.weight,
            base_value: self.base_value,
            pickup: self.pickup,
            equip_slot: self.equip_slot,
            portal: self.portal.clone(),
        }
    }
}

/// A live, in-play item: in an inventory or on a room floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInstance {
    pub uid: u64,
    /// `(area, item id)` of the template this was spawned from.
    pub source: (String, String),
    pub name: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub weight: u32,
    pub base_value: u32,
    pub pickup: bool,
    pub equip_slot: Option<Slot>,
    pub portal: Option<Portal>,
}

impl ItemInstance {
    pub fn matches(&self, keyword: &str) -> bool {
        let kw = keyword.trim().to_ascii_lowercase();
        if kw.is_empty() {
            return false;
        }
        self.name.to_ascii_lowercase() == kw
            || self.keywords.iter().any(|k| k.to_ascii_lowercase() == kw)
    }
}

/// Script body: one command line per line, fed through an NPC's `perform`
/// by the event subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub name: String,
    pub body: String,
}

impl Script {
    pub fn create(id: String) -> Self {
        Self {
            id,
            name: "new script".to_string(),
            body: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub title: String,
    pub description: String,
    pub exits: BTreeMap<Direction, Exit>,
    #[serde(default)]
    pub items: Vec<ItemInstance>,
    #[serde(skip)]
    pub sessions: BTreeSet<SessionId>,
    #[serde(skip)]
    pub npcs: BTreeSet<NpcId>,
}

impl Room {
    pub fn create(id: String) -> Self {
        Self {
            id,
            title: "New Room".to_string(),
            description: "An empty room. The walls wait for a builder.".to_string(),
            ..Default::default()
        }
    }

    pub fn find_item(&self, keyword: &str) -> Option<usize> {
        self.items.iter().position(|i| i.matches(keyword))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    pub title: String,
    pub level_range: String,
    pub description: String,
    #[serde(default)]
    pub builders: Vec<String>,
    #[serde(default)]
    pub rooms: BTreeMap<String, Room>,
    #[serde(default)]
    pub items: BTreeMap<String, Item>,
    #[serde(default)]
    pub npcs: BTreeMap<String, Npc>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Script>,
}

impl Area {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            title: "New Area".to_string(),
            level_range: "All".to_string(),
            description: "No description.".to_string(),
            builders: Vec::new(),
            rooms: BTreeMap::new(),
            items: BTreeMap::new(),
            npcs: BTreeMap::new(),
            scripts: BTreeMap::new(),
        }
    }

    /// Next free numeric id for one of this area's object maps (max + 1,
    /// starting at 1).
    fn next_id<V>(map: &BTreeMap<String, V>) -> String {
        let max = map
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        (max + 1).to_string()
    }

    pub fn new_room(&mut self) -> &mut Room {
        let id = Self::next_id(&self.rooms);
        self.rooms
            .entry(id.clone())
            .or_insert_with(|| Room::create(id))
    }

    pub fn new_item(&mut self) -> &mut Item {
        let id = Self::next_id(&self.items);
        self.items
            .entry(id.clone())
            .or_insert_with(|| Item::create(id))
    }

    pub fn new_npc(&mut self) -> &mut Npc {
        let id = Self::next_id(&self.npcs);
        let area = self.name.clone();
        self.npcs
            .entry(id.clone())
            .or_insert_with(|| Npc::create(id, area))
    }

    pub fn new_script(&mut self) -> &mut Script {
        let id = Self::next_id(&self.scripts);
        self.scripts
            .entry(id.clone())
            .or_insert_with(|| Script::create(id))
    }

    pub fn get_room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_npc(&self, id: &str) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn get_script(&self, id: &str) -> Option<&Script> {
        self.scripts.get(id)
    }

    pub fn destroy_room(&mut self, id: &str) -> Result<String, CommandError> {
        let room = self.rooms.get(id).ok_or_else(|| {
            CommandError::NotFound(format!("Room {id} doesn't exist."))
        })?;
        if !room.sessions.is_empty() || !room.npcs.is_empty() {
            return Err(CommandError::Usage(
                "You can't destroy that room, there's someone in there!".to_string(),
            ));
        }
        self.rooms.remove(id);
        Ok(format!("Room {id} has been destroyed."))
    }

    pub fn destroy_item(&mut self, id: &str) -> Result<String, CommandError> {
        match self.items.remove(id) {
            Some(item) => Ok(format!("\"{}\" has been destroyed.", item.name)),
            None => Err(CommandError::NotFound(
                "That item doesn't exist.".to_string(),
            )),
        }
    }

    pub fn destroy_npc(&mut self, id: &str) -> Result<String, CommandError> {
        match self.npcs.remove(id) {
            Some(npc) => Ok(format!("\"{}\" has been destroyed.", npc.name)),
            None => Err(CommandError::NotFound(
                "That npc doesn't exist.".to_string(),
            )),
        }
    }

    pub fn destroy_script(&mut self, id: &str) -> Result<String, CommandError> {
        match self.scripts.remove(id) {
            Some(s) => Ok(format!("Script \"{}\" has been destroyed.", s.name)),
            None => Err(CommandError::NotFound(
                "That script doesn't exist.".to_string(),
            )),
        }
    }

    pub fn describe(&self) -> String {
        let mut s = String::new();
        s.push_str(&center_header(" Area "));
        s.push_str(&format!(
            "Name: {} (not changeable)\nTitle: {}\nLevel Range: {}\nBuilders: {}\n",
            self.name,
            self.title,
            self.level_range,
            self.builders.join(", "),
        ));
        s.push_str(&format!(
            "Rooms: {}\nItems: {}\nNpcs: {}\nScripts: {}\nDescription:\n    {}\n",
            self.rooms.len(),
            self.items.len(),
            self.npcs.len(),
            self.scripts.len(),
            self.description,
        ));
        s.push_str(&rule());
        s
    }

    pub fn list_rooms(&self) -> String {
        list_block(
            &format!(" Rooms in area \"{}\" ", self.name),
            self.rooms.iter().map(|(k, v)| (k.as_str(), v.title.as_str())),
        )
    }

    pub fn list_items(&self) -> String {
        list_block(
            &format!(" Items in area \"{}\" ", self.name),
            self.items.iter().map(|(k, v)| (k.as_str(), v.name.as_str())),
        )
    }

    pub fn list_npcs(&self) -> String {
        list_block(
            &format!(" Npcs in area \"{}\" ", self.name),
            self.npcs.iter().map(|(k, v)| (k.as_str(), v.name.as_str())),
        )
    }

    pub fn list_scripts(&self) -> String {
        list_block(
            &format!(" Scripts in area \"{}\" ", self.name),
            self.scripts
                .iter()
                .map(|(k, v)| (k.as_str(), v.name.as_str())),
        )
    }
}

const RULE_WIDTH: usize = 50;

fn rule() -> String {
    format!("{}\n", "-".repeat(RULE_WIDTH))
}

fn center_header(label: &str) -> String {
    let pad = RULE_WIDTH.saturating_sub(label.len());
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}\n", "-".repeat(left), label, "-".repeat(right))
}

fn list_block<'a>(
    header: &str,
    rows: impl Iterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut s = center_header(header);
    let mut any = false;
    for (id, name) in rows {
        any = true;
        s.push_str(&format!("{id} - {name}\n"));
    }
    if !any {
        s.push_str("None.\n");
    }
    s.push_str(&rule());
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_counts_up_from_max() {
        let mut area = Area::new("moor");
        assert_eq!(area.new_room().id, "1");
        assert_eq!(area.new_room().id, "2");
        area.rooms.remove("1");
        assert_eq!(area.new_room().id, "3");
    }

    #[test]
    fn destroy_room_refuses_occupied() {
        let mut area = Area::new("moor");
        let id = area.new_room().id.clone();
        area.rooms
            .get_mut(&id)
            .unwrap()
            .sessions
            .insert(crate::session::SessionId(1));
        assert!(area.destroy_room(&id).is_err());

        area.rooms.get_mut(&id).unwrap().sessions.clear();
        assert!(area.destroy_room(&id).is_ok());
        assert!(area.get_room(&id).is_none());
    }

    #[test]
    fn item_instance_matches_keywords_and_name() {
        let mut item = Item::create("1".to_string());
        item.name = "a rusty sword".to_string();
        item.keywords = vec!["sword".to_string(), "rusty".to_string()];
        let inst = item.spawn(7, "moor");
        assert!(inst.matches("SWORD"));
        assert!(inst.matches("a rusty sword"));
        assert!(!inst.matches("dagger"));
    }

    #[test]
    fn direction_parse_and_opposite() {
        assert_eq!(Direction::parse("N"), Some(Direction::North));
        assert_eq!(Direction::North.opposite(), Direction::South);
        assert_eq!(Direction::parse("sideways"), None);
    }
}
