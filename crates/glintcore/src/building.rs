//! Build-mode commands: world authoring from inside the world.
//!
//! Field editing is table-driven: each entity type has an explicit match
//! from field name to a typed setter. There is no reflection anywhere —
//! an unknown field is just "You can't set that."

use crate::area::{Area, Direction, Exit, Portal, RoomRef, Slot};
use crate::commands::{split_command, Command, CommandRegistry, Ctx};
use crate::events::{EventBinding, ScriptRef};
use crate::mode::{EditTarget, Mode, TextEditMode};
use crate::personalize::Gender;
use crate::session::SessionId;
use crate::world::{Actor, World};
use crate::{CmdResult, CommandError, Permissions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    Room,
    Item,
    Npc,
    Script,
}

impl ObjKind {
    pub fn parse(s: &str) -> Option<ObjKind> {
        match s.trim().trim_end_matches('s').to_ascii_lowercase().as_str() {
            "room" => Some(ObjKind::Room),
            "item" => Some(ObjKind::Item),
            "npc" => Some(ObjKind::Npc),
            "script" => Some(ObjKind::Script),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjKind::Room => "room",
            ObjKind::Item => "item",
            ObjKind::Npc => "npc",
            ObjKind::Script => "script",
        }
    }
}

/// Reference to an editable object inside an area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjRef {
    pub kind: ObjKind,
    pub area: String,
    pub id: String,
}

pub fn build_registry() -> CommandRegistry {
    let mut r = CommandRegistry::new();
    let cmd = |run: crate::commands::CommandFn| Command {
        required: Permissions::BUILDER,
        run,
    };
    r.register(cmd(bcmd_create), &["create", "new"]);
    r.register(cmd(bcmd_edit), &["edit"]);
    r.register(cmd(bcmd_list), &["list"]);
    r.register(cmd(bcmd_set), &["set"]);
    r.register(cmd(bcmd_add), &["add"]);
    r.register(cmd(bcmd_remove), &["remove"]);
    r.register(cmd(bcmd_link), &["link"]);
    r.register(cmd(bcmd_destroy), &["destroy"]);
    r.register(cmd(bcmd_export), &["export"]);
    r.register(cmd(bcmd_import), &["import"]);
    r
}

/// Session + build-state pair every build command starts from.
fn builder_ctx<'c, 'a>(
    ctx: &'c mut Ctx<'a>,
) -> Option<(SessionId, &'c mut crate::mode::BuildMode)> {
    let Actor::Session(sid) = ctx.actor else {
        return None;
    };
    ctx.build.as_deref_mut().map(|bm| (sid, bm))
}

fn can_edit_area(world: &World, actor_name: &str, perms: Permissions, area: &str) -> bool {
    perms.contains(Permissions::GOD)
        || world
            .area(area)
            .map_or(false, |a| a.builders.iter().any(|b| b == actor_name))
}

fn bcmd_create(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let actor = ctx.actor;
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    if args.is_empty() {
        return Err(CommandError::Usage(
            "What do you want to create?".to_string(),
        ));
    }
    let (what, name) = split_command(&args);
    let what = what.to_ascii_lowercase();

    if what == "area" {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            world.send(actor, "You can't create a new area without a name.");
            return Ok(());
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CommandError::Usage(
                "Area names are letters, digits and underscores only.".to_string(),
            ));
        }
        let mut area = Area::new(&name);
        let builder = world
            .session(sid)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        if !builder.is_empty() {
            area.builders.push(builder);
        }
        if !world.add_area(area) {
            world.send(actor, "That area already exists.");
            return Ok(());
        }
        bm.edit_area = Some(name.clone());
        bm.edit_object = None;
        world.send(actor, format!("New area \"{name}\" created."));
        return Ok(());
    }

    let Some(kind) = ObjKind::parse(&what) else {
        world.send(actor, "You can't create that.");
        return Ok(());
    };
    let Some(area_name) = bm.edit_area.clone() else {
        world.send(actor, "You need to be editing an area first.");
        return Ok(());
    };
    let Some(area) = world.area_mut(&area_name) else {
        bm.edit_area = None;
        return Err(CommandError::NotFound(
            "That area doesn't exist anymore.".to_string(),
        ));
    };
    let id = match kind {
        ObjKind::Room => area.new_room().id.clone(),
        ObjKind::Item => area.new_item().id.clone(),
        ObjKind::Npc => area.new_npc().id.clone(),
        ObjKind::Script => area.new_script().id.clone(),
    };
    bm.edit_object = Some(ObjRef {
        kind,
        area: area_name,
        id: id.clone(),
    });
    world.send(
        actor,
        format!("New {} number {id} created.", kind.as_str()),
    );
    Ok(())
}

fn bcmd_edit(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let actor = ctx.actor;
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    let (what, rest) = split_command(&args);
    let rest = rest.trim().to_ascii_lowercase();
    if what.is_empty() || rest.is_empty() {
        return Err(CommandError::Usage(
            "Try: \"edit area <name>\" or \"edit <room|item|npc|script> <id>\".".to_string(),
        ));
    }

    if what.eq_ignore_ascii_case("area") {
        if !world.area_exists(&rest) {
            return Err(CommandError::NotFound(
                "That area doesn't exist. You should create it first.".to_string(),
            ));
        }
        let (name, perms) = world
            .session(sid)
            .map(|s| (s.name.clone(), s.permissions))
            .unwrap_or((String::new(), Permissions::empty()));
        if !can_edit_area(world, &name, perms, &rest) {
            world.send(actor, "You aren't allowed to edit someone else's area.");
            return Ok(());
        }
        bm.edit_area = Some(rest.clone());
        bm.edit_object = None;
        world.send(actor, format!("Now editing area \"{rest}\"."));
        return Ok(());
    }

    let Some(kind) = ObjKind::parse(what) else {
        world.send(actor, "You can't edit that.");
        return Ok(());
    };
    let Some(area_name) = bm.edit_area.clone() else {
        world.send(
            actor,
            "You need to be editing an area before you can edit its contents.",
        );
        return Ok(());
    };
    let obj = ObjRef {
        kind,
        area: area_name,
        id: rest,
    };
    match describe_obj(world, &obj) {
        Some(text) => {
            bm.edit_object = Some(obj);
            world.send(actor, text);
        }
        None => {
            world.send(
                actor,
                format!(
                    "That {} doesn't exist. Type \"list {}s\" to see all the {}s in your area.",
                    kind.as_str(),
                    kind.as_str(),
                    kind.as_str()
                ),
            );
        }
    }
    Ok(())
}

fn describe_obj(world: &World, obj: &ObjRef) -> Option<String> {
    let area = world.area(&obj.area)?;
    match obj.kind {
        ObjKind::Room => {
            let room = area.get_room(&obj.id)?;
            let mut s = format!(
                "--- Room {} in area {} ---\ntitle: {}\ndescription:\n    {}\nexits:\n",
                room.id, obj.area, room.title, room.description
            );
            if room.exits.is_empty() {
                s.push_str("    None.\n");
            }
            for (dir, exit) in &room.exits {
                s.push_str(&format!("    {} -> {}\n", dir.as_str(), exit.to));
            }
            Some(s)
        }
        ObjKind::Item => {
            let item = area.get_item(&obj.id)?;
            let slot = item
                .equip_slot
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "none".to_string());
            let portal = item
                .portal
                .as_ref()
                .map(|p| p.to.to_string())
                .unwrap_or_else(|| "none".to_string());
            Some(format!(
                "--- Item {} in area {} ---\nname: {}\ntitle: {}\nkeywords: {}\nweight: {}\nbase value: {}\npickup: {}\nequip slot: {}\nportal to: {}\ndescription:\n    {}\n",
                item.id,
                obj.area,
                item.name,
                item.title,
                item.keywords.join(", "),
                item.weight,
                item.base_value,
                item.pickup,
                slot,
                portal,
                item.description
            ))
        }
        ObjKind::Npc => Some(area.get_npc(&obj.id)?.describe()),
        ObjKind::Script => {
            let script = area.get_script(&obj.id)?;
            Some(format!(
                "--- Script {} in area {} ---\nname: {}\nbody:\n{}\n",
                script.id, obj.area, script.name, script.body
            ))
        }
    }
}

fn bcmd_list(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.trim().to_ascii_lowercase();
    let actor = ctx.actor;
    let Some((_, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };

    if args.is_empty() {
        let message = if let Some(obj) = &bm.edit_object {
            describe_obj(world, obj)
                .unwrap_or_else(|| "That object doesn't exist anymore.".to_string())
        } else if let Some(area) = &bm.edit_area {
            world
                .area(area)
                .map(|a| a.describe())
                .unwrap_or_else(|| "That area doesn't exist anymore.".to_string())
        } else {
            "You're not editing anything right now.".to_string()
        };
        world.send(actor, message);
        return Ok(());
    }

    if args == "areas" {
        let names = world.area_names();
        let message = if names.is_empty() {
            "There are no areas yet.".to_string()
        } else {
            let mut m = "Areas:".to_string();
            for n in names {
                m.push('\n');
                m.push_str(&n);
            }
            m
        };
        world.send(actor, message);
        return Ok(());
    }

    let raw: Vec<&str> = args.split_whitespace().collect();

    // "area [name]"
    if raw.first() == Some(&"area") {
        let name = raw
            .get(1)
            .map(|s| s.to_string())
            .or_else(|| bm.edit_area.clone());
        let message = match name.and_then(|n| world.area(&n).map(|a| a.describe())) {
            Some(d) => d,
            None => "That area doesn't exist.".to_string(),
        };
        world.send(actor, message);
        return Ok(());
    }

    let toks: Vec<String> = raw
        .into_iter()
        .filter(|t| *t != "in" && *t != "area")
        .map(str::to_string)
        .collect();
    let Some(kind) = toks.first().and_then(|t| ObjKind::parse(t)) else {
        return Err(CommandError::Usage("You can't list that.".to_string()));
    };
    let (id, area_name) = match toks.len() {
        1 => (None, None),
        2 => {
            let t = &toks[1];
            if t.chars().all(|c| c.is_ascii_digit()) {
                (Some(t.clone()), None)
            } else {
                (None, Some(t.clone()))
            }
        }
        3 => (Some(toks[1].clone()), Some(toks[2].clone())),
        _ => return Err(CommandError::Usage("You can't list that.".to_string())),
    };
    let Some(area_name) = area_name.or_else(|| bm.edit_area.clone()) else {
        world.send(
            actor,
            format!("What area do you want to list {}s for?", kind.as_str()),
        );
        return Ok(());
    };
    let Some(area) = world.area(&area_name) else {
        return Err(CommandError::NotFound(
            "That area doesn't exist.".to_string(),
        ));
    };
    let message = match id {
        Some(id) => describe_obj(
            world,
            &ObjRef {
                kind,
                area: area_name.clone(),
                id: id.clone(),
            },
        )
        .unwrap_or_else(|| {
            format!(
                "{} \"{id}\" doesn't exist in area \"{area_name}\".",
                crate::session::capitalize(kind.as_str())
            )
        }),
        None => match kind {
            ObjKind::Room => area.list_rooms(),
            ObjKind::Item => area.list_items(),
            ObjKind::Npc => area.list_npcs(),
            ObjKind::Script => area.list_scripts(),
        },
    };
    world.send(actor, message);
    Ok(())
}

fn current_target(bm: &crate::mode::BuildMode) -> Option<EditTarget> {
    bm.edit_object
        .clone()
        .map(EditTarget::Object)
        .or_else(|| bm.edit_area.clone().map(EditTarget::Area))
}

fn bcmd_set(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    let Some(target) = current_target(bm) else {
        world.send_session(sid, "You must be editing something to set its attributes.");
        return Ok(());
    };
    if args.is_empty() {
        return Err(CommandError::Usage("What do you want to set?".to_string()));
    }
    let (field, value) = split_command(&args);
    let field = field.to_ascii_lowercase();
    let message = apply_set(world, sid, &target, &field, value.trim());
    world.send_session(sid, message);
    Ok(())
}

fn apply_set(
    world: &mut World,
    sid: SessionId,
    target: &EditTarget,
    field: &str,
    value: &str,
) -> String {
    match target {
        EditTarget::Area(name) => set_area_field(world, sid, name, field, value),
        EditTarget::Object(obj) => match obj.kind {
            ObjKind::Room => set_room_field(world, sid, obj, field, value),
            ObjKind::Item => set_item_field(world, sid, obj, field, value),
            ObjKind::Npc => set_npc_field(world, sid, obj, field, value),
            ObjKind::Script => set_script_field(world, sid, obj, field, value),
        },
    }
}

fn enter_textedit(
    world: &mut World,
    sid: SessionId,
    target: EditTarget,
    field: &str,
    current: &str,
) -> String {
    world.request_mode(sid, Mode::TextEdit(TextEditMode::new(target, field, current)));
    "ENTERING TextEditMode: type \"@help\" for help.".to_string()
}

fn set_area_field(
    world: &mut World,
    sid: SessionId,
    name: &str,
    field: &str,
    value: &str,
) -> String {
    match field {
        "title" => {
            if value.is_empty() {
                return "Set the title to what?".to_string();
            }
            match world.area_mut(name) {
                Some(a) => {
                    a.title = value.to_string();
                    "Area title set.".to_string()
                }
                None => "That area doesn't exist anymore.".to_string(),
            }
        }
        "levelrange" | "level_range" => match world.area_mut(name) {
            Some(a) => {
                a.level_range = value.to_string();
                "Area level range set.".to_string()
            }
            None => "That area doesn't exist anymore.".to_string(),
        },
        "description" => {
            let current = world
                .area(name)
                .map(|a| a.description.clone())
                .unwrap_or_default();
            enter_textedit(
                world,
                sid,
                EditTarget::Area(name.to_string()),
                "description",
                &current,
            )
        }
        _ => "You can't set that.".to_string(),
    }
}

fn set_room_field(
    world: &mut World,
    sid: SessionId,
    obj: &ObjRef,
    field: &str,
    value: &str,
) -> String {
    match field {
        "title" => {
            if value.is_empty() {
                return "Set the title to what?".to_string();
            }
            match world
                .area_mut(&obj.area)
                .and_then(|a| a.rooms.get_mut(&obj.id))
            {
                Some(r) => {
                    r.title = value.to_string();
                    "Room title saved.".to_string()
                }
                None => "That room doesn't exist anymore.".to_string(),
            }
        }
        "description" => {
            let current = world
                .area(&obj.area)
                .and_then(|a| a.get_room(&obj.id))
                .map(|r| r.description.clone())
                .unwrap_or_default();
            enter_textedit(
                world,
                sid,
                EditTarget::Object(obj.clone()),
                "description",
                &current,
            )
        }
        _ => "You can't set that.".to_string(),
    }
}

fn set_item_field(
    world: &mut World,
    sid: SessionId,
    obj: &ObjRef,
    field: &str,
    value: &str,
) -> String {
    if field == "description" {
        let current = world
            .area(&obj.area)
            .and_then(|a| a.get_item(&obj.id))
            .map(|i| i.description.clone())
            .unwrap_or_default();
        return enter_textedit(
            world,
            sid,
            EditTarget::Object(obj.clone()),
            "description",
            &current,
        );
    }
    if field == "portal" {
        let toks: Vec<&str> = value.split_whitespace().collect();
        let to = match toks.as_slice() {
            ["none"] => None,
            [area, room] => {
                let r = RoomRef::new(*area, *room);
                if world.room(&r).is_none() {
                    return "That area/room combo doesn't exist.".to_string();
                }
                Some(r)
            }
            _ => {
                return "Try: \"set portal <area> <room>\" or \"set portal none\".".to_string()
            }
        };
        return match world
            .area_mut(&obj.area)
            .and_then(|a| a.items.get_mut(&obj.id))
        {
            Some(i) => {
                i.portal = to.map(Portal::new);
                "Item portal saved.".to_string()
            }
            None => "That item doesn't exist anymore.".to_string(),
        };
    }

    let Some(item) = world
        .area_mut(&obj.area)
        .and_then(|a| a.items.get_mut(&obj.id))
    else {
        return "That item doesn't exist anymore.".to_string();
    };
    match field {
        "name" => {
            if value.is_empty() {
                return "Set the name to what?".to_string();
            }
            item.name = value.to_string();
            "Item name saved.".to_string()
        }
        "title" => {
            item.title = value.to_string();
            "Item title saved.".to_string()
        }
        "keywords" => {
            if value.is_empty() {
                item.keywords = item
                    .name
                    .split_whitespace()
                    .map(|w| w.to_ascii_lowercase())
                    .collect();
                "Item keywords have been reset.".to_string()
            } else {
                item.keywords = value
                    .split(',')
                    .map(|w| w.trim().to_ascii_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                "Item keywords have been set.".to_string()
            }
        }
        "weight" => match value.parse::<u32>() {
            Ok(w) => {
                item.weight = w;
                "Item weight saved.".to_string()
            }
            Err(_) => "Weight must be a number.".to_string(),
        },
        "value" | "basevalue" | "base_value" => match value.parse::<u32>() {
            Ok(v) => {
                item.base_value = v;
                "Item value saved.".to_string()
            }
            Err(_) => "Value must be a number.".to_string(),
        },
        "pickup" => match value.to_ascii_lowercase().as_str() {
            "true" | "yes" => {
                item.pickup = true;
                "Item can now be picked up.".to_string()
            }
            "false" | "no" => {
                item.pickup = false;
                "Item can no longer be picked up.".to_string()
            }
            _ => "Try: \"set pickup true\" or \"set pickup false\".".to_string(),
        },
        "slot" | "equipslot" | "equip_slot" => {
            if value.eq_ignore_ascii_case("none") {
                item.equip_slot = None;
                return "Item equip slot cleared.".to_string();
            }
            match Slot::parse(value) {
                Some(slot) => {
                    item.equip_slot = Some(slot);
                    "Item equip slot saved.".to_string()
                }
                None => {
                    "Valid slots are: head, neck, torso, arms, hands, mainhand, offhand, legs, feet."
                        .to_string()
                }
            }
        }
        _ => "You can't set that.".to_string(),
    }
}

fn set_npc_field(
    world: &mut World,
    sid: SessionId,
    obj: &ObjRef,
    field: &str,
    value: &str,
) -> String {
    if field == "description" {
        let current = world
            .area(&obj.area)
            .and_then(|a| a.get_npc(&obj.id))
            .map(|n| n.description.clone())
            .unwrap_or_default();
        return enter_textedit(
            world,
            sid,
            EditTarget::Object(obj.clone()),
            "description",
            &current,
        );
    }
    let Some(npc) = world
        .area_mut(&obj.area)
        .and_then(|a| a.npcs.get_mut(&obj.id))
    else {
        return "That npc doesn't exist anymore.".to_string();
    };
    match field {
        "name" => {
            if value.is_empty() {
                return "Set the name to what?".to_string();
            }
            npc.name = value.to_string();
            "Npc name saved.".to_string()
        }
        "title" => {
            npc.title = value.to_string();
            "Npc title saved.".to_string()
        }
        "gender" => match Gender::parse(value) {
            Some(g) => {
                npc.gender = g;
                format!("{}'s gender has been set to {}.", npc.name, g.as_str())
            }
            None => "Valid genders are: female, male, neutral.".to_string(),
        },
        "keywords" => {
            if value.is_empty() {
                npc.default_keywords();
                "Npc keywords have been reset.".to_string()
            } else {
                npc.keywords = value
                    .split(',')
                    .map(|w| w.trim().to_ascii_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                "Npc keywords have been set.".to_string()
            }
        }
        _ => "You can't set that.".to_string(),
    }
}

fn set_script_field(
    world: &mut World,
    sid: SessionId,
    obj: &ObjRef,
    field: &str,
    value: &str,
) -> String {
    if field == "body" {
        let current = world
            .area(&obj.area)
            .and_then(|a| a.get_script(&obj.id))
            .map(|s| s.body.clone())
            .unwrap_or_default();
        return enter_textedit(world, sid, EditTarget::Object(obj.clone()), "body", &current);
    }
    let Some(script) = world
        .area_mut(&obj.area)
        .and_then(|a| a.scripts.get_mut(&obj.id))
    else {
        return "That script doesn't exist anymore.".to_string();
    };
    match field {
        "name" => {
            if value.is_empty() {
                return "Set the name to what?".to_string();
            }
            script.name = value.to_string();
            "Script name saved.".to_string()
        }
        _ => "You can't set that.".to_string(),
    }
}

/// Write back a TextEdit buffer. Called by TextEditMode on `@done`.
pub fn apply_text(world: &mut World, target: &EditTarget, field: &str, text: &str) -> String {
    let gone = "That object no longer exists; nothing was saved.".to_string();
    match target {
        EditTarget::Area(name) => match world.area_mut(name) {
            Some(a) if field == "description" => {
                a.description = text.to_string();
                "Area description saved.".to_string()
            }
            Some(_) => gone,
            None => gone,
        },
        EditTarget::Object(obj) => {
            let Some(area) = world.area_mut(&obj.area) else {
                return gone;
            };
            match (obj.kind, field) {
                (ObjKind::Room, "description") => match area.rooms.get_mut(&obj.id) {
                    Some(r) => {
                        r.description = text.to_string();
                        "Room description saved.".to_string()
                    }
                    None => gone,
                },
                (ObjKind::Item, "description") => match area.items.get_mut(&obj.id) {
                    Some(i) => {
                        i.description = text.to_string();
                        "Item description saved.".to_string()
                    }
                    None => gone,
                },
                (ObjKind::Npc, "description") => match area.npcs.get_mut(&obj.id) {
                    Some(n) => {
                        n.description = text.to_string();
                        "Npc description saved.".to_string()
                    }
                    None => gone,
                },
                (ObjKind::Script, "body") => match area.scripts.get_mut(&obj.id) {
                    Some(s) => {
                        s.body = text.to_string();
                        "Script body saved.".to_string()
                    }
                    None => gone,
                },
                _ => gone,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub trigger: String,
    pub condition: Option<String>,
    pub script_id: String,
    pub script_area: Option<String>,
    pub probability: i64,
}

/// `<trigger> ['<condition>'] call [script] <id> [from area <name>]
/// [<probability>]`. Every optional group lands in an optional field.
pub fn parse_event_spec(args: &str) -> Result<EventSpec, CommandError> {
    let usage = || {
        CommandError::Usage(
            "Try: \"add event <trigger> ['<condition>'] call <script-id> [from area <name>] [<probability>]\"."
                .to_string(),
        )
    };
    let (trigger, rest) = split_command(args.trim());
    if trigger.is_empty() {
        return Err(usage());
    }
    let mut rest = rest.trim();

    let mut condition = None;
    if let Some(tail) = rest.strip_prefix('\'') {
        let end = tail.find('\'').ok_or_else(usage)?;
        condition = Some(tail[..end].to_string());
        rest = tail[end + 1..].trim_start();
    }

    let (call, rest) = split_command(rest);
    if !call.eq_ignore_ascii_case("call") {
        return Err(usage());
    }
    let mut toks: Vec<String> = rest
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| t != "script" && t != "from" && t != "area")
        .collect();
    if toks.is_empty() {
        return Err(usage());
    }
    let script_id = toks.remove(0);
    if !script_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(usage());
    }

    let mut probability = 100;
    if toks
        .last()
        .map_or(false, |t| t.chars().all(|c| c.is_ascii_digit()))
    {
        probability = toks.pop().and_then(|t| t.parse().ok()).unwrap_or(100);
    }
    let script_area = match toks.as_slice() {
        [] => None,
        [name] => Some(name.clone()),
        _ => return Err(usage()),
    };
    Ok(EventSpec {
        trigger: trigger.to_ascii_lowercase(),
        condition,
        script_id,
        script_area,
        probability,
    })
}

fn bcmd_add(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    let Some(target) = current_target(bm) else {
        world.send_session(sid, "You must be editing something to add to it.");
        return Ok(());
    };
    if args.is_empty() {
        return Err(CommandError::Usage("What do you want to add?".to_string()));
    }
    let (field, value) = split_command(&args);
    let field = field.to_ascii_lowercase();
    let value = value.trim();

    let message = match (&target, field.as_str()) {
        (EditTarget::Area(name), "builder") => {
            if value.is_empty() {
                "Add which builder?".to_string()
            } else {
                match world.area_mut(name) {
                    Some(a) => {
                        let who = value.to_ascii_lowercase();
                        if a.builders.contains(&who) {
                            format!("{} is already a builder here.", crate::session::capitalize(&who))
                        } else {
                            a.builders.push(who.clone());
                            format!(
                                "{} has been added to the builder's list for this area.",
                                crate::session::capitalize(&who)
                            )
                        }
                    }
                    None => "That area doesn't exist anymore.".to_string(),
                }
            }
        }
        (EditTarget::Object(obj), "event") if obj.kind == ObjKind::Npc => {
            add_npc_event(world, obj, value)
        }
        (EditTarget::Object(obj), "permission") if obj.kind == ObjKind::Npc => {
            let perms = world.actor_permissions(Actor::Session(sid));
            if !perms.contains(Permissions::GOD) {
                "You need to be GOD in order to edit an npc's permissions.".to_string()
            } else {
                match Permissions::parse(value) {
                    Some(p) => match world
                        .area_mut(&obj.area)
                        .and_then(|a| a.npcs.get_mut(&obj.id))
                    {
                        Some(npc) => {
                            npc.permission_bits |= p.bits();
                            format!("{} now has {} permissions.", npc.name, value)
                        }
                        None => "That npc doesn't exist anymore.".to_string(),
                    },
                    None => "Valid permissions are: player, builder, dm, admin, god.".to_string(),
                }
            }
        }
        _ => "You can't add that.".to_string(),
    };
    world.send_session(sid, message);
    Ok(())
}

fn add_npc_event(world: &mut World, obj: &ObjRef, value: &str) -> String {
    let spec = match parse_event_spec(value) {
        Ok(s) => s,
        Err(e) => return e.to_string(),
    };
    let script_area = spec.script_area.clone().unwrap_or_else(|| obj.area.clone());
    match world.area(&script_area) {
        None => return format!("Area \"{script_area}\" doesn't exist."),
        Some(a) => {
            if a.get_script(&spec.script_id).is_none() {
                return format!("Script {} doesn't exist.", spec.script_id);
            }
        }
    }
    let binding = match EventBinding::new(
        &spec.trigger,
        spec.condition,
        ScriptRef {
            area: script_area,
            id: spec.script_id,
        },
        spec.probability,
    ) {
        Ok(b) => b,
        Err(e) => return e.to_string(),
    };
    match world
        .area_mut(&obj.area)
        .and_then(|a| a.npcs.get_mut(&obj.id))
    {
        Some(npc) => {
            npc.events.add(binding);
            "Event added.".to_string()
        }
        None => "That npc doesn't exist anymore.".to_string(),
    }
}

fn bcmd_remove(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    let Some(target) = current_target(bm) else {
        world.send_session(sid, "You must be editing something to remove from it.");
        return Ok(());
    };
    if args.is_empty() {
        return Err(CommandError::Usage(
            "What do you want to remove?".to_string(),
        ));
    }
    let (field, value) = split_command(&args);
    let field = field.to_ascii_lowercase();
    let value = value.trim();

    let message = match (&target, field.as_str()) {
        (EditTarget::Area(name), "builder") => match world.area_mut(name) {
            Some(a) => {
                let who = value.to_ascii_lowercase();
                match a.builders.iter().position(|b| *b == who) {
                    Some(i) => {
                        a.builders.remove(i);
                        format!(
                            "{} has been removed from the builder's list for this area.",
                            crate::session::capitalize(&who)
                        )
                    }
                    None => format!(
                        "{} is not on the builder's list for this area.",
                        crate::session::capitalize(&who)
                    ),
                }
            }
            None => "That area doesn't exist anymore.".to_string(),
        },
        (EditTarget::Object(obj), "event") if obj.kind == ObjKind::Npc => {
            let mut toks = value.split_whitespace();
            let trigger = toks.next().unwrap_or("").to_ascii_lowercase();
            let index = toks.next().and_then(|t| t.parse::<usize>().ok());
            match index {
                None => "Try: \"remove event <event-trigger> <event-index>\".".to_string(),
                Some(index) => match world
                    .area_mut(&obj.area)
                    .and_then(|a| a.npcs.get_mut(&obj.id))
                {
                    Some(npc) => match npc.events.remove(&trigger, index) {
                        Some(_) => {
                            format!("Event {trigger}, number {index} has been removed.")
                        }
                        None => format!(
                            "This npc doesn't have the event {trigger} #{index}."
                        ),
                    },
                    None => "That npc doesn't exist anymore.".to_string(),
                },
            }
        }
        (EditTarget::Object(obj), "permission") if obj.kind == ObjKind::Npc => {
            let perms = world.actor_permissions(Actor::Session(sid));
            if !perms.contains(Permissions::GOD) {
                "You need to be GOD in order to edit an npc's permissions.".to_string()
            } else {
                match Permissions::parse(value) {
                    Some(p) => match world
                        .area_mut(&obj.area)
                        .and_then(|a| a.npcs.get_mut(&obj.id))
                    {
                        Some(npc) => {
                            if npc.permission_bits & p.bits() != 0 {
                                npc.permission_bits &= !p.bits();
                                format!("{} no longer has {} permissions.", npc.name, value)
                            } else {
                                format!("{} doesn't have {} permissions.", npc.name, value)
                            }
                        }
                        None => "That npc doesn't exist anymore.".to_string(),
                    },
                    None => "Valid permissions are: player, builder, dm, admin, god.".to_string(),
                }
            }
        }
        _ => "You can't remove that.".to_string(),
    };
    world.send_session(sid, message);
    Ok(())
}

fn bcmd_link(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.to_string();
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    let this_room = match &bm.edit_object {
        Some(obj) if obj.kind == ObjKind::Room => obj.clone(),
        _ => {
            world.send_session(sid, "You have to be editing a room to link it to something.");
            return Ok(());
        }
    };
    let toks: Vec<&str> = args.split_whitespace().collect();
    let (dir_tok, rest) = match toks.as_slice() {
        [d] => (*d, None),
        [d, area, room] => (*d, Some((*area, *room))),
        _ => {
            return Err(CommandError::Usage(
                "Try: \"link <direction> [<area> <room>]\".".to_string(),
            ))
        }
    };
    let Some(dir) = Direction::parse(dir_tok) else {
        world.send_session(sid, "That direction doesn't exist.");
        return Ok(());
    };

    let here = RoomRef::new(this_room.area.clone(), this_room.id.clone());
    if world.room(&here).is_none() {
        world.send_session(sid, "That room doesn't exist anymore.");
        return Ok(());
    }

    let target = match rest {
        Some((area, room)) => {
            let r = RoomRef::new(area.to_ascii_lowercase(), room);
            if world.room(&r).is_none() {
                world.send_session(sid, "That area/room combo doesn't exist.");
                return Ok(());
            }
            r
        }
        None => {
            let new_id = match world.area_mut(&this_room.area) {
                Some(a) => a.new_room().id.clone(),
                None => {
                    world.send_session(sid, "That area doesn't exist anymore.");
                    return Ok(());
                }
            };
            world.send_session(sid, format!("Room {new_id} created."));
            RoomRef::new(this_room.area.clone(), new_id)
        }
    };

    if let Some(room) = world.room_mut(&here) {
        room.exits.insert(dir, Exit::to(target.clone()));
    }
    if let Some(room) = world.room_mut(&target) {
        room.exits.insert(dir.opposite(), Exit::to(here.clone()));
    }
    world.send_session(
        sid,
        format!(
            "Linked room {} {} to room {}.",
            here,
            dir.as_str(),
            target
        ),
    );
    Ok(())
}

fn bcmd_destroy(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let args = ctx.args.trim().to_ascii_lowercase();
    let Some((sid, bm)) = builder_ctx(ctx) else {
        return Ok(());
    };
    if args.is_empty() {
        world.send_session(
            sid,
            "You should be more specific. This command could really cause some damage.",
        );
        return Ok(());
    }
    let (what, rest) = split_command(&args);

    let (name, perms) = world
        .session(sid)
        .map(|s| (s.name.clone(), s.permissions))
        .unwrap_or((String::new(), Permissions::empty()));

    if what == "area" {
        let target = rest.trim();
        if target.is_empty() {
            return Err(CommandError::Usage("Destroy which area?".to_string()));
        }
        if !world.area_exists(target) {
            return Err(CommandError::NotFound(
                "That area doesn't exist.".to_string(),
            ));
        }
        if !can_edit_area(world, &name, perms, target) {
            world.send_session(sid, "You're not allowed to destroy someone else's area.");
            return Ok(());
        }
        let message = world.destroy_area(target)?;
        if bm.edit_area.as_deref() == Some(target) {
            bm.edit_area = None;
            bm.edit_object = None;
        }
        world.send_session(sid, message);
        return Ok(());
    }

    let Some(kind) = ObjKind::parse(what) else {
        return Err(CommandError::Usage(
            "Try: \"destroy <room|item|npc|script> <id> [in area <name>]\".".to_string(),
        ));
    };
    let toks: Vec<String> = rest
        .split_whitespace()
        .map(str::to_string)
        .filter(|t| t != "in" && t != "area")
        .collect();
    let (id, area_name) = match toks.as_slice() {
        [id] => (id.clone(), bm.edit_area.clone()),
        [id, area] => (id.clone(), Some(area.clone())),
        _ => {
            return Err(CommandError::Usage(
                "Try: \"destroy <room|item|npc|script> <id> [in area <name>]\".".to_string(),
            ))
        }
    };
    let Some(area_name) = area_name else {
        return Err(CommandError::Usage(
            "You need to be editing an area first.".to_string(),
        ));
    };
    if !world.area_exists(&area_name) {
        return Err(CommandError::NotFound(
            "That area doesn't exist.".to_string(),
        ));
    }
    if !can_edit_area(world, &name, perms, &area_name) {
        world.send_session(sid, "You're not allowed to destroy someone else's area.");
        return Ok(());
    }

    let result = {
        let Some(area) = world.area_mut(&area_name) else {
            return Err(CommandError::NotFound(
                "That area doesn't exist.".to_string(),
            ));
        };
        match kind {
            ObjKind::Room => area.destroy_room(&id),
            ObjKind::Item => area.destroy_item(&id),
            ObjKind::Npc => area.destroy_npc(&id),
            ObjKind::Script => area.destroy_script(&id),
        }
    };
    let message = result?;
    let destroyed = ObjRef {
        kind,
        area: area_name,
        id,
    };
    if bm.edit_object.as_ref() == Some(&destroyed) {
        bm.edit_object = None;
    }
    world.send_session(sid, message);
    Ok(())
}

fn bcmd_export(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Ok(());
    };
    let name = ctx.args.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(CommandError::Usage("Export what?".to_string()));
    }
    let Some(area) = world.area(&name).cloned() else {
        return Err(CommandError::NotFound(
            "That area doesn't exist.".to_string(),
        ));
    };
    world.send_session(sid, format!("Exporting area {name}. This may take a moment."));
    let message = match crate::store::export_area(world.areas_dir(), &area) {
        Ok(path) => format!("Area \"{name}\" exported to {}.", path.display()),
        Err(e) => {
            tracing::warn!(area = %name, err = %e, "area export failed");
            "Export failed; see the server log.".to_string()
        }
    };
    world.send_session(sid, message);
    Ok(())
}

fn bcmd_import(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Ok(());
    };
    let name = ctx.args.trim().to_ascii_lowercase();
    if name.is_empty() {
        let importable = crate::store::list_importable(world.areas_dir());
        let message = if importable.is_empty() {
            "There are no importable areas.".to_string()
        } else {
            format!("Importable areas: {}.", importable.join(", "))
        };
        world.send_session(sid, message);
        return Ok(());
    }
    if world.area_exists(&name) {
        world.send_session(
            sid,
            "That area already exists in your world.\nYou'll need to destroy it in-game before you try importing it.",
        );
        return Ok(());
    }
    let message = match crate::store::import_area(world.areas_dir(), &name) {
        Ok(area) => {
            world.add_area(area);
            format!("Area \"{name}\" imported.")
        }
        Err(e) => {
            tracing::warn!(area = %name, err = %e, "area import failed");
            "That area file doesn't exist or can't be read.".to_string()
        }
    };
    world.send_session(sid, message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_spec_full_form() {
        let spec =
            parse_event_spec("listen_for 'gold' call script 2 from area moor 75").unwrap();
        assert_eq!(spec.trigger, "listen_for");
        assert_eq!(spec.condition.as_deref(), Some("gold"));
        assert_eq!(spec.script_id, "2");
        assert_eq!(spec.script_area.as_deref(), Some("moor"));
        assert_eq!(spec.probability, 75);
    }

    #[test]
    fn parse_event_spec_minimal_form() {
        let spec = parse_event_spec("on_enter call 1").unwrap();
        assert_eq!(spec.trigger, "on_enter");
        assert_eq!(spec.condition, None);
        assert_eq!(spec.script_id, "1");
        assert_eq!(spec.script_area, None);
        assert_eq!(spec.probability, 100);
    }

    #[test]
    fn parse_event_spec_rejects_garbage() {
        assert!(parse_event_spec("").is_err());
        assert!(parse_event_spec("on_enter 1").is_err());
        assert!(parse_event_spec("on_enter call one").is_err());
        assert!(parse_event_spec("on_enter 'unterminated call 1").is_err());
    }

    #[test]
    fn objkind_parse_accepts_plurals() {
        assert_eq!(ObjKind::parse("rooms"), Some(ObjKind::Room));
        assert_eq!(ObjKind::parse("NPC"), Some(ObjKind::Npc));
        assert_eq!(ObjKind::parse("areas"), None);
    }
}
