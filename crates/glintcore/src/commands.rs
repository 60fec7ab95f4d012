//! Command registry and the generic (normal-mode) command set.
//!
//! A command is an alias-keyed descriptor: required permission bits plus a
//! handler fn. Dispatch builds a transient invocation from
//! `(actor, argument tail, alias)`, re-checks permissions on every call,
//! and resolves any handler error into a message for the acting session —
//! a bad command can never take down the tick loop.

use std::collections::HashMap;

use crate::area::{Portal, RoomRef};
use crate::events::{self, EventCtx};
use crate::mode::{BuildMode, Mode};
use crate::personalize::personalize;
use crate::world::{Actor, World};
use crate::{CmdResult, CommandError, Permissions};

pub type CommandFn = fn(&mut World, &mut Ctx<'_>) -> CmdResult;

/// Alias-independent command descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub required: Permissions,
    pub run: CommandFn,
}

/// One invocation: who is acting, the argument tail, and the alias that was
/// typed. `build` is the acting session's build-mode state when dispatch
/// came from build mode.
pub struct Ctx<'a> {
    pub actor: Actor,
    pub args: &'a str,
    pub alias: &'a str,
    pub build: Option<&'a mut BuildMode>,
}

/// A command an NPC has queued for a later tick.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub cmd: Command,
    pub args: String,
    pub alias: String,
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every alias to `cmd`. Re-registering an alias is last-write-wins.
    pub fn register(&mut self, cmd: Command, aliases: &[&str]) {
        for alias in aliases {
            self.commands.insert(alias.to_ascii_lowercase(), cmd);
        }
    }

    pub fn lookup(&self, alias: &str) -> Option<Command> {
        self.commands.get(&alias.to_ascii_lowercase()).copied()
    }
}

/// Split a raw line into `(alias, tail)` on the first whitespace run.
pub fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim_start()),
        None => (line, ""),
    }
}

/// Parse and run one line for an actor. Unknown aliases get a message;
/// build-mode sessions try the build registry before the generic one.
pub fn dispatch(world: &mut World, actor: Actor, line: &str, mut build: Option<&mut BuildMode>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let (alias, tail) = split_command(line);
    let alias = alias.to_ascii_lowercase();
    let cmd = if build.is_some() {
        world
            .build_commands
            .lookup(&alias)
            .or_else(|| world.commands.lookup(&alias))
    } else {
        world.commands.lookup(&alias)
    };
    match cmd {
        Some(cmd) => run_command(world, cmd, actor, tail, &alias, build.as_deref_mut()),
        None => world.send(actor, "You don't know how to do that."),
    }
}

/// Permission-gated execution. The gate runs on every call — permissions
/// may have changed since the command was queued.
pub fn run_command(
    world: &mut World,
    cmd: Command,
    actor: Actor,
    args: &str,
    alias: &str,
    build: Option<&mut BuildMode>,
) {
    let perms = world.actor_permissions(actor);
    let allowed = perms.contains(Permissions::GOD) || perms.intersects(cmd.required);
    if !allowed {
        world.send(actor, CommandError::Permission.to_string());
        return;
    }
    let mut ctx = Ctx {
        actor,
        args,
        alias,
        build,
    };
    if let Err(e) = (cmd.run)(world, &mut ctx) {
        world.send(actor, e.to_string());
    }
}

/// The generic command set every session gets.
pub fn standard_registry() -> CommandRegistry {
    use Permissions as P;
    let mut r = CommandRegistry::new();
    let cmd = |required: Permissions, run: CommandFn| Command { required, run };

    r.register(cmd(P::PLAYER, cmd_quit), &["quit", "exit"]);
    r.register(cmd(P::ADMIN, cmd_wecho), &["wecho", "worldecho"]);
    r.register(cmd(P::GOD, cmd_apocalypse), &["apocalypse", "die"]);
    r.register(cmd(P::PLAYER, cmd_chat), &["chat", "c"]);
    r.register(cmd(P::PLAYER, cmd_channel), &["channel"]);
    r.register(cmd(P::BUILDER, cmd_build), &["build"]);
    r.register(cmd(P::PLAYER, cmd_look), &["look"]);
    r.register(
        cmd(P::BUILDER | P::DM | P::ADMIN, cmd_goto),
        &["goto"],
    );
    r.register(cmd(P::PLAYER, cmd_go), &["go"]);
    r.register(cmd(P::PLAYER, cmd_say), &["say"]);
    r.register(
        cmd(P::ADMIN | P::BUILDER | P::DM, cmd_load),
        &["load"],
    );
    r.register(cmd(P::PLAYER, cmd_inventory), &["inventory", "i"]);
    r.register(cmd(P::PLAYER, cmd_give), &["give"]);
    r.register(cmd(P::PLAYER, cmd_drop), &["drop"]);
    r.register(cmd(P::PLAYER, cmd_get), &["get", "take"]);
    r.register(cmd(P::PLAYER, cmd_equip), &["equip"]);
    r.register(cmd(P::PLAYER, cmd_unequip), &["unequip"]);
    r.register(cmd(P::PLAYER, cmd_who), &["who"]);
    r.register(cmd(P::PLAYER, cmd_enter), &["enter"]);
    r.register(cmd(P::PLAYER, cmd_areas), &["areas"]);
    r.register(cmd(P::GOD, cmd_bestow), &["bestow"]);
    r.register(cmd(P::GOD, cmd_revoke), &["revoke"]);

    let emote_aliases: Vec<&str> = EMOTES.iter().map(|e| e.alias).collect();
    r.register(cmd(P::PLAYER, cmd_emote), &emote_aliases);

    r
}

// ***** generic commands *****

fn cmd_quit(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if let Actor::Session(sid) = ctx.actor {
        world.send_session(sid, "Goodbye.");
        if let Some(s) = world.session_mut(sid) {
            s.quit_flag = true;
        }
    }
    Ok(())
}

/// Echo to everyone in the world. Pub so other handlers (apocalypse, the
/// login join step) can compose with the execute path directly, skipping
/// the permission gate.
pub fn execute_wecho(world: &mut World, message: impl Into<String>) {
    world.wecho(message.into());
}

fn cmd_wecho(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("Echo what to the world?".to_string()));
    }
    execute_wecho(world, ctx.args);
    Ok(())
}

fn cmd_apocalypse(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let (name, _) = world.actor_persona(ctx.actor);
    execute_wecho(
        world,
        format!("{name} has stopped the world from turning. Goodbye."),
    );
    world.shutdown_flag = true;
    Ok(())
}

fn cmd_chat(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("Chat what?".to_string()));
    }
    if let Actor::Session(sid) = ctx.actor {
        let off = world.session(sid).map_or(false, |s| !s.channel_on("chat"));
        if off {
            if let Some(s) = world.session_mut(sid) {
                s.channels.insert("chat".to_string(), true);
            }
            world.send_session(sid, "Your chat channel has been turned on.");
        }
    }
    let (name, _) = world.actor_persona(ctx.actor);
    let message = format!("{} chats, \"{}\"", name, ctx.args);
    world.broadcast_channel("chat", &message);
    Ok(())
}

fn cmd_channel(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Ok(());
    };
    let Some((channel, choice)) = parse_channel(ctx.args) else {
        return Err(CommandError::Usage(
            "Try: \"channel <name> on|off\".".to_string(),
        ));
    };
    let known = world
        .session(sid)
        .map_or(false, |s| s.channels.contains_key(&channel));
    if !known {
        world.send_session(sid, "Which channel do you want to change?");
        return Ok(());
    }
    match choice {
        Some(on) => {
            if let Some(s) = world.session_mut(sid) {
                s.channels.insert(channel.clone(), on);
            }
            world.send_session(
                sid,
                format!(
                    "The {channel} channel has been turned {}.",
                    if on { "on" } else { "off" }
                ),
            );
        }
        None => world.send_session(
            sid,
            format!("You can only turn the {channel} channel on or off."),
        ),
    }
    Ok(())
}

fn cmd_build(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Err(CommandError::Usage(
            "Npcs don't get to reshape the world.".to_string(),
        ));
    };
    match ctx.args.trim() {
        "" => {
            world.request_mode(sid, Mode::build());
            world.send_session(sid, "Entering BuildMode.");
            Ok(())
        }
        "exit" => {
            world.request_mode(sid, Mode::Normal);
            world.send_session(sid, "Exiting BuildMode.");
            Ok(())
        }
        _ => Err(CommandError::Usage(
            "Try: \"build\" or \"build exit\".".to_string(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookPlace {
    Room,
    Inventory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookArgs {
    pub target: Option<String>,
    pub place: Option<LookPlace>,
}

/// `look [at] <target> [in room|inventory]`, hand-tokenized: the optional
/// groups become optional fields.
pub fn parse_look(args: &str) -> LookArgs {
    let a = args.trim().to_ascii_lowercase();
    if a.is_empty() {
        return LookArgs::default();
    }
    let rest = a.strip_prefix("at ").map(str::trim_start).unwrap_or(&a);
    if let Some(t) = rest.strip_suffix("in room") {
        return LookArgs {
            target: non_empty(t),
            place: Some(LookPlace::Room),
        };
    }
    if let Some(t) = rest.strip_suffix("in inventory") {
        return LookArgs {
            target: non_empty(t),
            place: Some(LookPlace::Inventory),
        };
    }
    LookArgs {
        target: non_empty(rest),
        place: None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn cmd_look(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let la = parse_look(ctx.args);
    let location = world.actor_location(ctx.actor);
    let message = match la.target {
        None => match &location {
            Some(r) => world.render_room(r, ctx.actor),
            None => "You see a dark void.".to_string(),
        },
        Some(target) => {
            let in_room = || {
                location
                    .as_ref()
                    .and_then(|r| look_in_room(world, r, &target))
            };
            let in_inv = || look_in_inventory(world, ctx.actor, &target);
            let found = match la.place {
                Some(LookPlace::Room) => in_room(),
                Some(LookPlace::Inventory) => in_inv(),
                None => in_room().or_else(in_inv),
            };
            found.unwrap_or_else(|| "You don't see that here.".to_string())
        }
    };
    world.send(ctx.actor, message);
    Ok(())
}

fn look_in_room(world: &World, room_ref: &RoomRef, keyword: &str) -> Option<String> {
    let room = world.room(room_ref)?;
    if let Some(i) = room.find_item(keyword) {
        let item = &room.items[i];
        return Some(format!("You look at {}:\n{}", item.name, item.description));
    }
    if let Some(nid) = world.find_npc_in_room(room_ref, keyword) {
        let npc = world.npc(nid)?;
        return Some(format!("You look at {}:\n{}", npc.name, npc.description));
    }
    if let Some(sid) = world.find_session_in_room(room_ref, keyword) {
        let s = world.session(sid)?;
        return Some(format!("You look at {}. They look busy.", s.fancy_name()));
    }
    None
}

fn look_in_inventory(world: &World, actor: Actor, keyword: &str) -> Option<String> {
    let item = match actor {
        Actor::Session(sid) => {
            let s = world.session(sid)?;
            s.find_inventory(keyword).map(|i| &s.inventory[i])?
        }
        Actor::Npc(nid) => {
            let n = world.npc(nid)?;
            n.find_inventory(keyword).map(|i| &n.inventory[i])?
        }
    };
    Some(format!("You look at {}:\n{}", item.name, item.description))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoArgs {
    Player(String),
    Room {
        area: Option<String>,
        room: String,
    },
}

/// `goto <room id> [in area <name>]`, `goto <area> <room id>`, or
/// `goto <player>`.
pub fn parse_goto(args: &str) -> Option<GotoArgs> {
    let toks: Vec<&str> = args
        .split_whitespace()
        .filter(|t| {
            let t = t.to_ascii_lowercase();
            t != "room" && t != "in" && t != "area"
        })
        .collect();
    match toks.as_slice() {
        [one] => {
            if one.chars().all(|c| c.is_ascii_digit()) {
                Some(GotoArgs::Room {
                    area: None,
                    room: one.to_string(),
                })
            } else {
                Some(GotoArgs::Player(one.to_ascii_lowercase()))
            }
        }
        [a, b] => {
            if b.chars().all(|c| c.is_ascii_digit()) {
                Some(GotoArgs::Room {
                    area: Some(a.to_ascii_lowercase()),
                    room: b.to_string(),
                })
            } else if a.chars().all(|c| c.is_ascii_digit()) {
                Some(GotoArgs::Room {
                    area: Some(b.to_ascii_lowercase()),
                    room: a.to_string(),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

fn cmd_goto(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("Where did you want to go?".to_string()));
    }
    let parsed = parse_goto(ctx.args).ok_or_else(|| {
        CommandError::Usage("Try: \"goto <room>\", \"goto <area> <room>\", or \"goto <player>\".".to_string())
    })?;
    let dest = match parsed {
        GotoArgs::Player(name) => {
            let sid = world.find_player(&name).ok_or_else(|| {
                CommandError::NotFound("That person doesn't exist.".to_string())
            })?;
            let target = world.session(sid).and_then(|s| s.location.clone());
            match target {
                Some(r) => r,
                None => {
                    let fancy = world
                        .session(sid)
                        .map(|s| s.fancy_name())
                        .unwrap_or_default();
                    world.send(ctx.actor, format!("You can't reach {fancy}."));
                    return Ok(());
                }
            }
        }
        GotoArgs::Room { area, room } => {
            let area_name = match area {
                Some(a) => a,
                None => world
                    .actor_location(ctx.actor)
                    .map(|r| r.area)
                    .ok_or_else(|| {
                        CommandError::Usage(
                            "You need to name an area to goto from the void.".to_string(),
                        )
                    })?,
            };
            if !world.area_exists(&area_name) {
                return Err(CommandError::NotFound(
                    "That area doesn't exist.".to_string(),
                ));
            }
            let r = RoomRef::new(area_name, room);
            if world.room(&r).is_none() {
                return Err(CommandError::NotFound(
                    "That room doesn't exist.".to_string(),
                ));
            }
            r
        }
    };
    world.move_actor(ctx.actor, &dest, true);
    Ok(())
}

fn cmd_go(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Some(here) = world.actor_location(ctx.actor) else {
        world.send(
            ctx.actor,
            "You exist in a void; there is nowhere to go.",
        );
        return Ok(());
    };
    let Some(dir) = crate::area::Direction::parse(ctx.args) else {
        return Err(CommandError::Usage("Go where?".to_string()));
    };
    let exit = world
        .room(&here)
        .and_then(|room| room.exits.get(&dir).cloned());
    let Some(exit) = exit else {
        world.send(ctx.actor, "You can't go that way.");
        return Ok(());
    };
    if exit.closed {
        world.send(ctx.actor, "The door is closed.");
        return Ok(());
    }
    if world.room(&exit.to).is_none() {
        // The room this exit pointed at is gone. Self-heal: drop the exit,
        // shout about it in the log, tell the room, and give the actor a
        // normal answer.
        world.heal_dangling_exit(&here, dir, &exit.to);
        world.send(ctx.actor, "You can't go that way.");
        return Ok(());
    }
    world.move_actor(ctx.actor, &exit.to, true);
    Ok(())
}

fn cmd_say(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("Say what?".to_string()));
    }
    let Some(here) = world.actor_location(ctx.actor) else {
        world.send(ctx.actor, "Your words are sucked into the void.");
        return Ok(());
    };
    let (name, _) = world.actor_persona(ctx.actor);
    world.tell_room(&here, &format!("{} says, \"{}\"", name, ctx.args), &[]);

    let mut ctx_map = EventCtx::new();
    ctx_map.insert("triggerer".to_string(), name);
    ctx_map.insert("text".to_string(), ctx.args.to_string());
    for nid in world.npcs_in_room(&here) {
        if Actor::Npc(nid) != ctx.actor {
            events::notify(world, nid, "listen_for", &ctx_map);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Item,
    Npc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadArgs {
    pub kind: LoadKind,
    pub id: String,
    pub area: Option<String>,
}

/// `load item|npc <id> [from area <name>]`; the suffix is an optional field.
pub fn parse_load(args: &str) -> Result<LoadArgs, CommandError> {
    let usage = || CommandError::Usage(
        "Try: \"load item <id> [from area <name>]\" or \"load npc <id> [from area <name>]\"."
            .to_string(),
    );
    let mut toks = args.split_whitespace();
    let kind = match toks.next().map(|t| t.to_ascii_lowercase()).as_deref() {
        Some("item") => LoadKind::Item,
        Some("npc") => LoadKind::Npc,
        _ => return Err(usage()),
    };
    let id = toks.next().ok_or_else(usage)?.to_string();
    if !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(usage());
    }
    let rest: Vec<String> = toks
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| t != "from" && t != "area")
        .collect();
    let area = match rest.as_slice() {
        [] => None,
        [name] => Some(name.clone()),
        _ => return Err(usage()),
    };
    Ok(LoadArgs { kind, id, area })
}

fn cmd_load(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("What do you want to load?".to_string()));
    }
    let la = parse_load(ctx.args)?;
    let area_name = match la.area {
        Some(name) => {
            if !world.area_exists(&name) {
                return Err(CommandError::NotFound(
                    "That area doesn't exist.".to_string(),
                ));
            }
            name
        }
        None => world
            .actor_location(ctx.actor)
            .map(|r| r.area)
            .or_else(|| {
                ctx.build
                    .as_ref()
                    .and_then(|b| b.edit_area.clone())
            })
            .ok_or_else(|| {
                CommandError::Usage(
                    "You need to specify an area to load from.".to_string(),
                )
            })?,
    };

    let (name, _) = world.actor_persona(ctx.actor);
    match la.kind {
        LoadKind::Item => {
            let uid = world.next_item_uid();
            let spawned = world
                .area(&area_name)
                .and_then(|a| a.get_item(&la.id))
                .map(|t| t.spawn(uid, &area_name));
            let Some(item) = spawned else {
                return Err(CommandError::NotFound(
                    "That item doesn't exist.".to_string(),
                ));
            };
            let item_name = item.name.clone();
            match ctx.actor {
                Actor::Session(sid) => {
                    if let Some(s) = world.session_mut(sid) {
                        s.inventory.push(item);
                    }
                }
                Actor::Npc(nid) => {
                    if let Some(n) = world.npc_mut(nid) {
                        n.inventory.push(item);
                    }
                }
            }
            world.send(ctx.actor, format!("You summon {item_name} into the world."));
            if let Some(here) = world.actor_location(ctx.actor) {
                world.tell_room(
                    &here,
                    &format!("{name} summons {item_name} into the world."),
                    &[ctx.actor],
                );
            }
        }
        LoadKind::Npc => {
            let Some(here) = world.actor_location(ctx.actor) else {
                return Err(CommandError::Usage(
                    "You need to be in a room to load an npc.".to_string(),
                ));
            };
            let nid = world.spawn_npc(&area_name, &la.id, &here)?;
            let npc_name = world.npc(nid).map(|n| n.name.clone()).unwrap_or_default();
            world.send(ctx.actor, format!("You summon {npc_name} into the world."));
            world.tell_room(
                &here,
                &format!("{name} summons {npc_name} into the world."),
                &[ctx.actor],
            );
        }
    }
    Ok(())
}

fn cmd_inventory(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let message = match ctx.actor {
        Actor::Session(sid) => {
            let Some(s) = world.session(sid) else {
                return Ok(());
            };
            let names: Vec<&str> = s
                .inventory
                .iter()
                .filter(|i| !s.is_equipped(i.uid))
                .map(|i| i.name.as_str())
                .collect();
            if names.is_empty() {
                "Your inventory is empty.".to_string()
            } else {
                let mut m = "Your inventory consists of:".to_string();
                for n in names {
                    m.push('\n');
                    m.push_str(n);
                }
                m
            }
        }
        Actor::Npc(nid) => {
            let Some(n) = world.npc(nid) else {
                return Ok(());
            };
            if n.inventory.is_empty() {
                "Your inventory is empty.".to_string()
            } else {
                let mut m = "Your inventory consists of:".to_string();
                for i in &n.inventory {
                    m.push('\n');
                    m.push_str(&i.name);
                }
                m
            }
        }
    };
    world.send(ctx.actor, message);
    Ok(())
}

/// `give <thing> to <person>`: split on the first ` to `.
pub fn parse_give(args: &str) -> Option<(String, String)> {
    let lc = args.to_ascii_lowercase();
    let i = lc.find(" to ")?;
    let thing = args[..i].trim();
    let person = args[i + 4..].trim();
    if thing.is_empty() || person.is_empty() {
        return None;
    }
    Some((thing.to_string(), person.to_string()))
}

fn cmd_give(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Some((thing, person)) = parse_give(ctx.args) else {
        return Err(CommandError::Usage(
            "Try: \"give <item> to <player>\".".to_string(),
        ));
    };
    let Some(here) = world.actor_location(ctx.actor) else {
        world.send(
            ctx.actor,
            "You are alone in the void; there's no one to give anything to.",
        );
        return Ok(());
    };

    let target = world
        .find_session_in_room(&here, &person)
        .map(Actor::Session)
        .or_else(|| world.find_npc_in_room(&here, &person).map(Actor::Npc));
    let Some(target) = target else {
        world.send(
            ctx.actor,
            format!("{} isn't here.", crate::session::capitalize(&person)),
        );
        return Ok(());
    };
    if target == ctx.actor {
        world.send(ctx.actor, "You already have it.");
        return Ok(());
    }

    let Some(item) = world.take_from_inventory(ctx.actor, &thing) else {
        world.send(ctx.actor, format!("You don't have {thing}."));
        return Ok(());
    };
    let item_name = item.name.clone();
    let (giver, _) = world.actor_persona(ctx.actor);
    let (givee, _) = world.actor_persona(target);
    world.add_to_inventory(target, item);

    world.send(ctx.actor, format!("You give {item_name} to {givee}."));
    world.send(target, format!("{giver} gives you {item_name}."));
    world.tell_room(
        &here,
        &format!("{giver} gives {item_name} to {givee}."),
        &[ctx.actor, target],
    );

    if let Actor::Npc(nid) = target {
        let mut ctx_map = EventCtx::new();
        ctx_map.insert("triggerer".to_string(), giver);
        ctx_map.insert("item".to_string(), item_name);
        events::notify(world, nid, "given_item", &ctx_map);
    }
    Ok(())
}

fn cmd_drop(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("What do you want to drop?".to_string()));
    }
    let Some(item) = world.take_from_inventory(ctx.actor, ctx.args) else {
        world.send(ctx.actor, "You don't have that.");
        return Ok(());
    };
    let item_name = item.name.clone();
    match world.actor_location(ctx.actor) {
        Some(here) => {
            if let Some(room) = world.room_mut(&here) {
                room.items.push(item);
            }
            let (name, _) = world.actor_persona(ctx.actor);
            world.send(ctx.actor, format!("You drop {item_name}."));
            world.tell_room(&here, &format!("{name} drops {item_name}."), &[ctx.actor]);
        }
        None => {
            // No floor out here. The item is gone.
            world.send(ctx.actor, format!("{item_name} disappears into the void."));
        }
    }
    Ok(())
}

fn cmd_get(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("What do you want to get?".to_string()));
    }
    let Some(here) = world.actor_location(ctx.actor) else {
        world.send(
            ctx.actor,
            "Only cold blackness exists in the void. It's not the sort of thing you can take.",
        );
        return Ok(());
    };
    let idx = world.room(&here).and_then(|r| r.find_item(ctx.args));
    let Some(idx) = idx else {
        world.send(ctx.actor, "That doesn't exist.");
        return Ok(());
    };
    let pickup = world
        .room(&here)
        .map(|r| r.items[idx].pickup)
        .unwrap_or(false);
    if !pickup {
        world.send(ctx.actor, "You can't take that.");
        return Ok(());
    }
    let item = world.room_mut(&here).map(|r| r.items.remove(idx));
    let Some(item) = item else {
        return Ok(());
    };
    let item_name = item.name.clone();
    world.add_to_inventory(ctx.actor, item);
    let (name, _) = world.actor_persona(ctx.actor);
    world.send(ctx.actor, format!("You get {item_name}."));
    world.tell_room(&here, &format!("{name} gets {item_name}."), &[ctx.actor]);
    Ok(())
}

fn cmd_equip(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Ok(());
    };
    let message = if ctx.args.is_empty() {
        let Some(s) = world.session(sid) else {
            return Ok(());
        };
        let mut m = "Equipped items:".to_string();
        if s.equipped.is_empty() {
            m.push_str("\nNothing.");
        }
        for (slot, uid) in &s.equipped {
            let name = s
                .inventory
                .iter()
                .find(|i| i.uid == *uid)
                .map(|i| i.name.as_str())
                .unwrap_or("nothing");
            m.push_str(&format!("\n{}: {}", slot.as_str(), name));
        }
        m
    } else {
        let found = world.session(sid).and_then(|s| {
            s.find_inventory(ctx.args).map(|i| {
                let item = &s.inventory[i];
                (item.uid, item.name.clone(), item.equip_slot)
            })
        });
        match found {
            None => "You don't have it.".to_string(),
            Some((_, _, None)) => "You can't equip that!".to_string(),
            Some((uid, name, Some(slot))) => {
                if let Some(s) = world.session_mut(sid) {
                    s.equipped.insert(slot, uid);
                }
                slot.equip_message().replace("#item", &name)
            }
        }
    };
    world.send_session(sid, message);
    Ok(())
}

fn cmd_unequip(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Actor::Session(sid) = ctx.actor else {
        return Ok(());
    };
    if ctx.args.is_empty() {
        return Err(CommandError::Usage(
            "What do you want to unequip?".to_string(),
        ));
    }
    let found = world.session(sid).and_then(|s| {
        s.find_inventory(ctx.args).map(|i| {
            let item = &s.inventory[i];
            (item.uid, item.name.clone(), s.is_equipped(item.uid))
        })
    });
    let message = match found {
        None => "You don't have that!".to_string(),
        Some((_, _, false)) => "You aren't using that.".to_string(),
        Some((uid, name, true)) => {
            if let Some(s) = world.session_mut(sid) {
                s.equipped.retain(|_, u| *u != uid);
            }
            format!("You remove {name}.")
        }
    };
    world.send_session(sid, message);
    Ok(())
}

fn cmd_who(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let mut m = String::from(
        "Currently Online:\n______________________________________________\n",
    );
    for name in world.player_names() {
        m.push_str(&crate::session::capitalize(&name));
        m.push('\n');
    }
    m.push_str("______________________________________________");
    world.send(ctx.actor, m);
    Ok(())
}

fn cmd_enter(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage("Enter what?".to_string()));
    }
    if let Some(here) = world.actor_location(ctx.actor) {
        let found = world
            .room(&here)
            .and_then(|r| r.find_item(ctx.args).map(|i| r.items[i].portal.clone()));
        match found {
            Some(Some(portal)) => go_portal(world, ctx.actor, &portal),
            Some(None) => world.send(ctx.actor, "That's not a portal..."),
            None => world.send(ctx.actor, "You don't see that here."),
        }
        return Ok(());
    }
    // In the void: maybe the actor is carrying the portal. It has to be
    // dropped first — a portal can't go through itself.
    let carried = match ctx.actor {
        Actor::Session(sid) => world
            .session(sid)
            .and_then(|s| s.find_inventory(ctx.args).map(|i| s.inventory[i].portal.clone())),
        Actor::Npc(nid) => world
            .npc(nid)
            .and_then(|n| n.find_inventory(ctx.args).map(|i| n.inventory[i].portal.clone())),
    };
    match carried {
        Some(Some(portal)) => {
            if let Some(drop) = world.commands.lookup("drop") {
                run_command(world, drop, ctx.actor, ctx.args, "drop", None);
            }
            go_portal(world, ctx.actor, &portal);
        }
        Some(None) => world.send(ctx.actor, "That's not a portal..."),
        None => world.send(ctx.actor, "You don't see that here."),
    }
    Ok(())
}

fn go_portal(world: &mut World, actor: Actor, portal: &Portal) {
    if world.room(&portal.to).is_none() {
        world.send(actor, "Nothing happened. It must be a dud.");
        return;
    }
    let (name, gender) = world.actor_persona(actor);
    if let Some(here) = world.actor_location(actor) {
        let leave = personalize(&portal.leave_message, (&name, gender), None);
        world.tell_room(&here, &leave, &[actor]);
    }
    let entrance = personalize(&portal.entrance_message, (&name, gender), None);
    world.send(actor, entrance);
    world.move_actor(actor, &portal.to, false);
    let emerge = personalize(&portal.emerge_message, (&name, gender), None);
    world.tell_room(&portal.to, &emerge, &[actor]);
}

fn cmd_areas(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let names = world.area_names();
    let mut m = String::from(
        "Area  |  Level Range\n______________________________________________\n",
    );
    if names.is_empty() {
        m.push_str("Sorry, there are no areas yet.\n");
    }
    for name in names {
        let range = world
            .area(&name)
            .map(|a| a.level_range.clone())
            .unwrap_or_default();
        m.push_str(&format!("{name}  |  {range}\n"));
    }
    m.push_str("______________________________________________");
    world.send(ctx.actor, m);
    Ok(())
}

/// `bestow <permission> [to|on|upon|for] <player>` (and `revoke`).
pub fn parse_permission_target(args: &str) -> Option<(String, String)> {
    let mut toks = args.split_whitespace();
    let perm = toks.next()?.to_ascii_lowercase();
    let player = toks
        .map(|t| t.to_ascii_lowercase())
        .find(|t| !matches!(t.as_str(), "to" | "on" | "upon" | "for"))?;
    Some((perm, player))
}

fn cmd_bestow(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage(
            "Bestow what authority upon whom?".to_string(),
        ));
    }
    let Some((perm_name, player)) = parse_permission_target(ctx.args) else {
        return Err(CommandError::Usage(
            "Try: \"bestow <permission> <player>\".".to_string(),
        ));
    };
    let Some(perm) = Permissions::parse(&perm_name) else {
        world.send(
            ctx.actor,
            "Valid permission types are: god, dm, builder, and admin.",
        );
        return Ok(());
    };
    let found = world
        .find_player(&player)
        .and_then(|sid| world.session(sid).map(|s| (sid, s.fancy_name(), s.permissions)));
    let Some((sid, fancy, perms)) = found else {
        world.send(ctx.actor, "That player isn't on right now.");
        return Ok(());
    };
    if perms.contains(perm) {
        world.send(ctx.actor, format!("{fancy} already has that authority."));
        return Ok(());
    }
    if let Some(s) = world.session_mut(sid) {
        s.permissions |= perm;
    }
    world.persist_session(sid);
    let (actor_name, _) = world.actor_persona(ctx.actor);
    world.send(
        ctx.actor,
        format!(
            "{fancy} now has the privilege of being {}.",
            perm_name.to_uppercase()
        ),
    );
    world.send_session(
        sid,
        format!(
            "{actor_name} has bestowed the authority of {} upon you!",
            perm_name.to_uppercase()
        ),
    );
    Ok(())
}

fn cmd_revoke(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    if ctx.args.is_empty() {
        return Err(CommandError::Usage(
            "Revoke whose authority over what?".to_string(),
        ));
    }
    let Some((perm_name, player)) = parse_permission_target(ctx.args) else {
        return Err(CommandError::Usage(
            "Try: \"revoke <permission> <player>\".".to_string(),
        ));
    };
    let Some(perm) = Permissions::parse(&perm_name) else {
        world.send(
            ctx.actor,
            "Valid permission types are: god, dm, builder, and admin.",
        );
        return Ok(());
    };
    let found = world
        .find_player(&player)
        .and_then(|sid| world.session(sid).map(|s| (sid, s.fancy_name(), s.permissions)));
    let Some((sid, fancy, perms)) = found else {
        world.send(ctx.actor, "That player isn't on right now.");
        return Ok(());
    };
    if !perms.contains(perm) {
        world.send(
            ctx.actor,
            format!("{fancy} doesn't have that authority anyway."),
        );
        return Ok(());
    }
    if let Some(s) = world.session_mut(sid) {
        s.permissions &= !perm;
    }
    world.persist_session(sid);
    let (actor_name, _) = world.actor_persona(ctx.actor);
    world.send(
        ctx.actor,
        format!("{fancy} has had the privilege of {perm_name} revoked."),
    );
    world.send_session(
        sid,
        format!("{actor_name} has revoked your {perm_name} privileges."),
    );
    Ok(())
}

// ***** emotes *****

struct EmoteSpec {
    alias: &'static str,
    // (to actor, to room)
    plain: (&'static str, &'static str),
    // (to actor, to target, to room)
    targeted: (&'static str, &'static str, &'static str),
}

const EMOTES: &[EmoteSpec] = &[
    EmoteSpec {
        alias: "smile",
        plain: ("You smile.", "#actor smiles to #a_self."),
        targeted: (
            "You smile at #target.",
            "#actor smiles at you.",
            "#actor smiles at #target.",
        ),
    },
    EmoteSpec {
        alias: "wave",
        plain: ("You wave.", "#actor waves."),
        targeted: (
            "You wave at #target.",
            "#actor waves at you.",
            "#actor waves at #target.",
        ),
    },
    EmoteSpec {
        alias: "bow",
        plain: ("You bow deeply.", "#actor bows deeply."),
        targeted: (
            "You bow to #target.",
            "#actor bows to you.",
            "#actor bows to #target.",
        ),
    },
    EmoteSpec {
        alias: "laugh",
        plain: ("You laugh.", "#actor laughs."),
        targeted: (
            "You laugh at #target. How rude.",
            "#actor laughs at you. How rude.",
            "#actor laughs at #target.",
        ),
    },
];

fn cmd_emote(world: &mut World, ctx: &mut Ctx<'_>) -> CmdResult {
    let Some(spec) = EMOTES.iter().find(|e| e.alias == ctx.alias) else {
        return Ok(());
    };
    let Some(here) = world.actor_location(ctx.actor) else {
        world.send(
            ctx.actor,
            "You try, but the action gets sucked into the void. The void apologizes.",
        );
        return Ok(());
    };
    let actor_p = world.actor_persona(ctx.actor);
    let actor_persona = (actor_p.0.as_str(), actor_p.1);

    if ctx.args.is_empty() {
        world.send(
            ctx.actor,
            personalize(spec.plain.0, actor_persona, None),
        );
        world.tell_room(
            &here,
            &personalize(spec.plain.1, actor_persona, None),
            &[ctx.actor],
        );
        return Ok(());
    }

    let target = world
        .find_session_in_room(&here, ctx.args)
        .map(Actor::Session);
    match target {
        Some(t) if t == ctx.actor => {
            world.send(
                ctx.actor,
                personalize(spec.plain.0, actor_persona, None),
            );
            world.tell_room(
                &here,
                &personalize(spec.plain.1, actor_persona, None),
                &[ctx.actor],
            );
        }
        Some(t) => {
            let tp = world.actor_persona(t);
            let target_persona = (tp.0.as_str(), tp.1);
            world.send(
                ctx.actor,
                personalize(spec.targeted.0, actor_persona, Some(target_persona)),
            );
            world.send(
                t,
                personalize(spec.targeted.1, actor_persona, Some(target_persona)),
            );
            world.tell_room(
                &here,
                &personalize(spec.targeted.2, actor_persona, Some(target_persona)),
                &[ctx.actor, t],
            );
        }
        None => match world.find_player(ctx.args) {
            Some(sid) => {
                let tp = world.actor_persona(Actor::Session(sid));
                let target_persona = (tp.0.as_str(), tp.1);
                world.send(
                    ctx.actor,
                    format!(
                        "From far away, {}",
                        personalize(spec.targeted.0, actor_persona, Some(target_persona))
                    ),
                );
                world.send_session(
                    sid,
                    format!(
                        "From far away, {}",
                        personalize(spec.targeted.1, actor_persona, Some(target_persona))
                    ),
                );
            }
            None => world.send(ctx.actor, format!("You don't see {}.", ctx.args)),
        },
    }
    Ok(())
}

/// `channel <name> on|off`; `None` choice means a word that wasn't on/off.
fn parse_channel(args: &str) -> Option<(String, Option<bool>)> {
    let mut toks = args.split_whitespace();
    let channel = toks.next()?.to_ascii_lowercase();
    let choice = toks.next()?.to_ascii_lowercase();
    let on = match choice.as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    };
    Some((channel, on))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_on_first_whitespace_run() {
        assert_eq!(split_command("say hello there"), ("say", "hello there"));
        assert_eq!(split_command("  look   at sword  "), ("look", "at sword"));
        assert_eq!(split_command("who"), ("who", ""));
        assert_eq!(split_command(""), ("", ""));
    }

    #[test]
    fn reregistering_alias_is_last_write_wins() {
        fn a(_: &mut World, _: &mut Ctx<'_>) -> CmdResult {
            Ok(())
        }
        fn b(_: &mut World, _: &mut Ctx<'_>) -> CmdResult {
            Ok(())
        }
        let mut r = CommandRegistry::new();
        r.register(
            Command {
                required: Permissions::PLAYER,
                run: a,
            },
            &["zap", "z"],
        );
        r.register(
            Command {
                required: Permissions::GOD,
                run: b,
            },
            &["zap"],
        );
        assert_eq!(r.lookup("zap").unwrap().required, Permissions::GOD);
        assert_eq!(r.lookup("ZAP").unwrap().required, Permissions::GOD);
        // Untouched alias still points at the first registration.
        assert_eq!(r.lookup("z").unwrap().required, Permissions::PLAYER);
        assert!(r.lookup("pow").is_none());
    }

    #[test]
    fn parse_look_optional_groups() {
        assert_eq!(parse_look(""), LookArgs::default());
        assert_eq!(
            parse_look("at sword"),
            LookArgs {
                target: Some("sword".to_string()),
                place: None,
            }
        );
        assert_eq!(
            parse_look("sword in room"),
            LookArgs {
                target: Some("sword".to_string()),
                place: Some(LookPlace::Room),
            }
        );
        assert_eq!(
            parse_look("at rusty sword in inventory"),
            LookArgs {
                target: Some("rusty sword".to_string()),
                place: Some(LookPlace::Inventory),
            }
        );
    }

    #[test]
    fn parse_load_with_optional_area() {
        let la = parse_load("item 3").unwrap();
        assert_eq!(la.kind, LoadKind::Item);
        assert_eq!(la.id, "3");
        assert_eq!(la.area, None);

        let la = parse_load("npc 2 from area moor").unwrap();
        assert_eq!(la.kind, LoadKind::Npc);
        assert_eq!(la.area.as_deref(), Some("moor"));

        let la = parse_load("item 1 moor").unwrap();
        assert_eq!(la.area.as_deref(), Some("moor"));

        assert!(parse_load("spell 3").is_err());
        assert!(parse_load("item").is_err());
        assert!(parse_load("item three").is_err());
    }

    #[test]
    fn parse_give_splits_on_first_to() {
        assert_eq!(
            parse_give("sword to alice"),
            Some(("sword".to_string(), "alice".to_string()))
        );
        assert_eq!(
            parse_give("letter addressed to bob to carol"),
            Some(("letter addressed".to_string(), "bob to carol".to_string()))
        );
        assert_eq!(parse_give("sword"), None);
        assert_eq!(parse_give(" to alice"), None);
    }

    #[test]
    fn parse_goto_variants() {
        assert_eq!(
            parse_goto("3"),
            Some(GotoArgs::Room {
                area: None,
                room: "3".to_string(),
            })
        );
        assert_eq!(
            parse_goto("room 3 in area moor"),
            Some(GotoArgs::Room {
                area: Some("moor".to_string()),
                room: "3".to_string(),
            })
        );
        assert_eq!(
            parse_goto("moor 3"),
            Some(GotoArgs::Room {
                area: Some("moor".to_string()),
                room: "3".to_string(),
            })
        );
        assert_eq!(parse_goto("alice"), Some(GotoArgs::Player("alice".to_string())));
        assert_eq!(parse_goto("too many words here"), None);
    }

    #[test]
    fn parse_permission_target_skips_filler() {
        assert_eq!(
            parse_permission_target("god upon alice"),
            Some(("god".to_string(), "alice".to_string()))
        );
        assert_eq!(
            parse_permission_target("builder bob"),
            Some(("builder".to_string(), "bob".to_string()))
        );
        assert_eq!(parse_permission_target("god"), None);
    }

    #[test]
    fn parse_channel_variants() {
        assert_eq!(
            parse_channel("chat off"),
            Some(("chat".to_string(), Some(false)))
        );
        assert_eq!(
            parse_channel("chat sideways"),
            Some(("chat".to_string(), None))
        );
        assert_eq!(parse_channel("chat"), None);
    }
}
