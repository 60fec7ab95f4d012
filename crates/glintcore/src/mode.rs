//! Per-session interaction modes.
//!
//! Exactly one mode is active per session. A mode's turn runs once per
//! tick: input-agnostic states do their work unconditionally, input-gated
//! states poll the session's inbound queue and no-op when it is empty.
//! Transitions are performed only by the running handler, either by
//! returning a different mode or by a command requesting one through
//! `World::request_mode`.

use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::{error, info, warn};
use zeroize::Zeroize;

use crate::building::{self, ObjRef};
use crate::commands;
use crate::personalize::Gender;
use crate::session::SessionId;
use crate::store::PlayerRec;
use crate::world::{Actor, World};
use crate::Permissions;

const WELCOME_BANNER: &str = "Welcome to glintmud.";

/// Passwords nobody should be allowed to pick.
const RESERVED_PASSWORDS: &[&str] = &[
    "password",
    "12345678",
    "letmein",
    "glintmud",
    "qwertyui",
];

#[derive(Debug)]
pub enum Mode {
    Login(LoginMode),
    Normal,
    Build(BuildMode),
    TextEdit(TextEditMode),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

impl Mode {
    pub fn login() -> Mode {
        Mode::Login(LoginMode::new())
    }

    pub fn build() -> Mode {
        Mode::Build(BuildMode::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Login(_) => "LoginMode",
            Mode::Normal => "NormalMode",
            Mode::Build(_) => "BuildMode",
            Mode::TextEdit(_) => "TextEditMode",
        }
    }
}

/// Run one session's turn: hand the tick to whatever mode is active.
///
/// The mode is moved out of the session while it runs (handlers need
/// `&mut World`); when the turn ends, a mode requested by a command this
/// turn wins over whatever the handler returned.
pub fn session_turn(world: &mut World, sid: SessionId) {
    let Some(mode) = world.take_mode(sid) else {
        return;
    };
    let next = match mode {
        Mode::Login(lm) => login_tick(world, sid, lm),
        Mode::Normal => {
            if let Some(line) = world.pop_input(sid) {
                commands::dispatch(world, Actor::Session(sid), &line, None);
            }
            Mode::Normal
        }
        Mode::Build(mut bm) => {
            if let Some(line) = world.pop_input(sid) {
                commands::dispatch(world, Actor::Session(sid), &line, Some(&mut bm));
            }
            Mode::Build(bm)
        }
        Mode::TextEdit(te) => textedit_tick(world, sid, te),
    };
    world.restore_mode(sid, next);
}

// ***** Build mode *****

/// Build-mode working state: the area being edited and, within it, the
/// object the builder currently has open. The build command family reads
/// and writes these.
#[derive(Debug, Default)]
pub struct BuildMode {
    pub edit_area: Option<String>,
    pub edit_object: Option<ObjRef>,
}

impl BuildMode {
    pub fn new() -> Self {
        Self::default()
    }
}

// ***** Text edit mode *****

#[derive(Debug, Clone)]
pub enum EditTarget {
    Area(String),
    Object(ObjRef),
}

/// Transient line editor for long text fields. Entered from build-mode
/// `set`; the previous mode is parked in `last_mode` and restored on
/// `@done`/`@cancel`.
#[derive(Debug)]
pub struct TextEditMode {
    pub target: EditTarget,
    pub field: String,
    pub lines: Vec<String>,
    pub last_mode: Box<Mode>,
}

impl TextEditMode {
    pub fn new(target: EditTarget, field: &str, current: &str) -> Self {
        let lines = if current.is_empty() {
            Vec::new()
        } else {
            current.lines().map(str::to_string).collect()
        };
        Self {
            target,
            field: field.to_string(),
            lines,
            last_mode: Box::new(Mode::Normal),
        }
    }
}

const TEXTEDIT_HELP: &str = "TextEditMode commands:\n  @show         display the text with line numbers\n  @delete <n>   delete line n\n  @insert <n> <text>  insert text before line n\n  @done         save and exit\n  @cancel       exit without saving\nAnything else is appended as a new line.";

fn textedit_tick(world: &mut World, sid: SessionId, mut te: TextEditMode) -> Mode {
    let Some(line) = world.pop_input(sid) else {
        return Mode::TextEdit(te);
    };
    let trimmed = line.trim_end();

    if let Some(rest) = trimmed.strip_prefix('@') {
        let (word, tail) = commands::split_command(rest);
        match word.to_ascii_lowercase().as_str() {
            "help" => world.send_session(sid, TEXTEDIT_HELP),
            "show" => {
                let mut s = String::new();
                for (i, l) in te.lines.iter().enumerate() {
                    s.push_str(&format!("{}: {}\n", i + 1, l));
                }
                if s.is_empty() {
                    s.push_str("(empty)\n");
                }
                world.send_session(sid, s);
            }
            "delete" => match tail.trim().parse::<usize>() {
                Ok(n) if n >= 1 && n <= te.lines.len() => {
                    te.lines.remove(n - 1);
                    world.send_session(sid, format!("Line {n} deleted."));
                }
                _ => world.send_session(sid, "Delete which line?"),
            },
            "insert" => {
                let (num, text) = commands::split_command(tail);
                match num.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= te.lines.len() + 1 => {
                        te.lines.insert(n - 1, text.to_string());
                        world.send_session(sid, format!("Inserted before line {n}."));
                    }
                    _ => world.send_session(sid, "Insert where?"),
                }
            }
            "done" => {
                let text = te.lines.join("\n");
                let msg = building::apply_text(world, &te.target, &te.field, &text);
                world.send_session(sid, msg);
                return *te.last_mode;
            }
            "cancel" => {
                world.send_session(sid, "Edit cancelled.");
                return *te.last_mode;
            }
            _ => world.send_session(sid, "Unknown @command. Type \"@help\" for help."),
        }
    } else {
        te.lines.push(trimmed.to_string());
    }
    Mode::TextEdit(te)
}

// ***** Login mode *****

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginState {
    Intro,
    VerifyPlayername,
    VerifyPassword,
    VerifyNewCharacter,
    NewPlayername,
    CreatePassword,
    ConfirmPassword,
    ChooseGender,
    AddEmail,
    CharacterCleanup,
    JoinWorld,
}

/// Login / character-creation state machine. Multi-step flows never block:
/// each input-gated state consumes at most one buffered line per tick and
/// re-prompts from the same state on bad input.
#[derive(Debug)]
pub struct LoginMode {
    state: LoginState,
    name: String,
    pw_hash: Option<String>,
    gender: Gender,
    email: Option<String>,
}

impl LoginMode {
    pub fn new() -> Self {
        Self {
            state: LoginState::Intro,
            name: String::new(),
            pw_hash: None,
            gender: Gender::Neutral,
            email: None,
        }
    }
}

impl Default for LoginMode {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_playername(name: &str) -> bool {
    (2..=16).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphabetic())
}

fn password_blacklisted(pw: &str, name: &str) -> bool {
    let lc = pw.to_ascii_lowercase();
    RESERVED_PASSWORDS.contains(&lc.as_str()) || lc == name
}

pub fn hash_password(pw: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut password_hash::rand_core::OsRng);
    Ok(Argon2::default()
        .hash_password(pw.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(pw: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(ph) => Argon2::default().verify_password(pw.as_bytes(), &ph).is_ok(),
        Err(_) => false,
    }
}

const NAME_PROMPT: &str = "Enter playername (or \"new\"): ";

fn login_tick(world: &mut World, sid: SessionId, mut lm: LoginMode) -> Mode {
    use LoginState::*;

    match lm.state {
        Intro => {
            world.send_session(sid, WELCOME_BANNER);
            world.send_session(sid, NAME_PROMPT);
            lm.state = VerifyPlayername;
        }
        VerifyPlayername => {
            let Some(line) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            let name = line.trim().to_ascii_lowercase();
            if name == "new" {
                lm.state = VerifyNewCharacter;
            } else if name.is_empty() {
                world.send_session(sid, NAME_PROMPT);
            } else if world.is_player_online(&name) {
                world.send_session(
                    sid,
                    format!("That player is already in the world.\n{NAME_PROMPT}"),
                );
            } else if world.store.get(&name).map_or(false, |r| r.pw_hash.is_some()) {
                lm.name = name;
                lm.state = VerifyPassword;
                world.send_session(sid, "Enter password: ");
            } else {
                world.send_session(
                    sid,
                    format!(
                        "That player doesn't exist. Type \"new\" to create a new character.\n{NAME_PROMPT}"
                    ),
                );
            }
        }
        VerifyPassword => {
            let Some(mut pw) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            let ok = world
                .store
                .get(&lm.name)
                .and_then(|r| r.pw_hash.as_deref())
                .map(|h| verify_password(&pw, h))
                .unwrap_or(false);
            pw.zeroize();
            if ok {
                lm.state = CharacterCleanup;
            } else {
                warn!(session = %sid, name = %lm.name, "failed login attempt");
                lm.name.clear();
                world.send_session(
                    sid,
                    format!("Bad playername or password.\n{NAME_PROMPT}"),
                );
                lm.state = VerifyPlayername;
            }
        }
        VerifyNewCharacter => {
            world.send_session(
                sid,
                "Welcome, new player!\nPlayernames are letters only, 2 to 16 characters.\nChoose a playername: ",
            );
            lm.state = NewPlayername;
        }
        NewPlayername => {
            let Some(line) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            let name = line.trim().to_ascii_lowercase();
            if !valid_playername(&name) {
                world.send_session(
                    sid,
                    "Playernames are letters only, 2 to 16 characters.\nChoose a playername: ",
                );
            } else if name == "new" {
                world.send_session(sid, "That name is reserved.\nChoose a playername: ");
            } else if world.store.exists(&name) || world.is_player_online(&name) {
                world.send_session(sid, "That name is already taken.\nChoose a playername: ");
            } else {
                lm.name = name;
                lm.state = CreatePassword;
                world.send_session(sid, "Choose a password: ");
            }
        }
        CreatePassword => {
            let Some(mut pw) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            if pw.len() < 8 {
                world.send_session(
                    sid,
                    "Passwords must be at least 8 characters.\nChoose a password: ",
                );
            } else if password_blacklisted(&pw, &lm.name) {
                world.send_session(
                    sid,
                    "That password is too easy to guess.\nChoose a password: ",
                );
            } else {
                match hash_password(&pw) {
                    Ok(hash) => {
                        lm.pw_hash = Some(hash);
                        lm.state = ConfirmPassword;
                        world.send_session(sid, "Confirm password: ");
                    }
                    Err(e) => {
                        error!(session = %sid, err = %e, "password hashing failed");
                        world.send_session(
                            sid,
                            "Something went wrong. Choose a password: ",
                        );
                    }
                }
            }
            pw.zeroize();
        }
        ConfirmPassword => {
            let Some(mut pw) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            let ok = lm
                .pw_hash
                .as_deref()
                .map(|h| verify_password(&pw, h))
                .unwrap_or(false);
            pw.zeroize();
            if ok {
                lm.state = ChooseGender;
                world.send_session(sid, "Choose a gender (male/female/neutral): ");
            } else {
                lm.pw_hash = None;
                lm.state = CreatePassword;
                world.send_session(sid, "Passwords don't match.\nChoose a password: ");
            }
        }
        ChooseGender => {
            let Some(line) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            match Gender::parse(&line) {
                Some(g) => {
                    lm.gender = g;
                    lm.state = AddEmail;
                    world.send_session(
                        sid,
                        "Add an email for password recovery? Enter an address, or \"n\" to skip: ",
                    );
                }
                None => world.send_session(
                    sid,
                    "Valid genders are: male, female, neutral.\nChoose a gender: ",
                ),
            }
        }
        AddEmail => {
            let Some(line) = world.pop_input(sid) else {
                return Mode::Login(lm);
            };
            let answer = line.trim();
            match answer.to_ascii_lowercase().as_str() {
                "" | "n" | "no" | "none" => {
                    lm.email = None;
                    lm.state = CharacterCleanup;
                }
                _ if answer.contains('@') => {
                    lm.email = Some(answer.to_string());
                    lm.state = CharacterCleanup;
                }
                _ => world.send_session(
                    sid,
                    "That doesn't look like an email address. Enter an address, or \"n\" to skip: ",
                ),
            }
        }
        CharacterCleanup => {
            character_cleanup(world, sid, &lm);
            lm.state = JoinWorld;
        }
        JoinWorld => {
            let fancy = world
                .session(sid)
                .map(|s| s.fancy_name())
                .unwrap_or_else(|| "Someone".to_string());
            commands::execute_wecho(world, format!("{fancy} has entered the world."));
            info!(session = %sid, name = %lm.name, "session joined the world");
            return Mode::Normal;
        }
    }
    Mode::Login(lm)
}

/// Terminal login step: make the player durable, adopt the persisted
/// identity onto the session, and move it into the active registry.
fn character_cleanup(world: &mut World, sid: SessionId, lm: &LoginMode) {
    if !world.store.exists(&lm.name) {
        world.store.put(PlayerRec {
            name: lm.name.clone(),
            pw_hash: lm.pw_hash.clone(),
            gender: lm.gender,
            email: lm.email.clone(),
            permissions: Permissions::PLAYER.bits(),
            channels: [("chat".to_string(), true)].into_iter().collect(),
            created_unix: crate::store::now_unix(),
        });
        world.save_players();
    }

    let Some(rec) = world.store.get(&lm.name).cloned() else {
        return;
    };
    let mut perms = Permissions::from_bits_truncate(rec.permissions) | Permissions::PLAYER;
    if world.bootstrap_gods.iter().any(|g| g.eq_ignore_ascii_case(&rec.name)) {
        perms |= Permissions::GOD;
    }
    if let Some(s) = world.session_mut(sid) {
        s.name = rec.name.to_ascii_lowercase();
        s.gender = rec.gender;
        s.email = rec.email.clone();
        s.permissions = perms;
        if !rec.channels.is_empty() {
            s.channels = rec.channels.clone().into_iter().collect();
        }
    }
    world.promote_session(sid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlayerStore;
    use crate::world::World;

    fn test_world(tag: &str) -> World {
        let dir = std::env::temp_dir().join(format!(
            "glintmud-mode-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let store = PlayerStore::load(dir.join("players.json"));
        World::new(store, dir.join("areas"), 1)
    }

    fn feed(world: &mut World, sid: SessionId, lines: &[&str]) {
        for l in lines {
            world.push_input(sid, l.to_string());
        }
    }

    fn run_ticks(world: &mut World, n: usize) {
        for _ in 0..n {
            world.tick();
        }
    }

    #[test]
    fn new_character_login_promotes_to_normal() {
        let mut world = test_world("create");
        let sid = SessionId(10);
        world.connect_session(sid);
        feed(
            &mut world,
            sid,
            &["new", "alicename", "passw0rd", "passw0rd", "male", "n"],
        );
        // Plenty of ticks: prompts and pass-through states take their own.
        run_ticks(&mut world, 14);

        let s = world.session(sid).unwrap();
        assert_eq!(s.mode.name(), "NormalMode");
        assert_eq!(s.name, "alicename");
        assert!(world.find_player("alicename").is_some());

        let rec = world.store.get("alicename").unwrap();
        assert_eq!(rec.gender, Gender::Male);
        assert_eq!(rec.email, None);
        assert!(rec.pw_hash.is_some());
        assert!(verify_password("passw0rd", rec.pw_hash.as_deref().unwrap()));
    }

    #[test]
    fn wrong_password_returns_to_verify_playername() {
        let mut world = test_world("badpw");
        world.store.put(PlayerRec {
            name: "bob".to_string(),
            pw_hash: Some(hash_password("realsecret").unwrap()),
            gender: Gender::Male,
            email: None,
            permissions: Permissions::PLAYER.bits(),
            channels: Default::default(),
            created_unix: 0,
        });

        let sid = SessionId(11);
        world.connect_session(sid);
        feed(&mut world, sid, &["bob", "wrongsecret"]);
        run_ticks(&mut world, 6);

        let s = world.session(sid).unwrap();
        match &s.mode {
            Mode::Login(lm) => assert_eq!(lm.state, LoginState::VerifyPlayername),
            m => panic!("expected login mode, got {}", m.name()),
        }
        assert!(world.find_player("bob").is_none());
    }

    #[test]
    fn duplicate_playername_is_rejected() {
        let mut world = test_world("dup");
        world.store.put(PlayerRec {
            name: "carol".to_string(),
            pw_hash: Some("$x".to_string()),
            gender: Gender::Female,
            email: None,
            permissions: Permissions::PLAYER.bits(),
            channels: Default::default(),
            created_unix: 0,
        });

        let sid = SessionId(12);
        world.connect_session(sid);
        feed(&mut world, sid, &["new", "carol"]);
        run_ticks(&mut world, 6);

        let s = world.session(sid).unwrap();
        match &s.mode {
            Mode::Login(lm) => {
                // Still waiting for an acceptable name.
                assert_eq!(lm.state, LoginState::NewPlayername);
                assert!(lm.name.is_empty());
            }
            m => panic!("expected login mode, got {}", m.name()),
        }
    }

    #[test]
    fn playername_validation() {
        assert!(valid_playername("alice"));
        assert!(!valid_playername("a"));
        assert!(!valid_playername("alice7"));
        assert!(!valid_playername("name with spaces"));
        assert!(!valid_playername("averyveryverylongname"));
    }

    #[test]
    fn reserved_passwords_are_blacklisted() {
        assert!(password_blacklisted("Password", "alice"));
        assert!(password_blacklisted("alice", "alice"));
        assert!(!password_blacklisted("passw0rd", "alice"));
    }

    #[test]
    fn textedit_restores_last_mode() {
        let mut world = test_world("textedit");
        let mut area = crate::area::Area::new("moor");
        area.builders.push("bea".to_string());
        area.new_room();
        world.add_area(area);

        let sid = SessionId(13);
        world.connect_session(sid);
        // Skip login for this test: force an active builder session.
        if let Some(s) = world.session_mut(sid) {
            s.name = "bea".to_string();
            s.permissions = Permissions::PLAYER | Permissions::BUILDER;
            s.mode = Mode::build();
        }
        world.promote_session(sid);

        feed(
            &mut world,
            sid,
            &[
                "edit area moor",
                "edit room 1",
                "set description",
                "@delete 1",
                "A mist-shrouded moor.",
                "@done",
            ],
        );
        run_ticks(&mut world, 9);

        let s = world.session(sid).unwrap();
        assert_eq!(s.mode.name(), "BuildMode");
        let room = world.area("moor").unwrap().get_room("1").unwrap();
        assert_eq!(room.description, "A mist-shrouded moor.");
    }
}
