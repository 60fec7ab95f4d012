//! glintd: the server binary.
//!
//! All world state lives in one task; connection tasks do socket IO only
//! and talk to the world over channels. The world task alternates between
//! applying transport messages and running ticks, so world mutation is
//! single-threaded by construction.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use glintcore::store::{self, PlayerStore};
use glintcore::{SessionId, World};
use glintio::LineReader;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};

#[derive(Debug, Clone)]
struct Config {
    bind: SocketAddr,
    tick_ms: u64,
    seed: u64,
    players_path: PathBuf,
    areas_dir: PathBuf,
    bootstrap_gods: Vec<String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "glintd configuration comes from the environment:\n\
         \x20 GLINT_BIND            listen address (default 127.0.0.1:4000)\n\
         \x20 GLINT_TICK_MS         world tick in ms (default 100, min 10)\n\
         \x20 GLINT_SEED            world RNG seed (default 1)\n\
         \x20 GLINT_PLAYERS_PATH    player store file (default var/players.json)\n\
         \x20 GLINT_AREAS_DIR       area export/import dir (default var/areas)\n\
         \x20 GLINT_BOOTSTRAP_GODS  comma-separated playernames granted GOD on login"
    );
    std::process::exit(2);
}

fn parse_args() -> Config {
    let bind: SocketAddr = std::env::var("GLINT_BIND")
        .unwrap_or_else(|_| "127.0.0.1:4000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let tick_ms: u64 = std::env::var("GLINT_TICK_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
        .max(10);
    let seed: u64 = std::env::var("GLINT_SEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let players_path: PathBuf = std::env::var("GLINT_PLAYERS_PATH")
        .unwrap_or_else(|_| "var/players.json".to_string())
        .into();
    let areas_dir: PathBuf = std::env::var("GLINT_AREAS_DIR")
        .unwrap_or_else(|_| "var/areas".to_string())
        .into();
    let bootstrap_gods: Vec<String> = std::env::var("GLINT_BOOTSTRAP_GODS")
        .ok()
        .map(|v| {
            v.split(',')
                .map(|x| x.trim().to_ascii_lowercase())
                .filter(|x| !x.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Config {
        bind,
        tick_ms,
        seed,
        players_path,
        areas_dir,
        bootstrap_gods,
    }
}

#[derive(Debug)]
enum Inbound {
    Connect {
        sid: SessionId,
        tx: mpsc::UnboundedSender<String>,
    },
    Line {
        sid: SessionId,
        line: String,
    },
    Gone {
        sid: SessionId,
    },
}

fn new_session_id() -> SessionId {
    let mut b = [0u8; 16];
    getrandom::getrandom(&mut b).expect("getrandom");
    SessionId::from_be_bytes(b)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,glintd=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    let player_store = PlayerStore::load(&cfg.players_path);
    let mut world = World::new(player_store, cfg.areas_dir.clone(), cfg.seed);
    world.bootstrap_gods = cfg.bootstrap_gods.clone();
    for area in store::load_areas(&cfg.areas_dir) {
        let name = area.name.clone();
        if world.add_area(area) {
            info!(area = %name, "area loaded");
        } else {
            warn!(area = %name, "duplicate area file ignored");
        }
    }

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(bind = %cfg.bind, tick_ms = cfg.tick_ms, "glintd listening");

    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<Inbound>();
    tokio::spawn(accept_loop(listener, in_tx));

    let mut conns: HashMap<SessionId, mpsc::UnboundedSender<String>> = HashMap::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                world.tick();
                flush(&mut world, &mut conns);
                // The flag may have flipped mid-tick; it is only observed
                // here, after the pass completed.
                if world.shutdown_flag {
                    info!("shutdown flag set; stopping");
                    break;
                }
            }
            msg = in_rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    Inbound::Connect { sid, tx } => {
                        conns.insert(sid, tx);
                        world.connect_session(sid);
                    }
                    Inbound::Line { sid, line } => world.push_input(sid, line),
                    Inbound::Gone { sid } => world.disconnect_session(sid),
                }
                flush(&mut world, &mut conns);
            }
        }
    }

    world.save_players();
    Ok(())
}

fn flush(world: &mut World, conns: &mut HashMap<SessionId, mpsc::UnboundedSender<String>>) {
    for (sid, text) in world.drain_output() {
        if let Some(tx) = conns.get(&sid) {
            let _ = tx.send(text);
        }
    }
    for sid in world.drain_closed() {
        // Dropping the sender ends the connection task's write side.
        conns.remove(&sid);
    }
}

async fn accept_loop(listener: TcpListener, in_tx: mpsc::UnboundedSender<Inbound>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let sid = new_session_id();
                info!(peer = %peer, session = %sid, "connection accepted");
                let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
                if in_tx.send(Inbound::Connect { sid, tx: out_tx }).is_err() {
                    return;
                }
                tokio::spawn(handle_conn(stream, sid, in_tx.clone(), out_rx));
            }
            Err(e) => warn!(err = %e, "accept failed"),
        }
    }
}

async fn handle_conn(
    stream: TcpStream,
    sid: SessionId,
    in_tx: mpsc::UnboundedSender<Inbound>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) {
    let (rd, mut wr) = stream.into_split();
    let mut lr = LineReader::new(rd);

    loop {
        tokio::select! {
            res = lr.read_line() => {
                let replies = lr.take_replies();
                if !replies.is_empty() {
                    let _ = wr.write_all(&replies).await;
                }
                match res {
                    Ok(Some(line)) => {
                        if in_tx.send(Inbound::Line { sid, line }).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = in_tx.send(Inbound::Gone { sid });
                        break;
                    }
                    Err(e) => {
                        warn!(session = %sid, err = %e, "read failed");
                        let _ = in_tx.send(Inbound::Gone { sid });
                        break;
                    }
                }
            }
            msg = out_rx.recv() => {
                match msg {
                    Some(text) => {
                        if wr.write_all(wire_text(&text).as_bytes()).await.is_err() {
                            let _ = in_tx.send(Inbound::Gone { sid });
                            break;
                        }
                    }
                    None => {
                        // The world removed this session.
                        let _ = wr.shutdown().await;
                        break;
                    }
                }
            }
        }
    }
}

/// CRLF-normalize one outbound message: interior newlines become CRLF and
/// the message always ends with one.
fn wire_text(text: &str) -> String {
    let mut t = text.replace("\r\n", "\n");
    if !t.ends_with('\n') {
        t.push('\n');
    }
    t.replace('\n', "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_text_normalizes_newlines() {
        assert_eq!(wire_text("hello"), "hello\r\n");
        assert_eq!(wire_text("a\nb"), "a\r\nb\r\n");
        assert_eq!(wire_text("already\r\ncrlf\r\n"), "already\r\ncrlf\r\n");
    }
}
