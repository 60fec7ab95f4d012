//! Flat-file persistence: player records and area export/import.
//!
//! Everything is JSON written atomically (tmp file + rename). Loads are
//! lenient: a missing or unreadable file means an empty store, never a
//! startup failure.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::area::Area;
use crate::personalize::Gender;

pub fn now_unix() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Persisted player record. Only the argon2 hash of the password is ever
/// written; there is no plaintext anywhere in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRec {
    pub name: String,
    #[serde(default)]
    pub pw_hash: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: u32,
    #[serde(default)]
    pub channels: HashMap<String, bool>,
    pub created_unix: u64,
}

#[derive(Debug)]
pub struct PlayerStore {
    path: PathBuf,
    by_name: HashMap<String, PlayerRec>,
}

impl PlayerStore {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut by_name = HashMap::new();
        if let Ok(s) = fs::read_to_string(&path) {
            match serde_json::from_str::<Vec<PlayerRec>>(&s) {
                Ok(v) => {
                    for rec in v {
                        by_name.insert(rec.name.to_ascii_lowercase(), rec);
                    }
                }
                Err(e) => warn!(path = %path.display(), err = %e, "bad player file; starting empty"),
            }
        }
        Self { path, by_name }
    }

    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut v = self.by_name.values().cloned().collect::<Vec<_>>();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        let s = serde_json::to_string_pretty(&v)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, s)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PlayerRec> {
        self.by_name.get(&name.trim().to_ascii_lowercase())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn put(&mut self, rec: PlayerRec) {
        self.by_name.insert(rec.name.to_ascii_lowercase(), rec);
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn area_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Write an area to `<dir>/<name>.json` (atomic).
pub fn export_area(dir: &Path, area: &Area) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = area_path(dir, &area.name);
    let s = serde_json::to_string_pretty(area)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, s)?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Read an area back from `<dir>/<name>.json`.
pub fn import_area(dir: &Path, name: &str) -> io::Result<Area> {
    let s = fs::read_to_string(area_path(dir, name))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Area names with an importable file under `dir`.
pub fn list_importable(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names
}

/// Load every area file under `dir` at boot. Bad files are skipped with a
/// warning.
pub fn load_areas(dir: &Path) -> Vec<Area> {
    let mut areas = Vec::new();
    for name in list_importable(dir) {
        match import_area(dir, &name) {
            Ok(area) => areas.push(area),
            Err(e) => warn!(area = %name, err = %e, "skipping unreadable area file"),
        }
    }
    areas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "glintmud-store-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn player_store_round_trips() {
        let dir = scratch_dir("players");
        let path = dir.join("players.json");

        let mut store = PlayerStore::load(&path);
        assert!(store.is_empty());
        store.put(PlayerRec {
            name: "alice".to_string(),
            pw_hash: Some("$argon2id$fake".to_string()),
            gender: Gender::Female,
            email: None,
            permissions: 1,
            channels: HashMap::new(),
            created_unix: now_unix(),
        });
        store.save().unwrap();

        let reloaded = PlayerStore::load(&path);
        assert!(reloaded.exists("Alice"));
        assert_eq!(
            reloaded.get("alice").unwrap().pw_hash.as_deref(),
            Some("$argon2id$fake")
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn area_export_import_round_trips() {
        let dir = scratch_dir("areas");

        let mut area = Area::new("moor");
        area.title = "The Grey Moor".to_string();
        area.new_room();
        export_area(&dir, &area).unwrap();

        assert_eq!(list_importable(&dir), vec!["moor".to_string()]);
        let back = import_area(&dir, "moor").unwrap();
        assert_eq!(back.title, "The Grey Moor");
        assert_eq!(back.rooms.len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = PlayerStore::load("/nonexistent/glintmud/players.json");
        assert!(store.is_empty());
    }
}
