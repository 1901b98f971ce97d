//! Persistent record of users and the tracks they uploaded.
//!
//! Tracks are keyed by exact title: uploading a title that already exists
//! refreshes its art and keeps the existing id. Each user keeps a
//! de-duplicated list of the track ids they uploaded.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;

/// What the catalog stores about a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track: String,
    pub artist: String,
    pub album: String,
    /// Art URL shown to clients (may be empty).
    pub art: String,
    pub path: PathBuf,
    pub size: u64,
    pub filetype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub id: String,
    #[serde(flatten)]
    pub record: TrackRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mac_id: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Store of users and tracks.
///
/// Implementations are blocking; callers run them on a blocking thread.
pub trait Catalog: Send + Sync {
    /// Returns the id of the user called `name`, creating it if needed.
    fn upsert_user(&self, name: &str, mac_id: &str) -> Result<String, PersistenceError>;

    /// Inserts or refreshes a track and adds it to `uploader`'s file set.
    ///
    /// Returns the track id.
    fn upsert_track(&self, uploader: &str, record: &TrackRecord)
        -> Result<String, PersistenceError>;

    /// Looks a track up by exact title.
    fn find_track(&self, title: &str) -> Result<Option<StoredTrack>, PersistenceError>;

    /// Looks a user up by name.
    fn find_user(&self, name: &str) -> Result<Option<StoredUser>, PersistenceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON File Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogData {
    #[serde(default)]
    users: Vec<StoredUser>,
    #[serde(default)]
    tracks: Vec<StoredTrack>,
}

/// [`Catalog`] kept in memory and mirrored to a pretty-printed JSON file.
///
/// Every mutation rewrites the file via temp file + rename while holding the
/// catalog lock, so concurrent writers never interleave. Memory only changes
/// once the write has succeeded.
pub struct JsonCatalog {
    path: Option<PathBuf>,
    data: Mutex<CatalogData>,
}

impl JsonCatalog {
    /// Opens (or starts) the catalog at `path`.
    ///
    /// A missing file is an empty catalog; an unreadable one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogData::default(),
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "[Catalog] Opened {} ({} users, {} tracks)",
            path.display(),
            data.users.len(),
            data.tracks.len()
        );
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// Creates a catalog that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(CatalogData::default()),
        }
    }

    /// Applies `mutate` to a copy of the catalog, writes the copy, and only
    /// then makes it visible. A failed write leaves memory as it was.
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut CatalogData) -> T,
    ) -> Result<T, PersistenceError> {
        let mut data = self.data.lock();
        let mut draft = data.clone();
        let out = mutate(&mut draft);
        self.save(&draft)?;
        *data = draft;
        Ok(out)
    }

    fn save(&self, data: &CatalogData) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomically(path, &serde_json::to_string_pretty(data)?)?;
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Catalog for JsonCatalog {
    fn upsert_user(&self, name: &str, mac_id: &str) -> Result<String, PersistenceError> {
        let mut added = false;
        let id = self.commit(|data| {
            if let Some(user) = data.users.iter().find(|u| u.name == name) {
                return user.id.clone();
            }
            added = true;
            let id = new_id();
            data.users.push(StoredUser {
                id: id.clone(),
                name: name.to_string(),
                mac_id: mac_id.to_string(),
                files: Vec::new(),
            });
            id
        })?;
        if added {
            log::info!("[Catalog] Added user {}", name);
        }
        Ok(id)
    }

    fn upsert_track(
        &self,
        uploader: &str,
        record: &TrackRecord,
    ) -> Result<String, PersistenceError> {
        let id = self.commit(|data| {
            let id = match data.tracks.iter().position(|t| t.record.track == record.track) {
                Some(index) => {
                    let existing = &mut data.tracks[index];
                    existing.record.art = record.art.clone();
                    existing.id.clone()
                }
                None => {
                    let id = new_id();
                    data.tracks.push(StoredTrack {
                        id: id.clone(),
                        record: record.clone(),
                    });
                    id
                }
            };

            match data.users.iter().position(|u| u.name == uploader) {
                Some(index) => {
                    let user = &mut data.users[index];
                    if !user.files.contains(&id) {
                        user.files.push(id.clone());
                    }
                }
                None => data.users.push(StoredUser {
                    id: new_id(),
                    name: uploader.to_string(),
                    mac_id: String::new(),
                    files: vec![id.clone()],
                }),
            }
            id
        })?;

        log::debug!("[Catalog] Stored '{}' for {}", record.track, uploader);
        Ok(id)
    }

    fn find_track(&self, title: &str) -> Result<Option<StoredTrack>, PersistenceError> {
        Ok(self
            .data
            .lock()
            .tracks
            .iter()
            .find(|t| t.record.track == title)
            .cloned())
    }

    fn find_user(&self, name: &str) -> Result<Option<StoredUser>, PersistenceError> {
        Ok(self
            .data
            .lock()
            .users
            .iter()
            .find(|u| u.name == name)
            .cloned())
    }
}
