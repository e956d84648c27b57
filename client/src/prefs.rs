use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use firesight_common::models::{CameraId, TimeRange};

const KEY_ONBOARDING: &str = "onboarding_complete";
const KEY_LAST_CAMERA: &str = "last_camera";
const KEY_LAST_RANGE: &str = "last_range";

/// Dashboard state that survives restarts. Read once at startup and written
/// back as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardPrefs {
    pub onboarding_complete: bool,
    pub last_camera: Option<CameraId>,
    pub last_range: Option<TimeRange>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to create preferences directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("preferences database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Local SQLite key/value store for [`DashboardPrefs`].
///
/// Schema: `prefs(key TEXT PRIMARY KEY, value TEXT, updated_at INTEGER)`.
/// WAL mode lets the live and heatmap binaries share one file.
pub struct PrefsStore {
    conn: Mutex<Connection>,
}

impl PrefsStore {
    /// Open (or create) the store, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, PrefsError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| PrefsError::CreateDir(dir.display().to_string(), e))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = path.display().to_string(), "preferences store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PrefsError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PrefsError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prefs (
                key        TEXT    PRIMARY KEY,
                value      TEXT    NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get(&self, conn: &Connection, key: &str) -> Result<Option<String>, PrefsError> {
        Ok(conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Load all preferences. Values that no longer parse are logged and
    /// treated as unset.
    pub fn load(&self) -> Result<DashboardPrefs, PrefsError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let onboarding_complete = self
            .get(&conn, KEY_ONBOARDING)?
            .map(|v| v == "true")
            .unwrap_or(false);

        let last_camera = self
            .get(&conn, KEY_LAST_CAMERA)?
            .and_then(|v| match v.parse::<CameraId>() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(value = %v, error = %e, "ignoring unreadable last_camera preference");
                    None
                }
            });

        let last_range = self
            .get(&conn, KEY_LAST_RANGE)?
            .and_then(|v| match v.parse::<TimeRange>() {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable last_range preference");
                    None
                }
            });

        let prefs = DashboardPrefs {
            onboarding_complete,
            last_camera,
            last_range,
        };
        debug!(?prefs, "preferences loaded");
        Ok(prefs)
    }

    /// Persist all preferences in one transaction. `None` fields are removed.
    pub fn save(&self, prefs: &DashboardPrefs) -> Result<(), PrefsError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        let entries = [
            (KEY_ONBOARDING, Some(prefs.onboarding_complete.to_string())),
            (KEY_LAST_CAMERA, prefs.last_camera.map(|c| c.to_string())),
            (KEY_LAST_RANGE, prefs.last_range.map(|r| r.to_string())),
        ];
        for (key, value) in entries {
            match value {
                Some(value) => {
                    tx.execute(
                        "INSERT INTO prefs (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        params![key, value, now],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM prefs WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        debug!(?prefs, "preferences saved");
        Ok(())
    }

    /// Load, apply `f`, save. Returns the updated preferences.
    pub fn update(&self, f: impl FnOnce(&mut DashboardPrefs)) -> Result<DashboardPrefs, PrefsError> {
        let mut prefs = self.load()?;
        f(&mut prefs);
        self.save(&prefs)?;
        Ok(prefs)
    }
}
