//! On-disk tool preferences for the host application
//!
//! The annotation engine itself keeps no preferences. Hosts that want the
//! last-used tools back on the next launch record every settings change
//! here and read them back at startup.

mod preferences;

pub use preferences::{ToolPreferences, ToolStyle};

use annotation_model::ToolSettings;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PREFERENCES_FILE: &str = "tool-preferences.json";
const PREFERENCES_SCHEMA: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no per-user data directory is available on this platform")]
    NoDataDirectory,
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid preferences file: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode preferences: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct StoredPreferences {
    schema: u32,
    #[serde(flatten)]
    preferences: ToolPreferences,
}

/// Tool preferences file in a directory
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    /// Store under the platform's per-user local data directory
    pub fn for_current_user() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Marginalia", "Marginalia")
            .ok_or(StorageError::NoDataDirectory)?;
        Ok(Self::in_dir(dirs.data_local_dir()))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(PREFERENCES_FILE)
    }

    /// Read stored preferences.
    ///
    /// A missing file, or one written with another schema, gives defaults.
    pub fn load(&self) -> Result<ToolPreferences, StorageError> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ToolPreferences::default());
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        let stored: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::Corrupt { path: path.clone(), source })?;
        let schema = stored.get("schema").and_then(serde_json::Value::as_u64);
        if schema != Some(u64::from(PREFERENCES_SCHEMA)) {
            tracing::warn!(path = %path.display(), ?schema, "discarding tool preferences");
            return Ok(ToolPreferences::default());
        }

        let stored: StoredPreferences = serde_json::from_value(stored)
            .map_err(|source| StorageError::Corrupt { path, source })?;
        Ok(stored.preferences)
    }

    /// Replace the stored preferences.
    ///
    /// The file is written beside its final path and renamed over it, so a
    /// reader sees either the old contents or the new ones.
    pub fn save(&self, preferences: &ToolPreferences) -> Result<(), StorageError> {
        let stored =
            StoredPreferences { schema: PREFERENCES_SCHEMA, preferences: preferences.clone() };
        let bytes = serde_json::to_vec_pretty(&stored).map_err(StorageError::Encode)?;

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path();
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(io_error(&staging))?;
        fs::rename(&staging, &path).map_err(io_error(&path))?;
        tracing::debug!(path = %path.display(), active = ?preferences.active, "preferences saved");
        Ok(())
    }

    /// Fold `settings` into the stored preferences and write them back
    pub fn record(&self, settings: &ToolSettings) -> Result<ToolPreferences, StorageError> {
        let mut preferences = self.load()?;
        preferences.remember(settings);
        self.save(&preferences)?;
        Ok(preferences)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError {
    let path = path.to_path_buf();
    move |source| StorageError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation_model::{EraserMode, Rgb, Tool};

    fn store() -> (tempfile::TempDir, PreferenceStore) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = PreferenceStore::in_dir(temp.path().join("prefs"));
        (temp, store)
    }

    #[test]
    fn recorded_styles_are_kept_per_tool() {
        let (_temp, store) = store();
        store
            .record(&ToolSettings { color: Rgb::RED, size: 4.0, ..ToolSettings::default() })
            .expect("record pen");
        store
            .record(&ToolSettings {
                tool: Tool::Eraser,
                eraser_mode: EraserMode::Stroke,
                size: 25.0,
                ..ToolSettings::default()
            })
            .expect("record eraser");

        let mut loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.settings().tool, Tool::Eraser);
        assert_eq!(loaded.settings().eraser_mode, EraserMode::Stroke);
        assert_eq!(loaded.settings().size, 25.0);

        let pen = loaded.switch_to(Tool::Pen);
        assert_eq!((pen.color, pen.size), (Rgb::RED, 4.0));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let (_temp, store) = store();

        assert_eq!(store.load().expect("load should succeed"), ToolPreferences::default());
    }

    #[test]
    fn other_schemas_are_discarded() {
        let (temp, store) = store();
        fs::create_dir_all(temp.path().join("prefs")).expect("create dir");
        fs::write(store.path(), br#"{"schema":1,"active":"eraser","styles":{}}"#)
            .expect("write should succeed");

        assert_eq!(store.load().expect("load should succeed"), ToolPreferences::default());
    }

    #[test]
    fn unreadable_json_reports_the_file() {
        let (temp, store) = store();
        fs::create_dir_all(temp.path().join("prefs")).expect("create dir");
        fs::write(store.path(), b"{not json").expect("write");

        let err = store.load().expect_err("corrupt file");
        assert!(matches!(&err, StorageError::Corrupt { path, .. } if *path == store.path()));
        assert!(err.to_string().contains(PREFERENCES_FILE));
    }

    #[test]
    fn stored_file_names_tools() {
        let (_temp, store) = store();
        store
            .record(&ToolSettings {
                tool: Tool::Highlighter,
                color: Rgb::YELLOW,
                ..ToolSettings::default()
            })
            .expect("record");

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).expect("read")).expect("json");
        assert_eq!(json["schema"], 2);
        assert_eq!(json["active"], "highlighter");
        assert_eq!(json["styles"]["highlighter"]["color"], "#FFEB3B");
    }
}
