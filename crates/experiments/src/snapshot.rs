//! JSON persistence for experiment state and results.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{SnapshotError, SnapshotResult};

/// A single JSON file holding the latest state of a running experiment.
///
/// Writes go through a sibling temporary file and a rename, so a reader never observes a
/// partially written snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store backed by `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the snapshot. Returns whether a file was removed.
    pub fn clear(&self) -> SnapshotResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapshotError::io(&self.path, e)),
        }
    }

    /// Replaces the snapshot with `state` as pretty-printed JSON.
    pub fn save<T: Serialize + ?Sized>(&self, state: &T) -> SnapshotResult<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| SnapshotError::json(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| SnapshotError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| SnapshotError::io(&self.path, e))
    }

    /// Reads the snapshot, or `None` if it does not exist.
    pub fn load<T: DeserializeOwned>(&self) -> SnapshotResult<Option<T>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotError::io(&self.path, e)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| SnapshotError::json(&self.path, e))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Writes named result documents into one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsWriter {
    dir: PathBuf,
}

impl ResultsWriter {
    /// Creates a writer for `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot store for `name` inside the results directory.
    pub fn snapshot(&self, name: &str) -> SnapshotStore {
        SnapshotStore::new(self.dir.join(name))
    }

    /// Writes `value` as pretty JSON to `<dir>/<name>` and returns the path.
    pub fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> SnapshotResult<PathBuf> {
        let store = self.snapshot(name);
        store.save(value)?;
        tracing::info!(path = %store.path().display(), "Wrote results");
        Ok(store.path)
    }

    /// Like [`ResultsWriter::write`] with a UTC timestamp appended to `prefix`.
    pub fn write_timestamped<T: Serialize + ?Sized>(
        &self,
        prefix: &str,
        value: &T,
    ) -> SnapshotResult<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        self.write(&format!("{prefix}_{stamp}.json"), value)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct State {
        phase: String,
        completed: Vec<String>,
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/state.json"));
        let state = State { phase: "connect".into(), completed: vec!["clear".into()] };

        store.save(&state).unwrap();
        assert_eq!(store.load::<State>().unwrap(), Some(state));
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[test]
    fn clear_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        assert!(!store.clear().unwrap());
        store.save(&1u8).unwrap();
        assert!(store.clear().unwrap());
        assert_eq!(store.load::<u8>().unwrap(), None);
    }

    #[test]
    fn load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let err = SnapshotStore::new(&path).load::<State>().unwrap_err();
        assert!(matches!(err, SnapshotError::Json { .. }));
    }

    #[test]
    fn results_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultsWriter::new(dir.path().join("results"));

        let path = writer.write_timestamped("run", &serde_json::json!({ "ok": true })).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_") && name.ends_with(".json"));

        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\"ok\": true"));
    }
}
