//! StateFile: whole-document JSON persistence with atomic replace.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::StateDocument;

/// Handle on the state file path.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. `Ok(None)` if the file does not exist yet.
    pub fn load(&self) -> StateResult<Option<StateDocument>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let doc = serde_json::from_slice(&bytes).map_err(|source| StateError::Deserialize {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(doc))
    }

    /// Write the full document to a sibling temp file, then rename it over
    /// the target.
    pub fn save(&self, doc: &StateDocument) -> StateResult<()> {
        let bytes =
            serde_json::to_vec_pretty(doc).map_err(|e| StateError::Serialize(e.to_string()))?;
        let tmp = self.temp_path();

        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }

        debug!(path = ?self.path, bytes = bytes.len(), "state file written");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redisbroker_core::Instance;

    fn sample_doc() -> StateDocument {
        let mut doc = StateDocument::default();
        doc.available_instances.push(Instance {
            id: String::new(),
            host: "10.0.0.2".to_string(),
            port: 6379,
            password: String::new(),
        });
        doc.allocated_instances.push(Instance {
            id: "inst-1".to_string(),
            host: "10.0.0.1".to_string(),
            port: 6379,
            password: "pw".to_string(),
        });
        doc.instance_bindings
            .insert("inst-1".to_string(), vec!["bind-a".to_string(), "bind-b".to_string()]);
        doc
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        let doc = sample_doc();

        file.save(&doc).unwrap();
        assert_eq!(file.load().unwrap(), Some(doc));
    }

    #[test]
    fn save_uses_snake_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        file.save(&sample_doc()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(file.path()).unwrap()).unwrap();
        assert!(raw.get("available_instances").is_some());
        assert!(raw.get("allocated_instances").is_some());
        assert_eq!(raw["instance_bindings"]["inst-1"][1], "bind-b");
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        file.save(&sample_doc()).unwrap();
        file.save(&StateDocument::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(file.load().unwrap(), Some(StateDocument::default()));
    }

    #[test]
    fn failed_save_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let file = StateFile::new(&path);
        file.save(&sample_doc()).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("state.json.tmp")).unwrap();
        let err = file.save(&StateDocument::default()).unwrap_err();
        assert!(matches!(err, StateError::Write { .. }));

        assert_eq!(file.load().unwrap(), Some(sample_doc()));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();
        let err = StateFile::new(&path).load().unwrap_err();
        assert!(matches!(err, StateError::Deserialize { .. }));
    }
}
