use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::RegistryError;
use crate::schema::{Database, SCHEMA_VERSION};

/// Storage engine for one registry database file. The registry holds a
/// single `Store` for its whole lifetime; every write operation ends with
/// one [`Store::commit`].
#[derive(Debug, Clone)]
pub struct Store {
    path: Utf8PathBuf,
}

impl Store {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().is_file()
    }

    /// Creates an empty database file. Safe to invoke against an existing
    /// store: without `force` this is a no-op. Returns whether a fresh
    /// database was written.
    pub fn initialize(&self, force: bool) -> Result<bool, RegistryError> {
        if self.exists() && !force {
            return Ok(false);
        }
        self.commit(&Database::new())?;
        Ok(true)
    }

    pub fn open(&self) -> Result<Database, RegistryError> {
        if !self.exists() {
            return Err(RegistryError::DatabaseNotFound(self.path.clone()));
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        let mut db: Database =
            serde_json::from_str(&content).map_err(|err| RegistryError::CorruptDatabase {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        if db.meta.schema_version != SCHEMA_VERSION {
            return Err(RegistryError::CorruptDatabase {
                path: self.path.clone(),
                message: format!(
                    "unsupported schema version {} (expected {})",
                    db.meta.schema_version, SCHEMA_VERSION
                ),
            });
        }
        db.rebuild_indexes();
        Ok(db)
    }

    pub fn commit(&self, db: &Database) -> Result<(), RegistryError> {
        let content = serde_json::to_vec_pretty(db)
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&self.path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RegistryError> {
        let parent = path
            .parent()
            .ok_or_else(|| RegistryError::Filesystem("invalid database path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("rnaseq-reg")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::error::RegistryError;

    fn temp_store(dir: &tempfile::TempDir) -> Store {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("registry.json")).unwrap();
        Store::new(path)
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);

        assert!(store.initialize(false).unwrap());
        let mut db = store.open().unwrap();
        db.insert_component("CompA").unwrap();
        store.commit(&db).unwrap();

        // A second initialize without force must not wipe the data.
        assert!(!store.initialize(false).unwrap());
        let db = store.open().unwrap();
        assert_eq!(db.components().count(), 1);

        // Forced initialize starts over.
        assert!(store.initialize(true).unwrap());
        let db = store.open().unwrap();
        assert_eq!(db.components().count(), 0);
    }

    #[test]
    fn open_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let err = store.open().unwrap_err();
        assert_matches!(err, RegistryError::DatabaseNotFound(_));
    }

    #[test]
    fn open_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        std::fs::write(store.path().as_std_path(), b"not json").unwrap();
        let err = store.open().unwrap_err();
        assert_matches!(err, RegistryError::CorruptDatabase { .. });
    }
}
