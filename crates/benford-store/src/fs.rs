use std::io::{ErrorKind, Write as _};
use std::path::{Component, Path, PathBuf};

use benford_core::store::{ObjectStore, StoreError};

/// Object store that keeps each key as a file under `root`.
///
/// Keys are `/`-separated relative paths. Writes go to a temporary file in the
/// target directory and are renamed into place, so a reader sees either the
/// previous contents or the new ones.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Use `root` as the store directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.ends_with('/')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Keys of every stored object, relative to the root.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<(), StoreError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 object name");
            continue;
        };
        if name.starts_with(".tmp") {
            continue;
        }
        let key = format!("{}{}", prefix, name);
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &format!("{}/", key), keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}

fn not_found(key: &str) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StoreError::NoSuchObject(key.to_string())
        } else {
            StoreError::Io(e)
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;

        let mut staged = tempfile::Builder::new().prefix(".tmp").tempfile_in(dir)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        tracing::debug!(key, bytes = data.len(), "object stored");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(not_found(key))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in self.keys()? {
            if key.starts_with(prefix) {
                self.delete(&key)?;
                removed += 1;
            }
        }
        tracing::info!(prefix, removed, "objects deleted");
        Ok(removed)
    }
}
