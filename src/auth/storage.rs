//! Durable key-value backends for [`super::TokenStore`].
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Synchronous string key-value storage.
///
/// `set_all` and `remove_all` must be all-or-nothing: a reader never observes
/// some of the entries of a batch without the others.
pub trait Storage: Send + Sync + Debug {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set_all(&self, entries: &[(&str, &str)]) -> io::Result<()>;
    fn remove_all(&self, keys: &[&str]) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> io::Result<()> {
        let mut values = self.values();
        for (k, v) in entries {
            values.insert(k.to_string(), v.to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> io::Result<()> {
        let mut values = self.values();
        for k in keys {
            values.remove(*k);
        }
        Ok(())
    }
}

/// All keys in one JSON object file. Every write replaces the file through a
/// rename, so the file on disk is always a complete document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> io::Result<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&self, values: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let bytes = serde_json::to_vec_pretty(values).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read()?;
        f(&mut values);
        self.write(&values)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.remove(key))
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> io::Result<()> {
        self.update(|values| {
            for (k, v) in entries {
                values.insert(k.to_string(), v.to_string());
            }
        })
    }

    fn remove_all(&self, keys: &[&str]) -> io::Result<()> {
        self.update(|values| {
            for k in keys {
                values.remove(*k);
            }
        })
    }
}
