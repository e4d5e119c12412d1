use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use fs2::FileExt;
use thiserror::Error;

pub const ACTIVE_TRACKER_KEY: &str = "active-tracker";
pub const HISTORY_KEY: &str = "history";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable byte storage addressed by key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(".lock")
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        let result = (|| -> Result<(), StoreError> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })();

        let unlocked = lock.unlock();
        result?;
        unlocked?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
enum Refuse {
    #[default]
    Nothing,
    Everything,
    Key(String),
}

/// In-process store. `failing()` refuses every write, `refusing(key)`
/// refuses writes to that one key.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
    refuse: Refuse,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            entries: HashMap::new(),
            refuse: Refuse::Everything,
        }
    }

    pub fn refusing(key: &str) -> Self {
        Self {
            entries: HashMap::new(),
            refuse: Refuse::Key(key.to_string()),
        }
    }

    pub fn with_entry(mut self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(key.to_string(), value.into());
        self
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let refused = match &self.refuse {
            Refuse::Nothing => false,
            Refuse::Everything => true,
            Refuse::Key(refused) => refused == key,
        };
        if refused {
            return Err(StoreError::Unavailable(format!("write to {key} refused")));
        }
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
