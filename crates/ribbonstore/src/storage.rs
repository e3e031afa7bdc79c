use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Key-value persistence for serialised profile lists.
pub trait ProfileStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&mut self, key: &str, contents: &str) -> io::Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ProfileStorage for FileStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, key: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // readers never observe a partially written list
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents)?;
        fs::rename(&staging, &path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, contents: &str) -> Self {
        let mut storage = Self::new();
        storage.entries.insert(key.to_string(), contents.to_string());
        storage
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl ProfileStorage for MemoryStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, contents: &str) -> io::Result<()> {
        self.entries.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trips_and_reports_missing_keys() {
        let temp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(temp.path().join("nested"));
        assert_eq!(storage.read("profiles").unwrap(), None);
        storage.write("profiles", "[]").unwrap();
        assert_eq!(storage.read("profiles").unwrap().as_deref(), Some("[]"));
        assert!(storage.path_for("profiles").exists());
        assert!(!storage.path_for("profiles").with_extension("json.tmp").exists());
    }

    #[test]
    fn memory_storage_overwrites() {
        let mut storage = MemoryStorage::with_entry("k", "one");
        storage.write("k", "two").unwrap();
        assert_eq!(storage.get("k"), Some("two"));
    }
}
