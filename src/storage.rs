use crate::error::{Error, Result};
use crate::Embedding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Enrolled faces as two parallel sequences: `names[i]` labels `encodings[i]`.
/// A name repeats once per face enrolled for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingDatabase {
    names: Vec<String>,
    encodings: Vec<Embedding>,
}

impl EncodingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, encoding: Embedding) {
        self.names.push(name.into());
        self.encodings.push(encoding);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn encodings(&self) -> &[Embedding] {
        &self.encodings
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.encodings.iter())
    }

    /// Distinct names in first-enrolled order.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for name in &self.names {
            if !seen.contains(&name.as_str()) {
                seen.push(name);
            }
        }
        seen
    }
}

pub fn load_database(path: &Path) -> Result<EncodingDatabase> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let db: EncodingDatabase = postcard::from_bytes(&data).map_err(|e| Error::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if db.names.len() != db.encodings.len() {
        return Err(Error::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "{} names for {} encodings",
                db.names.len(),
                db.encodings.len()
            ),
        });
    }
    Ok(db)
}

/// Writes `db` to `path`, replacing whatever was there.
pub fn save_database(db: &EncodingDatabase, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let data = postcard::to_allocvec(db)?;
    std::fs::write(path, data).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// In-memory copy of the database file, reloaded when its mtime changes.
#[derive(Debug)]
pub struct EncodingCache {
    path: PathBuf,
    loaded: Mutex<Option<(SystemTime, Arc<EncodingDatabase>)>>,
}

impl EncodingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<EncodingDatabase>> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.path.clone()))
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let mut loaded = self.loaded.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((stamp, db)) = loaded.as_ref() {
            if *stamp == modified {
                return Ok(Arc::clone(db));
            }
        }

        log::info!("loading encodings from {}", self.path.display());
        let db = Arc::new(load_database(&self.path)?);
        *loaded = Some((modified, Arc::clone(&db)));
        Ok(db)
    }
}

/// Where recognition reads the database from.
#[derive(Debug)]
pub enum EncodingSource {
    /// Read and decode the file on every call.
    Disk(PathBuf),
    Cached(EncodingCache),
}

impl EncodingSource {
    pub fn new(path: impl Into<PathBuf>, cache: bool) -> Self {
        let path = path.into();
        if cache {
            EncodingSource::Cached(EncodingCache::new(path))
        } else {
            EncodingSource::Disk(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            EncodingSource::Disk(path) => path,
            EncodingSource::Cached(cache) => &cache.path,
        }
    }

    pub fn load(&self) -> Result<Arc<EncodingDatabase>> {
        match self {
            EncodingSource::Disk(path) => load_database(path).map(Arc::new),
            EncodingSource::Cached(cache) => cache.get(),
        }
    }
}
