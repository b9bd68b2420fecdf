use std::fs::{self, File, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Where the bearer credential for the current session lives.
///
/// Any part of the client that needs auth reads through this trait instead
/// of touching process-wide state directly. Implementations must tolerate
/// being cleared concurrently by another request's 401.
pub trait CredentialProvider: Send + Sync {
    /// The current credential, if one is stored.
    fn get(&self) -> Option<String>;

    /// Replace the stored credential.
    fn set(&self, token: &str) -> io::Result<()>;

    /// Forget the stored credential.
    fn clear(&self) -> io::Result<()>;
}

/// Credential kept only for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialProvider for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set(&self, token: &str) -> io::Result<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.token.write() = None;
        Ok(())
    }
}

/// On-disk form of a stored credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    /// The bearer token exactly as issued
    pub token: String,

    /// When this client stored it
    pub saved_at: DateTime<Utc>,
}

/// Credential persisted to a JSON file so it survives between runs.
///
/// The file is read once on open and mirrored in memory afterwards; writes
/// go to disk first and only update the cache when they succeed.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<StoredCredential>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading any credential already saved there.
    ///
    /// A missing file means no credential. An unreadable or corrupt file is
    /// logged and treated the same way, so a damaged file never blocks login.
    ///
    /// # Arguments
    /// * `path` - Location of the credential file
    ///
    /// # Returns
    /// * `FileCredentialStore` - The opened store
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<StoredCredential>(&contents) {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!("Ignoring corrupt credential file {}: {e}", path.display());
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read credential file {}: {e}", path.display());
                None
            }
        };

        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata of the stored credential, if any.
    pub fn stored(&self) -> Option<StoredCredential> {
        self.cached.read().clone()
    }
}

impl CredentialProvider for FileCredentialStore {
    fn get(&self) -> Option<String> {
        self.cached.read().as_ref().map(|stored| stored.token.clone())
    }

    fn set(&self, token: &str) -> io::Result<()> {
        let stored = StoredCredential {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())?;

        debug!("Stored credential at {}", self.path.display());
        *self.cached.write() = Some(stored);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.cached.write() = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
