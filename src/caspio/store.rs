use crate::config::Config;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Fixed key the token record is persisted under.
pub const OPTION_NAME: &str = "caspio_api_token_json";

/// Persisted form of a credential. Times are seconds since Unix epoch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub created: i64,
    pub expires: i64,
}

/// Key/value storage for the token record.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenRecord>>;

    fn save(&self, record: &TokenRecord) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Stores the record as JSON in a single file, readable only by the owner.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store in the XDG cache directory.
    pub fn in_cache_dir() -> Result<Self> {
        let path = Config::cache_file(&format!("{}.json", OPTION_NAME))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| AppError::Store(format!("Failed to read tokens file: {}", e)))?;

        let record: TokenRecord = serde_json::from_str(&contents)
            .map_err(|e| AppError::Store(format!("Failed to parse tokens: {}", e)))?;

        Ok(Some(record))
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("Failed to create token cache directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| AppError::Store(format!("Failed to serialize tokens: {}", e)))?;

        // Mode is set at creation so the file is never world-readable
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(|e| AppError::Store(format!("Failed to create tokens file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| AppError::Store(format!("Failed to write tokens file: {}", e)))?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            debug!("No stored tokens to clear");
            return Ok(());
        }

        fs::remove_file(&self.path)
            .map_err(|e| AppError::Store(format!("Failed to delete tokens file: {}", e)))?;

        Ok(())
    }
}

/// In-process store, for tests and for embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<TokenRecord>>> {
        self.record
            .lock()
            .map_err(|_| AppError::Store("Token store lock poisoned".to_string()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        *self.lock()? = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
