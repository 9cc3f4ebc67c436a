//! Database connection management

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::fmt;
use std::path::{Path, PathBuf};

/// Connection settings for the remote store
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Remote database URL (e.g., `libsql://your-db.turso.io`)
    pub url: Option<String>,
    /// Authentication token for remote database
    pub auth_token: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RemoteConfig {
    /// Create a new remote configuration
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
        }
    }

    /// Check if the remote store is configured
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.auth_token.is_some()
    }
}

/// Database wrapper for a single libSQL connection
pub struct Database {
    // Keeps the database handle alive for the lifetime of the connection
    _db: LibSqlDatabase,
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new_local(path.to_string_lossy().to_string())
            .build()
            .await?;
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
            path: Some(path),
        };
        database.configure().await?;
        Ok(database)
    }

    /// Open a local database, quarantining the file once if it is corrupted
    pub async fn open_with_recovery(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::open(path).await {
            Ok(database) => match database.verify_readable().await {
                Ok(()) => Ok(database),
                Err(error) if is_corrupted_db_error(&error) => {
                    drop(database);
                    Self::recover(path, &error).await
                }
                Err(error) => Err(error),
            },
            Err(error) if is_corrupted_db_error(&error) => Self::recover(path, &error).await,
            Err(error) => Err(error),
        }
    }

    async fn recover(path: &Path, error: &Error) -> Result<Self> {
        tracing::warn!(
            "Local store at {} is unreadable: {}. Quarantining and starting fresh.",
            path.display(),
            error
        );
        quarantine_corrupted_db_files(path)?;
        Self::open(path).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
            path: None,
        };
        database.configure().await?;
        Ok(database)
    }

    /// Open a connection to the remote libSQL server
    pub async fn open_remote(config: &RemoteConfig) -> Result<Self> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| Error::Config("Remote URL is required".into()))?;
        let token = config
            .auth_token
            .as_ref()
            .ok_or_else(|| Error::Config("Remote auth token is required".into()))?;

        let db = Builder::new_remote(url.clone(), token.clone())
            .build()
            .await?;
        let conn = db.connect()?;
        tracing::debug!("Connected to remote store {}", url);

        Ok(Self {
            _db: db,
            conn,
            path: None,
        })
    }

    /// Configure `SQLite` for local use
    async fn configure(&self) -> Result<()> {
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok(); // Not supported for in-memory databases
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    async fn verify_readable(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sqlite_master", ())
            .await?;
        rows.next().await?;
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Filesystem path for local databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

pub(crate) fn is_corrupted_db_error(error: &Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("file is not a database") || message.contains("database disk image is malformed")
}

/// Move a corrupted database aside and remove its sidecar files
pub(crate) fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        let timestamp = crate::util::now_millis();
        let base_name = db_path
            .file_name()
            .map_or_else(|| "stockroom.db".into(), |name| name.to_string_lossy());
        let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

        std::fs::rename(db_path, &backup_path)?;
        tracing::warn!(
            "Moved corrupted local DB file from {} to {}",
            db_path.display(),
            backup_path.display()
        );
    }

    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };
    let sidecar_prefix = format!("{base_name}-");

    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(&sidecar_prefix) {
            let path = entry.path();
            std::fs::remove_file(&path)?;
            tracing::warn!("Removed stale local DB file {}", path.display());
        }
    }

    Ok(())
}
