pub mod models;
pub mod queries;

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

use models::{RawTrack, RawTrackRecord};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Invalid database key: {0}")]
    InvalidKey(&'static str),
    #[error("Missing table: {0}")]
    MissingTable(&'static str),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Something that can open a track library, optionally with a decryption key.
pub trait TrackSource {
    type Handle: LibraryHandle;

    fn open(&self, key: Option<&str>) -> Result<Self::Handle>;
}

/// An open library connection.
pub trait LibraryHandle {
    type Record: RawTrackRecord;

    /// Every track record in the library, in storage order.
    fn get_content(&self) -> Result<Vec<Self::Record>>;

    fn close(self) -> Result<()>;
}

/// A rekordbox 6/7 `master.db` on disk.
#[derive(Debug, Clone)]
pub struct RekordboxSource {
    path: PathBuf,
}

impl RekordboxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackSource for RekordboxSource {
    type Handle = MasterDb;

    fn open(&self, key: Option<&str>) -> Result<MasterDb> {
        MasterDb::open(&self.path, key)
    }
}

/// Read-only connection to a rekordbox library.
pub struct MasterDb {
    pub conn: Connection,
}

impl MasterDb {
    pub fn open(path: &Path, key: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(DbError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::unlock(conn, key)
    }

    fn unlock(conn: Connection, key: Option<&str>) -> Result<Self> {
        if let Some(key) = key {
            if key.is_empty() {
                return Err(DbError::InvalidKey("key is empty"));
            }
            if key.contains('\'') {
                return Err(DbError::InvalidKey("key must not contain quotes"));
            }
            // Passed as a passphrase; SQLCipher derives the real key via PBKDF2.
            conn.execute_batch(&format!("PRAGMA key = '{key}'"))?;
        }
        // Fails with "file is not a database" when the key is wrong or missing
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))?;
        Ok(Self { conn })
    }
}

impl LibraryHandle for MasterDb {
    type Record = RawTrack;

    fn get_content(&self) -> Result<Vec<RawTrack>> {
        self.load_content()
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}
