//! libSQL error classification.
//!
//! The only place that inspects driver errors. Everything above the storage
//! layer branches on [`StoreError`] variants.

use std::ffi::c_int;

use crate::error::{Error, StoreError};

const SQLITE_ERROR: c_int = 1;
const SQLITE_ABORT: c_int = 4;
const SQLITE_BUSY: c_int = 5;
const SQLITE_LOCKED: c_int = 6;
const SQLITE_CANTOPEN: c_int = 14;
const SQLITE_CONSTRAINT: c_int = 19;

const SQLITE_CONSTRAINT_FOREIGNKEY: c_int = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: c_int = 1555;
const SQLITE_CONSTRAINT_UNIQUE: c_int = 2067;

/// Map a libSQL error onto the storage taxonomy.
pub fn classify(error: libsql::Error) -> StoreError {
    match error {
        libsql::Error::SqliteFailure(code, message) => classify_sqlite(code, message),
        libsql::Error::ConnectionFailed(message) => StoreError::Connectivity(message),
        other => classify_message(other.to_string()),
    }
}

fn classify_sqlite(code: c_int, message: String) -> StoreError {
    match code {
        SQLITE_CONSTRAINT_FOREIGNKEY => StoreError::ReferentialIntegrity(message),
        SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE => {
            StoreError::DuplicateIdentity(message)
        }
        _ => match code & 0xff {
            SQLITE_ABORT | SQLITE_BUSY | SQLITE_LOCKED => StoreError::TransactionAborted(message),
            SQLITE_CANTOPEN => StoreError::Unavailable(message),
            // Primary-only codes carry the constraint kind in the message
            SQLITE_CONSTRAINT | SQLITE_ERROR => classify_message(message),
            _ => StoreError::Other(message),
        },
    }
}

/// Remote (Hrana) failures arrive as text; the SQLite wording is stable.
fn classify_message(message: String) -> StoreError {
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("foreign key constraint failed")
        || lowered.contains("sqlite_constraint_foreignkey")
    {
        return StoreError::ReferentialIntegrity(message);
    }
    if lowered.contains("unique constraint failed")
        || lowered.contains("sqlite_constraint_primarykey")
        || lowered.contains("sqlite_constraint_unique")
    {
        return StoreError::DuplicateIdentity(message);
    }
    if let Some(table) = missing_table(&message) {
        return StoreError::SchemaMismatch(table);
    }
    if lowered.contains("sqlite_busy")
        || lowered.contains("database is locked")
        || lowered.contains("sqlite_abort")
        || lowered.contains("transaction has been rolled back")
        || lowered.contains("no transaction is active")
    {
        return StoreError::TransactionAborted(message);
    }
    if lowered.contains("connection refused")
        || lowered.contains("connection reset")
        || lowered.contains("timed out")
        || lowered.contains("dns error")
        || lowered.contains("error sending request")
        || lowered.contains("stream closed")
    {
        return StoreError::Connectivity(message);
    }
    StoreError::Other(message)
}

fn missing_table(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("no such table:")?;
    let table = rest
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .split(|c: char| c.is_whitespace() || c == ')' || c == '"')
        .next()?
        .rsplit('.')
        .next()?
        .to_string();
    if table.is_empty() {
        None
    } else {
        Some(table)
    }
}

impl From<libsql::Error> for StoreError {
    fn from(error: libsql::Error) -> Self {
        classify(error)
    }
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        Self::Store(classify(error))
    }
}
