//! Server-side challenge state kept between the two provisioning phases.

use crate::error::ChallengeStoreError;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub type StoreResult<T> = std::result::Result<T, ChallengeStoreError>;

/// Outstanding challenge, keyed by the first 8 bytes of its nonce.
#[derive(Clone, PartialEq, Eq)]
pub struct ChallengeState {
    pub nonce_key: i64,
    pub nonce: Vec<u8>,
    /// Raw phase 1 request
    pub identity_claim: Vec<u8>,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

impl fmt::Debug for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeState")
            .field("nonce_key", &format_args!("{:#018x}", self.nonce_key))
            .field("identity_claim_len", &self.identity_claim.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Persistence for outstanding challenges.
///
/// `delete` removes and returns in one step; of several concurrent callers
/// for one key, at most one receives the state.
pub trait ChallengeStateStore: Send + Sync {
    /// Store a new challenge. Fails with `KeyInUse` if the key is taken.
    fn put(&self, state: ChallengeState) -> StoreResult<()>;

    fn get(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>>;

    fn delete(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>>;

    /// Remove challenges created before `cutoff` (ms); returns the count.
    fn purge_older_than(&self, cutoff: u64) -> StoreResult<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryChallengeStore {
    states: Mutex<HashMap<i64, ChallengeState>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<i64, ChallengeState>>> {
        self.states
            .lock()
            .map_err(|_| ChallengeStoreError::Unavailable("challenge lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChallengeStateStore for InMemoryChallengeStore {
    fn put(&self, state: ChallengeState) -> StoreResult<()> {
        let mut states = self.lock()?;
        if states.contains_key(&state.nonce_key) {
            return Err(ChallengeStoreError::KeyInUse(state.nonce_key));
        }
        states.insert(state.nonce_key, state);
        Ok(())
    }

    fn get(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>> {
        Ok(self.lock()?.get(&nonce_key).cloned())
    }

    fn delete(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>> {
        Ok(self.lock()?.remove(&nonce_key))
    }

    fn purge_older_than(&self, cutoff: u64) -> StoreResult<usize> {
        let mut states = self.lock()?;
        let before = states.len();
        states.retain(|_, state| state.created_at >= cutoff);
        Ok(before - states.len())
    }
}

/// SQLite-backed challenge store, shared by every authority process using
/// the same database file.
pub struct SqliteChallengeStore {
    conn: Mutex<Connection>,
}

impl SqliteChallengeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.as_ref().display(), "Opened challenge store");
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS challenge_states (
                nonce_key INTEGER PRIMARY KEY,
                nonce BLOB NOT NULL,
                identity_claim BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_challenge_created ON challenge_states(created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChallengeStoreError::Unavailable("challenge connection poisoned".to_string()))
    }

    fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChallengeState> {
        Ok(ChallengeState {
            nonce_key: row.get(0)?,
            nonce: row.get(1)?,
            identity_claim: row.get(2)?,
            created_at: row.get::<_, i64>(3)? as u64,
        })
    }
}

impl ChallengeStateStore for SqliteChallengeStore {
    fn put(&self, state: ChallengeState) -> StoreResult<()> {
        let inserted = self.lock()?.execute(
            "INSERT OR IGNORE INTO challenge_states (nonce_key, nonce, identity_claim, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                state.nonce_key,
                state.nonce,
                state.identity_claim,
                state.created_at as i64
            ],
        )?;
        if inserted == 0 {
            return Err(ChallengeStoreError::KeyInUse(state.nonce_key));
        }
        Ok(())
    }

    fn get(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>> {
        Ok(self
            .lock()?
            .query_row(
                "SELECT nonce_key, nonce, identity_claim, created_at
                 FROM challenge_states WHERE nonce_key = ?1",
                params![nonce_key],
                Self::row_to_state,
            )
            .optional()?)
    }

    fn delete(&self, nonce_key: i64) -> StoreResult<Option<ChallengeState>> {
        Ok(self
            .lock()?
            .query_row(
                "DELETE FROM challenge_states WHERE nonce_key = ?1
                 RETURNING nonce_key, nonce, identity_claim, created_at",
                params![nonce_key],
                Self::row_to_state,
            )
            .optional()?)
    }

    fn purge_older_than(&self, cutoff: u64) -> StoreResult<usize> {
        Ok(self.lock()?.execute(
            "DELETE FROM challenge_states WHERE created_at < ?1",
            params![cutoff as i64],
        )?)
    }
}
