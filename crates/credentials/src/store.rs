//! Credential trust store.
//!
//! The store is read-mostly: validation only queries it, administrative
//! uploads write it. Within one kind no two credentials share an SKI; a
//! credential that legitimately replaces another goes through
//! [`CredentialStore::replace`].

use crate::credential::{Credential, CredentialKind};
use crate::error::{StoreError, StoreResult};
use attestca_core::current_timestamp;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use x509_cert::name::Name;

/// Query predicate; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSelector {
    pub kind: Option<CredentialKind>,
    pub subject_key_id: Option<Vec<u8>>,
    pub serial: Option<Vec<u8>>,
    pub subject: Option<Name>,
    pub holder_serial: Option<Vec<u8>>,
    pub ek_modulus: Option<Vec<u8>>,
}

impl CredentialSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: CredentialKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_subject_key_id(mut self, ski: &[u8]) -> Self {
        self.subject_key_id = Some(ski.to_vec());
        self
    }

    pub fn with_serial(mut self, serial: &[u8]) -> Self {
        self.serial = Some(serial.to_vec());
        self
    }

    pub fn with_subject(mut self, subject: &Name) -> Self {
        self.subject = Some(subject.clone());
        self
    }

    pub fn with_holder_serial(mut self, serial: &[u8]) -> Self {
        self.holder_serial = Some(serial.to_vec());
        self
    }

    pub fn with_ek_modulus(mut self, modulus: &[u8]) -> Self {
        self.ek_modulus = Some(modulus.to_vec());
        self
    }

    pub fn matches(&self, credential: &Credential) -> bool {
        let info = credential.info();
        if self.kind.is_some_and(|kind| kind != credential.kind()) {
            return false;
        }
        if let Some(ski) = &self.subject_key_id {
            if info.subject_key_id.as_ref() != Some(ski) {
                return false;
            }
        }
        if let Some(serial) = &self.serial {
            if &info.serial != serial {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if info.subject.as_ref() != Some(subject) {
                return false;
            }
        }
        if let Some(holder) = &self.holder_serial {
            match credential.as_platform() {
                Some(pc) if pc.holder_serial.as_ref() == Some(holder) => {}
                _ => return false,
            }
        }
        if let Some(modulus) = &self.ek_modulus {
            match credential.as_endorsement() {
                Some(ec) if ec.has_modulus(modulus) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Storage of trusted and uploaded credentials.
pub trait CredentialStore: Send + Sync {
    /// Matching credentials in insertion order.
    fn find(&self, selector: &CredentialSelector) -> StoreResult<Vec<Credential>>;

    /// Persist a credential. Saving identical bytes again is a no-op; a
    /// different credential of the same kind with the same SKI is rejected.
    fn save(&self, credential: Credential) -> StoreResult<()>;

    /// Persist a credential, superseding any of the same kind and SKI.
    fn replace(&self, credential: Credential) -> StoreResult<()>;
}

fn duplicate_ski(credential: &Credential) -> StoreError {
    StoreError::DuplicateSubjectKeyIdentifier {
        ski: credential.info().subject_key_id_hex().unwrap_or_default(),
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<Vec<Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn same_kind_and_ski(a: &Credential, b: &Credential) -> bool {
    a.kind() == b.kind()
        && a.info().subject_key_id.is_some()
        && a.info().subject_key_id == b.info().subject_key_id
}

impl CredentialStore for InMemoryCredentialStore {
    fn find(&self, selector: &CredentialSelector) -> StoreResult<Vec<Credential>> {
        let credentials = self
            .credentials
            .read()
            .map_err(|_| StoreError::Unavailable("credential lock poisoned".to_string()))?;
        Ok(credentials
            .iter()
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }

    fn save(&self, credential: Credential) -> StoreResult<()> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| StoreError::Unavailable("credential lock poisoned".to_string()))?;
        if credentials
            .iter()
            .any(|c| c.kind() == credential.kind() && c.der() == credential.der())
        {
            return Ok(());
        }
        if credentials.iter().any(|c| same_kind_and_ski(c, &credential)) {
            return Err(duplicate_ski(&credential));
        }
        credentials.push(credential);
        Ok(())
    }

    fn replace(&self, credential: Credential) -> StoreResult<()> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| StoreError::Unavailable("credential lock poisoned".to_string()))?;
        credentials.retain(|c| !same_kind_and_ski(c, &credential) && c.der() != credential.der());
        credentials.push(credential);
        Ok(())
    }
}

/// SQLite-backed store keeping the raw DER of each credential.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.as_ref().display(), "Opened credential store");
        Ok(store)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                subject_key_id BLOB,
                serial BLOB NOT NULL,
                der BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (kind, der)
            );
            CREATE INDEX IF NOT EXISTS idx_credentials_ski ON credentials(subject_key_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("credential connection poisoned".to_string()))
    }

    fn insert(conn: &Connection, credential: &Credential) -> StoreResult<()> {
        let info = credential.info();
        conn.execute(
            "INSERT OR IGNORE INTO credentials (kind, subject_key_id, serial, der, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                credential.kind().as_str(),
                info.subject_key_id,
                info.serial,
                info.der,
                current_timestamp() as i64
            ],
        )?;
        debug!(
            kind = %credential.kind(),
            serial = %info.serial_hex(),
            "Stored credential"
        );
        Ok(())
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn find(&self, selector: &CredentialSelector) -> StoreResult<Vec<Credential>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, der FROM credentials
             WHERE (?1 IS NULL OR kind = ?1)
               AND (?2 IS NULL OR subject_key_id = ?2)
               AND (?3 IS NULL OR serial = ?3)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![
                selector.kind.map(|k| k.as_str()),
                selector.subject_key_id,
                selector.serial
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            },
        )?;

        let mut found = Vec::new();
        for row in rows {
            let (id, kind, der) = row?;
            let credential = kind
                .parse::<CredentialKind>()
                .and_then(|kind| Credential::from_der(kind, &der))
                .map_err(|e| {
                    warn!(id, error = %e, "Stored credential no longer parses");
                    StoreError::Corrupt {
                        id,
                        reason: e.to_string(),
                    }
                })?;
            if selector.matches(&credential) {
                found.push(credential);
            }
        }
        Ok(found)
    }

    fn save(&self, credential: Credential) -> StoreResult<()> {
        let conn = self.lock()?;
        if let Some(ski) = &credential.info().subject_key_id {
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT der FROM credentials WHERE kind = ?1 AND subject_key_id = ?2 LIMIT 1",
                    params![credential.kind().as_str(), ski],
                    |row| row.get(0),
                )
                .optional()?;
            match existing {
                Some(der) if der == credential.der() => return Ok(()),
                Some(_) => return Err(duplicate_ski(&credential)),
                None => {}
            }
        }
        Self::insert(&conn, &credential)
    }

    fn replace(&self, credential: Credential) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if let Some(ski) = &credential.info().subject_key_id {
            tx.execute(
                "DELETE FROM credentials WHERE kind = ?1 AND subject_key_id = ?2",
                params![credential.kind().as_str(), ski],
            )?;
        }
        Self::insert(&tx, &credential)?;
        tx.commit()?;
        Ok(())
    }
}
