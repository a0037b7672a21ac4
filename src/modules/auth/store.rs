use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::credentials::{normalize_email, CredentialRecord};
use super::errors::AuthError;

/// Which records a lookup may return. Inactive (soft-deleted) accounts are
/// only visible when asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    ActiveOnly,
    IncludeInactive,
}

impl RecordScope {
    fn admits(&self, record: &CredentialRecord) -> bool {
        match self {
            RecordScope::ActiveOnly => record.is_active(),
            RecordScope::IncludeInactive => true,
        }
    }
}

/// Persistence collaborator for credential records
pub trait CredentialRepository: Send + Sync {
    fn load(&self, identity: &str, scope: RecordScope)
        -> Result<Option<CredentialRecord>, AuthError>;

    fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError>;

    /// Find the record whose outstanding reset secret has this digest
    fn find_by_reset_digest(
        &self,
        digest: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError>;

    /// Add a new record; fails with `EmailTaken` if the email is in use by
    /// any record, active or not.
    fn insert(&self, record: CredentialRecord) -> Result<(), AuthError>;

    /// Overwrite an existing record
    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError>;
}

/// Container for all records, keyed by identity
#[derive(Serialize, Deserialize, Default, Debug)]
struct CredentialFile {
    users: HashMap<String, CredentialRecord>,
}

impl CredentialFile {
    fn load(&self, identity: &str, scope: RecordScope) -> Option<CredentialRecord> {
        self.users
            .get(identity)
            .filter(|record| scope.admits(record))
            .cloned()
    }

    fn find(
        &self,
        scope: RecordScope,
        predicate: impl Fn(&CredentialRecord) -> bool,
    ) -> Option<CredentialRecord> {
        self.users
            .values()
            .find(|record| scope.admits(record) && predicate(record))
            .cloned()
    }

    fn find_by_email(&self, email: &str, scope: RecordScope) -> Option<CredentialRecord> {
        let email = normalize_email(email);
        self.find(scope, |record| record.email == email)
    }

    fn find_by_reset_digest(&self, digest: &str, scope: RecordScope) -> Option<CredentialRecord> {
        self.find(scope, |record| {
            record
                .reset_secret
                .as_ref()
                .map(|secret| secret.hash == digest)
                .unwrap_or(false)
        })
    }

    fn insert(&mut self, record: CredentialRecord) -> Result<(), AuthError> {
        if self
            .find_by_email(&record.email, RecordScope::IncludeInactive)
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }
        if self.users.contains_key(&record.identity) {
            return Err(AuthError::Storage(format!(
                "identity {} already exists",
                record.identity
            )));
        }
        self.users.insert(record.identity.clone(), record);
        Ok(())
    }

    fn save(&mut self, record: &CredentialRecord) -> Result<(), AuthError> {
        match self.users.get_mut(&record.identity) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(AuthError::Storage(format!(
                "no record for identity {}",
                record.identity
            ))),
        }
    }
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<CredentialFile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialRepository for MemoryStore {
    fn load(
        &self,
        identity: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().load(identity, scope))
    }

    fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().find_by_email(email, scope))
    }

    fn find_by_reset_digest(
        &self,
        digest: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().find_by_reset_digest(digest, scope))
    }

    fn insert(&self, record: CredentialRecord) -> Result<(), AuthError> {
        self.inner.write().insert(record)
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        self.inner.write().save(record)
    }
}

/// Repository backed by a JSON file, rewritten after every change
pub struct JsonFileStore {
    path: PathBuf,
    inner: RwLock<CredentialFile>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let data = fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                CredentialFile::default()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            CredentialFile::default()
        };

        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Write to a sibling file first so a crash never leaves a half-written store
    fn persist(&self, file: &CredentialFile) -> Result<(), AuthError> {
        let data = serde_json::to_string_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(data.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl CredentialRepository for JsonFileStore {
    fn load(
        &self,
        identity: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().load(identity, scope))
    }

    fn find_by_email(
        &self,
        email: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().find_by_email(email, scope))
    }

    fn find_by_reset_digest(
        &self,
        digest: &str,
        scope: RecordScope,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.inner.read().find_by_reset_digest(digest, scope))
    }

    fn insert(&self, record: CredentialRecord) -> Result<(), AuthError> {
        let mut file = self.inner.write();
        let identity = record.identity.clone();
        file.insert(record)?;
        if let Err(e) = self.persist(&file) {
            file.users.remove(&identity);
            return Err(e);
        }
        Ok(())
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        let mut file = self.inner.write();
        let previous = file.users.get(&record.identity).cloned();
        file.save(record)?;
        if let Err(e) = self.persist(&file) {
            if let Some(previous) = previous {
                file.users.insert(previous.identity.clone(), previous);
            }
            return Err(e);
        }
        Ok(())
    }
}
