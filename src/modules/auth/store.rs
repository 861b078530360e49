use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::roles::RoleSet;
use crate::modules::utils::logging::log_data_operation;

/// Failures of the durable record layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("malformed store data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invitation record keyed by its code
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InvitationToken {
    pub code: String,
    #[serde(rename = "role")]
    pub roles: RoleSet,
    pub expires_at: u64,
    pub used: bool,
    #[serde(default)]
    pub created_at: u64,
}

impl InvitationToken {
    /// Unused and expiring strictly after `now`
    pub fn is_redeemable(&self, now: u64) -> bool {
        !self.used && self.expires_at > now
    }
}

/// Account record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,            // As entered, for display
    pub username_normalized: String, // Lowercase key for lookups
    pub password: String,            // PBKDF2 hash string, never the plaintext
    pub email: String,
    #[serde(rename = "role")]
    pub roles: RoleSet,
    #[serde(default)]
    pub password_reset_pending: bool,
    #[serde(default)]
    pub created_at: u64,
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// What became of an attempt to rewrite a user under a possibly new username
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekeyOutcome {
    Updated,
    NotFound,
    UsernameTaken,
}

/// Keyed record store backing users and invitation codes.
///
/// Implementations must make `insert_token`, `insert_user`, `insert_first_user`,
/// `rekey_user` and `compare_and_set_used` atomic with respect to each other; the
/// invitation store relies on that to hand out each code once.
pub trait RecordStore: Send + Sync {
    fn get_token(&self, code: &str) -> Result<Option<InvitationToken>, StoreError>;

    /// Insert or replace a token
    fn put_token(&self, token: InvitationToken) -> Result<(), StoreError>;

    /// Insert only if the code is free; `false` when it is already taken
    fn insert_token(&self, token: InvitationToken) -> Result<bool, StoreError>;

    /// Flip `used` from `expected_used` to `new_used`; `false` if the record is missing
    /// or its flag did not match
    fn compare_and_set_used(
        &self,
        code: &str,
        expected_used: bool,
        new_used: bool,
    ) -> Result<bool, StoreError>;

    /// Drop every token for which `keep` is false, returning how many went
    fn retain_tokens(&self, keep: &dyn Fn(&InvitationToken) -> bool) -> Result<usize, StoreError>;

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError>;

    /// Insert only if the normalized username is free
    fn insert_user(&self, user: UserRecord) -> Result<bool, StoreError>;

    /// Insert only if there are no users at all
    fn insert_first_user(&self, user: UserRecord) -> Result<bool, StoreError>;

    /// Replace the user stored under `old_username` with `user`, moving it to the new
    /// key when the username changed
    fn rekey_user(&self, old_username: &str, user: UserRecord) -> Result<RekeyOutcome, StoreError>;

    fn delete_user(&self, username: &str) -> Result<bool, StoreError>;

    fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;
}

/// The full record set, as held in memory and as written to disk
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Records {
    pub users: HashMap<String, UserRecord>,
    pub invitations: HashMap<String, InvitationToken>,
}

impl Records {
    fn insert_token(&mut self, token: InvitationToken) -> bool {
        if self.invitations.contains_key(&token.code) {
            return false;
        }
        self.invitations.insert(token.code.clone(), token);
        true
    }

    fn compare_and_set_used(&mut self, code: &str, expected_used: bool, new_used: bool) -> bool {
        match self.invitations.get_mut(code) {
            Some(token) if token.used == expected_used => {
                token.used = new_used;
                true
            }
            _ => false,
        }
    }

    fn retain_tokens(&mut self, keep: &dyn Fn(&InvitationToken) -> bool) -> usize {
        let before = self.invitations.len();
        self.invitations.retain(|_, token| keep(token));
        before - self.invitations.len()
    }

    fn insert_user(&mut self, user: UserRecord) -> bool {
        if self.users.contains_key(&user.username_normalized) {
            return false;
        }
        self.users.insert(user.username_normalized.clone(), user);
        true
    }

    fn insert_first_user(&mut self, user: UserRecord) -> bool {
        if !self.users.is_empty() {
            return false;
        }
        self.insert_user(user)
    }

    fn rekey_user(&mut self, old_key: &str, user: UserRecord) -> RekeyOutcome {
        if !self.users.contains_key(old_key) {
            return RekeyOutcome::NotFound;
        }
        if user.username_normalized != old_key && self.users.contains_key(&user.username_normalized) {
            return RekeyOutcome::UsernameTaken;
        }
        self.users.remove(old_key);
        self.users.insert(user.username_normalized.clone(), user);
        RekeyOutcome::Updated
    }

    fn sorted_users(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.username_normalized.cmp(&b.username_normalized));
        users
    }
}

fn lock(records: &Mutex<Records>) -> Result<MutexGuard<'_, Records>, StoreError> {
    records
        .lock()
        .map_err(|_| StoreError::Unavailable("record lock poisoned".to_string()))
}

/// Process-local store; every operation runs under one lock
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get_token(&self, code: &str) -> Result<Option<InvitationToken>, StoreError> {
        Ok(lock(&self.records)?.invitations.get(code).cloned())
    }

    fn put_token(&self, token: InvitationToken) -> Result<(), StoreError> {
        lock(&self.records)?
            .invitations
            .insert(token.code.clone(), token);
        Ok(())
    }

    fn insert_token(&self, token: InvitationToken) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.insert_token(token))
    }

    fn compare_and_set_used(
        &self,
        code: &str,
        expected_used: bool,
        new_used: bool,
    ) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.compare_and_set_used(code, expected_used, new_used))
    }

    fn retain_tokens(&self, keep: &dyn Fn(&InvitationToken) -> bool) -> Result<usize, StoreError> {
        Ok(lock(&self.records)?.retain_tokens(keep))
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(lock(&self.records)?
            .users
            .get(&normalize_username(username))
            .cloned())
    }

    fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        lock(&self.records)?
            .users
            .insert(user.username_normalized.clone(), user);
        Ok(())
    }

    fn insert_user(&self, user: UserRecord) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.insert_user(user))
    }

    fn insert_first_user(&self, user: UserRecord) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.insert_first_user(user))
    }

    fn rekey_user(&self, old_username: &str, user: UserRecord) -> Result<RekeyOutcome, StoreError> {
        Ok(lock(&self.records)?.rekey_user(&normalize_username(old_username), user))
    }

    fn delete_user(&self, username: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?
            .users
            .remove(&normalize_username(username))
            .is_some())
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(lock(&self.records)?.sorted_users())
    }
}

/// Store persisted as a JSON document.
///
/// Mutations are applied under the lock and written through before the lock is
/// released; the file is replaced by rename so a crash never leaves half a document.
/// A failed write rolls the in-memory state back.
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match File::open(&path) {
            Ok(mut file) => {
                let mut data = String::new();
                file.read_to_string(&mut data)?;
                if data.trim().is_empty() {
                    Records::default()
                } else {
                    serde_json::from_str(&data)?
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Records::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(records)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(data.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    /// Apply `change` and write the result; `change` reports whether anything changed
    fn mutate<T>(
        &self,
        operation: &str,
        change: impl FnOnce(&mut Records) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut records = lock(&self.records)?;
        let snapshot = records.clone();
        let (result, changed) = change(&mut *records);
        if changed {
            if let Err(e) = self.persist(&*records) {
                *records = snapshot;
                log_data_operation(
                    operation,
                    "-",
                    &self.path.display().to_string(),
                    false,
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
        Ok(result)
    }
}

impl RecordStore for JsonFileStore {
    fn get_token(&self, code: &str) -> Result<Option<InvitationToken>, StoreError> {
        Ok(lock(&self.records)?.invitations.get(code).cloned())
    }

    fn put_token(&self, token: InvitationToken) -> Result<(), StoreError> {
        self.mutate("put_token", |records| {
            records.invitations.insert(token.code.clone(), token);
            ((), true)
        })
    }

    fn insert_token(&self, token: InvitationToken) -> Result<bool, StoreError> {
        self.mutate("insert_token", |records| {
            let inserted = records.insert_token(token);
            (inserted, inserted)
        })
    }

    fn compare_and_set_used(
        &self,
        code: &str,
        expected_used: bool,
        new_used: bool,
    ) -> Result<bool, StoreError> {
        self.mutate("compare_and_set_used", |records| {
            let swapped = records.compare_and_set_used(code, expected_used, new_used);
            (swapped, swapped)
        })
    }

    fn retain_tokens(&self, keep: &dyn Fn(&InvitationToken) -> bool) -> Result<usize, StoreError> {
        self.mutate("retain_tokens", |records| {
            let removed = records.retain_tokens(keep);
            (removed, removed > 0)
        })
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(lock(&self.records)?
            .users
            .get(&normalize_username(username))
            .cloned())
    }

    fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.mutate("upsert_user", |records| {
            records.users.insert(user.username_normalized.clone(), user);
            ((), true)
        })
    }

    fn insert_user(&self, user: UserRecord) -> Result<bool, StoreError> {
        self.mutate("insert_user", |records| {
            let inserted = records.insert_user(user);
            (inserted, inserted)
        })
    }

    fn insert_first_user(&self, user: UserRecord) -> Result<bool, StoreError> {
        self.mutate("insert_first_user", |records| {
            let inserted = records.insert_first_user(user);
            (inserted, inserted)
        })
    }

    fn rekey_user(&self, old_username: &str, user: UserRecord) -> Result<RekeyOutcome, StoreError> {
        let old_key = normalize_username(old_username);
        self.mutate("rekey_user", |records| {
            let outcome = records.rekey_user(&old_key, user);
            (outcome, outcome == RekeyOutcome::Updated)
        })
    }

    fn delete_user(&self, username: &str) -> Result<bool, StoreError> {
        let key = normalize_username(username);
        self.mutate("delete_user", |records| {
            let removed = records.users.remove(&key).is_some();
            (removed, removed)
        })
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(lock(&self.records)?.sorted_users())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::auth::roles::Role;
    use tempfile::TempDir;

    fn sample_token(code: &str) -> InvitationToken {
        InvitationToken {
            code: code.to_string(),
            roles: RoleSet::single(Role::Student),
            expires_at: 2_000_000_000,
            used: false,
            created_at: 1_700_000_000,
        }
    }

    fn sample_user(username: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            username_normalized: normalize_username(username),
            password: "pbkdf2$1$00$00".to_string(),
            email: "user@example.com".to_string(),
            roles: RoleSet::single(Role::User),
            password_reset_pending: false,
            created_at: 1_700_000_000,
        }
    }

    fn exercise_store(store: &dyn RecordStore) {
        assert!(store.insert_token(sample_token("ab12")).unwrap());
        assert!(!store.insert_token(sample_token("ab12")).unwrap());
        assert_eq!(store.get_token("ab12").unwrap(), Some(sample_token("ab12")));
        assert_eq!(store.get_token("zz99").unwrap(), None);

        assert!(store.compare_and_set_used("ab12", false, true).unwrap());
        assert!(!store.compare_and_set_used("ab12", false, true).unwrap());
        assert!(!store.compare_and_set_used("zz99", false, true).unwrap());
        assert!(store.get_token("ab12").unwrap().unwrap().used);

        store.put_token(sample_token("cd34")).unwrap();
        let removed = store.retain_tokens(&|token| !token.used).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get_token("ab12").unwrap(), None);

        assert!(store.insert_user(sample_user("Alice")).unwrap());
        assert!(!store.insert_user(sample_user("alice")).unwrap());
        let found = store.get_user_by_username("ALICE").unwrap().unwrap();
        assert_eq!(found.username, "Alice");

        let mut updated = found.clone();
        updated.password_reset_pending = true;
        store.upsert_user(updated).unwrap();
        assert!(store.get_user_by_username("alice").unwrap().unwrap().password_reset_pending);

        store.upsert_user(sample_user("Bob")).unwrap();
        let names: Vec<String> = store
            .list_users()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        // Rename Bob to Robert, then try to take Alice's name
        let mut robert = sample_user("Robert");
        robert.email = "robert@example.com".to_string();
        assert_eq!(store.rekey_user("BOB", robert).unwrap(), RekeyOutcome::Updated);
        assert_eq!(store.get_user_by_username("bob").unwrap(), None);
        assert_eq!(
            store.get_user_by_username("robert").unwrap().unwrap().email,
            "robert@example.com"
        );
        assert_eq!(
            store.rekey_user("robert", sample_user("ALICE")).unwrap(),
            RekeyOutcome::UsernameTaken
        );
        assert!(store.get_user_by_username("robert").unwrap().is_some());
        assert_eq!(
            store.rekey_user("ghost", sample_user("Ghost")).unwrap(),
            RekeyOutcome::NotFound
        );
        // Same key, different display case
        assert_eq!(store.rekey_user("robert", sample_user("ROBERT")).unwrap(), RekeyOutcome::Updated);
        assert_eq!(store.get_user_by_username("robert").unwrap().unwrap().username, "ROBERT");

        assert!(!store.insert_first_user(sample_user("Dave")).unwrap());

        assert!(store.delete_user("robert").unwrap());
        assert!(!store.delete_user("robert").unwrap());
    }

    fn exercise_first_user(store: &dyn RecordStore) {
        assert!(store.insert_first_user(sample_user("Root")).unwrap());
        assert!(!store.insert_first_user(sample_user("Other")).unwrap());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_first_user_only_into_empty_store() {
        exercise_first_user(&MemoryStore::new());

        let dir = TempDir::new().unwrap();
        exercise_first_user(&JsonFileStore::open(dir.path().join("records.json")).unwrap());
    }

    #[test]
    fn test_memory_store_operations() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_json_store_operations() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("records.json")).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert_token(sample_token("ef56")).unwrap();
            store.compare_and_set_used("ef56", false, true).unwrap();
            store.insert_user(sample_user("Carol")).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(reopened.get_token("ef56").unwrap().unwrap().used);
        assert!(reopened.get_user_by_username("carol").unwrap().is_some());

        // Roles sit in the file as the joined string
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"role\": \"student\""));
    }

    #[test]
    fn test_json_store_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_json_store_rolls_back_failed_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let store = JsonFileStore::open(&path).unwrap();

        // A directory in place of the file makes the rename fail
        fs::create_dir(&path).unwrap();
        assert!(store.insert_token(sample_token("ab12")).is_err());
        assert_eq!(store.get_token("ab12").unwrap(), None);
        assert!(store.insert_user(sample_user("Alice")).is_err());
        assert!(store.list_users().unwrap().is_empty());

        fs::remove_dir(&path).unwrap();
        assert!(store.insert_token(sample_token("ab12")).unwrap());
    }

    #[test]
    fn test_token_redeemable_window() {
        let token = sample_token("gh78");
        assert!(token.is_redeemable(token.expires_at - 1));
        assert!(!token.is_redeemable(token.expires_at));
        let used = InvitationToken { used: true, ..token };
        assert!(!used.is_redeemable(0));
    }
}
