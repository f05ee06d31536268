//! Secret store for the portal password, the authorized chat id and the bot token.
//!
//! Secrets are grouped by namespace, then key. The file-backed store keeps them
//! in `.autoclock/secrets.json`, written atomically with owner-only permissions.
//! Values are read at call time and never logged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Namespace holding portal passwords, keyed by username.
pub const CREDENTIAL_NAMESPACE: &str = "autoclock";
/// Namespace holding bot settings.
pub const BOT_NAMESPACE: &str = "autobot";
pub const CHAT_ID_KEY: &str = "chat_id";
pub const BOT_TOKEN_KEY: &str = "bot_token";

const SECRETS_FILE: &str = "secrets.json";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("no value entered for {0}")]
    Empty(&'static str),
}

pub trait SecretStore: Send + Sync {
    fn get_secret(&self, namespace: &str, key: &str) -> Result<Option<String>, SecretError>;

    fn set_secret(&self, namespace: &str, key: &str, value: &str) -> Result<(), SecretError>;

    /// Whether any secret is stored under `namespace`.
    fn has_namespace(&self, namespace: &str) -> Result<bool, SecretError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretFile {
    #[serde(default)]
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

/// JSON-file secret store.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `.autoclock/secrets.json` under `root`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(crate::config::CONFIG_DIR).join(SECRETS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SecretFile, SecretError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SecretFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a temp file then rename, so readers never see a partial file.
    fn write(&self, file: &SecretFile) -> Result<(), SecretError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;
        write_private(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get_secret(&self, namespace: &str, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self
            .read()?
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set_secret(&self, namespace: &str, key: &str, value: &str) -> Result<(), SecretError> {
        let mut file = self.read()?;
        file.namespaces
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        self.write(&file)
    }

    fn has_namespace(&self, namespace: &str) -> Result<bool, SecretError> {
        Ok(self
            .read()?
            .namespaces
            .get(namespace)
            .is_some_and(|entries| !entries.is_empty()))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Whether a secret was already present or has just been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Found,
    Stored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    pub password: Provisioned,
    pub bot_token: Provisioned,
    /// Passwords exist for other usernames but not this one.
    pub other_accounts: bool,
}

/// Fill in the portal password for `username` and the bot token, asking
/// `ask` only for the ones not yet stored. Existing values are never replaced.
pub fn provision(
    store: &dyn SecretStore,
    username: &str,
    mut ask: impl FnMut(&str) -> std::io::Result<String>,
) -> Result<SetupReport, SecretError> {
    let mut other_accounts = false;
    let password = if store.get_secret(CREDENTIAL_NAMESPACE, username)?.is_some() {
        Provisioned::Found
    } else {
        other_accounts = store.has_namespace(CREDENTIAL_NAMESPACE)?;
        let value = read_value(&mut ask, &format!("Portal password for {username}: "), "password")?;
        store.set_secret(CREDENTIAL_NAMESPACE, username, &value)?;
        Provisioned::Stored
    };

    let bot_token = if store.get_secret(BOT_NAMESPACE, BOT_TOKEN_KEY)?.is_some() {
        Provisioned::Found
    } else {
        let value = read_value(&mut ask, "Telegram bot token: ", "bot token")?;
        store.set_secret(BOT_NAMESPACE, BOT_TOKEN_KEY, &value)?;
        Provisioned::Stored
    };

    Ok(SetupReport {
        password,
        bot_token,
        other_accounts,
    })
}

fn read_value(
    ask: &mut impl FnMut(&str) -> std::io::Result<String>,
    label: &str,
    what: &'static str,
) -> Result<String, SecretError> {
    let value = ask(label)?.trim().to_owned();
    if value.is_empty() {
        return Err(SecretError::Empty(what));
    }
    Ok(value)
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySecretStore {
    entries: std::sync::Mutex<BTreeMap<(String, String), String>>,
}

#[cfg(test)]
impl SecretStore for MemorySecretStore {
    fn get_secret(&self, namespace: &str, key: &str) -> Result<Option<String>, SecretError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(namespace.to_owned(), key.to_owned())).cloned())
    }

    fn set_secret(&self, namespace: &str, key: &str, value: &str) -> Result<(), SecretError> {
        self.entries
            .lock()
            .unwrap()
            .insert((namespace.to_owned(), key.to_owned()), value.to_owned());
        Ok(())
    }

    fn has_namespace(&self, namespace: &str) -> Result<bool, SecretError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.keys().any(|(ns, _)| ns == namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::in_root(dir.path());
        assert_eq!(store.get_secret(BOT_NAMESPACE, CHAT_ID_KEY).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_then_get_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        FileSecretStore::in_root(dir.path())
            .set_secret(CREDENTIAL_NAMESPACE, "qps56811", "hunter2")
            .unwrap();

        let reopened = FileSecretStore::in_root(dir.path());
        assert_eq!(
            reopened
                .get_secret(CREDENTIAL_NAMESPACE, "qps56811")
                .unwrap()
                .as_deref(),
            Some("hunter2")
        );
        assert_eq!(reopened.get_secret(CREDENTIAL_NAMESPACE, "other").unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::in_root(dir.path());
        store.set_secret(BOT_NAMESPACE, CHAT_ID_KEY, "42").unwrap();
        store.set_secret(BOT_NAMESPACE, BOT_TOKEN_KEY, "tok").unwrap();

        assert_eq!(store.get_secret(CREDENTIAL_NAMESPACE, CHAT_ID_KEY).unwrap(), None);
        assert_eq!(
            store.get_secret(BOT_NAMESPACE, CHAT_ID_KEY).unwrap().as_deref(),
            Some("42")
        );
        assert_eq!(
            store.get_secret(BOT_NAMESPACE, BOT_TOKEN_KEY).unwrap().as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn test_has_namespace_tracks_stored_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::in_root(dir.path());
        assert!(!store.has_namespace(CREDENTIAL_NAMESPACE).unwrap());

        store
            .set_secret(CREDENTIAL_NAMESPACE, "qps56811", "hunter2")
            .unwrap();

        assert!(store.has_namespace(CREDENTIAL_NAMESPACE).unwrap());
        assert!(!store.has_namespace(BOT_NAMESPACE).unwrap());
        assert!(
            FileSecretStore::in_root(dir.path())
                .has_namespace(CREDENTIAL_NAMESPACE)
                .unwrap()
        );
    }

    #[test]
    fn test_provision_asks_only_for_missing_secrets() {
        let store = MemorySecretStore::default();
        store.set_secret(BOT_NAMESPACE, BOT_TOKEN_KEY, "tok").unwrap();
        let mut asked = Vec::new();

        let report = provision(&store, "qps56811", |label| {
            asked.push(label.to_owned());
            Ok(" hunter2\n".to_owned())
        })
        .unwrap();

        assert_eq!(asked, vec!["Portal password for qps56811: ".to_owned()]);
        assert_eq!(report.password, Provisioned::Stored);
        assert_eq!(report.bot_token, Provisioned::Found);
        assert!(!report.other_accounts);
        assert_eq!(
            store
                .get_secret(CREDENTIAL_NAMESPACE, "qps56811")
                .unwrap()
                .as_deref(),
            Some("hunter2")
        );
        assert_eq!(
            store.get_secret(BOT_NAMESPACE, BOT_TOKEN_KEY).unwrap().as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn test_provision_notices_other_accounts() {
        let store = MemorySecretStore::default();
        store
            .set_secret(CREDENTIAL_NAMESPACE, "someone-else", "pw")
            .unwrap();

        let report = provision(&store, "qps56811", |_| Ok("value".to_owned())).unwrap();

        assert!(report.other_accounts);
        assert_eq!(report.bot_token, Provisioned::Stored);
    }

    #[test]
    fn test_provision_with_everything_stored_asks_nothing() {
        let store = MemorySecretStore::default();
        store.set_secret(CREDENTIAL_NAMESPACE, "qps56811", "pw").unwrap();
        store.set_secret(BOT_NAMESPACE, BOT_TOKEN_KEY, "tok").unwrap();

        let report = provision(&store, "qps56811", |label| {
            panic!("unexpected prompt: {label}")
        })
        .unwrap();

        assert_eq!(report.password, Provisioned::Found);
        assert_eq!(report.bot_token, Provisioned::Found);
    }

    #[test]
    fn test_provision_rejects_blank_input() {
        let store = MemorySecretStore::default();

        let err = provision(&store, "qps56811", |_| Ok("  ".to_owned())).unwrap_err();

        assert!(matches!(err, SecretError::Empty("password")));
        assert!(!store.has_namespace(CREDENTIAL_NAMESPACE).unwrap());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::in_root(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        assert!(matches!(
            store.get_secret(BOT_NAMESPACE, CHAT_ID_KEY),
            Err(SecretError::Corrupt(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::in_root(dir.path());
        store.set_secret(BOT_NAMESPACE, BOT_TOKEN_KEY, "tok").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
