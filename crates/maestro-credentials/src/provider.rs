//! Credential provider implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use maestro_core::MaestroError;
use maestro_store::ConnectionPool;
use maestro_store::repositories::CredentialRepo;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Environment variable the CLI reads when no profile file is present.
pub const AMBIENT_KEY_VAR: &str = "ASSISTANT_API_KEY";

/// Resolved credentials for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialMode {
    /// Active-default API key; passed to the subprocess environment.
    ApiKey(String),
    /// CLI login profile materialized to the credentials file.
    Profile,
    /// No stored credentials, but the service environment carries a key.
    Ambient,
}

impl CredentialMode {
    /// Whether turns in this mode must serialize on the profile lock.
    #[must_use]
    pub fn requires_profile_lock(&self) -> bool {
        matches!(self, Self::Profile)
    }
}

/// Guard holding the process-wide profile-file lock for the duration of a
/// `write → spawn → wait` sequence.
pub struct ProfileGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

/// Resolves credentials per request and materializes profile blobs.
pub struct CredentialProvider {
    pool: ConnectionPool,
    credentials_file: PathBuf,
    profile_lock: Arc<Mutex<()>>,
}

impl CredentialProvider {
    /// Create a provider writing profile blobs to `credentials_file`.
    #[must_use]
    pub fn new(pool: ConnectionPool, credentials_file: PathBuf) -> Self {
        Self {
            pool,
            credentials_file,
            profile_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The well-known CLI credentials file path.
    #[must_use]
    pub fn credentials_file(&self) -> &Path {
        &self.credentials_file
    }

    /// Resolve credentials for `user_id`, materializing the profile file when
    /// in profile mode. Fails with `CredentialUnavailable` before any agent
    /// turn if nothing usable exists.
    pub async fn ensure(&self, user_id: &str) -> Result<CredentialMode, MaestroError> {
        let record = {
            let conn = self
                .pool
                .get()
                .map_err(|e| MaestroError::Storage(e.to_string()))?;
            CredentialRepo::get(&conn, user_id).map_err(MaestroError::from)?
        };

        if let Some(record) = &record {
            if record.api_key_active {
                if let Some(key) = &record.api_key {
                    debug!(user_id, "resolved active api key");
                    return Ok(CredentialMode::ApiKey(key.clone()));
                }
            }
            if record.profile_selected {
                if let Some(blob) = &record.profile_blob {
                    self.write_profile(blob).await.map_err(|e| {
                        MaestroError::CredentialUnavailable {
                            user_id: user_id.to_owned(),
                            reason: format!("profile write failed: {e}"),
                        }
                    })?;
                    debug!(user_id, file = %self.credentials_file.display(), "materialized profile");
                    return Ok(CredentialMode::Profile);
                }
            }
        }

        if std::env::var(AMBIENT_KEY_VAR).is_ok_and(|v| !v.is_empty()) {
            debug!(user_id, "falling back to ambient environment key");
            return Ok(CredentialMode::Ambient);
        }

        Err(MaestroError::CredentialUnavailable {
            user_id: user_id.to_owned(),
            reason: "no active api key, selected profile, or ambient key".into(),
        })
    }

    /// Acquire the process-wide profile lock. Callers in profile mode hold
    /// this across the spawn-and-wait of their subprocess.
    pub async fn profile_guard(&self) -> ProfileGuard<'_> {
        ProfileGuard(self.profile_lock.lock().await)
    }

    async fn write_profile(&self, blob: &str) -> std::io::Result<()> {
        if let Some(parent) = self.credentials_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.credentials_file, blob).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.credentials_file, perms).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use maestro_store::open_in_memory;

    fn provider(dir: &tempfile::TempDir) -> CredentialProvider {
        let pool = open_in_memory().unwrap();
        CredentialProvider::new(pool, dir.path().join("cli").join("credentials.json"))
    }

    fn set_api_key(provider: &CredentialProvider, user: &str, key: &str, active: bool) {
        let conn = provider.pool.get().unwrap();
        CredentialRepo::set_api_key(&conn, user, Some(key), active).unwrap();
    }

    fn set_profile(provider: &CredentialProvider, user: &str, blob: &str) {
        let conn = provider.pool.get().unwrap();
        CredentialRepo::set_profile(&conn, user, Some(blob), true).unwrap();
    }

    #[tokio::test]
    async fn active_api_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        set_api_key(&p, "u1", "sk-123", true);
        set_profile(&p, "u1", "{\"token\":\"t\"}");

        let mode = p.ensure("u1").await.unwrap();
        assert_eq!(mode, CredentialMode::ApiKey("sk-123".into()));
        // API-key mode must not touch the profile file.
        assert!(!p.credentials_file().exists());
    }

    #[tokio::test]
    async fn inactive_api_key_falls_through_to_profile() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        set_api_key(&p, "u1", "sk-123", false);
        set_profile(&p, "u1", "{\"token\":\"t\"}");

        let mode = p.ensure("u1").await.unwrap();
        assert_eq!(mode, CredentialMode::Profile);
        let written = std::fs::read_to_string(p.credentials_file()).unwrap();
        assert_eq!(written, "{\"token\":\"t\"}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn profile_file_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        set_profile(&p, "u1", "{}");

        let _ = p.ensure("u1").await.unwrap();
        let mode = std::fs::metadata(p.credentials_file())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn profile_refreshed_on_every_request() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        set_profile(&p, "u1", "{\"v\":1}");
        let _ = p.ensure("u1").await.unwrap();

        // Rotate the stored profile; the next request must pick it up.
        set_profile(&p, "u1", "{\"v\":2}");
        let _ = p.ensure("u1").await.unwrap();
        let written = std::fs::read_to_string(p.credentials_file()).unwrap();
        assert_eq!(written, "{\"v\":2}");
    }

    #[tokio::test]
    async fn nothing_stored_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        // The ambient var may leak from the host environment; only assert the
        // error path when it is absent.
        if std::env::var(AMBIENT_KEY_VAR).is_err() {
            let err = p.ensure("ghost").await.unwrap_err();
            assert_matches!(err, MaestroError::CredentialUnavailable { .. });
            assert!(err.is_precondition());
        }
    }

    #[tokio::test]
    async fn profile_lock_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let p = Arc::new(provider(&dir));

        let guard = p.profile_guard().await;
        let p2 = p.clone();
        let contender = tokio::spawn(async move {
            let _guard = p2.profile_guard().await;
        });
        // The contender cannot finish while the guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[test]
    fn api_key_mode_skips_lock() {
        assert!(!CredentialMode::ApiKey("k".into()).requires_profile_lock());
        assert!(CredentialMode::Profile.requires_profile_lock());
        assert!(!CredentialMode::Ambient.requires_profile_lock());
    }
}
