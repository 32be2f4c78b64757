//! On-disk access token cache, keyed by store.
//!
//! Tokens are stored with an absolute expiry. A token is served only while
//! it has more than [`EARLY_REFRESH_SECS`] left, and never for longer than
//! the cache's own TTL after it was minted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Refresh this long before the upstream expiry.
pub(super) const EARLY_REFRESH_SECS: i64 = 60;

/// Assumed lifetime when the token endpoint omits `expires_in`.
pub(super) const DEFAULT_EXPIRES_IN_SECS: i64 = 86_399;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub(super) struct TokenCache {
    path: PathBuf,
    ttl: Option<Duration>,
    entries: BTreeMap<String, CachedToken>,
}

impl TokenCache {
    /// `$CACHE_DIR/ordercheck/tokens.json`
    pub(super) fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("ordercheck").join("tokens.json"))
    }

    /// Open the cache at `path`. A missing or unreadable file starts empty.
    pub(super) fn open(path: PathBuf, ttl: Option<Duration>) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("ignoring token cache {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, ttl, entries }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn get(&self, store: &str, now: DateTime<Utc>) -> Option<&str> {
        let entry = self.entries.get(store)?;
        if entry.expires_at > now {
            Some(entry.token.as_str())
        } else {
            debug!("cached token for '{store}' expired at {}", entry.expires_at);
            None
        }
    }

    /// Record a freshly minted token and persist the cache.
    pub(super) fn put(
        &mut self,
        store: &str,
        token: &str,
        expires_in_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), CliError> {
        let expires_in = expires_in_secs
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let mut lifetime = Duration::seconds((expires_in - EARLY_REFRESH_SECS).max(1));
        if let Some(ttl) = self.ttl {
            lifetime = lifetime.min(ttl);
        }
        self.entries.insert(
            store.to_string(),
            CachedToken {
                token: token.to_string(),
                expires_at: now + lifetime,
            },
        );
        self.save()
    }

    pub(super) fn invalidate(&mut self, store: &str) -> Result<(), CliError> {
        if self.entries.remove(store).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), CliError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                CliError::write(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| CliError::general(format!("cannot serialize token cache: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            CliError::write(format!("cannot write token cache {}: {e}", self.path.display()))
        })?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
    }

    #[test]
    fn token_refreshes_early() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TokenCache::open(dir.path().join("tokens.json"), None);
        cache.put("yuma", "tok", Some(3600), at(0)).unwrap();

        assert_eq!(cache.get("yuma", at(3539)), Some("tok"));
        assert_eq!(cache.get("yuma", at(3540)), None);
        assert_eq!(cache.get("bloomommy", at(0)), None);
    }

    #[test]
    fn ttl_caps_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TokenCache::open(dir.path().join("tokens.json"), Some(Duration::seconds(600)));
        cache.put("yuma", "tok", None, at(0)).unwrap();
        assert_eq!(cache.get("yuma", at(599)), Some("tok"));
        assert_eq!(cache.get("yuma", at(600)), None);
    }

    #[test]
    fn persists_and_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");
        {
            let mut cache = TokenCache::open(path.clone(), None);
            cache.put("cellumove", "abc", Some(86_399), at(0)).unwrap();
        }
        let mut cache = TokenCache::open(path.clone(), None);
        assert_eq!(cache.get("cellumove", at(10)), Some("abc"));

        cache.invalidate("cellumove").unwrap();
        let cache = TokenCache::open(path, None);
        assert_eq!(cache.get("cellumove", at(10)), None);
    }

    #[test]
    fn corrupt_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = TokenCache::open(path, None);
        assert_eq!(cache.get("yuma", at(0)), None);
    }
}
