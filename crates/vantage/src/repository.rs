//! TTL caching in front of a slow repository connector.

use std::collections::BTreeSet;
use vantage_core::{
    error::Result, to_millis, traits::Repository, CacheConfig, State, Timestamp, TtlCache,
    ViewBundle,
};

type ProfileKey = (String, i64);
type BundleKey = (String, String, i64);

/// Wraps a repository with short-lived caches keyed by (pid, date).
///
/// Answers are as-of a date, so an entry never goes wrong; the TTL only
/// bounds memory and how long a content model's redefinition can hide
/// behind a cached answer. [`Repository::invalidate`] drops everything
/// cached about a pid and forwards to the wrapped repository.
pub struct CachingRepository<R> {
    inner: R,
    entry_angles: TtlCache<ProfileKey, BTreeSet<String>>,
    collections: TtlCache<ProfileKey, BTreeSet<String>>,
    content_models: TtlCache<ProfileKey, bool>,
    states: TtlCache<ProfileKey, State>,
    bundles: TtlCache<BundleKey, ViewBundle>,
}

impl<R: Repository> CachingRepository<R> {
    pub fn new(inner: R, config: &CacheConfig) -> Self {
        let profile_ttl = config.profile_ttl();
        let max = config.max_entries;
        Self {
            inner,
            entry_angles: TtlCache::new("entry_angles", profile_ttl, max),
            collections: TtlCache::new("collections", profile_ttl, max),
            content_models: TtlCache::new("content_models", profile_ttl, max),
            states: TtlCache::new("states", profile_ttl, max),
            bundles: TtlCache::new("view_bundles", config.bundle_ttl(), max),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Drop every cached answer.
    pub fn clear(&self) {
        self.entry_angles.clear();
        self.collections.clear();
        self.content_models.clear();
        self.states.clear();
        self.bundles.clear();
    }
}

fn profile_key(pid: &str, at: Timestamp) -> ProfileKey {
    (pid.to_string(), to_millis(at))
}

impl<R: Repository> Repository for CachingRepository<R> {
    fn entry_angles(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>> {
        self.entry_angles
            .get_or_try_insert(profile_key(pid, at), || self.inner.entry_angles(pid, at))
    }

    fn collections(&self, pid: &str, at: Timestamp) -> Result<BTreeSet<String>> {
        self.collections
            .get_or_try_insert(profile_key(pid, at), || self.inner.collections(pid, at))
    }

    fn calc_view_bundle(
        &self,
        entry_pid: &str,
        view_angle: &str,
        at: Timestamp,
    ) -> Result<ViewBundle> {
        let key = (entry_pid.to_string(), view_angle.to_string(), to_millis(at));
        self.bundles.get_or_try_insert(key, || {
            self.inner.calc_view_bundle(entry_pid, view_angle, at)
        })
    }

    fn is_content_model(&self, pid: &str, at: Timestamp) -> Result<bool> {
        self.content_models
            .get_or_try_insert(profile_key(pid, at), || self.inner.is_content_model(pid, at))
    }

    fn objects_of_content_model(&self, cm_pid: &str) -> Result<BTreeSet<String>> {
        // not dated, so never cached
        self.inner.objects_of_content_model(cm_pid)
    }

    fn state(&self, pid: &str, at: Timestamp) -> Result<State> {
        self.states
            .get_or_try_insert(profile_key(pid, at), || self.inner.state(pid, at))
    }

    fn invalidate(&self, pid: &str) {
        tracing::debug!(pid, "Invalidating cached repository answers");
        self.entry_angles.retain(|(p, _)| p != pid);
        self.collections.retain(|(p, _)| p != pid);
        self.content_models.retain(|(p, _)| p != pid);
        self.states.retain(|(p, _)| p != pid);
        self.bundles.retain(|(entry, _, _)| entry != pid);
        self.inner.invalidate(pid);
    }
}
