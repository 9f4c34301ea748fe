//! # Session
//!
//! Binds path resolution, name extraction, the freshness cache and the invoker
//! into the operations a presentation layer needs: `configure`, `load_names`,
//! `run_function`, `reload`, `search` and `view`.
//!
//! ## State
//!
//! The path moves `Unconfigured → Resolving → Ready | Invalid`, the name list
//! `Idle → Loading → Loaded | Failed`. Every `configure` bumps a generation
//! counter; a load that finishes under an older generation is discarded and
//! reported as [`SessionError::Superseded`].
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Extractions are shared per cache key: concurrent loads of the same
//! script join one in-flight extraction instead of starting their own.

use crate::CancellationToken;
use crate::core::cache::{CacheError, FreshnessCache, KeyValueStore};
use crate::core::extractor::{ExtractionError, NameExtractor};
use crate::core::paths::{self, ResolveError};
use crate::models::{
    CacheKeyMode, InvocationOutcome, LoadOrigin, LoadReport, LoadState, PathState,
    ReloadSummary, ScriptLocation, SessionView, Settings, StrategyPreference,
};
use crate::system::invoker::Invoker;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

/// A shared, at-most-once load for one cache key.
type LoadPromise = Arc<OnceCell<Result<LoadReport, ExtractionError>>>;

/// A cache key plus whether the load may be answered from the cache.
type InFlightKey = (String, bool);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Path(#[from] ResolveError),
    #[error("No script is configured. Set 'script_path' or pass --script.")]
    NotConfigured,
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("'{0}' is not a function of the current script.")]
    UnknownFunction(String),
    #[error("The script path changed while this operation was running.")]
    Superseded,
}

#[derive(Debug, Default)]
struct SessionState {
    path: PathState,
    load: LoadState,
    names: Vec<String>,
    generation: u64,
}

/// The state a presentation layer drives. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Session {
    cache: FreshnessCache,
    extractor: NameExtractor,
    invoker: Invoker,
    preference: StrategyPreference,
    key_mode: CacheKeyMode,
    state: Mutex<SessionState>,
    in_flight: Mutex<HashMap<InFlightKey, LoadPromise>>,
    active_invocations: AtomicUsize,
}

impl Session {
    /// Creates an unconfigured session with the default extractor, the `Auto`
    /// strategy preference and modification-time cache keys.
    pub fn new(cache: FreshnessCache, invoker: Invoker) -> Self {
        Self {
            cache,
            extractor: NameExtractor::default(),
            invoker,
            preference: StrategyPreference::default(),
            key_mode: CacheKeyMode::default(),
            state: Mutex::new(SessionState::default()),
            in_flight: Mutex::new(HashMap::new()),
            active_invocations: AtomicUsize::new(0),
        }
    }

    /// Builds a session from user settings over the given store.
    pub fn from_settings(settings: &Settings, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(FreshnessCache::new(store), Invoker::from_settings(settings))
            .with_strategy(settings.strategy)
            .with_key_mode(settings.cache_key)
    }

    pub fn with_extractor(mut self, extractor: NameExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_strategy(mut self, preference: StrategyPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_key_mode(mut self, key_mode: CacheKeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    // --- Operations ---

    /// Points the session at a new script and loads its names.
    ///
    /// On a resolution failure the path becomes `Invalid` with the resolver's
    /// message and the name list is left empty. No interpreter is started.
    pub async fn configure(&self, raw: &str) -> Result<LoadReport, SessionError> {
        self.configure_with(raw, false).await
    }

    /// Like [`Self::configure`], but the initial load skips the cache.
    pub async fn configure_fresh(&self, raw: &str) -> Result<LoadReport, SessionError> {
        self.configure_with(raw, true).await
    }

    async fn configure_with(&self, raw: &str, force_fresh: bool) -> Result<LoadReport, SessionError> {
        self.set_script(raw).await?;
        self.load_names(force_fresh).await
    }

    /// Points the session at a new script without loading its names. The
    /// previous list is dropped.
    pub async fn set_script(&self, raw: &str) -> Result<ScriptLocation, SessionError> {
        let generation = {
            let mut state = self.lock_state();
            state.generation += 1;
            state.path = PathState::Resolving {
                raw: raw.to_string(),
            };
            state.load = LoadState::Idle;
            state.names.clear();
            state.generation
        };
        log::debug!("Configuring script '{}' (generation {})", raw, generation);

        let resolved = paths::resolve(raw).await;

        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return Err(SessionError::Superseded);
            }
            match &resolved {
                Ok(location) => state.path = PathState::Ready(location.clone()),
                Err(e) => {
                    state.path = PathState::Invalid {
                        raw: raw.to_string(),
                        message: e.to_string(),
                    };
                }
            }
        }

        let location = resolved?;
        log::info!("Using script '{}'", display_location(&location));
        Ok(location)
    }

    /// Loads the function names of the configured script.
    ///
    /// Reads the cache first unless `force_fresh` is set. On a miss the script
    /// is extracted, the result stored, and the in-memory list replaced.
    pub async fn load_names(&self, force_fresh: bool) -> Result<LoadReport, SessionError> {
        let (path, generation) = self.begin_load()?;
        let key = self.key_for(&path).await;

        if !force_fresh {
            if let Some(key) = &key {
                if let Some(names) = self.cache.get(key).await {
                    return self.commit(generation, names, LoadOrigin::Cache);
                }
            }
        }

        let report = self.fetch(generation, &path, key.as_deref(), !force_fresh).await?;
        self.commit(generation, report.names, report.origin)
    }

    /// Drops the cached names of the current script and extracts them again.
    pub async fn reload(&self) -> Result<ReloadSummary, SessionError> {
        let (path, generation) = self.begin_load()?;
        let key = self.key_for(&path).await;

        if let Some(key) = &key {
            if let Err(e) = self.cache.remove(key).await {
                log::warn!("Could not remove cache entry '{}': {}", key, e);
            }
        }

        let report = self.fetch(generation, &path, key.as_deref(), false).await?;
        let summary = ReloadSummary {
            count: report.names.len(),
            origin: report.origin,
        };
        self.commit(generation, report.names, report.origin)?;
        Ok(summary)
    }

    /// Runs one function of the current script.
    ///
    /// The name must be in the current list (compared case-insensitively; the
    /// listed spelling is the one invoked). Otherwise, or when no script is
    /// ready, a failed outcome is returned and nothing is spawned. The list
    /// itself is never modified.
    pub async fn run_function(
        &self,
        name: &str,
        cancellation_token: &CancellationToken,
    ) -> InvocationOutcome {
        let target = {
            let state = self.lock_state();
            match &state.path {
                PathState::Ready(location) => match location.resolved.clone() {
                    Some(path) => state
                        .names
                        .iter()
                        .find(|n| n.eq_ignore_ascii_case(name))
                        .cloned()
                        .map(|listed| (path, listed))
                        .ok_or_else(|| SessionError::UnknownFunction(name.to_string())),
                    None => Err(SessionError::NotConfigured),
                },
                _ => Err(SessionError::NotConfigured),
            }
        };

        let (path, listed) = match target {
            Ok(target) => target,
            Err(e) => {
                return InvocationOutcome::failed(name, e.to_string(), String::new(), None, Duration::ZERO);
            }
        };

        self.active_invocations.fetch_add(1, Ordering::SeqCst);
        let _active = scopeguard::guard((), |()| {
            self.active_invocations.fetch_sub(1, Ordering::SeqCst);
        });
        log::info!("Invoking '{}' from '{}'", listed, path.display());
        self.invoker.invoke(&path, &listed, cancellation_token).await
    }

    /// Names containing `query`, ignoring case, in list order. An empty or
    /// blank query returns every name.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        let state = self.lock_state();
        state
            .names
            .iter()
            .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock_state().names.clone()
    }

    /// The resolved script, if the session is ready.
    pub fn location(&self) -> Option<ScriptLocation> {
        match &self.lock_state().path {
            PathState::Ready(location) => Some(location.clone()),
            _ => None,
        }
    }

    pub fn view(&self) -> SessionView {
        let state = self.lock_state();
        SessionView {
            path: state.path.clone(),
            load: state.load.clone(),
            names: state.names.clone(),
            active_invocations: self.active_invocations.load(Ordering::SeqCst),
        }
    }

    /// The cache key of the current script.
    pub async fn cache_key(&self) -> Result<String, SessionError> {
        let path = self
            .location()
            .and_then(|l| l.resolved)
            .ok_or(SessionError::NotConfigured)?;
        Ok(self.cache.compute_key(&path, self.key_mode).await?)
    }

    // --- Internals ---

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the list as loading and returns what the load works on.
    fn begin_load(&self) -> Result<(PathBuf, u64), SessionError> {
        let mut state = self.lock_state();
        let path = match &state.path {
            PathState::Ready(location) => location.resolved.clone(),
            _ => None,
        }
        .ok_or(SessionError::NotConfigured)?;
        state.load = LoadState::Loading;
        Ok((path, state.generation))
    }

    /// A key that cannot be computed only disables caching for this load.
    async fn key_for(&self, path: &Path) -> Option<String> {
        match self.cache.compute_key(path, self.key_mode).await {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("Cache disabled for '{}': {}", path.display(), e);
                None
            }
        }
    }

    async fn fetch(
        &self,
        generation: u64,
        path: &Path,
        key: Option<&str>,
        reuse_cache: bool,
    ) -> Result<LoadReport, SessionError> {
        let result = match key {
            Some(key) => self.extract_shared(key, path, reuse_cache).await,
            None => self
                .extractor
                .extract(path, self.preference)
                .await
                .map(|extracted| LoadReport {
                    names: extracted.names,
                    origin: LoadOrigin::Extracted(extracted.strategy),
                }),
        };

        result.map_err(|e| {
            let mut state = self.lock_state();
            if state.generation == generation {
                state.load = LoadState::Failed {
                    message: e.to_string(),
                };
                state.names.clear();
            }
            SessionError::Extraction(e)
        })
    }

    /// Extracts `path` at most once per key at a time. The first caller runs
    /// the extraction and stores the result; later callers await the same
    /// promise. The promise leaves the in-flight map when the leader finishes.
    ///
    /// With `reuse_cache`, the leader reads the cache again first: an earlier
    /// leader may have stored the names after this caller missed.
    async fn extract_shared(
        &self,
        key: &str,
        path: &Path,
        reuse_cache: bool,
    ) -> Result<LoadReport, ExtractionError> {
        let slot: InFlightKey = (key.to_string(), reuse_cache);
        let promise = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                in_flight
                    .entry(slot.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let leader_promise = Arc::clone(&promise);
        promise
            .get_or_init(|| async move {
                let _cleanup = scopeguard::guard(leader_promise, |leader| {
                    let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                    if in_flight.get(&slot).is_some_and(|p| Arc::ptr_eq(p, &leader)) {
                        in_flight.remove(&slot);
                    }
                });

                if reuse_cache {
                    if let Some(names) = self.cache.get(key).await {
                        log::debug!("'{}' was stored while waiting to extract", key);
                        return Ok(LoadReport {
                            names,
                            origin: LoadOrigin::Cache,
                        });
                    }
                }

                let result = self
                    .extractor
                    .extract(path, self.preference)
                    .await
                    .map(|extracted| LoadReport {
                        names: extracted.names,
                        origin: LoadOrigin::Extracted(extracted.strategy),
                    });
                if let Ok(report) = &result {
                    if let Err(e) = self.cache.set(key, &report.names).await {
                        log::warn!("Could not store names for '{}': {}", key, e);
                    }
                }
                result
            })
            .await
            .clone()
    }

    fn commit(
        &self,
        generation: u64,
        names: Vec<String>,
        origin: LoadOrigin,
    ) -> Result<LoadReport, SessionError> {
        let mut state = self.lock_state();
        if state.generation != generation {
            log::debug!("Discarding names loaded for generation {}", generation);
            return Err(SessionError::Superseded);
        }
        state.names = names.clone();
        state.load = LoadState::Loaded;
        log::debug!("Loaded {} function(s) from the {}", names.len(), origin);
        Ok(LoadReport { names, origin })
    }
}

fn display_location(location: &ScriptLocation) -> String {
    location
        .path()
        .map_or_else(|| location.raw.clone(), |p| p.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::MemoryStore;
    use crate::core::extractor::{NameSource, SourceError, TextualSource};
    use crate::models::{ExtractionStrategy, InvocationStatus};
    use std::fs;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct CountingSource(Arc<AtomicUsize>);

    impl NameSource for CountingSource {
        fn strategy(&self) -> ExtractionStrategy {
            ExtractionStrategy::Textual
        }

        fn extract(&self, source: &str) -> Result<Vec<String>, SourceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            TextualSource.extract(source)
        }
    }

    fn counting_session(calls: &Arc<AtomicUsize>) -> Session {
        session().with_extractor(NameExtractor::new(vec![Box::new(CountingSource(
            Arc::clone(calls),
        ))]))
    }

    fn session() -> Session {
        Session::new(
            FreshnessCache::new(Arc::new(MemoryStore::new())),
            Invoker::new("/nonexistent/psfunc-interpreter", vec![]),
        )
    }

    fn script(dir: &TempDir, content: &str) -> String {
        script_named(dir, "profile.ps1", content)
    }

    fn script_named(dir: &TempDir, file_name: &str, content: &str) -> String {
        let path = dir.path().join(file_name);
        fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    #[tokio::test]
    async fn test_fresh_session_is_unconfigured() {
        let session = session();

        let view = session.view();
        assert_eq!(view.path, PathState::Unconfigured);
        assert_eq!(view.load, LoadState::Idle);
        assert!(view.names.is_empty());
        assert!(matches!(
            session.load_names(false).await,
            Err(SessionError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_configure_loads_names() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let raw = script(&dir, "function Get-A { }\nfunction Set-B($x) { }\nfunction Get-C() { }\n");
        let session = session();

        // --- Execute ---
        let report = session.configure(&raw).await.unwrap();

        // --- Assert ---
        assert_eq!(report.names, vec!["Get-A", "Get-C"]);
        assert_eq!(report.origin, LoadOrigin::Extracted(ExtractionStrategy::Structural));
        let view = session.view();
        assert!(matches!(view.path, PathState::Ready(_)));
        assert_eq!(view.load, LoadState::Loaded);
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_invalid_path_keeps_message_and_clears_names() {
        let dir = tempfile::tempdir().unwrap();
        let session = session();
        session.configure(&script(&dir, "function Get-A { }")).await.unwrap();

        let missing = dir.path().join("missing.ps1").display().to_string();
        let err = session.configure(&missing).await.unwrap_err();

        let view = session.view();
        assert!(session.names().is_empty());
        assert_eq!(view.last_error(), Some(err.to_string().as_str()));
        assert!(matches!(view.path, PathState::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_search_filters_case_insensitively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let session = session();
        session
            .configure(&script(
                &dir,
                "function Get-Status { }\nfunction Restart-App { }\nfunction get-stats { }\n",
            ))
            .await
            .unwrap();

        assert_eq!(session.search("STAT"), vec!["Get-Status", "get-stats"]);
        assert_eq!(session.search(""), session.names());
        assert!(session.search("nothing").is_empty());
    }

    #[tokio::test]
    async fn test_run_requires_a_listed_name() {
        let dir = tempfile::tempdir().unwrap();
        let session = session();

        let unconfigured = session.run_function("Get-A", &token()).await;
        assert_eq!(unconfigured.status, InvocationStatus::Failed);

        session.configure(&script(&dir, "function Get-A { }")).await.unwrap();
        let unknown = session.run_function("Remove-Everything", &token()).await;

        assert_eq!(unknown.status, InvocationStatus::Failed);
        assert!(unknown.error.unwrap().contains("not a function of the current script"));
        assert_eq!(session.view().active_invocations, 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_sets_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let raw = script(&dir, "function Broken { 'x }");
        let session = session().with_strategy(StrategyPreference::Structural);

        let err = session.configure(&raw).await.unwrap_err();

        assert!(matches!(err, SessionError::Extraction(_)));
        assert!(matches!(session.view().load, LoadState::Failed { .. }));
        assert!(session.view().last_error().is_some());
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let session = session();
        session.configure(&script(&dir, "function Get-A { }")).await.unwrap();
        let (_, old_generation) = session.begin_load().unwrap();

        session
            .configure(&script_named(&dir, "other.ps1", "function Get-B { }"))
            .await
            .unwrap();
        let stale = session.commit(old_generation, vec!["Get-A".into()], LoadOrigin::Cache);

        assert!(matches!(stale, Err(SessionError::Superseded)));
        assert_eq!(session.names(), vec!["Get-B"]);
    }

    #[tokio::test]
    async fn test_set_script_resolves_without_extracting() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&calls);

        // --- Execute ---
        let location = session.set_script(&script(&dir, "function Get-A { }")).await.unwrap();
        let before_reload = calls.load(Ordering::SeqCst);
        let summary = session.reload().await.unwrap();

        // --- Assert ---
        assert!(location.resolved.is_some());
        assert_eq!(before_reload, 0);
        assert_eq!(summary.count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.names(), vec!["Get-A"]);
    }

    #[tokio::test]
    async fn test_late_loader_reuses_names_stored_by_the_previous_leader() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&calls);
        session.configure(&script(&dir, "function Get-A { }")).await.unwrap();
        let key = session.cache_key().await.unwrap();
        let path = session.location().unwrap().resolved.unwrap();

        // --- Execute ---
        // A caller that missed the cache just before the previous leader stored
        // its result, and one that asked for a fresh parse.
        let late = session.extract_shared(&key, &path, true).await.unwrap();
        let fresh = session.extract_shared(&key, &path, false).await.unwrap();

        // --- Assert ---
        assert_eq!(late.origin, LoadOrigin::Cache);
        assert_eq!(late.names, vec!["Get-A"]);
        assert_eq!(fresh.origin, LoadOrigin::Extracted(ExtractionStrategy::Textual));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
