// tests/session.rs

use psfunc::core::cache::{FileStore, FreshnessCache, KeyValueStore, MemoryStore};
use psfunc::core::extractor::{NameExtractor, NameSource, SourceError, TextualSource};
use psfunc::core::session::{Session, SessionError};
use psfunc::models::{
    CacheKeyMode, ExtractionStrategy, InvocationStatus, LoadOrigin, LoadState, PathState,
};
use psfunc::system::invoker::Invoker;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const PROFILE: &str = r#"
function Get-Status {
    Write-Output "OK"
}

function Set-Value($x) {
    $script:value = $x
}
"#;

fn write_script(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn raw(path: &Path) -> String {
    path.display().to_string()
}

fn unused_invoker() -> Invoker {
    Invoker::new("/nonexistent/psfunc-interpreter", vec![])
}

fn memory_session(store: Arc<MemoryStore>) -> Session {
    Session::new(FreshnessCache::new(store), unused_invoker())
}

fn token() -> psfunc::CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Counts extractions and holds each one open long enough for others to pile up.
#[derive(Debug)]
struct SlowCountingSource {
    calls: Arc<AtomicUsize>,
}

impl NameSource for SlowCountingSource {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Textual
    }

    fn extract(&self, source: &str) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        TextualSource.extract(source)
    }
}

// --- Scenario A ---

#[tokio::test]
async fn test_only_zero_argument_functions_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let session = memory_session(Arc::new(MemoryStore::new()));

    let report = session.configure(&raw(&script)).await.unwrap();

    assert_eq!(report.names, vec!["Get-Status"]);
    assert_eq!(session.names(), vec!["Get-Status"]);
}

// --- Scenario D ---

#[tokio::test]
async fn test_empty_path_is_invalid_and_spawns_nothing() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let invoker = Invoker::new(
        "sh",
        vec!["-c".into(), format!("touch '{}'", marker.display()), "psfunc-test".into()],
    );
    let session = Session::new(FreshnessCache::new(Arc::new(MemoryStore::new())), invoker);

    // --- Execute ---
    let result = session.configure("   ").await;
    let outcome = session.run_function("Get-Status", &token()).await;

    // --- Assert ---
    assert!(matches!(result, Err(SessionError::Path(_))));
    let view = session.view();
    assert!(matches!(
        &view.path,
        PathState::Invalid { message, .. } if message.contains("No script path is configured")
    ));
    assert!(view.names.is_empty());
    assert_eq!(outcome.status, InvocationStatus::Failed);
    assert!(!marker.exists());
}

// --- Scenarios B and C ---

#[cfg(unix)]
#[tokio::test]
async fn test_run_function_through_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "profile.ps1",
        "function Get-Ok { 'OK' }\nfunction Warn-Only { Write-Error 'careful' }\n",
    );
    let fake = r#"
case "$1" in
  *Get-Ok) printf 'OK\n' ;;
  *Warn-Only) printf 'careful\n' >&2 ;;
esac
"#;
    let invoker = Invoker::new("sh", vec!["-c".into(), fake.into(), "psfunc-test".into()]);
    let session = Session::new(FreshnessCache::new(Arc::new(MemoryStore::new())), invoker);
    session.configure(&raw(&script)).await.unwrap();

    let ok = session.run_function("get-ok", &token()).await;
    let warn = session.run_function("Warn-Only", &token()).await;

    assert_eq!(ok.status, InvocationStatus::Succeeded);
    assert_eq!(ok.function_name, "Get-Ok");
    assert_eq!(ok.stdout, "OK");
    assert_eq!(warn.status, InvocationStatus::Failed);
    assert_eq!(warn.error.as_deref(), Some("careful"));
    assert_eq!(session.names(), vec!["Get-Ok", "Warn-Only"]);
    assert_eq!(session.view().active_invocations, 0);
}

// --- Caching ---

#[tokio::test]
async fn test_second_load_is_a_cache_hit_with_identical_names() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let store = Arc::new(MemoryStore::new());
    let session = memory_session(store.clone());

    let first = session.configure(&raw(&script)).await.unwrap();
    let second = session.load_names(false).await.unwrap();

    assert_eq!(first.origin, LoadOrigin::Extracted(ExtractionStrategy::Structural));
    assert_eq!(second.origin, LoadOrigin::Cache);
    assert_eq!(first.names, second.names);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_cache_survives_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);

    let first = Session::new(
        FreshnessCache::new(Arc::new(FileStore::open(cache_dir.path()).unwrap())),
        unused_invoker(),
    );
    first.configure(&raw(&script)).await.unwrap();

    let second = Session::new(
        FreshnessCache::new(Arc::new(FileStore::open(cache_dir.path()).unwrap())),
        unused_invoker(),
    );
    let report = second.configure(&raw(&script)).await.unwrap();

    assert_eq!(report.origin, LoadOrigin::Cache);
    assert_eq!(report.names, vec!["Get-Status"]);
}

#[tokio::test]
async fn test_editing_the_script_forces_a_fresh_extraction() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let session = memory_session(Arc::new(MemoryStore::new()));
    session.configure(&raw(&script)).await.unwrap();

    // --- Execute ---
    fs::write(&script, "function Get-Status { }\nfunction Clear-Logs { }\n").unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&script)
        .unwrap()
        .set_modified(later)
        .unwrap();
    let report = session.load_names(false).await.unwrap();

    // --- Assert ---
    assert_eq!(report.origin, LoadOrigin::Extracted(ExtractionStrategy::Structural));
    assert_eq!(report.names, vec!["Get-Status", "Clear-Logs"]);
}

#[tokio::test]
async fn test_fixed_keys_need_an_explicit_reload() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let session =
        memory_session(Arc::new(MemoryStore::new())).with_key_mode(CacheKeyMode::Fixed);
    session.configure(&raw(&script)).await.unwrap();

    fs::write(&script, "function Get-Status { }\nfunction Clear-Logs { }\n").unwrap();
    let stale = session.load_names(false).await.unwrap();
    let summary = session.reload().await.unwrap();

    assert_eq!(stale.origin, LoadOrigin::Cache);
    assert_eq!(stale.names, vec!["Get-Status"]);
    assert_eq!(summary.count, 2);
    assert_eq!(summary.origin, LoadOrigin::Extracted(ExtractionStrategy::Structural));
    assert_eq!(session.names(), vec!["Get-Status", "Clear-Logs"]);
    assert_eq!(session.load_names(false).await.unwrap().origin, LoadOrigin::Cache);
}

#[tokio::test]
async fn test_reload_replaces_the_stored_entry() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let store = Arc::new(MemoryStore::new());
    let session = memory_session(store.clone());
    session.configure(&raw(&script)).await.unwrap();
    let key = session.cache_key().await.unwrap();

    let summary = session.reload().await.unwrap();

    assert_eq!(summary.count, 1);
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("[\"Get-Status\"]"));
    assert_eq!(session.view().load, LoadState::Loaded);
}

// --- Concurrency ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_share_one_extraction() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "profile.ps1", PROFILE);
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = NameExtractor::new(vec![Box::new(SlowCountingSource {
        calls: calls.clone(),
    })]);
    let session = Arc::new(memory_session(Arc::new(MemoryStore::new())).with_extractor(extractor));
    session.configure(&raw(&script)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // --- Execute ---
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.load_names(true).await })
        })
        .collect();
    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.unwrap().unwrap());
    }

    // --- Assert ---
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    for report in reports {
        assert_eq!(report.names, vec!["Get-Status"]);
        assert_eq!(report.origin, LoadOrigin::Extracted(ExtractionStrategy::Textual));
    }
}

#[tokio::test]
async fn test_reconfiguring_drops_the_old_list() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_script(&dir, "first.ps1", "function From-First { }");
    let second = write_script(&dir, "second.ps1", "function From-Second { }");
    let session = memory_session(Arc::new(MemoryStore::new()));

    session.configure(&raw(&first)).await.unwrap();
    session.configure(&raw(&second)).await.unwrap();

    assert_eq!(session.names(), vec!["From-Second"]);
    assert!(session.search("first").is_empty());
    let location = session.location().unwrap();
    assert_eq!(
        location.path().unwrap(),
        dunce::canonicalize(&second).unwrap()
    );
}
