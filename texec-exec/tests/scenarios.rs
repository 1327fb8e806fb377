use std::fs;
use std::sync::Arc;
use std::thread;

use texec_dag::SessionId;
use texec_store::LocalCache;

/// spec.md §8 scenario 2: two concurrent envelopes referencing the same
/// source path produce exactly one cache file, and the scratch symlink
/// resolves into the Local Cache Directory.
#[test]
fn concurrent_staging_of_the_same_source_materializes_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("shared_input.bin");
    fs::write(&source, b"shared content").unwrap();

    let cache = Arc::new(LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), 1 << 20).unwrap());
    let session = SessionId::new();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let source = source.clone();
            thread::spawn(move || cache.get_local_cache_path(&source, session).unwrap())
        })
        .collect();

    let paths: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let first = &paths[0];
    assert!(paths.iter().all(|p| p == first));
    assert_eq!(fs::read(first).unwrap(), b"shared content");
}
