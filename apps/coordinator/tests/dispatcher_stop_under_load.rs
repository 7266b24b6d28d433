//! Exercises the Dispatcher's parallel mode against a sizeable pending
//! queue: once a worker reports a hit, the stop broadcaster should latch
//! and only a small number of already-in-flight batches should still
//! complete afterward, leaving most of the queue untouched.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use xiebo_coordinator::dispatcher::{Dispatcher, ExecutionMode};
use xiebo_coordinator::stop::StopBroadcaster;
use xiebo_coordinator::worker::WorkerRunner;
use xiebo_domain_models::Batch;
use xiebo_infra_store::{BackingStore, SqlBackingStore};
use xiebo_shared_presenter::Presenter;

const TOTAL_BATCHES: u64 = 300;

/// Writes a stand-in `xiebo` binary that always exits 0 and, on GPU 1's
/// 7th invocation, prints a hit line the parser recognizes. Invocation
/// counts are tracked in per-GPU files under `counter_dir`, baked into the
/// script at generation time since the runner doesn't let tests set a
/// child's environment.
fn write_fake_worker(dir: &std::path::Path, counter_dir: &std::path::Path) -> std::path::PathBuf {
    fs::create_dir_all(counter_dir).unwrap();
    let script_path = dir.join("fake_xiebo.sh");
    let script = format!(
        r#"#!/bin/sh
gpu="$2"
counter_file="{counter_dir}/gpu_${{gpu}}.count"
count=0
[ -f "$counter_file" ] && count=$(cat "$counter_file")
count=$((count + 1))
echo "$count" > "$counter_file"
if [ "$gpu" = "1" ] && [ "$count" = "7" ]; then
    echo "Range Finished! Time: 00:00:01 Found: 1"
    echo "Priv (HEX): deadbeefcafebabe"
    echo "Priv (WIF): K0000000000000000000000000000000000000000000000000000000"
else
    echo "Range Finished! Time: 00:00:01 Found: 0"
fi
exit 0
"#,
        counter_dir = counter_dir.display()
    );
    fs::write(&script_path, script).unwrap();
    let mut perms = fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script_path, perms).unwrap();
    script_path
}

#[tokio::test]
async fn stop_latches_after_a_hit_and_most_batches_stay_pending() {
    let dir = tempfile::tempdir().unwrap();
    let counter_dir = dir.path().join("counters");
    let worker_path = write_fake_worker(dir.path(), &counter_dir);

    // `:memory:` cannot be used here: `SqlBackingStore` opens a fresh
    // connection per call, and libsql's in-memory backend hands out an
    // unrelated empty database to every new connection. A temp file gives
    // each call the same on-disk database, matching what real (file/remote)
    // deployments see.
    let db_path = dir.path().join("test.db");
    let sql = SqlBackingStore::connect(db_path.to_str().unwrap(), None).await.unwrap();
    for id in 0..TOTAL_BATCHES {
        sql.insert_pending(&Batch::new_pending(id, format!("{:x}", id * 4), format!("{:x}", id * 4 + 3)))
            .await
            .unwrap();
    }
    let store = Arc::new(BackingStore::Sql(sql));

    let runner = WorkerRunner::new(worker_path.to_string_lossy().to_string());
    let stop = StopBroadcaster::new();
    let presenter = Arc::new(Presenter::unbounded());
    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        runner,
        vec![0, 1, 2],
        "1PlaceholderAddress".to_string(),
        TOTAL_BATCHES,
        Duration::from_millis(1),
        Duration::from_secs(30),
    );

    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        dispatcher.run(ExecutionMode::Parallel, &stop, &presenter),
    )
    .await
    .expect("dispatcher should wind down shortly after the hit")
    .unwrap();

    assert!(summary.found_yes >= 1, "expected at least one reported hit");
    assert!(stop.is_set(), "a hit must latch the stop broadcaster");

    let remaining = store.fetch_pending(0, TOTAL_BATCHES).await.unwrap();
    assert!(
        !remaining.is_empty(),
        "a 300-batch queue should not drain completely after an early hit"
    );
    assert!(
        summary.launched < TOTAL_BATCHES,
        "dispatch should stop well short of exhausting the queue"
    );
}
