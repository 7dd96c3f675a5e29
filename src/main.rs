/*!
 * Dir Store - Demo Entry Point
 *
 * Exercises a store rooted at `DIR_STORE_ROOT`:
 * - sync write/read on the calling thread
 * - async writes and reads delivered on a dedicated event loop
 * - async delete of every tracked key
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::Duration;
use tracing::info;

use dir_store::{init_tracing, EventLoop, JsonAdapter, KeyedStore, StoreConfig, StringAdapter};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

fn main() -> Result<()> {
    init_tracing();

    let config = StoreConfig::from_env().context("invalid store configuration")?;
    info!(root = %config.root.display(), policy = %config.writer_policy, "Dir store demo starting");

    let event_loop = EventLoop::spawn("dir-store-main").context("failed to start event loop")?;
    let store = KeyedStore::new(config, event_loop.handle()).context("failed to open store")?;

    // Sync path
    let notes = store.open("notes", StringAdapter)?;
    notes.write(&"first line\nsecond line".to_string())?;
    info!(content = %notes.read()?, "sync round trip");

    // Async path, callbacks land on the event loop thread
    let profile = store.open("profile", JsonAdapter::<Profile>::pretty())?;
    let (tx, rx) = mpsc::channel();

    for visits in 1..=3 {
        let tx = tx.clone();
        profile.write_async(
            Profile {
                name: "demo".into(),
                visits,
            },
            move |result| {
                let _ = tx.send(result.map(|_| format!("write #{visits} done")));
            },
        );
    }
    for _ in 0..3 {
        let message = rx.recv_timeout(CALLBACK_TIMEOUT)??;
        info!(%message, "async write acknowledged");
    }

    let (read_tx, read_rx) = mpsc::channel();
    profile.read_async(move |result| {
        let _ = read_tx.send(result);
    });
    let loaded = read_rx.recv_timeout(CALLBACK_TIMEOUT)??;
    info!(name = %loaded.name, visits = loaded.visits, "async read");

    let stats = store.dispatcher_stats();
    info!(
        writes = stats.write.completed,
        reads = stats.read.completed,
        read_workers = stats.read.live_workers,
        "dispatcher stats"
    );

    // Cleanup
    let (delete_tx, delete_rx) = mpsc::channel();
    store.delete_all_async(move |result| {
        let _ = delete_tx.send(result);
    });
    let removed = delete_rx.recv_timeout(CALLBACK_TIMEOUT)??;
    info!(removed, tracked = store.tracked_keys().len(), "tracked keys deleted");

    store.shutdown();
    event_loop.shutdown();
    info!("Dir store demo finished");
    Ok(())
}
