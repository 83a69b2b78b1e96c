//! # DEEPFIELD Explorer
//!
//! Headless explorer: loads a config, opens the map, mines until told to
//! stop, and flushes everything on the way out.
//!
//! ```bash
//! # Mine 500 chunks around the origin with the default config
//! ./explorer --chunks 500
//!
//! # Use a config file, import a shared map first, export when done
//! RUST_LOG=deepfield=debug ./explorer explorer.toml --import map.json --export out.json
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deepfield_cache::{shared, ChunkStore, LogStore, MemoryStore, SharedStore, SpatialChunkCache};
use deepfield_miner::{ExplorerConfig, Miner, MinerEvent, SharedCache, StoreKind};
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Command line options.
#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    chunks: Option<u64>,
    seconds: Option<u64>,
    import: Option<PathBuf>,
    export: Option<PathBuf>,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--chunks" => {
                let raw = value("--chunks")?;
                options.chunks = Some(raw.parse().map_err(|_| format!("bad --chunks {raw}"))?);
            }
            "--seconds" => {
                let raw = value("--seconds")?;
                options.seconds = Some(raw.parse().map_err(|_| format!("bad --seconds {raw}"))?);
            }
            "--import" => options.import = Some(PathBuf::from(value("--import")?)),
            "--export" => options.export = Some(PathBuf::from(value("--export")?)),
            other if other.starts_with("--") => return Err(format!("unknown flag {other}")),
            path => options.config = Some(PathBuf::from(path)),
        }
    }
    Ok(options)
}

fn open_store(config: &ExplorerConfig) -> Result<SharedStore, String> {
    match config.store.kind {
        StoreKind::Memory => Ok(shared(MemoryStore::new())),
        StoreKind::Log => {
            let mut log = LogStore::open(&config.store.path).map_err(|e| e.to_string())?;
            let replay = log.replay_report();
            if replay.dropped_bytes > 0 {
                warn!(dropped = replay.dropped_bytes, "log had a torn tail");
            }
            if config.store.compact_on_open {
                log.compact().map_err(|e| e.to_string())?;
            }
            info!(path = %config.store.path.display(), records = log.len(), "store opened");
            Ok(shared(log))
        }
    }
}

fn fatal(what: &str, err: impl std::fmt::Display) -> ! {
    error!(%err, "{what}");
    eprintln!("   ✗ FATAL: {what}: {err}");
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    DEEPFIELD EXPLORER v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");

    // === CONFIG ===
    let options = parse_args().unwrap_or_else(|e| fatal("bad arguments", e));
    let config = match &options.config {
        Some(path) => ExplorerConfig::load(path),
        None => Ok(ExplorerConfig::default()),
    }
    .unwrap_or_else(|e| fatal("bad config", e));

    // === MAP ===
    let store = open_store(&config).unwrap_or_else(|e| fatal("cannot open store", e));
    let mut cache = SpatialChunkCache::open(config.world.geometry, store, config.flush)
        .unwrap_or_else(|e| fatal("cannot load map", e));
    if let Some(path) = &options.import {
        let json = std::fs::read_to_string(path).unwrap_or_else(|e| fatal("cannot read import", e));
        let report = cache
            .import_json(&json)
            .unwrap_or_else(|e| fatal("cannot import map", e));
        println!(
            "   ✓ Imported {} chunks ({} known, {} invalid)",
            report.imported, report.duplicates, report.invalid
        );
    }
    println!("   ✓ Map: {} chunks, {} planets", cache.len(), cache.location_count());
    let cache: SharedCache = Arc::new(Mutex::new(cache));

    // === MINER ===
    let pattern = config.miner.pattern.build(config.world.geometry.min_side);
    println!("   ✓ Pattern: {}", pattern.describe());
    let mut miner = Miner::spawn(&config.world, &config.miner, Arc::clone(&cache), pattern)
        .unwrap_or_else(|e| fatal("cannot start miner", e));
    let events = miner.events();
    miner
        .start_exploring()
        .unwrap_or_else(|e| fatal("cannot start exploring", e));

    // === MAIN LOOP ===
    let started = Instant::now();
    let deadline = options.seconds.map(|s| started + Duration::from_secs(s));
    let mut discovered = 0u64;
    let mut planets = 0usize;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("time limit reached");
            break;
        }
        match events.recv_timeout(Duration::from_millis(250)) {
            Some(MinerEvent::ChunkDiscovered { chunk, elapsed_ms, .. }) => {
                discovered += 1;
                planets += chunk.locations.len();
                info!(
                    x = chunk.footprint.bottom_left.x,
                    y = chunk.footprint.bottom_left.y,
                    planets = chunk.locations.len(),
                    elapsed_ms,
                    "chunk mined"
                );
                if options.chunks.is_some_and(|limit| discovered >= limit) {
                    info!(discovered, "chunk limit reached");
                    break;
                }
            }
            Some(MinerEvent::ChunkDropped { footprint, reason }) => {
                warn!(x = footprint.bottom_left.x, y = footprint.bottom_left.y, %reason, "chunk dropped");
            }
            Some(MinerEvent::Exhausted { job }) => {
                info!(job, "nothing left to mine in bounds");
                break;
            }
            Some(MinerEvent::StateChanged(status)) => info!(?status, "miner state changed"),
            None => {}
        }
    }

    // === SHUTDOWN ===
    let stats = miner.stats();
    miner.shutdown();
    let cache = cache.lock();
    if let Err(err) = cache.flush_now() {
        error!(%err, "final flush failed");
    }
    if let Some(path) = &options.export {
        match cache.export_json() {
            Ok(json) => {
                if let Err(err) = std::fs::write(path, json) {
                    error!(%err, path = %path.display(), "export failed");
                }
            }
            Err(err) => error!(%err, "export failed"),
        }
    }

    println!();
    println!("   Chunks mined:  {discovered}");
    println!("   Planets found: {planets}");
    println!("   Hash rate:     {:.0} H/s", stats.hash_rate);
    println!("   Map size:      {} chunks", cache.len());
    println!("   Runtime:       {:.1}s", started.elapsed().as_secs_f64());
}
