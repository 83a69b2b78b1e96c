//! End-to-end runs of the threaded miner against real lanes.
//!
//! Run with: cargo test --package deepfield_miner --test miner_test

use std::sync::Arc;
use std::time::Duration;

use deepfield_cache::SpatialChunkCache;
use deepfield_miner::{
    EventReceiver, Miner, MinerConfig, MinerError, MinerEvent, MinerStatus, MiningPattern,
    SharedCache, SpiralPattern,
};
use deepfield_oracle::Oracle;
use deepfield_shared::{
    Chunk, ChunkGeometry, Coordinate, Footprint, HashMode, PlanetRarity, WorldConfig,
};
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(20);

fn world(hash_mode: HashMode, world_radius: u64) -> WorldConfig {
    WorldConfig {
        rarity: PlanetRarity::new(16).unwrap(),
        hash_mode,
        geometry: ChunkGeometry::new(16, 1024),
        world_radius,
        ..WorldConfig::default()
    }
}

fn cache(world: &WorldConfig) -> SharedCache {
    Arc::new(Mutex::new(SpatialChunkCache::new(world.geometry)))
}

fn spiral() -> SpiralPattern {
    SpiralPattern::new(Coordinate::new(0, 0), 16)
}

fn walk(pattern: &dyn MiningPattern, steps: usize) -> Vec<Footprint> {
    let mut out = Vec::with_capacity(steps);
    let mut current = pattern.start();
    for _ in 0..steps {
        out.push(current);
        current = pattern.next(&current);
    }
    out
}

fn next_chunk(events: &EventReceiver) -> Chunk {
    loop {
        match events.recv_timeout(WAIT) {
            Some(MinerEvent::ChunkDiscovered { chunk, .. }) => return chunk,
            Some(_) => {}
            None => panic!("no chunk within {WAIT:?}"),
        }
    }
}

fn wait_for(events: &EventReceiver, wanted: &MinerEvent) -> Vec<MinerEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events.recv_timeout(WAIT).expect("event expected");
        let done = event == *wanted;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[test]
fn test_fake_mode_mines_spiral_in_order() {
    let world = world(HashMode::Fake, 8192);
    let cache = cache(&world);
    let settings = MinerConfig {
        lanes: Some(4),
        ..MinerConfig::default()
    };
    let mut miner = Miner::spawn(&world, &settings, Arc::clone(&cache), Box::new(spiral())).unwrap();
    let events = miner.events();
    miner.start_exploring().unwrap();
    assert!(miner.is_exploring());

    let oracle = Oracle::new(&world);
    for expected in walk(&spiral(), 12) {
        let chunk = next_chunk(&events);
        assert_eq!(chunk.footprint, expected);
        assert_eq!(chunk.locations, oracle.mine_footprint(&expected));
        assert!(cache.lock().has_mined(&expected));
    }

    miner.stop_exploring().unwrap();
    assert!(!miner.is_exploring());
    miner.shutdown();
    let stats = miner.stats();
    assert!(stats.chunks_completed >= 12);
    assert_eq!(stats.status, MinerStatus::Idle);
    assert!(stats.hashes >= 12 * 256);
}

#[test]
fn test_lanes_agree_with_single_thread() {
    let world = world(HashMode::Keccak, 8192);
    let settings = MinerConfig {
        lanes: Some(3),
        ..MinerConfig::default()
    };
    let mut miner = Miner::spawn(&world, &settings, cache(&world), Box::new(spiral())).unwrap();
    let events = miner.events();
    miner.start_exploring().unwrap();

    let oracle = Oracle::new(&world);
    for expected in walk(&spiral(), 4) {
        let chunk = next_chunk(&events);
        assert_eq!(chunk.footprint, expected);
        assert_eq!(chunk.locations, oracle.mine_footprint(&expected));
    }
    miner.shutdown();
}

#[test]
fn test_nothing_discovered_after_stop() {
    let world = world(HashMode::Fake, 8192);
    let mut miner = Miner::spawn(
        &world,
        &MinerConfig::default(),
        cache(&world),
        Box::new(spiral()),
    )
    .unwrap();
    let events = miner.events();
    miner.start_exploring().unwrap();
    next_chunk(&events);

    miner.stop_exploring().unwrap();
    wait_for(&events, &MinerEvent::StateChanged(MinerStatus::Idle));
    std::thread::sleep(Duration::from_millis(200));
    assert!(events
        .drain()
        .iter()
        .all(|e| !matches!(e, MinerEvent::ChunkDiscovered { .. })));
    miner.shutdown();
}

#[test]
fn test_small_world_exhausts() {
    let world = world(HashMode::Fake, 40);
    let settings = MinerConfig {
        max_seek_candidates: 2000,
        ..MinerConfig::default()
    };
    let cache = cache(&world);
    let mut miner = Miner::spawn(&world, &settings, Arc::clone(&cache), Box::new(spiral())).unwrap();
    let events = miner.events();
    miner.start_exploring().unwrap();

    let seen = wait_for(&events, &MinerEvent::StateChanged(MinerStatus::Idle));
    assert!(seen.iter().any(|e| matches!(e, MinerEvent::Exhausted { .. })));
    assert!(!miner.is_exploring());

    // Every chunk touching the disk was mined.
    let cache = cache.lock();
    for footprint in walk(&spiral(), 100) {
        let (cx, cy) = footprint.center();
        if cx.hypot(cy) - footprint.half_diagonal() < 40.0 {
            assert!(cache.has_mined(&footprint), "{footprint:?} missed");
        }
    }
    drop(cache);
    miner.shutdown();
}

#[test]
fn test_pattern_change_while_running() {
    let world = world(HashMode::Fake, 8192);
    let mut miner = Miner::spawn(
        &world,
        &MinerConfig::default(),
        cache(&world),
        Box::new(spiral()),
    )
    .unwrap();
    let events = miner.events();
    miner.start_exploring().unwrap();
    next_chunk(&events);

    let elsewhere = SpiralPattern::new(Coordinate::new(-3000, 2000), 16);
    miner.set_pattern(Box::new(elsewhere)).unwrap();
    let home = elsewhere.home();
    loop {
        if next_chunk(&events).footprint == home {
            break;
        }
    }
    assert!(miner.is_exploring());
    miner.shutdown();
}

#[test]
fn test_handle_rejects_bad_requests() {
    let world = world(HashMode::Fake, 8192);
    let mut miner = Miner::spawn(
        &world,
        &MinerConfig::default(),
        cache(&world),
        Box::new(spiral()),
    )
    .unwrap();

    let odd = SpiralPattern::new(Coordinate::new(0, 0), 48);
    assert!(matches!(
        miner.set_pattern(Box::new(odd)),
        Err(MinerError::InvalidPattern(_))
    ));
    assert!(matches!(miner.set_lanes(0), Err(MinerError::Config(_))));
    miner.set_world_radius(100).unwrap();
    miner.set_lanes(2).unwrap();

    miner.shutdown();
    miner.shutdown();
    assert_eq!(miner.start_exploring(), Err(MinerError::ShutDown));
    assert!(!miner.is_exploring());
}

#[test]
fn test_spawn_rejects_bad_settings() {
    let world = world(HashMode::Fake, 8192);
    let settings = MinerConfig {
        seek_batch: 0,
        ..MinerConfig::default()
    };
    assert!(matches!(
        Miner::spawn(&world, &settings, cache(&world), Box::new(spiral())),
        Err(MinerError::Config(_))
    ));
}
