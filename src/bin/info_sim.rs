//! Avatar info simulator
//!
//! Drives the synchronization engine over a crowd of random-walking avatars,
//! each with its own observer connection, and logs per-tick statistics.
//!
//! Environment:
//! - `SIM_AVATARS` avatars to spawn (default 200)
//! - `SIM_TICKS` ticks to run (default 100)
//! - `SIM_SEED` RNG seed (default 530)
//! - `SIM_TICK_MS` sleep between ticks in milliseconds (default 0)
//! - `RUSTSCAPE_LOG_FORMAT=json` for JSON logs

use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use rustscape_protocol::crypto::{IsaacProvider, StreamCipherProvider};
use rustscape_protocol::game::info::{Appearance, ChatMessage, HitMark};
use rustscape_protocol::game::{AvatarRepository, CoordGrid};
use rustscape_protocol::{InfoSyncEngine, SyncConfig, VERSION};

/// Lumbridge
const SPAWN_X: u16 = 3222;
const SPAWN_Z: u16 = 3218;
const SPAWN_SPREAD: i32 = 40;

const PHRASES: [&str; 5] = [
    "Buying gf",
    "Selling lobbies",
    "Free armour trimming",
    "Wave 63 anyone?",
    "Lol",
];

fn main() -> Result<()> {
    init_logging();

    let avatars: usize = env_or("SIM_AVATARS", 200)?;
    let ticks: u64 = env_or("SIM_TICKS", 100)?;
    let seed: u64 = env_or("SIM_SEED", 530)?;
    let tick_ms: u64 = env_or("SIM_TICK_MS", 0)?;

    let config = SyncConfig::load()?;
    info!(
        version = VERSION,
        revision = config.revision,
        avatars = avatars,
        ticks = ticks,
        "Starting avatar info simulation"
    );

    let mut engine = InfoSyncEngine::new(&config)?;
    let mut repo = AvatarRepository::new(config.max_avatars);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..avatars.min(repo.capacity()) {
        spawn(&mut engine, &mut repo, &mut rng)?;
    }

    let mut total_bytes = 0usize;
    let mut failed_ticks = 0u64;
    for _ in 0..ticks {
        simulate(&mut engine, &mut repo, &mut rng)?;

        let output = engine.run_tick(&mut repo);
        total_bytes += output.stats.bytes_written;
        info!(
            tick = output.tick,
            observers = output.stats.observers,
            precomputed = output.stats.precomputed_blocks,
            bytes = output.stats.bytes_written,
            elapsed_us = output.stats.elapsed.as_micros() as u64,
            "Tick complete"
        );
        if let Some(failure) = &output.failure {
            failed_ticks += 1;
            for observer in &failure.failures {
                warn!(
                    tick = failure.tick,
                    connection = observer.connection,
                    error = %observer.error,
                    "Observer failed"
                );
            }
        }

        if tick_ms > 0 {
            thread::sleep(Duration::from_millis(tick_ms));
        }
    }

    info!(
        ticks = ticks,
        total_bytes = total_bytes,
        failed_ticks = failed_ticks,
        pool_acquired = engine.pool().acquired_total(),
        pool_outstanding = engine.pool().outstanding(),
        "Simulation finished"
    );
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rustscape_protocol=info"));

    let json = env::var("RUSTSCAPE_LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .init();
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value}")),
        Err(_) => Ok(default),
    }
}

fn spawn(engine: &mut InfoSyncEngine, repo: &mut AvatarRepository, rng: &mut StdRng) -> Result<()> {
    let x = SPAWN_X as i32 + rng.gen_range(-SPAWN_SPREAD..=SPAWN_SPREAD);
    let z = SPAWN_Z as i32 + rng.gen_range(-SPAWN_SPREAD..=SPAWN_SPREAD);
    let index = repo.insert(CoordGrid::new(x as u16, z as u16, 0)?)?;

    if let Some(avatar) = repo.get_mut(index) {
        let mut appearance = Appearance {
            name: format!("Avatar {index}"),
            gender: rng.gen_range(0..=1),
            combat_level: rng.gen_range(3..=126),
            ..Appearance::default()
        };
        appearance.colours = rng.gen();
        avatar.info.set_appearance(appearance);
        avatar.info.set_move_speed(1);
    }

    let seed: [u32; 4] = rng.gen();
    engine.register(index as u64, index, IsaacProvider.provide(&seed));
    Ok(())
}

fn simulate(
    engine: &mut InfoSyncEngine,
    repo: &mut AvatarRepository,
    rng: &mut StdRng,
) -> Result<()> {
    let indices: Vec<u16> = repo.iter().map(|avatar| avatar.index()).collect();

    for &index in &indices {
        let Some(avatar) = repo.get_mut(index) else {
            continue;
        };

        let stride = match rng.gen_range(0..10) {
            0..=4 => 0,
            5..=8 => 1,
            _ => 2,
        };
        if stride > 0 {
            let dx = rng.gen_range(-stride..=stride);
            let dz = rng.gen_range(-stride..=stride);
            if let Ok(next) = avatar.coord().translate(dx, dz, 0) {
                avatar.set_coord(next);
            }
        }

        match rng.gen_range(0..100) {
            0..=2 => avatar.info.say(PHRASES[rng.gen_range(0..PHRASES.len())]),
            3..=4 => avatar.info.set_chat(ChatMessage {
                colour: rng.gen_range(0..12),
                effects: 0,
                rights: 0,
                text: PHRASES[rng.gen_range(0..PHRASES.len())].to_string(),
            }),
            5..=7 => avatar.info.set_sequence(rng.gen_range(800..900), 0),
            8 => avatar.info.set_face_angle(rng.gen_range(0..2048)),
            9 => avatar.info.add_hit(HitMark {
                kind: 1,
                self_kind: 2,
                source: indices.get(rng.gen_range(0..indices.len())).copied(),
                damage: rng.gen_range(0..30),
                delay: 0,
            }),
            _ => {}
        }
    }

    // Churn: the occasional logout, the occasional login into a freed slot
    if rng.gen_bool(0.05) && !indices.is_empty() {
        let index = indices[rng.gen_range(0..indices.len())];
        engine.unregister(index as u64);
        repo.remove(index)?;
    }
    if rng.gen_bool(0.05) && repo.len() < repo.capacity() {
        spawn(engine, repo, rng)?;
    }
    Ok(())
}
