//! Cadence Player - headless stage runner
//!
//! 1. Opens the audio device and starts the output stream
//! 2. Decodes the stage's track and parses its chart
//! 3. Ticks the rhythm engine at a fixed rate, fed by the autoplay bot
//! 4. Logs judgements until the song ends or health runs out
//!
//! ## Command line flags
//!
//! - `--config <path>`: config file (default ~/.config/cadence/player.yaml)
//! - `--write-config`: save the effective config to that path and exit

mod autoplay;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cadence_core::assets::{AssetSource, DirectoryAssets};
use cadence_core::audio::open_output;
use cadence_core::config::{load_config, save_config};
use cadence_core::engine::{PlaybackClock, StageTransport};
use cadence_core::rhythm::{JudgeEvent, PadState, RhythmEngine, SessionError};

use autoplay::Autoplay;
use config::PlayerConfig;

fn main() -> Result<()> {
    // Set RUST_LOG=debug for state transitions and per-step events
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);

    let config: PlayerConfig = load_config(&config_path);

    if args.iter().any(|arg| arg == "--write-config") {
        save_config(&config, &config_path)?;
        log::info!("Wrote config to {:?}", config_path);
        return Ok(());
    }

    log::info!("cadence-player starting up");
    run(&config)
}

fn run(config: &PlayerConfig) -> Result<()> {
    let assets: Arc<dyn AssetSource> = Arc::new(DirectoryAssets::new(&config.asset_root));
    log::info!("Assets from {:?}", config.asset_root);

    let output = open_output(&config.audio).context("Failed to open audio output")?;
    let clock = PlaybackClock::new(output.sample_rate());
    let audio = output
        .start(clock.clone())
        .context("Failed to start audio stream")?;
    log::info!(
        "Audio running at {}Hz (~{:.1}ms buffer)",
        audio.sample_rate(),
        audio.latency_ms()
    );

    let mut transport = StageTransport::new(clock, assets.clone(), config.stage.track.clone());
    transport
        .prepare()
        .with_context(|| format!("Failed to load track {}", config.stage.track))?;

    let mut engine = RhythmEngine::load(
        assets.as_ref(),
        &config.stage,
        config.difficulty,
        config.tuning.clone(),
        config.ticks_per_second,
    )
    .context("Failed to load stage")?;

    let mut bot = Autoplay::new();
    let period = Duration::from_secs(1) / config.ticks_per_second.max(1);
    let mut deadline = Instant::now();

    loop {
        let pad = if config.autoplay {
            bot.next_input(&engine)
        } else {
            PadState::default()
        };

        let result = engine.tick(&mut transport, &pad);
        for event in engine.drain_events() {
            log_event(&event);
        }

        match result {
            Ok(()) => {}
            Err(SessionError::HealthDepleted { step, .. }) => {
                bail!("YOU DIED at step {} (score {})", step, engine.score());
            }
            Err(e) => return Err(e).context("Stage failed"),
        }

        if engine.is_finished() {
            break;
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else if now - deadline > period * 4 {
            log::warn!("Tick loop fell behind by {:?}, resyncing", now - deadline);
            deadline = now;
        }
    }

    log::info!(
        "Stage clear: score {}, max combo {}, health {}",
        engine.score(),
        engine.max_combo(),
        engine.health()
    );
    drop(audio);
    Ok(())
}

fn log_event(event: &JudgeEvent) {
    match event {
        JudgeEvent::Hit {
            lane,
            tier,
            offset,
            combo,
        } => log::info!("{} on lane {} ({} steps), combo {}", tier, lane, offset, combo),
        JudgeEvent::Miss { lane, cause } => log::info!("Miss on lane {} ({:?})", lane, cause),
        JudgeEvent::ComboBroken { was } => log::info!("Combo broken at {}", was),
        JudgeEvent::HealthChanged { health, delta } if *delta < 0 => {
            log::info!("Health {} ({})", health, delta)
        }
        other => log::debug!("{:?}", other),
    }
}
