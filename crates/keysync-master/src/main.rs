//! KeySync master entry point.
//!
//! Loads configuration, wires the platform adapters into the engine and runs
//! the control loop until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config.toml, profiles.json, sync_hotkey.ini
//!  └─ SyncEngine::new(key probe, segment provider, tracker, profile, hotkey)
//!  └─ ControlLoop::spawn()
//!       ├─ keyboard hook      (Win32 message-loop thread)
//!       ├─ heartbeat / probe  (Tokio intervals)
//!       └─ window scan        (spawn_blocking + timeout)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keysync_core::domain::window::TargetMatcher;
use keysync_core::keymap::key_name;
use keysync_core::profile::KEY_DOWN_BIT;
use keysync_core::protocol::{FLAG_CLEAR, FLAG_PAUSED};
use keysync_core::{FilterProfile, ProfileMode};
use keysync_master::application::control_loop::{ControlLoop, EngineCommand};
use keysync_master::application::foreground::ForegroundTracker;
use keysync_master::application::sync_engine::SyncEngine;
use keysync_master::infrastructure::clock::SystemClock;
use keysync_master::infrastructure::key_source::platform_key_source;
use keysync_master::infrastructure::os_keyboard::platform_key_state_probe;
use keysync_master::infrastructure::shared_memory::{classify, SegmentStatus};
use keysync_master::infrastructure::storage::config::{
    config_dir, config_file_path, load_config_from, save_config_to, AppConfig, ConfigError,
};
use keysync_master::infrastructure::storage::hotkey_store::HotkeyStore;
use keysync_master::infrastructure::storage::profile_store::ProfileStore;
use keysync_master::infrastructure::windows_enum::platform_enumerator;

#[derive(Debug, Parser)]
#[command(name = "keysync-master", version, about = "Publishes synchronized keyboard state to follower windows")]
struct Cli {
    /// Path to config.toml (default: the platform config directory).
    #[arg(long, env = "KEYSYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset, e.g. "debug" or "keysync_master=trace".
    #[arg(long, env = "KEYSYNC_LOG", global = true)]
    log_level: Option<String>,

    /// Never auto-pause when the target loses focus.
    #[arg(
        long,
        env = "KEYSYNC_DISABLE_AUTOPAUSE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    no_auto_pause: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture the keyboard and publish (the default).
    Run,
    /// Attach to the shared segment as a consumer would and print it.
    Inspect,
    /// Write a config.toml with every default filled in.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().map_or_else(config_file_path, Ok);
    let loaded = config_path.as_ref().map_err(|e| e.to_string()).and_then(|path| {
        load_config_from(path).map_err(|e: ConfigError| e.to_string())
    });
    let config = loaded.clone().unwrap_or_default();

    // Initialise structured logging. `RUST_LOG` wins over every other source.
    let level = cli.log_level.clone().unwrap_or_else(|| config.sync.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    if let Err(e) = &loaded {
        warn!(error = %e, "config unavailable, using defaults");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let auto_pause = config.sync.auto_pause && !cli.no_auto_pause;
            run(config, auto_pause).await
        }
        Command::Inspect => inspect(&config.sync.segment_name),
        Command::InitConfig { force } => {
            let path = config_path.context("no config path")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            save_config_to(&path, &config)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

async fn run(config: AppConfig, auto_pause: bool) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "KeySync master starting");

    let dir = config_dir().unwrap_or_else(|e| {
        warn!(error = %e, "no config directory, using the working directory");
        PathBuf::from(".")
    });

    let mut profiles = ProfileStore::new(config.profile_path(&dir));
    if let Err(e) = profiles.ensure_exists() {
        warn!(error = %e, "could not create profile store");
    }
    let profile = match profiles.load() {
        Ok(loaded) => loaded.profile,
        Err(e) => {
            warn!(path = %profiles.path().display(), error = %e, "using built-in profile");
            Arc::new(FilterProfile::default_profile())
        }
    };

    let mut hotkeys = HotkeyStore::new(config.hotkey_path(&dir));
    hotkeys.ensure_exists();
    hotkeys.reload_if_changed();

    let tracker = ForegroundTracker::new(
        TargetMatcher::new(&config.target.process_name, &config.target.title_keyword),
        config.timing.grace_ms,
        auto_pause,
    );
    if !auto_pause {
        info!("auto-pause disabled");
    }

    #[cfg(target_os = "windows")]
    let provider =
        keysync_master::infrastructure::shared_memory::windows::NamedSegmentProvider::new(&config.sync.segment_name);
    #[cfg(not(target_os = "windows"))]
    let provider = {
        warn!("named shared memory is Windows-only, publishing to process memory");
        keysync_master::infrastructure::shared_memory::HeapSegmentProvider::new()
    };

    let engine = SyncEngine::new(platform_key_state_probe(), provider, tracker, profile, hotkeys.current());
    let (handle, mut task) = ControlLoop::new(
        engine,
        platform_key_source(),
        platform_enumerator(),
        Box::new(SystemClock::new()),
        config.timing.clone(),
    )
    .with_profile_store(profiles)
    .with_hotkey_store(hotkeys)
    .spawn();

    info!(
        target_process = %config.target.process_name,
        segment = %config.sync.segment_name,
        "KeySync ready. Press Ctrl-C to exit."
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("shutdown signal received");
            if handle.send(EngineCommand::Shutdown).await.is_err() {
                error!("control loop already stopped");
            }
        }
        result = &mut task => {
            result.context("control loop panicked")?;
            anyhow::bail!("control loop exited unexpectedly");
        }
    }

    task.await.context("control loop panicked")?;
    info!("KeySync master stopped");
    Ok(())
}

fn inspect(segment_name: &str) -> anyhow::Result<()> {
    #[cfg(target_os = "windows")]
    let status = classify(keysync_master::infrastructure::shared_memory::windows::NamedSegment::open_existing(
        segment_name,
    ));
    #[cfg(not(target_os = "windows"))]
    let status = classify::<keysync_core::protocol::HeapSegment>(Err(
        keysync_master::infrastructure::shared_memory::SegmentError::Unsupported,
    ));

    let snapshot = match status {
        SegmentStatus::Readable(snapshot) => snapshot,
        SegmentStatus::NotFound => anyhow::bail!("segment {segment_name} not found (is the master running?)"),
        SegmentStatus::SizeMismatch { expected, actual } => {
            anyhow::bail!("segment is {actual} bytes, expected {expected}")
        }
        SegmentStatus::ProtocolMismatch(reason) => anyhow::bail!("incompatible segment: {reason}"),
        SegmentStatus::Stalled { seq } => anyhow::bail!("writer stalled mid-publish at sequence {seq}"),
        SegmentStatus::Unavailable(reason) => anyhow::bail!("segment unavailable: {reason}"),
    };

    let frame = &snapshot.frame;
    let mode = ProfileMode::from_u32(frame.profile_mode).map_or_else(|| frame.profile_mode.to_string(), |m| m.to_string());
    let down: Vec<String> = (0..=u8::MAX)
        .filter(|&vk| frame.key_state[usize::from(vk)] & KEY_DOWN_BIT != 0)
        .map(|vk| key_name(vk).map_or_else(|| format!("{vk:#04x}"), str::to_string))
        .collect();

    println!("segment      {segment_name}");
    println!("sequence     {}", snapshot.seq);
    println!(
        "flags        paused={} clear={}",
        frame.flags & FLAG_PAUSED != 0,
        frame.flags & FLAG_CLEAR != 0
    );
    println!("active pid   {}", frame.active_pid);
    println!("profile      {:#010x} ({mode})", frame.profile_id);
    println!("last tick    {} ms", frame.last_tick_ms);
    println!("keys down    {}", if down.is_empty() { "-".to_string() } else { down.join(" ") });
    Ok(())
}
