//! g930d - multimedia key daemon for Logitech G930/G35 headsets
//!
//! Connects to the headset, grabs its event interfaces and logs the
//! logical key stream. Volume wheel reports are forwarded to a uinput
//! virtual keyboard unless `grab_multimedia` is set. The config file is
//! watched and a change cycles the connection.

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

use g930d::config::{self, Config, FileConfigSource};
use g930d::input::{list_devices, KeyInjector, NullInjector, VirtualKeyboard};
use g930d::{Driver, G930Driver, KeyCallback, KeyState, LogicalKey};

/// Main loop tick (signal and config-watch latency)
const MAIN_LOOP_INTERVAL: Duration = Duration::from_millis(200);

/// Route SIGTERM (systemd stop), SIGINT (Ctrl+C) and SIGHUP (terminal
/// hangup) into `shutdown`
fn register_shutdown_signals(shutdown: &Arc<AtomicBool>) {
    for signal in [SIGTERM, SIGINT, SIGHUP] {
        if let Err(e) = flag::register(signal, Arc::clone(shutdown)) {
            warn!("Failed to register handler for signal {}: {}", signal, e);
        }
    }
}

fn print_help() {
    println!(
        r#"g930d {} - Logitech G930/G35 headset key driver

USAGE:
    g930d [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -l, --list              List matching headset event devices and exit
    --init-config           Generate the default config file
    -f, --force             Overwrite config file without confirmation

CONFIG FILE:
    $G930D_CONFIG, ~/.config/g930d/config.toml or /etc/g930d/config.toml

    [headset]
    grab_multimedia = false   # true: volume/mute become driver keys

    [input]
    device_dir = "/dev/input/by-id"
    poll_timeout_ms = 1000

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn init_config(force: bool) -> Result<()> {
    let path = config::default_config_path().context("Cannot determine config directory")?;
    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }
    Config::write_default_config(&path)?;
    println!("Config written: {}", path.display());
    Ok(())
}

fn list() -> Result<()> {
    let cfg = Config::load();
    let dir = cfg.device_dir();
    let found = list_devices(&dir).with_context(|| format!("Cannot scan {}", dir.display()))?;
    if found.is_empty() {
        println!("No supported headset found in {}", dir.display());
    }
    for dev in found {
        println!("{}\t{}\t{}", dev.model.id, dev.model.name, dev.path.display());
    }
    Ok(())
}

fn key_logger() -> KeyCallback {
    Arc::new(|keys: &[LogicalKey], state: KeyState| {
        let names: Vec<&str> = keys.iter().map(|k| k.id()).collect();
        info!("Key {:?} {}", state, names.join(","));
    })
}

fn virtual_keyboard() -> Arc<dyn KeyInjector> {
    match VirtualKeyboard::new() {
        Ok(kbd) => Arc::new(kbd),
        Err(e) => {
            warn!(
                "Virtual keyboard unavailable, volume wheel will not reach the desktop: {}",
                e
            );
            Arc::new(NullInjector)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Check command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("g930d {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--init-config") {
        let force = args.iter().any(|a| a == "--force" || a == "-f");
        return init_config(force);
    }

    if args.iter().any(|a| a == "--list" || a == "-l") {
        return list();
    }

    info!("g930d starting...");
    let shutdown = Arc::new(AtomicBool::new(false));
    register_shutdown_signals(&shutdown);

    let mut driver = G930Driver::new(Arc::new(FileConfigSource), virtual_keyboard())
        .with_on_close(Arc::new(|| info!("Headset connection closed")));

    driver
        .connect()
        .context("No supported Logitech headset found")?;
    info!(
        "{} ({}), grab_multimedia={}, poll timeout {:?}",
        driver.name(),
        driver.model_name().unwrap_or("?"),
        driver.grab_multimedia(),
        driver.config().poll_timeout()
    );
    driver.grab_keyboard(key_logger())?;

    // Config hot-reload (Linux only)
    #[cfg(target_os = "linux")]
    let config_watcher = Config::config_path()
        .or_else(config::default_config_path)
        .and_then(|path| match config::ConfigWatcher::new(&path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Config watch disabled: {:#}", e);
                None
            }
        });

    // Notify systemd that we're ready
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(MAIN_LOOP_INTERVAL);

        if !driver.is_receiving() {
            warn!("Receive thread exited, headset unplugged?");
            break;
        }

        #[cfg(target_os = "linux")]
        if let Some(ref watcher) = config_watcher {
            if watcher.check_reload() {
                info!("Config file change detected, reloading...");
                if let Err(e) = driver.on_configuration_changed() {
                    warn!("Reconnect after config change failed: {}", e);
                    break;
                }
            }
        }
    }

    info!("Shutting down...");
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
    if driver.is_connected() {
        driver.disconnect()?;
    }
    Ok(())
}
