//! Configuration file management
//!
//! Loads TOML configuration files and provides driver settings.
//! Default config path: ~/.config/g930d/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::path::Path;
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::input::discovery::DEFAULT_DEVICE_DIR;
use crate::input::receiver::DEFAULT_POLL_TIMEOUT;

/// Shortest poll timeout accepted from the config file (milliseconds)
const MIN_POLL_TIMEOUT_MS: u64 = 10;

/// Driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Headset behaviour
    pub headset: HeadsetConfig,
    /// Input device settings
    pub input: InputConfig,
}

/// Headset behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadsetConfig {
    /// Surface volume up/down and mute as logical keys (true) or replay
    /// the headset's volume wheel on a virtual keyboard (false)
    pub grab_multimedia: bool,
}

/// Input device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory scanned for headset event nodes
    pub device_dir: String,
    /// Upper bound of one poll wait in milliseconds (also the worst-case
    /// shutdown latency of the receive thread)
    pub poll_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headset: HeadsetConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            grab_multimedia: false,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_dir: DEFAULT_DEVICE_DIR.to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Config {
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/g930d/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. G930D_CONFIG environment variable
        if let Ok(path) = std::env::var("G930D_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/g930d/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/g930d/config.toml
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. G930D_CONFIG environment variable
    /// 2. ~/.config/g930d/config.toml (user config)
    /// 3. /etc/g930d/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the default config to `path` (parent directories created)
    pub fn write_default_config(path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        let content = format!(
            "# g930d configuration\n\
             #\n\
             # headset.grab_multimedia: deliver volume/mute as driver keys instead\n\
             # of passing them on to the desktop\n\n{}",
            body
        );
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Poll timeout for the receive worker
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.input.poll_timeout_ms.max(MIN_POLL_TIMEOUT_MS))
    }

    /// Directory scanned for headset nodes
    pub fn device_dir(&self) -> PathBuf {
        PathBuf::from(&self.input.device_dir)
    }
}

/// Supplies a fresh configuration on every (re)connect
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Config;
}

/// Reads the config file hierarchy on each call
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigSource;

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Config {
        Config::load()
    }
}

/// Fixed in-memory configuration
impl ConfigSource for Config {
    fn load(&self) -> Config {
        self.clone()
    }
}

/// Config file change watcher (Linux only)
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                // Detect Modify, Create, and Rename events
                // (editors often save by writing to temp file then rename)
                use notify::EventKind;
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) if ours => {
                        let _ = tx.send(());
                    }
                    _ => {}
                }
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        info!("Watching {} for changes", config_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking)
    ///
    /// Drains all pending notifications so one save triggers one reload.
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("g930d").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::discovery::tests::scratch_dir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.headset.grab_multimedia);
        assert_eq!(config.device_dir(), PathBuf::from("/dev/input/by-id"));
        assert_eq!(config.poll_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_partial() {
        let config: Config = toml::from_str("[headset]\ngrab_multimedia = true\n").unwrap();
        assert!(config.headset.grab_multimedia);
        assert_eq!(config.input, InputConfig::default());
    }

    #[test]
    fn test_poll_timeout_floor() {
        let config: Config = toml::from_str("[input]\npoll_timeout_ms = 0\n").unwrap();
        assert_eq!(config.poll_timeout(), Duration::from_millis(MIN_POLL_TIMEOUT_MS));
    }

    #[test]
    fn test_write_and_reload_default() {
        let dir = scratch_dir("config");
        let path = dir.join("nested").join("config.toml");
        Config::write_default_config(&path).unwrap();
        assert_eq!(Config::load_from_file(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_from_file_rejects_garbage() {
        let dir = scratch_dir("config-bad");
        let path = dir.join("config.toml");
        std::fs::write(&path, "headset = [").unwrap();
        assert!(Config::load_from_file(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    // Only test touching G930D_CONFIG; the variable is process-wide
    #[test]
    fn test_env_config_takes_priority_and_bad_file_falls_back() {
        let dir = scratch_dir("config-env");
        let path = dir.join("custom.toml");
        std::fs::write(&path, "[headset]\ngrab_multimedia = true\n").unwrap();

        std::env::set_var("G930D_CONFIG", &path);
        assert_eq!(Config::config_path(), Some(path.clone()));
        assert!(Config::load().headset.grab_multimedia);
        assert!(FileConfigSource.load().headset.grab_multimedia);

        std::fs::write(&path, "headset = [").unwrap();
        assert_eq!(Config::load(), Config::default());

        std::env::remove_var("G930D_CONFIG");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(target_os = "linux")]
    fn wait_for_reload(watcher: &ConfigWatcher, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if watcher.check_reload() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_watcher_fires_only_for_config_file() {
        let dir = scratch_dir("config-watch");
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();
        let watcher = ConfigWatcher::new(&path).unwrap();

        std::fs::write(dir.join("other.toml"), "x = 1").unwrap();
        assert!(!wait_for_reload(&watcher, Duration::from_millis(300)));

        std::fs::write(&path, "[headset]\n").unwrap();
        std::fs::write(&path, "[headset]\ngrab_multimedia = true\n").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(wait_for_reload(&watcher, Duration::from_secs(2)));
        // Every event from both writes was drained by that one check
        assert!(!watcher.check_reload());

        drop(watcher);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
