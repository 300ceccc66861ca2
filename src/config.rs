use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wolgate.json";
const DEFAULT_LISTEN: &str = "127.0.0.1:9000";
const DEFAULT_DATA: &str = "/data/wolgate.json";
const DEFAULT_BROADCAST: &str = "255.255.255.255";
const DEFAULT_LOG_FILE: &str = "/tmp/wolgate.log";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_MAX_SIZE: u64 = 10;
const DEFAULT_LOG_MAX_BACKUPS: usize = 3;
const DEFAULT_LOG_MAX_AGE: u64 = 7;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub wake: WakeConfig,
    pub log: LogConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    // Address the HTTP server listens on.
    pub listen: String,
    // Path of the device registry file.
    pub data: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WakeConfig {
    // Interface to send from. Empty lets the routing table decide.
    pub iface: String,
    pub broadcast: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    // Empty logs to stderr.
    pub file: String,
    pub level: String,
    // Megabytes before the file is rotated.
    pub max_size: u64,
    pub max_backups: usize,
    // Days a rotated file is kept.
    pub max_age: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            data: DEFAULT_DATA.to_string(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            iface: String::new(),
            broadcast: DEFAULT_BROADCAST.to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: DEFAULT_LOG_FILE.to_string(),
            level: DEFAULT_LOG_LEVEL.to_string(),
            max_size: DEFAULT_LOG_MAX_SIZE,
            max_backups: DEFAULT_LOG_MAX_BACKUPS,
            max_age: DEFAULT_LOG_MAX_AGE,
        }
    }
}

/// Values taken from flags or `WOLGATE_*` environment variables. `None`
/// leaves the loaded value alone.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub data: Option<String>,
    pub iface: Option<String>,
    pub broadcast: Option<String>,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
    pub log_max_size: Option<u64>,
    pub log_max_backups: Option<usize>,
    pub log_max_age: Option<u64>,
}

impl Config {
    /// Loads `path` over the defaults. An empty path or a missing file gives
    /// the defaults; a file that can't be read or parsed is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(Config::default());
        }
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e.into()),
        };
        let mut config: Config = serde_json::from_slice(&data)?;
        config.apply_defaults();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Fills fields that a config file left empty or zero.
    pub fn apply_defaults(&mut self) {
        let defaults = Config::default();
        fill(&mut self.server.listen, defaults.server.listen);
        fill(&mut self.server.data, defaults.server.data);
        fill(&mut self.wake.broadcast, defaults.wake.broadcast);
        fill(&mut self.log.file, defaults.log.file);
        fill(&mut self.log.level, defaults.log.level);
        if self.log.max_size == 0 {
            self.log.max_size = defaults.log.max_size;
        }
        if self.log.max_backups == 0 {
            self.log.max_backups = defaults.log.max_backups;
        }
        if self.log.max_age == 0 {
            self.log.max_age = defaults.log.max_age;
        }
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        set(&mut self.server.listen, &overrides.listen);
        set(&mut self.server.data, &overrides.data);
        set(&mut self.wake.iface, &overrides.iface);
        set(&mut self.wake.broadcast, &overrides.broadcast);
        set(&mut self.log.file, &overrides.log_file);
        set(&mut self.log.level, &overrides.log_level);
        if let Some(size) = overrides.log_max_size.filter(|s| *s > 0) {
            self.log.max_size = size;
        }
        if let Some(backups) = overrides.log_max_backups.filter(|b| *b > 0) {
            self.log.max_backups = backups;
        }
        if let Some(age) = overrides.log_max_age {
            self.log.max_age = age;
        }
    }
}

fn fill(field: &mut String, default: String) {
    if field.is_empty() {
        *field = default;
    }
}

fn set(field: &mut String, value: &Option<String>) {
    if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
        *field = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.server.listen, "127.0.0.1:9000");
        assert_eq!(c.server.data, "/data/wolgate.json");
        assert_eq!(c.wake.iface, "");
        assert_eq!(c.wake.broadcast, "255.255.255.255");
        assert_eq!(c.log.file, "/tmp/wolgate.log");
        assert_eq!(c.log.level, "info");
        assert_eq!((c.log.max_size, c.log.max_backups, c.log.max_age), (10, 3, 7));
    }

    #[test]
    fn test_load_empty_path() {
        assert_eq!(Config::load("").unwrap(), Config::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::load(dir.path().join("missing.json")).unwrap(),
            Config::default()
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolgate.json");
        fs::write(
            &path,
            r#"{"server": {"listen": "0.0.0.0:8080", "data": ""},
                "wake": {"iface": "br-lan"},
                "log": {"level": "debug", "max_size": 0}}"#,
        )
        .unwrap();
        let c = Config::load(&path).unwrap();
        assert_eq!(c.server.listen, "0.0.0.0:8080");
        assert_eq!(c.server.data, "/data/wolgate.json");
        assert_eq!(c.wake.iface, "br-lan");
        assert_eq!(c.wake.broadcast, "255.255.255.255");
        assert_eq!(c.log.level, "debug");
        assert_eq!(c.log.max_size, 10);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolgate.json");
        fs::write(&path, "{invalid").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_overrides_win() {
        let mut c = Config::default();
        c.apply(&Overrides {
            listen: Some("0.0.0.0:9999".to_string()),
            iface: Some("eth1".to_string()),
            broadcast: Some(String::new()),
            log_level: Some("warn".to_string()),
            log_max_size: Some(0),
            log_max_backups: Some(5),
            log_max_age: Some(0),
            ..Default::default()
        });
        assert_eq!(c.server.listen, "0.0.0.0:9999");
        assert_eq!(c.server.data, "/data/wolgate.json");
        assert_eq!(c.wake.iface, "eth1");
        assert_eq!(c.wake.broadcast, "255.255.255.255");
        assert_eq!(c.log.level, "warn");
        assert_eq!(c.log.max_size, 10);
        assert_eq!(c.log.max_backups, 5);
        assert_eq!(c.log.max_age, 0);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolgate.json");
        let mut c = Config::default();
        c.wake.iface = "eth0".to_string();
        c.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), c);
    }
}
