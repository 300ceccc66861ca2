// Logger setup: env_logger, optionally writing into a size-rotated file.

use crate::config::LogConfig;
use log::LevelFilter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::macros::format_description;
use time::OffsetDateTime;

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to open log file: {0}")]
    Io(#[from] io::Error),
    #[error("logger already initialized")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Installs the global logger described by `config`.
pub fn init(config: &LogConfig) -> Result<(), Error> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level_filter(&config.level))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis));
    if !config.file.is_empty() {
        let max_age = match config.max_age {
            0 => None,
            days => Some(Duration::from_secs(days * SECONDS_PER_DAY)),
        };
        let file = RotatingFile::open(
            &config.file,
            config.max_size * BYTES_PER_MB,
            config.max_backups,
            max_age,
        )?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

/// Unknown names fall back to info.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// An append-only file that is renamed to `<path>.<timestamp>` once it would
/// grow past `max_size` bytes. Old backups are pruned by count and by age.
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    max_size: u64,
    max_backups: usize,
    max_age: Option<Duration>,
}

impl RotatingFile {
    pub fn open(
        path: impl Into<PathBuf>,
        max_size: u64,
        max_backups: usize,
        max_age: Option<Duration>,
    ) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            size,
            max_size,
            max_backups,
            max_age,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.backup_path()?)?;
        self.file = open_append(&self.path)?;
        self.size = 0;
        self.remove_stale_backups()
    }

    fn backup_path(&self) -> io::Result<PathBuf> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]-[month]-[day].[hour][minute][second]"
            ))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let base = format!("{}.{}", self.path.display(), stamp);
        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}.{}", base, n));
            n += 1;
        }
        Ok(candidate)
    }

    fn remove_stale_backups(&self) -> io::Result<()> {
        let mut backups = self.backups()?;
        backups.sort_by(|a, b| b.1.cmp(&a.1));
        let now = SystemTime::now();
        for (i, (path, modified)) in backups.iter().enumerate() {
            let too_many = self.max_backups > 0 && i >= self.max_backups;
            let too_old = match (self.max_age, now.duration_since(*modified)) {
                (Some(max_age), Ok(age)) => age > max_age,
                _ => false,
            };
            if too_many || too_old {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Rotated files next to the log file, with their modification times.
    pub fn backups(&self) -> io::Result<Vec<(PathBuf, SystemTime)>> {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = match self.path.file_name() {
            Some(name) => format!("{}.", name.to_string_lossy()),
            None => return Ok(vec![]),
        };
        let mut backups = vec![];
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_file() && entry.file_name().to_string_lossy().starts_with(&prefix) {
                backups.push((entry.path(), meta.modified()?));
            }
        }
        Ok(backups)
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_size > 0 && self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
