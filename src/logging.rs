//! Logger setup shared by the bins: stderr always, plus a timestamped file
//! under `logging.dir` when configured.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

use crate::config::LoggingConfig;

/// Writes every line to stderr and to the log file
struct Tee {
    file: BufWriter<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// `<dir>/<name>_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_path(dir: &Path, name: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{name}_{ts}.log"))
}

/// Install the global logger. `RUST_LOG` overrides `config.level`.
///
/// Returns the log file path when one was opened. A second call is a no-op.
pub fn init(config: &LoggingConfig, name: &str) -> Result<Option<PathBuf>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.level.as_str()));

    let path = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            let path = log_file_path(dir, name);
            let file = File::create(&path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(Tee {
                file: BufWriter::new(file),
            })));
            Some(path)
        }
        None => None,
    };

    if builder.try_init().is_err() {
        log::debug!("[log] logger already installed");
    }
    if let Some(path) = &path {
        log::info!("[log] writing to {}", path.display());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("logs"), "tracker_server");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("tracker_server_"));
        assert!(name.ends_with(".log"));
        // tracker_server_ + 8 digits + _ + 6 digits + .log
        assert_eq!(name.len(), "tracker_server_".len() + 15 + 4);
        assert_eq!(path.parent(), Some(Path::new("logs")));
    }

    #[test]
    fn test_init_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            dir: Some(dir.path().join("logs")),
        };
        let path = init(&config, "test").unwrap().unwrap();
        assert!(path.exists());
    }
}
