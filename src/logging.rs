//! Log setup: env_logger records go to stderr and an append-only log file

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::{Env, Target};

/// Set up env_logger to write every record to stderr and append it to the log file
///
/// Defaults to `info`, `RUST_LOG` overrides the filter as usual.
pub fn init(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Can't open log file {}", log_file.display()))?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "{} [{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), record.level(), record.args())
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()?;

    Ok(())
}

/// Duplicates log output to stderr and an append-only file
struct Tee {
    file: File,
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
