//! Logger setup and per-thread log sections.
//!
//! While a module is inside one of its lifecycle calls the framework marks
//! the current thread with a section such as `R:SimplePropagation:dut`. The
//! formatter installed by [`init_logger`] prints it in front of every line,
//! so messages of modules running on different workers stay attributable.

use crate::core::error::Result;
use env_logger::{Builder, Env, Target};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

thread_local! {
    static SECTION: RefCell<String> = RefCell::new(String::new());
}

/// Marks the current thread with a log section until dropped
#[must_use = "the section is left again when the guard is dropped"]
pub struct LogSection {
    previous: String,
}

impl LogSection {
    pub fn enter(section: impl Into<String>) -> Self {
        let previous = SECTION.with(|current| current.replace(section.into()));
        Self { previous }
    }
}

impl Drop for LogSection {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        SECTION.with(|current| *current.borrow_mut() = previous);
    }
}

/// Section of the current thread, empty outside of module calls
pub fn current_section() -> String {
    SECTION.with(|current| current.borrow().clone())
}

/// Copies every log line to standard error and to a log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
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

/// Install the global logger.
///
/// `level` is used unless `RUST_LOG` is set. With `log_file` every line is
/// also written to that file, which is truncated first. Installing twice is
/// harmless.
pub fn init_logger(level: &str, timestamps: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    if let Some(path) = log_file {
        let file = File::create(path)?;
        builder.target(Target::Pipe(Box::new(TeeWriter { file })));
    }
    builder.format(move |buf, record| {
        if timestamps {
            let timestamp = buf.timestamp();
            write!(buf, "{} ", timestamp)?;
        }
        let section = current_section();
        if section.is_empty() {
            writeln!(buf, "({}) {}", record.level(), record.args())
        } else {
            writeln!(buf, "({}) [{}] {}", record.level(), section, record.args())
        }
    });
    if builder.try_init().is_err() {
        log::debug!("Logger already installed");
    }
    Ok(())
}
