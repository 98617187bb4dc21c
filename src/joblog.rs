use chrono::Local;
use colored::{ColoredString, Colorize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Severity of one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }

    fn colored_label(self) -> ColoredString {
        match self {
            Level::Info => self.label().green(),
            Level::Warning => self.label().yellow(),
            Level::Error => self.label().red(),
        }
    }
}

/// A log sink owned by a single job.
///
/// Every record becomes one `timestamp - LEVEL - message` line in the
/// backing file. The aggregate run sink additionally echoes each line to
/// stdout with the level colored. Writes are serialized internally, so one
/// sink can be shared by reference across pool workers.
pub struct JobLog {
    file: Mutex<File>,
    echo_stdout: bool,
}

impl JobLog {
    /// Opens `path` in append mode, creating it if needed.
    pub fn create(path: &Path, echo_stdout: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JobLog {
            file: Mutex::new(file),
            echo_stdout,
        })
    }

    /// Write failures are swallowed; logging must never take down a job.
    pub fn log(&self, level: Level, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{timestamp} - {} - {message}", level.label());
        }
        if self.echo_stdout {
            println!("{timestamp} - {} - {message}", level.colored_label());
        }
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Banner line opening a run or course log.
    pub fn banner(&self) {
        self.info(&"/".repeat(62));
    }

    /// Separator line between per-image blocks.
    pub fn separator(&self) {
        self.info(&"-".repeat(62));
    }
}
