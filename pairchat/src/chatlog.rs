//! Exporting a conversation history to a text file.
//!
//! Files land in the chat-log directory as
//! `<local>_<contact>_<MM-DD-YY>_<HH-MM-SS>.txt`, one history line per row.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Directory used when none is configured.
pub const DEFAULT_CHAT_LOG_DIR: &str = "./ChatLogs";

/// Errors that can occur when saving a chat log.
#[derive(Debug, thiserror::Error)]
pub enum ChatLogError {
    /// There is nothing to save.
    #[error("no messages with {0} to save")]
    EmptyHistory(String),

    /// The directory or file could not be written.
    #[error("failed to write chat log {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// File name for a log of `local`'s conversation with `contact` saved at `at`.
#[must_use]
pub fn file_name(local: &str, contact: &str, at: DateTime<Local>) -> String {
    format!("{local}_{contact}_{}.txt", at.format("%m-%d-%y_%H-%M-%S"))
}

/// Writes `lines` to a new file under `dir` and returns its path.
///
/// `dir` is created if missing. An existing file with the same name is
/// overwritten.
///
/// # Errors
///
/// Returns [`ChatLogError::EmptyHistory`] if `lines` is empty, or
/// [`ChatLogError::Io`] if the directory or file cannot be written.
pub fn export(
    dir: &Path,
    local: &str,
    contact: &str,
    lines: &[String],
    at: DateTime<Local>,
) -> Result<PathBuf, ChatLogError> {
    if lines.is_empty() {
        return Err(ChatLogError::EmptyHistory(contact.to_string()));
    }
    fs::create_dir_all(dir).map_err(|source| ChatLogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(file_name(local, contact, at));
    write_lines(&path, lines).map_err(|source| ChatLogError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), lines = lines.len(), "chat log saved");
    Ok(path)
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
