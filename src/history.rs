//! Version-history lookups. A [`VersionHistory`] returns the commit log for a
//! repository or for a single file within it, newest first. The build only
//! uses it to default a post's `created`/`updated` dates and to hand the
//! repository log to the main listing page; when history is unavailable the
//! build degrades instead of failing.

use chrono::{DateTime, FixedOffset};
use std::io;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// A single commit record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// The full commit hash.
    pub id: String,

    /// The author's name.
    pub author: String,

    /// The author's email address.
    pub email: String,

    /// The author date.
    pub timestamp: DateTime<FixedOffset>,

    /// The commit subject line.
    pub message: String,
}

/// Retrieves commit logs. Implementations must be usable from several build
/// threads at once.
pub trait VersionHistory: Sync {
    /// Returns the commits touching `file` (or the whole repository when
    /// `file` is `None`), newest first. `workdir` is the directory the query
    /// runs from.
    fn log(&self, workdir: &Path, file: Option<&Path>) -> Result<Vec<Commit>>;
}

/// Reads history by running `git log`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GitHistory;

/// A history source that never has any commits. Used when history lookups
/// are disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHistory;

// ASCII unit separator between fields; one commit per line.
const FIELD_SEPARATOR: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%s";

impl VersionHistory for GitHistory {
    fn log(&self, workdir: &Path, file: Option<&Path>) -> Result<Vec<Commit>> {
        let mut command = Command::new("git");
        command.current_dir(workdir).arg("log").arg(LOG_FORMAT);
        if let Some(file) = file {
            command.arg("--follow").arg("--").arg(file);
        }

        let output = command.output().map_err(Error::Spawn)?;
        if !output.status.success() {
            return Err(Error::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        parse_log(&String::from_utf8_lossy(&output.stdout))
    }
}

impl VersionHistory for NoHistory {
    fn log(&self, _workdir: &Path, _file: Option<&Path>) -> Result<Vec<Commit>> {
        Ok(Vec::new())
    }
}

/// Parses the output of `git log` run with [`LOG_FORMAT`]. Blank lines are
/// ignored.
pub fn parse_log(output: &str) -> Result<Vec<Commit>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_commit)
        .collect()
}

fn parse_commit(line: &str) -> Result<Commit> {
    let fields: Vec<&str> = line.splitn(5, FIELD_SEPARATOR).collect();
    match fields.as_slice() {
        [id, author, email, timestamp, message] => Ok(Commit {
            id: (*id).to_owned(),
            author: (*author).to_owned(),
            email: (*email).to_owned(),
            timestamp: DateTime::parse_from_rfc3339(timestamp).map_err(|err| {
                Error::Malformed {
                    line: line.to_owned(),
                    reason: err.to_string(),
                }
            })?,
            message: (*message).to_owned(),
        }),
        _ => Err(Error::Malformed {
            line: line.to_owned(),
            reason: format!("expected 5 fields, found {}", fields.len()),
        }),
    }
}

/// The result of a history lookup.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons history may be unavailable. None of these are fatal to a build.
#[derive(Debug, Error)]
pub enum Error {
    /// The `git` executable could not be started.
    #[error("running git: {0}")]
    Spawn(#[source] io::Error),

    /// `git log` exited unsuccessfully (e.g., not a repository).
    #[error("git log failed: {0}")]
    Failed(String),

    /// A line of `git log` output could not be parsed.
    #[error("unrecognized git log line `{line}`: {reason}")]
    Malformed { line: String, reason: String },
}
