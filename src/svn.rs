//! Subversion collaborators.
//!
//! Implements [`SourceHistory`] and [`Destination`] by driving the stock
//! Subversion command-line tools as subprocesses:
//!
//! - `svn log -q -r 0:HEAD` — one-shot listing of a source's revision
//!   timestamps;
//! - `svnadmin dump --incremental -r N` — the raw bytes of one revision;
//! - `svn mkdir` — namespace creation in the destination (one commit);
//! - `svnadmin load --ignore-uuid --parent-dir` — committing a rewritten
//!   revision under its namespace;
//! - `svnlook youngest` — lock-step verification.
//!
//! There is no library form of `svnadmin`, so unlike a git backend this
//! layer is subprocess-only. All repositories are addressed by local path;
//! URL-form access uses `file://` URLs derived from the canonicalized path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, trace};

use crate::merge::{Destination, SourceHistory};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the Subversion subprocess layer.
#[derive(Debug, Error)]
pub enum SvnError {
    /// The repository path does not exist.
    #[error("repository does not exist: {}", path.display())]
    RepositoryNotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The repository path cannot be used (no final component, or not
    /// representable as a `file://` URL).
    #[error("cannot use repository path {}: {reason}", path.display())]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A Subversion command exited unsuccessfully.
    #[error("`{command}` failed{}: {stderr}", exit_code.map_or_else(String::new, |c| format!(" (exit code {c})")))]
    CommandFailed {
        /// The full command line that was run.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A line of `svn log` output did not match the expected shape.
    #[error("could not parse `svn log` line {line:?}: {reason}")]
    LogParse {
        /// The offending line.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The revision list from `svn log` was not exactly r0, r1, … rN.
    #[error("revision list from `svn log` is not sequential: expected r{expected}, found r{found}")]
    NonSequentialLog {
        /// The revision number expected at this position.
        expected: u64,
        /// The revision number actually listed.
        found: u64,
    },

    /// `svnlook youngest` printed something other than a revision number.
    #[error("unexpected `svnlook youngest` output {output:?}")]
    YoungestParse {
        /// The raw output.
        output: String,
    },

    /// Spawning or talking to a subprocess failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tool paths
// ---------------------------------------------------------------------------

/// Locations of the Subversion binaries.
///
/// Defaults to bare command names resolved through `PATH`; overridable via
/// `svnmeld.toml` for hosts with several installations.
#[derive(Clone, Debug)]
pub struct SvnTools {
    /// The `svn` client binary.
    pub svn: PathBuf,
    /// The `svnadmin` binary.
    pub svnadmin: PathBuf,
    /// The `svnlook` binary.
    pub svnlook: PathBuf,
}

impl Default for SvnTools {
    fn default() -> Self {
        Self {
            svn: PathBuf::from("svn"),
            svnadmin: PathBuf::from("svnadmin"),
            svnlook: PathBuf::from("svnlook"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subprocess helpers
// ---------------------------------------------------------------------------

/// Render a command for error messages: program followed by its arguments.
fn describe(cmd: &Command) -> String {
    let mut s = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        s.push(' ');
        s.push_str(&arg.to_string_lossy());
    }
    s
}

/// Run a command and return its stdout bytes, failing on non-zero exit.
fn run_stdout(mut cmd: Command) -> Result<Vec<u8>, SvnError> {
    let command = describe(&cmd);
    trace!(%command, "running subversion command");
    let output = cmd.output()?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(SvnError::CommandFailed {
            command,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Run a command with `input` piped to stdin, failing on non-zero exit.
fn run_with_stdin(mut cmd: Command, input: &[u8]) -> Result<(), SvnError> {
    let command = describe(&cmd);
    trace!(%command, bytes = input.len(), "running subversion command with piped input");
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin unavailable"))?;
    stdin.write_all(input)?;
    drop(stdin);
    let output = child.wait_with_output()?;
    if output.status.success() {
        trace!(stdout = %String::from_utf8_lossy(&output.stdout), "command output");
        Ok(())
    } else {
        Err(SvnError::CommandFailed {
            command,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// `file://` URL for a local repository path.
///
/// The path is canonicalized first, so relative paths and trailing slashes
/// are fine; the result is absolute and starts with `/`.
fn file_url(path: &Path) -> Result<String, SvnError> {
    let canonical = path
        .canonicalize()
        .map_err(|_| SvnError::RepositoryNotFound {
            path: path.to_owned(),
        })?;
    let Some(s) = canonical.to_str() else {
        return Err(SvnError::InvalidPath {
            path: path.to_owned(),
            reason: "path is not valid UTF-8 and cannot form a file:// URL".to_owned(),
        });
    };
    Ok(format!("file://{s}"))
}

/// The namespace name for a repository path: its final component.
fn namespace_for(path: &Path) -> Result<String, SvnError> {
    let canonical = path
        .canonicalize()
        .map_err(|_| SvnError::RepositoryNotFound {
            path: path.to_owned(),
        })?;
    canonical
        .file_name()
        .and_then(|n| n.to_str())
        .map(ToOwned::to_owned)
        .ok_or_else(|| SvnError::InvalidPath {
            path: path.to_owned(),
            reason: "path has no usable final component to name a namespace after".to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Log parsing
// ---------------------------------------------------------------------------

/// One `rN | author | date` entry from `svn log -q` output.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogEntry {
    revision: u64,
    timestamp: DateTime<Utc>,
}

/// Parse the plain `svn log -q` output: separator lines of dashes between
/// `rN | author | date` entries. With `-r 0:HEAD` the entries arrive in
/// ascending revision order.
fn parse_log_output(output: &str) -> Result<Vec<LogEntry>, SvnError> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("----") {
            continue;
        }
        entries.push(parse_log_line(line)?);
    }
    Ok(entries)
}

fn parse_log_line(line: &str) -> Result<LogEntry, SvnError> {
    let err = |reason| SvnError::LogParse {
        line: line.to_owned(),
        reason,
    };

    let mut fields = line.splitn(3, " | ");
    let rev_field = fields.next().ok_or_else(|| err("empty line"))?;
    let _author = fields.next().ok_or_else(|| err("missing author field"))?;
    let date_field = fields.next().ok_or_else(|| err("missing date field"))?;

    let revision = rev_field
        .strip_prefix('r')
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| err("revision field is not rN"))?;

    // The date field is `2006-05-09 21:31:10 +0000 (Tue, 09 May 2006)`;
    // the parenthesized human-readable form is optional and ignored.
    let date_part = date_field
        .split(" (")
        .next()
        .unwrap_or(date_field)
        .trim();
    let timestamp = DateTime::parse_from_str(date_part, "%Y-%m-%d %H:%M:%S %z")
        .map_err(|_| err("unparsable timestamp"))?
        .with_timezone(&Utc);

    Ok(LogEntry {
        revision,
        timestamp,
    })
}

/// Turn the ascending log entries into the timestamp list the scheduler
/// wants: index 0 = revision 1.
///
/// Every repository has an r0 (its creation); that entry is dropped, and
/// the rest must be exactly r1..rN in order — anything else means the log
/// output cannot be trusted as a revision index.
fn timestamps_from_entries(entries: &[LogEntry]) -> Result<Vec<DateTime<Utc>>, SvnError> {
    let mut expected = 0_u64;
    let mut timestamps = Vec::with_capacity(entries.len().saturating_sub(1));
    for entry in entries {
        if entry.revision != expected {
            return Err(SvnError::NonSequentialLog {
                expected,
                found: entry.revision,
            });
        }
        if expected > 0 {
            timestamps.push(entry.timestamp);
        }
        expected += 1;
    }
    if expected == 0 {
        return Err(SvnError::LogParse {
            line: String::new(),
            reason: "log output contained no revisions",
        });
    }
    Ok(timestamps)
}

// ---------------------------------------------------------------------------
// SvnSource
// ---------------------------------------------------------------------------

/// One source repository, addressed by local path.
#[derive(Clone, Debug)]
pub struct SvnSource {
    path: PathBuf,
    url: String,
    name: String,
    tools: SvnTools,
}

impl SvnSource {
    /// Open a source repository.
    ///
    /// # Errors
    /// [`SvnError::RepositoryNotFound`] if the path does not exist;
    /// [`SvnError::InvalidPath`] if it cannot name a namespace.
    pub fn open(path: &Path, tools: SvnTools) -> Result<Self, SvnError> {
        let url = file_url(path)?;
        let name = namespace_for(path)?;
        Ok(Self {
            path: path.to_owned(),
            url,
            name,
            tools,
        })
    }

    /// The repository path this source was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceHistory for SvnSource {
    type Error = SvnError;

    fn name(&self) -> &str {
        &self.name
    }

    fn revision_timestamps(&self) -> Result<Vec<DateTime<Utc>>, SvnError> {
        debug!(source = %self.name, url = %self.url, "loading revision dates");
        let mut cmd = Command::new(&self.tools.svn);
        cmd.args(["log", "-q", "-r", "0:HEAD", "--non-interactive"])
            .arg(&self.url);
        let stdout = run_stdout(cmd)?;
        let text = String::from_utf8_lossy(&stdout);
        let entries = parse_log_output(&text)?;
        timestamps_from_entries(&entries)
    }

    fn revision_dump(&self, rev: u64) -> Result<Vec<u8>, SvnError> {
        let mut cmd = Command::new(&self.tools.svnadmin);
        cmd.arg("dump")
            .arg(&self.path)
            .args(["--incremental", "-r"])
            .arg(rev.to_string());
        run_stdout(cmd)
    }
}

// ---------------------------------------------------------------------------
// SvnDestination
// ---------------------------------------------------------------------------

/// The combined repository, addressed by local path.
///
/// Namespace creation commits through the `file://` URL with a fixed
/// message and username; loads go through `svnadmin load --ignore-uuid`
/// so each source's UUID does not clobber the destination's.
#[derive(Clone, Debug)]
pub struct SvnDestination {
    path: PathBuf,
    url: String,
    tools: SvnTools,
    username: String,
    mkdir_message: String,
}

impl SvnDestination {
    /// Open the destination repository.
    ///
    /// # Errors
    /// [`SvnError::RepositoryNotFound`] if the path does not exist.
    pub fn open(
        path: &Path,
        tools: SvnTools,
        username: String,
        mkdir_message: String,
    ) -> Result<Self, SvnError> {
        let url = file_url(path)?;
        Ok(Self {
            path: path.to_owned(),
            url,
            tools,
            username,
            mkdir_message,
        })
    }
}

impl Destination for SvnDestination {
    type Error = SvnError;

    fn create_namespace(&mut self, name: &str) -> Result<(), SvnError> {
        let mut cmd = Command::new(&self.tools.svn);
        cmd.arg("mkdir")
            .arg(format!("{}/{name}", self.url))
            .args(["--non-interactive", "-m"])
            .arg(&self.mkdir_message)
            .arg("--username")
            .arg(&self.username);
        run_stdout(cmd).map(drop)
    }

    fn load_revision(&mut self, namespace: &str, dump: &[u8]) -> Result<(), SvnError> {
        let mut cmd = Command::new(&self.tools.svnadmin);
        cmd.arg("load")
            .arg(&self.path)
            .args(["--ignore-uuid", "--parent-dir"])
            .arg(format!("/{namespace}"));
        run_with_stdin(cmd, dump)
    }

    fn committed_revision(&self) -> Result<u64, SvnError> {
        let mut cmd = Command::new(&self.tools.svnlook);
        cmd.arg("youngest").arg(&self.path);
        let stdout = run_stdout(cmd)?;
        let text = String::from_utf8_lossy(&stdout);
        text.trim()
            .parse::<u64>()
            .map_err(|_| SvnError::YoungestParse {
                output: text.trim().to_owned(),
            })
    }
}
