//! Boundary to the host operating system
//!
//! Everything the helper learns about or changes on the machine goes through
//! [`SystemHost`]: file reads, free-space queries and external commands, both
//! unprivileged and privileged. [`LinuxHost`] is the real implementation; tests
//! substitute scripted hosts.

use crate::batch::PrivilegedBatch;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

/// pkexec: the user dismissed the authentication dialog
pub const PKEXEC_DISMISSED: i32 = 126;

/// pkexec: not authorized, or authentication failed
pub const PKEXEC_NOT_AUTHORIZED: i32 = 127;

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into a tool failure naming `what`
    pub fn check(self, what: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }

        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        let status = match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "killed by signal".to_string(),
        };

        Err(Error::tool(
            if detail.is_empty() {
                format!("{} failed ({})", what, status)
            } else {
                format!("{} failed ({}): {}", what, status, detail)
            },
            self.exit_code,
        ))
    }
}

/// A command to run with root privileges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedRequest {
    pub argv: Vec<String>,
    /// Shown in logs and used in failure messages
    pub description: String,
}

impl PrivilegedRequest {
    pub fn new<I, S>(description: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            description: description.into(),
        }
    }

    /// The program being run, for matching in tests and logs
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for PrivilegedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.description, self.argv.join(" "))
    }
}

/// Operations the helper needs from the machine
pub trait SystemHost: Send + Sync {
    /// Read a whole text file
    fn read_file(&self, path: &Path) -> Result<String>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Size of a file in bytes
    fn file_size(&self, path: &Path) -> Result<u64>;

    /// Bytes available to unprivileged users on the filesystem holding `path`
    fn free_space_bytes(&self, path: &Path) -> Result<u64>;

    /// Run a read-only command as the current user.
    /// A non-zero exit is returned as output, not as an error.
    fn run(&self, argv: &[&str]) -> Result<CommandOutput>;

    /// Run a command through the authentication broker.
    /// Denial becomes [`Error::PermissionDenied`]; other exits are returned as output.
    fn run_privileged(&self, request: &PrivilegedRequest) -> Result<CommandOutput>;

    /// Run every step of `batch` under a single escalation.
    ///
    /// Returns one output per step that ran, in order. An empty batch does
    /// not escalate at all.
    fn run_privileged_batch(&self, batch: &PrivilegedBatch) -> Result<Vec<CommandOutput>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let output = self.run_privileged(&batch.to_request())?;
        batch.parse_output(output)
    }
}

/// The local Linux machine
pub struct LinuxHost {
    escalation: Vec<String>,
    timeout: Duration,
}

impl LinuxHost {
    pub fn new(escalation: Vec<String>, timeout: Duration) -> Self {
        Self {
            escalation,
            timeout,
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(
            config.privilege.escalation_command.clone(),
            config.command_timeout(),
        )
    }

    /// Run `request` behind the escalation prefix, mapping broker refusals
    fn escalate(&self, request: &PrivilegedRequest, timeout: Duration) -> Result<CommandOutput> {
        debug!("Privileged: {}", request.description);

        let argv: Vec<String> = self
            .escalation
            .iter()
            .chain(request.argv.iter())
            .cloned()
            .collect();
        let output = self.execute(&argv, timeout)?;

        if self.escalation.is_empty() {
            return Ok(output);
        }

        match output.exit_code {
            Some(PKEXEC_DISMISSED) => Err(Error::PermissionDenied(format!(
                "authentication was cancelled while trying to {}",
                request.description
            ))),
            Some(PKEXEC_NOT_AUTHORIZED) => Err(Error::PermissionDenied(format!(
                "not authorized to {}",
                request.description
            ))),
            _ => Ok(output),
        }
    }

    /// Spawn `argv`, wait for it under the timeout and capture its output.
    ///
    /// Uses a dedicated current-thread runtime so callers stay synchronous; it
    /// must therefore be called from a plain thread, not from async code.
    fn execute(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::tool("empty command line", None))?;

        debug!("Running: {}", argv.join(" "));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let output = runtime.block_on(async {
            let child = tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output();

            tokio::time::timeout(timeout, child).await
        });

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::tool(format!("{} is not installed", program), None));
            }
            Ok(Err(e)) => {
                return Err(Error::tool(format!("Failed to run {}: {}", program, e), None));
            }
            Err(_) => {
                warn!("{} timed out after {:?}", program, timeout);
                return Err(Error::tool(
                    format!("{} did not finish within {}s", program, timeout.as_secs()),
                    None,
                ));
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!("{} exited with {:?}", program, result.exit_code);
        Ok(result)
    }
}

impl SystemHost for LinuxHost {
    fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn free_space_bytes(&self, path: &Path) -> Result<u64> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|e| {
            Error::tool(format!("statvfs {} failed: {}", path.display(), e), None)
        })?;
        Ok(stat.fragment_size() as u64 * stat.blocks_available() as u64)
    }

    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.execute(&argv, self.timeout)
    }

    fn run_privileged(&self, request: &PrivilegedRequest) -> Result<CommandOutput> {
        self.escalate(request, self.timeout)
    }

    /// The whole batch shares one timeout, scaled by its number of steps
    fn run_privileged_batch(&self, batch: &PrivilegedBatch) -> Result<Vec<CommandOutput>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let steps = u32::try_from(batch.steps.len()).unwrap_or(u32::MAX);
        let output = self.escalate(&batch.to_request(), self.timeout.saturating_mul(steps))?;
        batch.parse_output(output)
    }
}
