//! Several privileged commands behind one authentication prompt
//!
//! A [`PrivilegedBatch`] is rendered into a single `sh -c` script so the
//! authentication broker is invoked once per action. The script brackets every
//! step with markers and prints its exit status, so each step still gets its
//! own outcome when the output is parsed back.

use crate::error::{Error, Result};
use crate::extents::{self, FsFamily, FILEFRAG_RESUME_OFFSET_AWK, UNSUPPORTED_LAYOUT_EXIT};
use crate::host::{CommandOutput, PrivilegedRequest};
use crate::steps::StepPolicy;

/// Stands for the offset found by an earlier [`BatchCommand::ResumeOffset`] step
pub const RESUME_OFFSET: &str = "{resume_offset}";

const MARKER: &str = "@@hibernation-helper";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    /// Run argv; [`RESUME_OFFSET`] inside an argument is expanded
    Run(Vec<String>),
    /// Run an offset query and keep its result for later steps
    ResumeOffset { family: FsFamily, query: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStep {
    pub name: String,
    pub description: String,
    pub command: BatchCommand,
}

impl BatchStep {
    /// The program this step runs
    pub fn program(&self) -> &str {
        let argv = match &self.command {
            BatchCommand::Run(argv) => argv,
            BatchCommand::ResumeOffset { query, .. } => query,
        };
        argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Interpret this step's captured output; `None` means it never ran
    pub fn result(&self, output: Option<&CommandOutput>) -> Result<CommandOutput> {
        let output = output.cloned().ok_or_else(|| {
            Error::tool(format!("{} did not run", self.description), None)
        })?;

        if let BatchCommand::ResumeOffset { .. } = self.command {
            if output.exit_code == Some(UNSUPPORTED_LAYOUT_EXIT) {
                return Err(Error::UnsupportedConfiguration(
                    output.stdout.trim().to_string(),
                ));
            }
            let output = output.check(&self.description)?;
            extents::parse_resume_offset(&output.stdout)?;
            return Ok(output);
        }

        output.check(&self.description)
    }
}

/// Privileged steps run by one escalated shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedBatch {
    pub description: String,
    pub policy: StepPolicy,
    pub steps: Vec<BatchStep>,
}

impl PrivilegedBatch {
    pub fn new(description: impl Into<String>, policy: StepPolicy) -> Self {
        Self {
            description: description.into(),
            policy,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str, request: PrivilegedRequest) {
        self.steps.push(BatchStep {
            name: name.to_string(),
            description: request.description,
            command: BatchCommand::Run(request.argv),
        });
    }

    pub fn push_resume_offset(&mut self, name: &str, family: FsFamily, query: PrivilegedRequest) {
        self.steps.push(BatchStep {
            name: name.to_string(),
            description: query.description,
            command: BatchCommand::ResumeOffset {
                family,
                query: query.argv,
            },
        });
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position of the offset query, if the batch has one
    pub fn resume_offset_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| matches!(s.command, BatchCommand::ResumeOffset { .. }))
    }

    /// The POSIX shell script that runs every step
    pub fn script(&self) -> String {
        let mut script = String::new();

        for (index, step) in self.steps.iter().enumerate() {
            script.push_str(&format!("printf '%s\\n' '{} begin {}'\n", MARKER, index));

            match &step.command {
                BatchCommand::Run(argv) => {
                    script.push_str(&render_argv(argv));
                    script.push_str(" 2>&1\nstatus=$?\n");
                }
                BatchCommand::ResumeOffset { family, query } => {
                    script.push_str(&format!("resume_offset=$({} 2>&1)", render_argv(query)));
                    if *family != FsFamily::Btrfs {
                        script.push_str(&format!(
                            " && resume_offset=$(printf '%s\\n' \"$resume_offset\" | awk {})",
                            quote(FILEFRAG_RESUME_OFFSET_AWK)
                        ));
                    }
                    script.push_str("\nstatus=$?\n");
                    // Later steps must never see a non-numeric offset
                    script.push_str(
                        "case $resume_offset in ''|*[!0-9]*) [ \"$status\" -ne 0 ] || status=1 ;; esac\n",
                    );
                    script.push_str("printf '%s\\n' \"$resume_offset\"\n");
                }
            }

            script.push_str(&format!(
                "printf '\\n%s %s\\n' '{} end {}' \"$status\"\n",
                MARKER, index
            ));
            if self.policy == StepPolicy::AbortOnFirstFailure {
                script.push_str("[ \"$status\" -eq 0 ] || exit 0\n");
            }
        }

        script
    }

    /// `sh -c <script>` as one request for the broker
    pub fn to_request(&self) -> PrivilegedRequest {
        PrivilegedRequest::new(
            self.description.clone(),
            [
                "sh".to_string(),
                "-c".to_string(),
                self.script(),
                "hibernation-helper".to_string(),
            ],
        )
    }

    /// Split the script's output into one [`CommandOutput`] per step that ran.
    ///
    /// A step that started but never printed its status (the shell was
    /// killed) is returned without an exit code.
    pub fn parse_output(&self, output: CommandOutput) -> Result<Vec<CommandOutput>> {
        let mut outputs = Vec::new();
        let mut current: Option<String> = None;

        for line in output.stdout.lines() {
            let Some(marker) = line.strip_prefix(MARKER) else {
                if let Some(buffer) = current.as_mut() {
                    buffer.push_str(line);
                    buffer.push('\n');
                }
                continue;
            };

            let fields: Vec<&str> = marker.split_whitespace().collect();
            match fields.as_slice() {
                ["begin", index] if index.parse::<usize>().ok() == Some(outputs.len()) => {
                    current = Some(String::new());
                }
                ["end", index, status] if index.parse::<usize>().ok() == Some(outputs.len()) => {
                    let stdout = current.take().unwrap_or_default();
                    outputs.push(CommandOutput {
                        exit_code: status.parse().ok(),
                        stdout: stdout.trim_end_matches('\n').to_string(),
                        stderr: String::new(),
                    });
                }
                _ => return Err(Error::Parse(format!("Unexpected batch marker: {}", line))),
            }
        }

        if let Some(partial) = current {
            outputs.push(CommandOutput {
                exit_code: None,
                stdout: partial,
                stderr: output.stderr.clone(),
            });
        }

        if outputs.is_empty() && !self.steps.is_empty() {
            output.check(&self.description)?;
            return Err(Error::tool(
                format!("{} printed no step results", self.description),
                None,
            ));
        }

        Ok(outputs)
    }
}

/// Single-quote `value` for the shell
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn render_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            arg.split(RESUME_OFFSET)
                .map(quote)
                .collect::<Vec<_>>()
                .join("\"$resume_offset\"")
        })
        .collect::<Vec<_>>()
        .join(" ")
}
