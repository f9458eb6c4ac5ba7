// Simulated Linux host for integration tests
// Interprets the argv of every command the helper runs and keeps the
// resulting swap, fstab and kernel-argument state in memory.

#![allow(dead_code)]

use hibernation_core::batch::RESUME_OFFSET;
use hibernation_core::extents::FsFamily;
use hibernation_core::steps::StepPolicy;
use hibernation_core::{
    BatchCommand, CommandOutput, Error, PrivilegedBatch, PrivilegedRequest, Result, SystemHost,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;
pub const ROOT_UUID: &str = "1b2c3d4e-5f60-4a7b-8c9d-0e1f2a3b4c5d";
pub const PARTITION_UUID: &str = "9f8e7d6c-5b4a-4392-8170-6f5e4d3c2b1a";
/// Offset reported for a contiguous swap file on ext4 and xfs
pub const EXT_RESUME_OFFSET: u64 = 34816;
/// Offset `btrfs inspect-internal map-swapfile -r` reports
pub const BTRFS_RESUME_OFFSET: u64 = 533760;

#[derive(Debug, Clone)]
pub struct ActiveSwap {
    pub path: PathBuf,
    pub kind: &'static str,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct State {
    pub ram_bytes: u64,
    pub free_bytes: u64,
    pub fstype: String,
    pub swaps: Vec<ActiveSwap>,
    /// Regular files by size
    pub files: HashMap<PathBuf, u64>,
    pub fstab: String,
    /// Arguments the bootloader passes on next boot
    pub kernel_args: String,
    /// Arguments of the running kernel
    pub cmdline: String,
    pub fragmented: bool,
    /// Program whose privileged runs are refused by the broker
    pub deny: Option<&'static str>,
    /// Program whose privileged runs exit with status 1
    pub fail: Option<&'static str>,
    pub privileged: Vec<Vec<String>>,
    /// Times the authentication broker was started
    pub escalations: usize,
}

pub struct SimulatedHost {
    pub state: Mutex<State>,
}

impl SimulatedHost {
    pub fn new(ram_bytes: u64) -> Self {
        Self {
            state: Mutex::new(State {
                ram_bytes,
                free_bytes: 100 * GIB,
                fstype: "ext4".to_string(),
                swaps: Vec::new(),
                files: HashMap::new(),
                fstab: format!("UUID={} / ext4 defaults 1 1\n", ROOT_UUID),
                kernel_args: "ro rhgb quiet".to_string(),
                cmdline: "BOOT_IMAGE=/vmlinuz ro rhgb quiet".to_string(),
                fragmented: false,
                deny: None,
                fail: None,
                privileged: Vec::new(),
                escalations: 0,
            }),
        }
    }

    pub fn with_swap(self, path: &str, kind: &'static str, size_bytes: u64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.swaps.push(ActiveSwap {
                path: PathBuf::from(path),
                kind,
                size_bytes,
            });
            if kind == "file" {
                state.files.insert(PathBuf::from(path), size_bytes);
            }
        }
        self
    }

    pub fn with_fstype(self, fstype: &str) -> Self {
        self.state.lock().unwrap().fstype = fstype.to_string();
        self
    }

    pub fn privileged_calls(&self) -> usize {
        self.state.lock().unwrap().escalations
    }

    pub fn with_kernel_args(self, args: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.kernel_args = format!("ro rhgb quiet {}", args);
            state.cmdline = format!("BOOT_IMAGE=/vmlinuz ro rhgb quiet {}", args);
        }
        self
    }

    /// Boot with the configured kernel arguments
    pub fn reboot(&self) {
        let mut state = self.state.lock().unwrap();
        state.cmdline = format!("BOOT_IMAGE=/vmlinuz {}", state.kernel_args);
    }

    pub fn privileged_programs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .privileged
            .iter()
            .map(|argv| argv[0].clone())
            .collect()
    }

    pub fn swap_active(&self, path: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .swaps
            .iter()
            .any(|s| s.path == Path::new(path))
    }
}

fn output(exit_code: i32, stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: Some(exit_code),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl State {
    /// What the batch script prints for an offset query
    fn resume_offset(&self, family: FsFamily, path: &str) -> CommandOutput {
        if !self.files.contains_key(Path::new(path)) {
            return failed(&format!("{}: No such file or directory", path));
        }
        match family {
            FsFamily::Btrfs => output(0, format!("{}\n", BTRFS_RESUME_OFFSET)),
            FsFamily::Ext | FsFamily::Xfs if self.fragmented => output(
                3,
                format!("{}: swap file is split into 2 non-contiguous physical runs\n", path),
            ),
            FsFamily::Ext | FsFamily::Xfs => output(0, format!("{}\n", EXT_RESUME_OFFSET)),
        }
    }

    fn execute(&mut self, argv: &[String]) -> CommandOutput {
        self.privileged.push(argv.to_vec());

        let program = argv[0].as_str();
        if self.fail == Some(program) {
            return failed(&format!("{}: simulated failure", program));
        }

        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["dd", _, of, _, count, _] => {
                let path = PathBuf::from(of.trim_start_matches("of="));
                let mib: u64 = count.trim_start_matches("count=").parse().unwrap();
                self.free_bytes = self.free_bytes.saturating_sub(mib * MIB);
                self.files.insert(path, mib * MIB);
                output(0, "")
            }
            ["btrfs", "filesystem", "mkswapfile", "--size", size, path] => {
                let mib: u64 = size.trim_end_matches('m').parse().unwrap();
                self.free_bytes = self.free_bytes.saturating_sub(mib * MIB);
                self.files.insert(PathBuf::from(path), mib * MIB);
                output(0, "")
            }
            ["chmod", "600", path] | ["mkswap", path] => {
                if self.files.contains_key(Path::new(path)) {
                    output(0, "")
                } else {
                    failed("No such file or directory")
                }
            }
            ["swapon", path] => match self.files.get(Path::new(path)).copied() {
                Some(size) => {
                    self.swaps.push(ActiveSwap {
                        path: PathBuf::from(path),
                        kind: "file",
                        size_bytes: size,
                    });
                    output(0, "")
                }
                None => failed("No such file or directory"),
            },
            ["swapoff", path] => {
                self.swaps.retain(|s| s.path != Path::new(path));
                output(0, "")
            }
            ["rm", "-f", path] => {
                if let Some(size) = self.files.remove(Path::new(path)) {
                    self.free_bytes += size;
                }
                output(0, "")
            }
            ["sh", "-c", _, "sh", line, _fstab] => {
                self.fstab.push_str(line);
                self.fstab.push('\n');
                output(0, "")
            }
            ["sed", "-i", address, _fstab] => {
                let path = address
                    .trim_start_matches("\\|^")
                    .split("[[:space:]]")
                    .next()
                    .unwrap()
                    .to_string();
                self.fstab = self
                    .fstab
                    .lines()
                    .filter(|l| l.split_whitespace().next() != Some(path.as_str()))
                    .map(|l| format!("{}\n", l))
                    .collect();
                output(0, "")
            }
            ["grubby", "--update-kernel=ALL", change] => {
                if let Some(removed) = change.strip_prefix("--remove-args=") {
                    let names: Vec<&str> = removed.split_whitespace().collect();
                    self.kernel_args = self
                        .kernel_args
                        .split_whitespace()
                        .filter(|arg| !names.contains(&arg.split('=').next().unwrap_or(arg)))
                        .collect::<Vec<_>>()
                        .join(" ");
                } else if let Some(added) = change.strip_prefix("--args=") {
                    self.kernel_args = format!("{} {}", self.kernel_args, added);
                }
                output(0, "")
            }
            other => panic!("unexpected privileged command {:?}", other),
        }
    }
}

impl SystemHost for SimulatedHost {
    fn read_file(&self, path: &Path) -> Result<String> {
        let state = self.state.lock().unwrap();
        match path.to_str() {
            Some("/proc/meminfo") => Ok(format!(
                "MemTotal:       {} kB\nMemFree:         123456 kB\n",
                state.ram_bytes / 1024
            )),
            Some("/proc/cmdline") => Ok(format!("{}\n", state.cmdline)),
            Some("/sys/power/state") => Ok("freeze mem disk\n".to_string()),
            Some("/etc/fstab") => Ok(state.fstab.clone()),
            _ => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    fn free_space_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(self.state.lock().unwrap().free_bytes)
    }

    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let state = self.state.lock().unwrap();
        match argv {
            ["swapon", ..] => Ok(output(
                0,
                state
                    .swaps
                    .iter()
                    .map(|s| format!("{} {} {} 0 -2\n", s.path.display(), s.kind, s.size_bytes))
                    .collect::<String>(),
            )),
            ["grubby", "--info=DEFAULT"] => Ok(output(
                0,
                format!(
                    "index=0\nkernel=\"/boot/vmlinuz\"\nargs=\"{}\"\n",
                    state.kernel_args
                ),
            )),
            ["findmnt", ..] => Ok(output(0, format!("{} {}\n", state.fstype, ROOT_UUID))),
            ["lsblk", ..] => Ok(output(0, format!("{}\n", PARTITION_UUID))),
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .copied()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ))
            })
    }

    fn run_privileged(&self, request: &PrivilegedRequest) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.escalations += 1;
        if state.deny == Some(request.program()) {
            return Err(Error::PermissionDenied(
                "authentication dialog dismissed (pkexec exit code 126)".to_string(),
            ));
        }
        Ok(state.execute(&request.argv))
    }

    /// One escalation for the whole batch, then each step in order
    fn run_privileged_batch(&self, batch: &PrivilegedBatch) -> Result<Vec<CommandOutput>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().unwrap();
        state.escalations += 1;
        if batch.steps.iter().any(|step| state.deny == Some(step.program())) {
            return Err(Error::PermissionDenied(
                "authentication dialog dismissed (pkexec exit code 126)".to_string(),
            ));
        }

        let mut resume_offset: Option<String> = None;
        let mut outputs = Vec::new();
        for step in &batch.steps {
            let result = match &step.command {
                BatchCommand::Run(argv) => {
                    let argv: Vec<String> = argv
                        .iter()
                        .map(|arg| match &resume_offset {
                            Some(offset) => arg.replace(RESUME_OFFSET, offset),
                            None => arg.clone(),
                        })
                        .collect();
                    state.execute(&argv)
                }
                BatchCommand::ResumeOffset { family, query } => {
                    state.privileged.push(query.clone());
                    let path = query.last().map(String::as_str).unwrap_or_default();
                    let result = state.resume_offset(*family, path);
                    if result.success() {
                        resume_offset = Some(result.stdout.trim().to_string());
                    }
                    result
                }
            };

            let ok = result.success();
            outputs.push(result);
            if !ok && batch.policy == StepPolicy::AbortOnFirstFailure {
                break;
            }
        }
        Ok(outputs)
    }
}
