use crate::error::{Error, FailureKind, Result};
use byte_unit::{Byte, UnitType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Bytes in one MiB
pub const MIB: u64 = 1024 * 1024;

/// Size of the swap signature page that `mkswap` reserves
pub const SWAP_HEADER_BYTES: u64 = 4096;

/// Swap size needed to hold a hibernation image of `ram_bytes`.
///
/// The header page is added before rounding up to a whole MiB, so the usable
/// swap area reported by `swapon` is never smaller than RAM.
pub fn required_swap_bytes(ram_bytes: u64) -> u64 {
    let with_header = ram_bytes.saturating_add(SWAP_HEADER_BYTES);
    with_header.div_ceil(MIB).saturating_mul(MIB)
}

/// Human readable binary size, e.g. "7.6 GiB"
pub fn format_bytes(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{:.1}", adjusted)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapKind {
    None,
    Partition,
    File,
}

impl fmt::Display for SwapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapKind::None => write!(f, "none"),
            SwapKind::Partition => write!(f, "partition"),
            SwapKind::File => write!(f, "file"),
        }
    }
}

/// One active swap area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEntry {
    pub path: PathBuf,
    pub kind: SwapKind,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub priority: i32,
}

impl SwapEntry {
    /// zram lives in RAM and cannot hold a hibernation image
    pub fn is_zram(&self) -> bool {
        self.path.to_string_lossy().starts_with("/dev/zram")
    }
}

/// `resume=` and `resume_offset=` kernel arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeParameter {
    pub device: String,
    pub offset: Option<u64>,
}

impl ResumeParameter {
    /// Extract resume arguments from a whitespace separated argument list.
    /// The last occurrence wins, as it does for the kernel. A `resume_offset`
    /// that is not a number is an error rather than a missing offset.
    pub fn from_args(args: &str) -> Result<Option<Self>> {
        let mut device = None;
        let mut offset = None;

        for token in args.split_whitespace() {
            if let Some(value) = token.strip_prefix("resume=") {
                device = Some(value.to_string());
            } else if let Some(value) = token.strip_prefix("resume_offset=") {
                let parsed = value.parse::<u64>().map_err(|e| {
                    Error::Parse(format!("resume_offset={} is not a block offset: {}", value, e))
                })?;
                offset = Some(parsed);
            }
        }

        Ok(device
            .filter(|d| !d.is_empty())
            .map(|device| Self { device, offset }))
    }

    /// Render as kernel arguments
    pub fn to_args(&self) -> String {
        match self.offset {
            Some(offset) => format!("resume={} resume_offset={}", self.device, offset),
            None => format!("resume={}", self.device),
        }
    }
}

impl fmt::Display for ResumeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (offset {})", self.device, offset),
            None => write!(f, "{}", self.device),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelSupport {
    Supported,
    Unsupported,
    Unknown,
}

/// A probe that could not be read; the matching report field stays unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub field: String,
    pub message: String,
}

/// Snapshot of everything hibernation depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub total_ram_bytes: Option<u64>,
    pub swaps: Vec<SwapEntry>,
    pub swap_kind: SwapKind,
    pub swap_size_bytes: u64,
    pub swap_path: Option<PathBuf>,
    /// Resume arguments of the running kernel
    pub resume: Option<ResumeParameter>,
    /// Resume arguments the bootloader passes on next boot
    pub configured_resume: Option<ResumeParameter>,
    pub kernel_support: KernelSupport,
    pub lockdown: Option<String>,
    pub managed_swap_file_present: bool,
    /// Size of the managed swap file when it exists, active or not
    pub managed_swap_file_bytes: Option<u64>,
    pub free_space_bytes: Option<u64>,
    pub probe_errors: Vec<ProbeError>,
}

impl ReadinessReport {
    pub fn resume_parameter_present(&self) -> bool {
        self.resume.is_some()
    }

    pub fn resume_parameter_value(&self) -> Option<String> {
        self.resume.as_ref().map(|r| r.to_args())
    }

    /// The running kernel refuses to hibernate
    pub fn kernel_blocks_hibernation(&self) -> bool {
        self.kernel_support == KernelSupport::Unsupported || self.lockdown.is_some()
    }

    /// Active swap areas that can hold a hibernation image
    pub fn disk_swaps(&self) -> impl Iterator<Item = &SwapEntry> {
        self.swaps.iter().filter(|s| !s.is_zram())
    }

    pub fn is_swap_active(&self, path: &std::path::Path) -> bool {
        self.swaps.iter().any(|s| s.path == path)
    }

    pub fn verdict(&self) -> Verdict {
        if self.kernel_blocks_hibernation() {
            return Verdict::KernelUnsupported;
        }

        let Some(ram) = self.total_ram_bytes else {
            return Verdict::Unknown;
        };

        if self.swap_size_bytes < ram {
            return Verdict::InsufficientSwap {
                required: ram,
                available: self.swap_size_bytes,
            };
        }

        if self.resume.is_some() {
            Verdict::Ready
        } else if self.configured_resume.is_some() {
            Verdict::RebootRequired
        } else {
            Verdict::ResumeNotConfigured
        }
    }

    /// Swap and resume arguments are in place, possibly pending a reboot
    pub fn is_configured(&self) -> bool {
        matches!(self.verdict(), Verdict::Ready | Verdict::RebootRequired)
    }
}

/// Overall readiness derived from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    RebootRequired,
    InsufficientSwap { required: u64, available: u64 },
    ResumeNotConfigured,
    KernelUnsupported,
    Unknown,
}

impl Verdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, Verdict::Ready)
    }

    pub fn describe(&self) -> String {
        match self {
            Verdict::Ready => "Hibernation is fully configured and ready".to_string(),
            Verdict::RebootRequired => {
                "Hibernation is configured; reboot to activate the resume parameters".to_string()
            }
            Verdict::InsufficientSwap {
                required,
                available,
            } => format!(
                "Not enough disk-based swap: need {}, have {} (short by {})",
                format_bytes(*required),
                format_bytes(*available),
                format_bytes(required.saturating_sub(*available))
            ),
            Verdict::ResumeNotConfigured => {
                "Kernel resume is not configured; use Enable to set it up".to_string()
            }
            Verdict::KernelUnsupported => {
                "The running kernel does not allow hibernation".to_string()
            }
            Verdict::Unknown => "Hibernation readiness could not be determined".to_string(),
        }
    }
}

/// User-triggered actions that change system state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Enable,
    Disable,
    Test,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Enable => write!(f, "enable"),
            ActionKind::Disable => write!(f, "disable"),
            ActionKind::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed { kind: FailureKind, message: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }
}

/// Outcome of one user action, consumed immediately for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub steps: Vec<StepOutcome>,
}

impl ActionResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            exit_code: Some(0),
            failure: None,
            steps: Vec::new(),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exit_code: None,
            failure: Some(kind),
            steps: Vec::new(),
        }
    }

    pub fn from_error(err: &crate::Error) -> Self {
        Self {
            exit_code: err.exit_code(),
            ..Self::failed(err.kind(), err.to_string())
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepOutcome>) -> Self {
        self.steps = steps;
        self
    }
}
