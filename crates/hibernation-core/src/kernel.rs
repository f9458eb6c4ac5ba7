//! Kernel-side facts: memory size, hibernation support, lockdown and the
//! resume arguments configured in the bootloader.

use crate::error::{Error, Result};
use crate::types::{KernelSupport, ResumeParameter};

pub const MEMINFO_PATH: &str = "/proc/meminfo";
pub const CMDLINE_PATH: &str = "/proc/cmdline";
pub const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";
pub const POWER_STATE_PATH: &str = "/sys/power/state";
pub const LOCKDOWN_PATH: &str = "/sys/kernel/security/lockdown";

/// Kernel config symbol that gates suspend-to-disk
pub const HIBERNATION_SYMBOL: &str = "CONFIG_HIBERNATION";

/// Path of the build config shipped with the running kernel
pub fn kernel_config_path(release: &str) -> String {
    format!("/boot/config-{}", release.trim())
}

/// Parse `MemTotal` from /proc/meminfo, in bytes.
///
/// Format:
/// ```text
/// MemTotal:       16318532 kB
/// MemFree:         1234567 kB
/// ```
pub fn parse_mem_total(content: &str) -> Result<u64> {
    let line = content
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| Error::Parse("MemTotal not found in /proc/meminfo".to_string()))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(Error::Parse(format!("Invalid MemTotal line: {}", line)));
    }

    let value = parts[1]
        .parse::<u64>()
        .map_err(|e| Error::Parse(format!("Failed to parse MemTotal '{}': {}", parts[1], e)))?;

    match parts.get(2) {
        Some(&"kB") | None => Ok(value.saturating_mul(1024)),
        Some(unit) => Err(Error::Parse(format!("Unexpected MemTotal unit: {}", unit))),
    }
}

/// Look up a boolean symbol in a kernel build config.
///
/// `=y` and `=m` mean built, `# SYMBOL is not set` means disabled, absence
/// tells nothing.
pub fn parse_config_symbol(content: &str, symbol: &str) -> KernelSupport {
    let enabled = format!("{}=", symbol);
    let disabled = format!("# {} is not set", symbol);

    for line in content.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix(&enabled) {
            return match value {
                "y" | "m" => KernelSupport::Supported,
                _ => KernelSupport::Unsupported,
            };
        }
        if line == disabled {
            return KernelSupport::Unsupported;
        }
    }

    KernelSupport::Unknown
}

/// `disk` in /sys/power/state means the kernel accepts hibernation right now
pub fn power_state_allows_disk(content: &str) -> bool {
    content.split_whitespace().any(|s| s == "disk")
}

/// Active lockdown mode, if any.
///
/// Format: `none [integrity] confidentiality`, the bracketed word is active.
pub fn parse_lockdown(content: &str) -> Option<String> {
    content
        .split_whitespace()
        .find_map(|w| w.strip_prefix('[').and_then(|w| w.strip_suffix(']')))
        .filter(|mode| *mode != "none")
        .map(str::to_string)
}

/// Resume arguments from `grubby --info=DEFAULT`.
///
/// Format:
/// ```text
/// index=0
/// kernel="/boot/vmlinuz-6.8.5-301.fc40.x86_64"
/// args="ro rootflags=subvol=root resume=UUID=abcd resume_offset=533760 rhgb quiet"
/// root="UUID=..."
/// ```
pub fn parse_grubby_info(content: &str) -> Result<Option<ResumeParameter>> {
    let args = content
        .lines()
        .find_map(|l| l.trim().strip_prefix("args="))
        .ok_or_else(|| Error::Parse("grubby output has no args line".to_string()))?;

    let args = args.trim().trim_matches('"');
    ResumeParameter::from_args(args)
}
