use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::SystemHost;
use crate::kernel::{self, HIBERNATION_SYMBOL};
use crate::swap::{self, SWAPON_SHOW_ARGS};
use crate::types::{
    KernelSupport, ProbeError, ReadinessReport, ResumeParameter, SwapEntry, SwapKind,
};
use std::path::Path;
use tracing::{debug, warn};

/// Read-only readiness checks
///
/// Every probe re-reads the live system. A failing probe leaves its field
/// unknown and adds a [`ProbeError`]; inspection itself never fails.
pub struct SystemInspector<'a> {
    host: &'a dyn SystemHost,
    config: &'a Config,
}

impl<'a> SystemInspector<'a> {
    pub fn new(host: &'a dyn SystemHost, config: &'a Config) -> Self {
        Self { host, config }
    }

    pub fn inspect(&self) -> ReadinessReport {
        let mut errors = Vec::new();

        let total_ram_bytes = record(&mut errors, "total_ram", self.read_total_ram());
        let swaps = record(&mut errors, "swap", self.read_swaps()).unwrap_or_default();
        let resume = record(&mut errors, "resume", self.read_running_resume()).flatten();
        let configured_resume =
            record(&mut errors, "configured_resume", self.read_configured_resume()).flatten();
        let free_space_bytes = record(
            &mut errors,
            "free_space",
            self.host.free_space_bytes(self.config.swap_dir()),
        );

        let managed_file = &self.config.swap.file_path;
        let managed_swap_file_present = self.host.path_exists(managed_file);
        let managed_swap_file_bytes = if managed_swap_file_present {
            record(&mut errors, "managed_swap_file", self.host.file_size(managed_file))
        } else {
            None
        };

        let (swap_kind, swap_size_bytes, swap_path) = match swap::hibernation_candidate(&swaps) {
            Some(SwapEntry {
                kind,
                size_bytes,
                path,
                ..
            }) => (*kind, *size_bytes, Some(path.clone())),
            None => (SwapKind::None, 0, None),
        };

        let report = ReadinessReport {
            total_ram_bytes,
            swap_kind,
            swap_size_bytes,
            swap_path,
            swaps,
            resume,
            configured_resume,
            kernel_support: self.read_kernel_support(),
            lockdown: self.read_lockdown(),
            managed_swap_file_present,
            managed_swap_file_bytes,
            free_space_bytes,
            probe_errors: errors,
        };

        debug!(
            "Inspection: ram={:?} swap={} ({} bytes) resume={:?} kernel={:?}",
            report.total_ram_bytes,
            report.swap_kind,
            report.swap_size_bytes,
            report.resume,
            report.kernel_support
        );

        report
    }

    fn read_total_ram(&self) -> Result<u64> {
        let content = self.host.read_file(Path::new(kernel::MEMINFO_PATH))?;
        kernel::parse_mem_total(&content)
    }

    /// swapon first, /proc/swaps when swapon is missing or fails
    fn read_swaps(&self) -> Result<Vec<SwapEntry>> {
        match self.host.run(&SWAPON_SHOW_ARGS) {
            Ok(output) if output.success() => return swap::parse_swapon(&output.stdout),
            Ok(output) => debug!(
                "swapon exited with {:?}, falling back to /proc/swaps",
                output.exit_code
            ),
            Err(e) => debug!("swapon unavailable ({}), falling back to /proc/swaps", e),
        }

        let content = self.host.read_file(Path::new("/proc/swaps"))?;
        swap::parse_proc_swaps(&content)
    }

    fn read_running_resume(&self) -> Result<Option<ResumeParameter>> {
        let cmdline = self.host.read_file(Path::new(kernel::CMDLINE_PATH))?;
        ResumeParameter::from_args(&cmdline)
    }

    fn read_configured_resume(&self) -> Result<Option<ResumeParameter>> {
        let tool = self.config.bootloader.tool.as_str();
        let output = self.host.run(&[tool, "--info=DEFAULT"])?.check(tool)?;
        kernel::parse_grubby_info(&output.stdout)
    }

    /// Build config symbol first, /sys/power/state as fallback
    fn read_kernel_support(&self) -> KernelSupport {
        let from_config = self
            .host
            .read_file(Path::new(kernel::OSRELEASE_PATH))
            .and_then(|release| {
                self.host
                    .read_file(Path::new(&kernel::kernel_config_path(&release)))
            })
            .map(|content| kernel::parse_config_symbol(&content, HIBERNATION_SYMBOL));

        match from_config {
            Ok(KernelSupport::Unknown) | Err(_) => {}
            Ok(support) => return support,
        }

        match self.host.read_file(Path::new(kernel::POWER_STATE_PATH)) {
            Ok(state) if kernel::power_state_allows_disk(&state) => KernelSupport::Supported,
            _ => KernelSupport::Unknown,
        }
    }

    /// Missing securityfs means no lockdown
    fn read_lockdown(&self) -> Option<String> {
        self.host
            .read_file(Path::new(kernel::LOCKDOWN_PATH))
            .ok()
            .and_then(|content| kernel::parse_lockdown(&content))
    }
}

fn record<T>(errors: &mut Vec<ProbeError>, field: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Probe '{}' failed: {}", field, e);
            errors.push(ProbeError {
                field: field.to_string(),
                message: describe(&e),
            });
            None
        }
    }
}

fn describe(err: &Error) -> String {
    match err {
        Error::Io(io) => io.to_string(),
        other => other.to_string(),
    }
}
