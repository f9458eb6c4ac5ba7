use crate::batch::PrivilegedBatch;
use crate::commands;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extents::{self, FilesystemInfo, FsFamily};
use crate::host::{PrivilegedRequest, SystemHost};
use crate::steps::{StepPolicy, StepRunner};
use crate::types::{
    format_bytes, required_swap_bytes, ActionResult, KernelSupport, ReadinessReport,
    ResumeParameter, SwapKind,
};
use std::path::{Path, PathBuf};
use tracing::info;

const GIB: u64 = 1024 * 1024 * 1024;

/// Where the hibernation image will live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapPlan {
    /// Active partition at least as large as RAM
    Partition { device: PathBuf },
    /// Active swap file at least as large as RAM
    ExistingFile { path: PathBuf },
    /// Create the managed swap file, replacing whatever is at its path
    CreateFile {
        path: PathBuf,
        size_bytes: u64,
        /// The old file is an active swap area and must be turned off first
        deactivate_existing: bool,
        remove_existing: bool,
    },
}

/// Enables hibernation, stopping at the first failed step.
///
/// Read-only probes run first as the current user. Every change is then
/// made by one privileged batch, so the user authenticates once. Steps that
/// succeeded before a failure are left in place.
pub struct HibernationConfigurator<'a> {
    host: &'a dyn SystemHost,
    config: &'a Config,
}

impl<'a> HibernationConfigurator<'a> {
    pub fn new(host: &'a dyn SystemHost, config: &'a Config) -> Self {
        Self { host, config }
    }

    pub fn enable(&self, report: &ReadinessReport) -> ActionResult {
        if report.is_configured() {
            info!("Hibernation already configured, nothing to do");
            return ActionResult::succeeded(format!(
                "Hibernation is already configured. {}",
                report.verdict().describe()
            ));
        }

        let mut run = StepRunner::new(StepPolicy::AbortOnFirstFailure);

        let Some(plan) = run.step("check preconditions", || self.plan(report)) else {
            return run.finish("");
        };
        info!("Enabling hibernation with plan {:?}", plan);

        let mut batch = PrivilegedBatch::new("enable hibernation", StepPolicy::AbortOnFirstFailure);
        let tool = self.config.bootloader.tool.as_str();

        let prepared = match &plan {
            SwapPlan::Partition { device } => {
                run.step("resolve swap partition UUID", || self.partition_uuid(device))
                    .map(|uuid| {
                        let resume = ResumeParameter {
                            device: format!("UUID={}", uuid),
                            offset: None,
                        };
                        let set_args = commands::set_resume_args(tool, &resume);
                        let summary = format!(
                            "Hibernation enabled using swap partition {}.",
                            device.display()
                        );
                        (resume, set_args, summary)
                    })
            }
            SwapPlan::ExistingFile { path } => {
                self.prepare_existing_file(&mut run, &mut batch, path).map(|device| {
                    let summary =
                        format!("Hibernation enabled using swap file {}.", path.display());
                    self.file_resume(tool, device, summary)
                })
            }
            SwapPlan::CreateFile {
                path,
                size_bytes,
                deactivate_existing,
                remove_existing,
            } => self
                .create_swap_file(
                    &mut run,
                    &mut batch,
                    path,
                    *size_bytes,
                    *deactivate_existing,
                    *remove_existing,
                )
                .map(|device| {
                    let summary = format!(
                        "Created a {} swap file at {} and enabled hibernation.",
                        format_bytes(*size_bytes),
                        path.display()
                    );
                    self.file_resume(tool, device, summary)
                }),
        };
        let Some((mut resume, set_args, summary)) = prepared else {
            return run.finish("");
        };

        batch.push("clear stale resume arguments", commands::clear_resume_args(tool));
        batch.push("set resume kernel arguments", set_args);
        let regenerate = &self.config.bootloader.regenerate_command;
        if !regenerate.is_empty() {
            batch.push(
                "regenerate bootloader configuration",
                commands::regenerate_bootloader(regenerate),
            );
        }

        let outputs = run.replay(&batch, self.host.run_privileged_batch(&batch));
        if let Some(offset) = batch
            .resume_offset_step()
            .and_then(|index| outputs.get(index))
            .and_then(Option::as_ref)
            .and_then(|output| extents::parse_resume_offset(&output.stdout).ok())
        {
            resume.offset = Some(offset);
        }

        run.finish(format!(
            "{}\nResume from {}. Reboot to apply the changes.",
            summary, resume
        ))
    }

    /// Resume target and kernel-argument step for a swap file on `device`
    fn file_resume(
        &self,
        tool: &str,
        device: String,
        summary: String,
    ) -> (ResumeParameter, PrivilegedRequest, String) {
        let set_args = commands::set_resume_args_from_query(tool, &device);
        (
            ResumeParameter {
                device,
                offset: None,
            },
            set_args,
            summary,
        )
    }

    /// Decide where the image goes and check every precondition.
    /// Nothing is changed on the system.
    pub fn plan(&self, report: &ReadinessReport) -> Result<SwapPlan> {
        let ram = report.total_ram_bytes.ok_or_else(|| {
            Error::PreconditionNotMet("total RAM could not be determined".to_string())
        })?;

        if report.kernel_support == KernelSupport::Unsupported {
            return Err(Error::UnsupportedConfiguration(
                "the running kernel is built without hibernation support".to_string(),
            ));
        }

        if let Some(mode) = &report.lockdown {
            return Err(Error::UnsupportedConfiguration(format!(
                "kernel lockdown ({}) disables hibernation, usually because Secure Boot is on",
                mode
            )));
        }

        let largest = |kind: SwapKind| {
            report
                .disk_swaps()
                .filter(|s| s.kind == kind)
                .max_by_key(|s| s.size_bytes)
        };

        if let Some(partition) = largest(SwapKind::Partition).filter(|p| p.size_bytes >= ram) {
            return Ok(SwapPlan::Partition {
                device: partition.path.clone(),
            });
        }

        if let Some(file) = largest(SwapKind::File).filter(|f| f.size_bytes >= ram) {
            return Ok(SwapPlan::ExistingFile {
                path: file.path.clone(),
            });
        }

        if let Some(partition) = largest(SwapKind::Partition) {
            return Err(Error::PreconditionNotMet(format!(
                "swap partition {} is {} but RAM is {}; partitions are not resized, \
                 enlarge or remove it first",
                partition.path.display(),
                format_bytes(partition.size_bytes),
                format_bytes(ram)
            )));
        }

        let path = self.config.swap.file_path.clone();
        let size_bytes = required_swap_bytes(ram);
        let active = report.swaps.iter().find(|s| s.path == path);
        let remove_existing = active.is_some() || report.managed_swap_file_present;
        // A leftover from an interrupted enable is deleted too, so its space counts
        let reclaimed = if remove_existing {
            report
                .managed_swap_file_bytes
                .or(active.map(|s| s.size_bytes))
                .unwrap_or(0)
        } else {
            0
        };

        let free = report.free_space_bytes.ok_or_else(|| {
            Error::PreconditionNotMet(format!(
                "free space on {} could not be determined",
                self.config.swap_dir().display()
            ))
        })?;
        let needed = size_bytes.saturating_add(self.config.swap.headroom_gib.saturating_mul(GIB));

        if free.saturating_add(reclaimed) < needed {
            return Err(Error::PreconditionNotMet(format!(
                "not enough space: need {} free on {}, only {} available",
                format_bytes(needed),
                self.config.swap_dir().display(),
                format_bytes(free.saturating_add(reclaimed))
            )));
        }

        Ok(SwapPlan::CreateFile {
            path,
            size_bytes,
            deactivate_existing: active.is_some(),
            remove_existing,
        })
    }

    /// Queue the steps for an active swap file; returns the resume device
    fn prepare_existing_file(
        &self,
        run: &mut StepRunner,
        batch: &mut PrivilegedBatch,
        path: &Path,
    ) -> Option<String> {
        let dir = path.parent().unwrap_or_else(|| Path::new("/"));
        let fs = run.step("probe filesystem", || self.probe_filesystem(dir))?;
        let family = fs.family()?;

        batch.push_resume_offset("query physical extents", family, offset_query(family, path));
        self.queue_fstab_entry(run, batch, path)?;

        Some(format!("UUID={}", fs.uuid))
    }

    /// Queue the steps that (re)create the managed swap file
    fn create_swap_file(
        &self,
        run: &mut StepRunner,
        batch: &mut PrivilegedBatch,
        path: &Path,
        size_bytes: u64,
        deactivate_existing: bool,
        remove_existing: bool,
    ) -> Option<String> {
        let fs = run.step("probe filesystem", || self.probe_filesystem(self.config.swap_dir()))?;
        let family = fs.family()?;

        if deactivate_existing {
            batch.push("deactivate undersized swap file", commands::swapoff(path));
        }
        if remove_existing {
            batch.push("remove old swap file", commands::remove_file(path));
        }

        match family {
            FsFamily::Btrfs => {
                batch.push("create swap file", commands::btrfs_mkswapfile(path, size_bytes));
            }
            FsFamily::Ext | FsFamily::Xfs => {
                batch.push("create swap file", commands::allocate_file(path, size_bytes));
                batch.push("restrict swap file permissions", commands::restrict_permissions(path));
                batch.push("format swap area", commands::mkswap(path));
            }
        }

        // The layout check fails the batch before the file is activated
        batch.push_resume_offset("query physical extents", family, offset_query(family, path));
        batch.push("activate swap", commands::swapon(path));
        self.queue_fstab_entry(run, batch, path)?;

        Some(format!("UUID={}", fs.uuid))
    }

    fn queue_fstab_entry(
        &self,
        run: &mut StepRunner,
        batch: &mut PrivilegedBatch,
        path: &Path,
    ) -> Option<()> {
        let fstab = &self.config.swap.fstab_path;
        let listed = run.step("read fstab", || {
            let content = self.host.read_file(fstab)?;
            Ok(commands::fstab_has_entry(&content, path))
        })?;

        if listed {
            run.skip(
                "persist swap in fstab",
                format!("{} is already listed", path.display()),
            );
        } else {
            batch.push("persist swap in fstab", commands::fstab_append(fstab, path));
        }
        Some(())
    }

    /// Filesystem type and UUID of `dir`; unsupported types are rejected
    fn probe_filesystem(&self, dir: &Path) -> Result<FilesystemInfo> {
        let dir_str = dir.to_string_lossy();
        let output = self
            .host
            .run(&["findmnt", "-no", "FSTYPE,UUID", "-T", dir_str.as_ref()])?
            .check("findmnt")?;
        let fs = FilesystemInfo::parse_findmnt(&output.stdout)?;

        if fs.family().is_none() {
            return Err(Error::UnsupportedConfiguration(format!(
                "filesystem {} on {} cannot hold a resumable swap file",
                fs.fstype,
                dir.display()
            )));
        }
        Ok(fs)
    }

    fn partition_uuid(&self, device: &Path) -> Result<String> {
        let device_str = device.to_string_lossy();
        let output = self
            .host
            .run(&["lsblk", "-ndo", "UUID", device_str.as_ref()])?
            .check("lsblk")?;

        let uuid = output.stdout.trim();
        if uuid.is_empty() {
            return Err(Error::UnsupportedConfiguration(format!(
                "swap partition {} has no UUID",
                device.display()
            )));
        }
        Ok(uuid.to_string())
    }
}

fn offset_query(family: FsFamily, path: &Path) -> PrivilegedRequest {
    match family {
        FsFamily::Btrfs => commands::btrfs_map_swapfile(path),
        FsFamily::Ext | FsFamily::Xfs => commands::filefrag(path),
    }
}
