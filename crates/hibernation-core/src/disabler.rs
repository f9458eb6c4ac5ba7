use crate::batch::PrivilegedBatch;
use crate::commands;
use crate::config::Config;
use crate::host::SystemHost;
use crate::steps::{StepPolicy, StepRunner};
use crate::types::{ActionResult, ReadinessReport};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableOptions {
    /// Also delete the swap file this tool manages
    pub remove_swap_file: bool,
}

impl Default for DisableOptions {
    fn default() -> Self {
        Self {
            remove_swap_file: true,
        }
    }
}

/// Reverts hibernation setup, attempting every step even after failures.
/// Swap partitions are never touched.
pub struct HibernationDisabler<'a> {
    host: &'a dyn SystemHost,
    config: &'a Config,
}

impl<'a> HibernationDisabler<'a> {
    pub fn new(host: &'a dyn SystemHost, config: &'a Config) -> Self {
        Self { host, config }
    }

    pub fn disable(&self, report: &ReadinessReport, options: DisableOptions) -> ActionResult {
        info!("Disabling hibernation (remove swap file: {})", options.remove_swap_file);
        let mut run = StepRunner::new(StepPolicy::BestEffort);
        let mut batch = PrivilegedBatch::new("disable hibernation", StepPolicy::BestEffort);
        let tool = self.config.bootloader.tool.as_str();

        batch.push("remove resume kernel arguments", commands::clear_resume_args(tool));

        let regenerate = &self.config.bootloader.regenerate_command;
        if !regenerate.is_empty() {
            batch.push(
                "regenerate bootloader configuration",
                commands::regenerate_bootloader(regenerate),
            );
        }

        let path = &self.config.swap.file_path;
        let fstab = &self.config.swap.fstab_path;
        let mut delete_step = None;

        if !options.remove_swap_file {
            run.skip("delete swap file", "kept at user request");
        } else if !report.managed_swap_file_present && !report.is_swap_active(path) {
            run.skip("delete swap file", format!("{} does not exist", path.display()));
        } else {
            if report.is_swap_active(path) {
                batch.push("deactivate swap file", commands::swapoff(path));
            }
            delete_step = Some(batch.steps.len());
            batch.push("delete swap file", commands::remove_file(path));

            let listed = run.step("read fstab", || {
                let content = self.host.read_file(fstab)?;
                Ok(commands::fstab_has_entry(&content, path))
            });
            match listed {
                Some(true) => {
                    batch.push("remove swap file from fstab", commands::fstab_remove(fstab, path));
                }
                Some(false) => run.skip(
                    "remove swap file from fstab",
                    format!("{} is not listed", path.display()),
                ),
                None => {}
            }
        }

        let outputs = run.replay(&batch, self.host.run_privileged_batch(&batch));
        let removed_file = delete_step
            .and_then(|index| outputs.get(index))
            .is_some_and(Option::is_some);

        let message = if removed_file {
            format!(
                "Hibernation disabled and {} removed. Reboot to apply the changes.",
                path.display()
            )
        } else {
            "Hibernation disabled. Reboot to apply the changes.".to_string()
        };
        run.finish(message)
    }
}
