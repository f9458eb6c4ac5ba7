use crate::error::Error;
use crate::power::PowerManager;
use crate::types::{ActionResult, KernelSupport, ReadinessReport};
use tracing::{info, warn};

/// Triggers a real hibernation cycle once the running kernel can resume
pub struct HibernationTester<'a> {
    power: &'a dyn PowerManager,
}

impl<'a> HibernationTester<'a> {
    pub fn new(power: &'a dyn PowerManager) -> Self {
        Self { power }
    }

    pub fn test_hibernate(&self, report: &ReadinessReport) -> ActionResult {
        if report.resume.is_none() {
            let hint = if report.configured_resume.is_some() {
                "resume is configured but not active yet; reboot first"
            } else {
                "the running kernel has no resume parameter; enable hibernation and reboot first"
            };
            return ActionResult::from_error(&Error::PreconditionNotMet(hint.to_string()));
        }

        if report.kernel_blocks_hibernation() {
            let reason = match (&report.lockdown, report.kernel_support) {
                (Some(mode), _) => format!("kernel lockdown ({}) disables hibernation", mode),
                (None, KernelSupport::Unsupported) => {
                    "the running kernel is built without hibernation support".to_string()
                }
                _ => "the running kernel refuses to hibernate".to_string(),
            };
            return ActionResult::from_error(&Error::UnsupportedConfiguration(reason));
        }

        match self.power.can_hibernate() {
            Ok(capability) if !capability.is_possible() => {
                return ActionResult::from_error(&Error::UnsupportedConfiguration(format!(
                    "the power manager reports hibernation as unavailable ({:?})",
                    capability
                )));
            }
            Ok(_) => {}
            // The trigger itself reports the real problem
            Err(e) => warn!("Could not ask whether hibernation is possible: {}", e),
        }

        info!("Triggering hibernation");
        match self.power.hibernate() {
            Ok(()) => ActionResult::succeeded("Hibernate initiated"),
            Err(e) => {
                warn!("Hibernation request failed: {}", e);
                ActionResult::from_error(&e)
            }
        }
    }
}
