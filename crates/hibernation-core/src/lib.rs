//! Hibernation Helper Core Library
//!
//! Checks whether a Linux system can hibernate and resume, sets up swap and
//! kernel resume arguments, reverts them, and triggers a test hibernation.

pub mod batch;
pub mod commands;
pub mod config;
pub mod configurator;
pub mod disabler;
pub mod error;
pub mod extents;
pub mod gate;
pub mod host;
pub mod inspector;
pub mod kernel;
pub mod lifecycle;
pub mod power;
pub mod service;
pub mod steps;
pub mod swap;
pub mod tester;
pub mod types;

pub use batch::{BatchCommand, BatchStep, PrivilegedBatch};
pub use config::Config;
pub use configurator::{HibernationConfigurator, SwapPlan};
pub use disabler::{DisableOptions, HibernationDisabler};
pub use error::{Error, FailureKind, Result};
pub use gate::{ActionGate, ActionPermit};
pub use host::{CommandOutput, LinuxHost, PrivilegedRequest, SystemHost};
pub use inspector::SystemInspector;
pub use lifecycle::{HibernationState, Lifecycle};
pub use power::{HibernateCapability, LogindPowerManager, PowerManager, SystemctlPowerManager};
pub use service::HibernationHelper;
pub use tester::HibernationTester;
pub use types::{
    format_bytes, required_swap_bytes, ActionKind, ActionResult, KernelSupport, ProbeError,
    ReadinessReport, ResumeParameter, StepOutcome, StepStatus, SwapEntry, SwapKind, Verdict,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
