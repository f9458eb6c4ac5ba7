//! Entry points for the presentation layer
//!
//! [`HibernationHelper`] owns configuration, the system host and the power
//! manager. Every action takes the [`ActionGate`], re-inspects the live
//! system and returns an [`ActionResult`]; no error escapes.

use crate::config::{Config, HibernateMethod};
use crate::configurator::HibernationConfigurator;
use crate::disabler::{DisableOptions, HibernationDisabler};
use crate::error::FailureKind;
use crate::gate::ActionGate;
use crate::host::{LinuxHost, SystemHost};
use crate::inspector::SystemInspector;
use crate::power::{LogindPowerManager, PowerManager, SystemctlPowerManager};
use crate::tester::HibernationTester;
use crate::types::{ActionKind, ActionResult, ReadinessReport};
use std::sync::Arc;
use tracing::{info, warn};

pub struct HibernationHelper {
    config: Config,
    host: Arc<dyn SystemHost>,
    power: Arc<dyn PowerManager>,
    gate: ActionGate,
}

impl HibernationHelper {
    pub fn new(config: Config, host: Arc<dyn SystemHost>, power: Arc<dyn PowerManager>) -> Self {
        Self {
            config,
            host,
            power,
            gate: ActionGate::new(),
        }
    }

    /// Real system host with the configured hibernation trigger
    pub fn from_config(config: Config) -> Self {
        let host: Arc<dyn SystemHost> = Arc::new(LinuxHost::from_config(&config));
        let power: Arc<dyn PowerManager> = match config.tester.method {
            HibernateMethod::Logind => Arc::new(LogindPowerManager::new()),
            HibernateMethod::Systemctl => Arc::new(SystemctlPowerManager::new(Arc::clone(&host))),
        };
        Self::new(config, host, power)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The action currently holding the gate
    pub fn running_action(&self) -> Option<ActionKind> {
        self.gate.current()
    }

    pub fn inspect(&self) -> ReadinessReport {
        SystemInspector::new(self.host.as_ref(), &self.config).inspect()
    }

    pub fn enable(&self) -> ActionResult {
        self.guarded(ActionKind::Enable, |report| {
            HibernationConfigurator::new(self.host.as_ref(), &self.config).enable(report)
        })
    }

    pub fn disable(&self, options: DisableOptions) -> ActionResult {
        self.guarded(ActionKind::Disable, |report| {
            HibernationDisabler::new(self.host.as_ref(), &self.config).disable(report, options)
        })
    }

    pub fn test_hibernate(&self) -> ActionResult {
        self.guarded(ActionKind::Test, |report| {
            HibernationTester::new(self.power.as_ref()).test_hibernate(report)
        })
    }

    fn guarded(
        &self,
        kind: ActionKind,
        action: impl FnOnce(&ReadinessReport) -> ActionResult,
    ) -> ActionResult {
        let _permit = match self.gate.try_acquire(kind) {
            Ok(permit) => permit,
            Err(running) => {
                warn!("Refusing to {} while {} is running", kind, running);
                return ActionResult::failed(
                    FailureKind::Busy,
                    format!("Cannot {} while {} is still running", kind, running),
                );
            }
        };

        info!("Action started: {}", kind);
        let report = self.inspect();
        let result = action(&report);

        if result.success {
            info!("Action {} succeeded: {}", kind, result.message);
        } else {
            warn!(
                "Action {} failed ({}): {}",
                kind,
                result.failure.map(|f| f.label()).unwrap_or("unknown"),
                result.message
            );
        }
        result
    }
}
