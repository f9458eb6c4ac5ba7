use crate::error::{Error, Result};
use crate::types::{ActionKind, ActionResult, ReadinessReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HibernationState {
    NotConfigured,
    Configuring,
    /// Configured, possibly waiting for a reboot
    Ready,
    Testing,
    Disabling,
    Failed,
}

impl HibernationState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            HibernationState::Configuring | HibernationState::Testing | HibernationState::Disabling
        )
    }
}

impl fmt::Display for HibernationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HibernationState::NotConfigured => "not configured",
            HibernationState::Configuring => "configuring",
            HibernationState::Ready => "ready",
            HibernationState::Testing => "testing",
            HibernationState::Disabling => "disabling",
            HibernationState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Tracks which actions are allowed next
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: HibernationState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: HibernationState::NotConfigured,
        }
    }

    pub fn state(&self) -> HibernationState {
        self.state
    }

    /// Sync with a fresh report.
    ///
    /// Only an action in flight keeps its state. A failure is replaced by
    /// whatever the system now shows, so a refresh after a partial enable
    /// can land on Ready.
    pub fn observe(&mut self, report: &ReadinessReport) {
        if self.state.is_busy() {
            return;
        }
        self.state = if report.is_configured() {
            HibernationState::Ready
        } else {
            HibernationState::NotConfigured
        };
        debug!("Lifecycle: {}", self.state);
    }

    pub fn can_start(&self, kind: ActionKind) -> bool {
        use HibernationState::*;
        match kind {
            ActionKind::Enable => matches!(self.state, NotConfigured | Failed),
            ActionKind::Test => self.state == Ready,
            ActionKind::Disable => matches!(self.state, Ready | Failed | NotConfigured),
        }
    }

    pub fn begin(&mut self, kind: ActionKind) -> Result<()> {
        if !self.can_start(kind) {
            return Err(Error::PreconditionNotMet(format!(
                "cannot {} while hibernation is {}",
                kind, self.state
            )));
        }
        self.state = match kind {
            ActionKind::Enable => HibernationState::Configuring,
            ActionKind::Test => HibernationState::Testing,
            ActionKind::Disable => HibernationState::Disabling,
        };
        debug!("Lifecycle: {}", self.state);
        Ok(())
    }

    pub fn complete(&mut self, kind: ActionKind, result: &ActionResult) {
        self.state = match (kind, result.success) {
            (ActionKind::Enable, true) | (ActionKind::Test, true) => HibernationState::Ready,
            (ActionKind::Disable, true) => HibernationState::NotConfigured,
            (_, false) => HibernationState::Failed,
        };
        debug!("Lifecycle: {}", self.state);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
