//! At most one state-changing action at a time

use crate::types::ActionKind;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared slot holding the action currently in flight
#[derive(Debug, Clone, Default)]
pub struct ActionGate {
    running: Arc<Mutex<Option<ActionKind>>>,
}

/// Held for the duration of an action; dropping it frees the gate
#[derive(Debug)]
pub struct ActionPermit {
    running: Arc<Mutex<Option<ActionKind>>>,
    kind: ActionKind,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or return the action that already holds it
    pub fn try_acquire(&self, kind: ActionKind) -> Result<ActionPermit, ActionKind> {
        let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = *slot {
            return Err(current);
        }
        *slot = Some(kind);
        Ok(ActionPermit {
            running: Arc::clone(&self.running),
            kind,
        })
    }

    pub fn current(&self) -> Option<ActionKind> {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActionPermit {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_action_is_refused() {
        let gate = ActionGate::new();
        let permit = gate.try_acquire(ActionKind::Enable).unwrap();
        assert_eq!(permit.kind(), ActionKind::Enable);

        assert_eq!(gate.try_acquire(ActionKind::Disable).unwrap_err(), ActionKind::Enable);
        assert_eq!(gate.current(), Some(ActionKind::Enable));

        drop(permit);
        assert_eq!(gate.current(), None);
        assert!(gate.try_acquire(ActionKind::Test).is_ok());
    }

    #[test]
    fn test_gate_shared_across_threads() {
        let gate = ActionGate::new();
        let permit = gate.try_acquire(ActionKind::Test).unwrap();

        let other = gate.clone();
        let refused = std::thread::spawn(move || other.try_acquire(ActionKind::Enable).is_err())
            .join()
            .unwrap();
        assert!(refused);
        drop(permit);
    }
}
