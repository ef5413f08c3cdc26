use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// The long-running operations that exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    BatchGeneration,
    SingleGeneration,
    Export,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatchGeneration => write!(f, "batch generation"),
            Self::SingleGeneration => write!(f, "scene generation"),
            Self::Export => write!(f, "export"),
        }
    }
}

/// Process-wide busy flag. At most one [`Activity`] holds it at a time.
#[derive(Debug, Clone, Default)]
pub struct BusyGate {
    active: Arc<Mutex<Option<Activity>>>,
}

impl BusyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate for `activity`, or reports who already holds it.
    pub fn try_acquire(&self, activity: Activity) -> Result<BusyGuard, Activity> {
        let mut active = self.lock();
        if let Some(current) = *active {
            return Err(current);
        }
        *active = Some(activity);
        debug!(%activity, "busy gate acquired");
        Ok(BusyGuard {
            active: Arc::clone(&self.active),
            activity,
        })
    }

    pub fn current(&self) -> Option<Activity> {
        *self.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Activity>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the gate when dropped, whichever way the operation ends.
#[derive(Debug)]
pub struct BusyGuard {
    active: Arc<Mutex<Option<Activity>>>,
    activity: Activity,
}

impl BusyGuard {
    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = None;
        debug!(activity = %self.activity, "busy gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let gate = BusyGate::new();
        let guard = gate.try_acquire(Activity::Export).unwrap();
        assert_eq!(guard.activity(), Activity::Export);

        assert_eq!(
            gate.try_acquire(Activity::SingleGeneration).unwrap_err(),
            Activity::Export
        );
        assert_eq!(gate.current(), Some(Activity::Export));

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire(Activity::BatchGeneration).is_ok());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let gate = BusyGate::new();
        let other = gate.clone();
        let _guard = gate.try_acquire(Activity::BatchGeneration).unwrap();
        assert_eq!(other.current(), Some(Activity::BatchGeneration));
    }
}
