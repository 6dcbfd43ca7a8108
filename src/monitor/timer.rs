use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingDismiss {
    pub id: TimerId,
    pub due_at: DateTime<Utc>,
}

/// The single alert-dismiss task.
///
/// At most one dismissal is pending at any instant. Scheduling replaces
/// (and thereby cancels) the previous one; a replaced or cancelled task
/// never fires.
#[derive(Clone, Debug, Default)]
pub struct DismissTimer {
    pending: Option<PendingDismiss>,
    next_id: u64,
}

impl DismissTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_at: DateTime<Utc>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending = Some(PendingDismiss { id, due_at });
        id
    }

    /// Returns true if a pending task was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn pending(&self) -> Option<PendingDismiss> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Fire the pending task if its deadline has been reached.
    pub fn fire_if_due(&mut self, now: DateTime<Utc>) -> Option<TimerId> {
        match self.pending {
            Some(task) if now >= task.due_at => {
                self.pending = None;
                Some(task.id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_780_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn fires_once_at_deadline() {
        let mut timer = DismissTimer::new();
        let id = timer.schedule(t(5_000));
        assert_eq!(timer.fire_if_due(t(4_999)), None);
        assert_eq!(timer.fire_if_due(t(5_000)), Some(id));
        assert_eq!(timer.fire_if_due(t(9_000)), None);
    }

    #[test]
    fn schedule_replaces_pending_task() {
        let mut timer = DismissTimer::new();
        let first = timer.schedule(t(5_000));
        let second = timer.schedule(t(8_000));
        assert_ne!(first, second);

        assert_eq!(timer.fire_if_due(t(5_500)), None);
        assert_eq!(timer.pending().map(|p| p.id), Some(second));
        assert_eq!(timer.fire_if_due(t(8_000)), Some(second));
    }

    #[test]
    fn cancel_prevents_firing() {
        let mut timer = DismissTimer::new();
        timer.schedule(t(1_000));
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert_eq!(timer.fire_if_due(t(2_000)), None);
    }
}
