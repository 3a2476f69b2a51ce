/// Which session table a timer's owner lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The client session table.
    Client,
    /// The server session table.
    Server,
}

/// Identity of a session slot, usable after the session itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRef {
    /// Which table.
    pub side: Side,
    /// Slot index within that table.
    pub index: u32,
}

/// Which of a channel's two messages owns a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The inbound message's keepalive-ACK timer.
    Inbound,
    /// The outbound message's retransmission timer.
    Outbound,
}

/// Identity of one timer. A message reschedules by key, so at most one
/// entry per key exists in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerKey {
    /// The session owning the channel.
    pub session: SessionRef,
    /// The channel within the session.
    pub channel_id: u8,
    /// Inbound or outbound message.
    pub kind: TimerKind,
}

/// What a fired timer asks the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDisposition {
    /// Keep going; the handler rescheduled itself if it wanted to.
    Continue,
    /// Too many consecutive timeouts without progress; close the session.
    AbortSession,
}

/// A flat list of pending timers, linearly scanned on each dispatch tick.
///
/// Deadlines are absolute clock ticks. The list is unordered; with at most
/// two timers per active channel the scan stays trivially cheap.
#[derive(Debug, Default)]
pub struct TimerList {
    entries: Vec<(TimerKey, u64)>,
}

impl TimerList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to fire at `when`, replacing any earlier deadline.
    pub fn schedule(&mut self, key: TimerKey, when: u64) {
        for entry in self.entries.iter_mut() {
            if entry.0 == key {
                entry.1 = when;
                return;
            }
        }
        self.entries.push((key, when));
    }

    /// Removes the timer for `key`, if scheduled.
    pub fn cancel(&mut self, key: TimerKey) {
        self.entries.retain(|(entry, _)| *entry != key);
    }

    /// Removes and returns every timer due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Vec<TimerKey> {
        let mut due = Vec::new();
        self.entries.retain(|(key, when)| {
            if *when <= now {
                due.push(*key);
                false
            } else {
                true
            }
        });
        due
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The deadline currently scheduled for `key`, if any.
    pub fn deadline(&self, key: TimerKey) -> Option<u64> {
        self.entries.iter().find(|(entry, _)| *entry == key).map(|&(_, when)| when)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: u32, channel_id: u8, kind: TimerKind) -> TimerKey {
        TimerKey { session: SessionRef { side: Side::Client, index }, channel_id, kind }
    }

    #[test]
    fn test_schedule_replaces_existing_deadline() {
        let mut timers = TimerList::new();
        let k = key(0, 0, TimerKind::Outbound);
        timers.schedule(k, 100);
        timers.schedule(k, 250);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(k), Some(250));
    }

    #[test]
    fn test_pop_due_removes_only_expired() {
        let mut timers = TimerList::new();
        let early = key(0, 0, TimerKind::Inbound);
        let late = key(0, 1, TimerKind::Inbound);
        timers.schedule(early, 10);
        timers.schedule(late, 20);

        let due = timers.pop_due(15);
        assert_eq!(due, vec![early]);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(late), Some(20));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timers = TimerList::new();
        let k = key(3, 2, TimerKind::Outbound);
        timers.schedule(k, 5);
        timers.cancel(k);
        timers.cancel(k);
        assert!(timers.is_empty());
    }
}
