use swiftrpc_core::config::Config;

use crate::context::Ctx;

/// What the session table needs from the sessions it pools.
pub trait PooledSession {
    /// Constructs the session for slot `id`. The id doubles as the wire
    /// hint, so sessions never move between slots.
    fn new(id: u32, config: &Config) -> Self;

    /// Stamps the allocation epoch for the slot's current tenancy.
    fn set_epoch(&mut self, epoch: u64);

    /// Tick of the last datagram handled or sent on this session's behalf.
    fn last_activity(&self) -> u64;

    /// Tears the session down if nothing pins it, returning whether the
    /// slot may be reclaimed.
    fn try_expire(&mut self, ctx: &mut Ctx<'_>) -> bool;
}

/// A weak reference to a pooled session: slot index plus the allocation
/// epoch observed when the handle was made. The handle goes stale the
/// moment the slot is reclaimed and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    /// Slot index, stable for the slot's lifetime.
    pub index: u32,
    /// Allocation epoch at handle creation.
    pub epoch: u64,
}

/// A pool of sessions indexed by wire hints.
///
/// Slots are allocated from a free list and grow on demand; indices are
/// stable forever, so peers can cache them as hints. Reclamation is
/// opportunistic: one [`SessionTable::expire`] sweep tries to free the
/// least-recently-active session.
#[derive(Debug)]
pub struct SessionTable<S> {
    sessions: Vec<S>,
    live: Vec<bool>,
    free: Vec<u32>,
    next_epoch: u64,
}

impl<S: PooledSession> SessionTable<S> {
    /// An empty table.
    pub fn new() -> Self {
        Self { sessions: Vec::new(), live: Vec::new(), free: Vec::new(), next_epoch: 1 }
    }

    /// Number of slots ever allocated. Hints at or beyond this are invalid.
    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `index` names a currently allocated session.
    pub fn is_live(&self, index: u32) -> bool {
        self.live.get(index as usize).copied().unwrap_or(false)
    }

    /// The session at `index`, if live.
    pub fn get_live(&self, index: u32) -> Option<&S> {
        if self.is_live(index) {
            self.sessions.get(index as usize)
        } else {
            None
        }
    }

    /// Mutable access to the session at `index`, if live.
    pub fn get_live_mut(&mut self, index: u32) -> Option<&mut S> {
        if self.is_live(index) {
            self.sessions.get_mut(index as usize)
        } else {
            None
        }
    }

    /// Allocates a session slot, reusing a free one or growing the table.
    /// Returns the slot index.
    pub fn get(&mut self, config: &Config) -> u32 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        match self.free.pop() {
            Some(index) => {
                self.live[index as usize] = true;
                self.sessions[index as usize].set_epoch(epoch);
                index
            }
            None => {
                let index = self.sessions.len() as u32;
                let mut session = S::new(index, config);
                session.set_epoch(epoch);
                self.sessions.push(session);
                self.live.push(true);
                index
            }
        }
    }

    /// Tries to reclaim the least-recently-active live session. A session
    /// that refuses (work in flight) stays; nothing else is attempted.
    pub fn expire(&mut self, ctx: &mut Ctx<'_>) {
        let mut candidate: Option<(u32, u64)> = None;
        for (index, session) in self.sessions.iter().enumerate() {
            if !self.live[index] {
                continue;
            }
            let activity = session.last_activity();
            if candidate.map_or(true, |(_, oldest)| activity < oldest) {
                candidate = Some((index as u32, activity));
            }
        }
        if let Some((index, _)) = candidate {
            if self.sessions[index as usize].try_expire(ctx) {
                self.live[index as usize] = false;
                self.free.push(index);
            }
        }
    }
}

impl<S: PooledSession> Default for SessionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use swiftrpc_core::config::Config;

    /// Minimal pooled session for exercising the table mechanics.
    struct FakeSession {
        epoch: u64,
        last_activity: u64,
        busy: bool,
    }

    impl PooledSession for FakeSession {
        fn new(_id: u32, _config: &Config) -> Self {
            Self { epoch: 0, last_activity: 0, busy: false }
        }
        fn set_epoch(&mut self, epoch: u64) {
            self.epoch = epoch;
        }
        fn last_activity(&self) -> u64 {
            self.last_activity
        }
        fn try_expire(&mut self, _ctx: &mut Ctx<'_>) -> bool {
            !self.busy
        }
    }

    #[test]
    fn test_get_grows_then_reuses_free_slots() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut table: SessionTable<FakeSession> = SessionTable::new();

        let a = table.get(&harness.config);
        let b = table.get(&harness.config);
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.size(), 2);

        table.expire(&mut harness.ctx());
        assert!(!table.is_live(a) || !table.is_live(b));

        // The freed slot is handed out again with a fresh epoch.
        let old_epoch = 1;
        let c = table.get(&harness.config);
        assert_eq!(table.size(), 2);
        assert!(table.get_live(c).unwrap().epoch > old_epoch);
    }

    #[test]
    fn test_expire_picks_least_recently_active() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut table: SessionTable<FakeSession> = SessionTable::new();
        let a = table.get(&harness.config);
        let b = table.get(&harness.config);
        table.get_live_mut(a).unwrap().last_activity = 100;
        table.get_live_mut(b).unwrap().last_activity = 50;

        table.expire(&mut harness.ctx());
        assert!(table.is_live(a));
        assert!(!table.is_live(b));
    }

    #[test]
    fn test_busy_session_survives_expiry() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut table: SessionTable<FakeSession> = SessionTable::new();
        let a = table.get(&harness.config);
        table.get_live_mut(a).unwrap().busy = true;

        table.expire(&mut harness.ctx());
        assert!(table.is_live(a));
    }

    #[test]
    fn test_stale_handles_detectable_by_epoch() {
        let mut harness = Harness::new(Config::default(), 100);
        let mut table: SessionTable<FakeSession> = SessionTable::new();
        let index = table.get(&harness.config);
        let handle = SessionHandle { index, epoch: table.get_live(index).unwrap().epoch };

        table.expire(&mut harness.ctx());
        let reused = table.get(&harness.config);
        assert_eq!(reused, index);
        assert_ne!(table.get_live(index).unwrap().epoch, handle.epoch);
    }
}
