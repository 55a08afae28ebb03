//! Connection Registry
//!
//! Shared table of live sessions, read by the status display and written by
//! the request workers.
//!
//! ## Design
//!
//! - One `std::sync::Mutex` guards the table; every operation is a single map
//!   access (or one full scan for snapshots) and never performs I/O, so the
//!   lock is never held across a blocking call or an `.await`.
//! - A `Condvar` plus a generation counter lets the display thread sleep until
//!   something changes, with a timeout floor so it still refreshes elapsed
//!   times when the table is idle.
//! - The registry stores bookkeeping only. Streams stay with their workers;
//!   unregistering never closes anything.

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use netcalc_core::Timestamp;

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identity of the worker task serving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// One accepted connection, minus its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Unique session id.
    pub id: SessionId,
    /// Peer address and port.
    pub peer: SocketAddr,
    /// Wall-clock time the connection was accepted.
    pub created_at: Timestamp,
}

/// Registry-visible projection of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session this entry describes.
    pub session_id: SessionId,
    /// Peer address and port.
    pub peer: SocketAddr,
    /// Worker serving the session.
    pub worker_id: WorkerId,
    /// Monotonic registration time, for elapsed display.
    pub started_at: Instant,
    /// Wall-clock session creation time.
    pub started_wall: Timestamp,
    /// Successfully evaluated operations so far.
    pub operations: u64,
}

impl SessionInfo {
    /// Time since registration.
    pub fn connected_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Proof of registration returned by [`ConnectionRegistry::register`].
///
/// Not `Clone`: unregistering consumes it, so an entry cannot be removed twice.
#[derive(Debug, PartialEq, Eq)]
pub struct EntryHandle {
    session_id: SessionId,
}

impl EntryHandle {
    /// Session this handle refers to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<SessionId, SessionInfo>,
    generation: u64,
}

impl RegistryState {
    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Thread-safe table of live sessions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    changed: Condvar,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for `session` with a zero operation counter.
    pub fn register(&self, session: &Session, worker_id: WorkerId) -> EntryHandle {
        let info = SessionInfo {
            session_id: session.id,
            peer: session.peer,
            worker_id,
            started_at: Instant::now(),
            started_wall: session.created_at,
            operations: 0,
        };

        let mut state = self.lock();
        state.entries.insert(session.id, info);
        state.touch();
        self.changed.notify_all();

        EntryHandle { session_id: session.id }
    }

    /// Register and get a guard that unregisters on drop.
    pub fn register_scoped(&self, session: &Session, worker_id: WorkerId) -> Registration<'_> {
        let handle = self.register(session, worker_id);
        Registration { registry: self, handle: Some(handle) }
    }

    /// Bump the operation counter of an entry. Returns the new count.
    pub fn increment(&self, handle: &EntryHandle) -> u64 {
        let mut state = self.lock();
        let count = state.entries.get_mut(&handle.session_id).map_or(0, |entry| {
            entry.operations += 1;
            entry.operations
        });
        state.touch();
        self.changed.notify_all();
        count
    }

    /// Remove an entry. The session's stream is left untouched.
    pub fn unregister(&self, handle: EntryHandle) -> Option<SessionInfo> {
        let mut state = self.lock();
        let removed = state.entries.remove(&handle.session_id);
        state.touch();
        self.changed.notify_all();
        removed
    }

    /// Consistent copy of all live entries, ordered by session id.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut entries: Vec<SessionInfo> = self.lock().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.session_id);
        entries
    }

    /// Block until a mutation happens or `timeout` elapses.
    ///
    /// Returns `true` if woken by a change, `false` on timeout.
    pub fn wait_for_change(&self, timeout: Duration) -> bool {
        self.wait_for_change_since(self.generation(), timeout)
    }

    /// Current change counter. Pair with [`Self::wait_for_change_since`] so a
    /// mutation landing between a snapshot and the wait is not missed.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Block until the change counter differs from `seen` or `timeout` elapses.
    pub fn wait_for_change_since(&self, seen: u64, timeout: Duration) -> bool {
        let (state, _) = self
            .changed
            .wait_timeout_while(self.lock(), timeout, |state| state.generation == seen)
            .unwrap_or_else(PoisonError::into_inner);

        state.generation != seen
    }

    /// Wake every waiting display thread without changing any entry.
    pub fn wake(&self) {
        let mut state = self.lock();
        state.touch();
        self.changed.notify_all();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Each mutation is a single map operation, so a panic elsewhere while the
    // lock was held cannot leave the table half-updated.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped registration held by a worker for the lifetime of its session.
///
/// Dropping it unregisters the entry, including during a panic unwind.
#[derive(Debug)]
pub struct Registration<'a> {
    registry: &'a ConnectionRegistry,
    handle: Option<EntryHandle>,
}

impl Registration<'_> {
    /// Bump this session's operation counter.
    pub fn increment(&self) -> u64 {
        self.handle.as_ref().map_or(0, |handle| self.registry.increment(handle))
    }

    /// Unregister now instead of at drop.
    pub fn release(mut self) -> Option<SessionInfo> {
        self.handle.take().and_then(|handle| self.registry.unregister(handle))
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.registry.unregister(handle);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::prelude::*;

    use super::*;

    fn session(id: u64) -> Session {
        Session {
            id: SessionId::new(id),
            peer: SocketAddr::from(([127, 0, 0, 1], 40_000 + u16::try_from(id % 1000).unwrap())),
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn register_adds_entry_with_zero_operations() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(&session(1), WorkerId::new(7));

        let entries = registry.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session_id, handle.session_id());
        assert_eq!(entries[0].worker_id, WorkerId::new(7));
        assert_eq!(entries[0].operations, 0);
    }

    #[test]
    fn increment_counts_operations() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(&session(1), WorkerId::new(1));

        assert_eq!(registry.increment(&handle), 1);
        assert_eq!(registry.increment(&handle), 2);
        assert_eq!(registry.snapshot()[0].operations, 2);
    }

    #[test]
    fn unregister_removes_only_that_entry() {
        let registry = ConnectionRegistry::new();
        let first = registry.register(&session(1), WorkerId::new(1));
        let _second = registry.register(&session(2), WorkerId::new(2));

        let removed = registry.unregister(first).unwrap();
        assert_eq!(removed.session_id, SessionId::new(1));

        let entries = registry.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session_id, SessionId::new(2));
    }

    #[test]
    fn snapshot_is_ordered_by_session_id() {
        let registry = ConnectionRegistry::new();
        for id in [5, 1, 3, 2, 4] {
            let _ = registry.register(&session(id), WorkerId::new(id));
        }

        let ids: Vec<u64> = registry.snapshot().iter().map(|e| e.session_id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn scoped_registration_unregisters_on_drop() {
        let registry = ConnectionRegistry::new();
        {
            let registration = registry.register_scoped(&session(1), WorkerId::new(1));
            registration.increment();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn scoped_registration_unregisters_on_panic() {
        let registry = Arc::new(ConnectionRegistry::new());
        let shared = Arc::clone(&registry);

        let result = thread::spawn(move || {
            let _registration = shared.register_scoped(&session(1), WorkerId::new(1));
            panic!("worker failure");
        })
        .join();

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_register_and_increment_loses_no_update() {
        const SESSIONS: u64 = 64;
        let registry = ConnectionRegistry::new();

        let handles: Vec<EntryHandle> = thread::scope(|scope| {
            let workers: Vec<_> = (0..SESSIONS)
                .map(|id| {
                    let registry = &registry;
                    scope.spawn(move || registry.register(&session(id), WorkerId::new(id)))
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        thread::scope(|scope| {
            for handle in &handles {
                let registry = &registry;
                scope.spawn(move || registry.increment(handle));
            }
        });

        let entries = registry.snapshot();
        assert_eq!(entries.len() as u64, SESSIONS);
        assert!(entries.iter().all(|entry| entry.operations == 1));
    }

    #[test]
    fn wait_for_change_times_out_when_idle() {
        let registry = ConnectionRegistry::new();
        let start = Instant::now();

        assert!(!registry.wait_for_change(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn change_before_wait_is_not_missed() {
        let registry = ConnectionRegistry::new();
        let seen = registry.generation();
        let _ = registry.register(&session(1), WorkerId::new(1));

        let start = Instant::now();
        assert!(registry.wait_for_change_since(seen, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_for_change_wakes_on_register() {
        let registry = Arc::new(ConnectionRegistry::new());
        let writer = Arc::clone(&registry);

        let waiter = thread::spawn({
            let registry = Arc::clone(&registry);
            move || registry.wait_for_change(Duration::from_secs(10))
        });

        // Keep mutating until the waiter observes one of the changes.
        let mut id = 0;
        while !waiter.is_finished() {
            let _ = writer.register(&session(id), WorkerId::new(id));
            id += 1;
            thread::sleep(Duration::from_millis(5));
        }

        assert!(waiter.join().unwrap());
    }

    #[derive(Debug, Clone)]
    enum RegistryOp {
        Register,
        Increment(usize),
        Unregister(usize),
    }

    fn registry_op() -> impl Strategy<Value = RegistryOp> {
        prop_oneof![
            Just(RegistryOp::Register),
            any::<usize>().prop_map(RegistryOp::Increment),
            any::<usize>().prop_map(RegistryOp::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn prop_registry_matches_model(ops in prop::collection::vec(registry_op(), 0..64)) {
            let registry = ConnectionRegistry::new();
            let mut live: Vec<(EntryHandle, u64)> = Vec::new();
            let mut next_id = 0;

            for op in ops {
                match op {
                    RegistryOp::Register => {
                        live.push((registry.register(&session(next_id), WorkerId::new(next_id)), 0));
                        next_id += 1;
                    },
                    RegistryOp::Increment(i) if !live.is_empty() => {
                        let len = live.len();
                        let slot = &mut live[i % len];
                        slot.1 += 1;
                        prop_assert_eq!(registry.increment(&slot.0), slot.1);
                    },
                    RegistryOp::Unregister(i) if !live.is_empty() => {
                        let (handle, _) = live.remove(i % live.len());
                        prop_assert!(registry.unregister(handle).is_some());
                    },
                    _ => {},
                }
            }

            // PROPERTY: exactly one entry per live session, counters intact
            let snapshot = registry.snapshot();
            prop_assert_eq!(snapshot.len(), live.len());
            for (handle, count) in &live {
                let entry = snapshot.iter().find(|e| e.session_id == handle.session_id());
                prop_assert_eq!(entry.map(|e| e.operations), Some(*count));
            }
        }
    }
}
