use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::event::EventMask;
use crate::list::KeyedList;
use crate::platform::select::FdSet;

/// Caller-supplied callback: `Fn(descriptor, event, user_context) -> ()`,
/// invoked on the event thread with exactly one event bit per call.
pub type Callback = Arc<dyn Fn(Descriptor, crate::event::Event, &(dyn Any + Send + Sync)) + Send + Sync>;

/// Hints the caller supplies at `register` time that the event thread can't
/// otherwise infer from readiness alone: whether the descriptor is a
/// listening socket (disambiguates ACCEPT from READ) and whether it has an
/// outbound connect in flight (arms the CONNECT/CONN_FAIL probe on the next
/// writability).
#[derive(Copy, Clone, Debug, Default)]
pub struct SocketHints {
    pub listening: bool,
    pub connect_pending: bool,
}

/// Per-socket registration record. Shared via `Arc`: the live table holds the
/// canonical reference, the event thread clones it for a callback's duration,
/// and the deferred queue holds pre-live references.
pub struct SocketRecord {
    pub descriptor: Descriptor,
    interest_mask: AtomicU32,
    pub callback: Callback,
    pub context: Box<dyn Any + Send + Sync>,
    listening: AtomicBool,
    connect_pending: AtomicBool,
    terminal_event_observed: AtomicBool,
    in_callback: AtomicBool,
    dispatch_lock: Mutex<()>,
}

impl SocketRecord {
    fn new(
        descriptor: Descriptor,
        mask: EventMask,
        callback: Callback,
        context: Box<dyn Any + Send + Sync>,
        hints: SocketHints,
    ) -> SocketRecord {
        SocketRecord {
            descriptor,
            interest_mask: AtomicU32::new(mask.as_u32()),
            callback,
            context,
            listening: AtomicBool::new(hints.listening),
            connect_pending: AtomicBool::new(hints.connect_pending),
            terminal_event_observed: AtomicBool::new(false),
            in_callback: AtomicBool::new(false),
            dispatch_lock: Mutex::new(()),
        }
    }

    pub fn interest_mask(&self) -> EventMask {
        EventMask::from(self.interest_mask.load(Ordering::SeqCst))
    }

    fn set_interest_mask(&self, mask: EventMask) {
        self.interest_mask.store(mask.as_u32(), Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_connect_pending(&self) -> bool {
        self.connect_pending.load(Ordering::SeqCst)
    }

    pub fn clear_connect_pending(&self) {
        self.connect_pending.store(false, Ordering::SeqCst);
    }

    /// True once a CLOSE or INVALID delivery has gone out for this record —
    /// the two terminal events whose presence in the interest mask, per
    /// `RegistrationTable::unregister`'s contract, means no separate
    /// synthetic `Event::Removed` is owed after the sync thread applies the
    /// teardown.
    pub fn has_observed_terminal_event(&self) -> bool {
        self.terminal_event_observed.load(Ordering::SeqCst)
    }

    pub fn set_terminal_event_observed(&self) {
        self.terminal_event_observed.store(true, Ordering::SeqCst);
    }

    pub fn is_in_callback(&self) -> bool {
        self.in_callback.load(Ordering::SeqCst)
    }

    /// RAII guard that sets `in_callback` for the duration of one dispatch,
    /// clearing it on drop even if the callback panics (the panic itself is
    /// caught by the event thread with `catch_unwind`, not here).
    ///
    /// This flag alone is bookkeeping for `drain_deferred`'s early-retry
    /// check — it doesn't stop two threads from both deciding "not busy" in
    /// the same instant and calling the callback concurrently. Actual
    /// mutual exclusion between the event thread's real dispatch and the
    /// sync thread's synthetic `Removed` delivery comes from
    /// [`SocketRecord::lock_dispatch`], which both call sites must hold
    /// for the duration of the callback invocation.
    pub fn enter_callback(self: &Arc<SocketRecord>) -> CallbackGuard {
        self.in_callback.store(true, Ordering::SeqCst);
        CallbackGuard { record: self.clone() }
    }

    /// Serializes the actual callback call for this descriptor between the
    /// event thread and the sync thread. Held for the duration of a single
    /// invocation by both `dispatch::event_thread::deliver` and the
    /// synthetic-`Removed` loop in `dispatch::sync_thread::run`, so one
    /// record's callback never runs on two threads at once.
    pub(crate) fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, ()> {
        self.dispatch_lock
            .lock()
            .unwrap_or_else(|_| panic!("bal: dispatch lock poisoned for descriptor {}", self.descriptor))
    }
}

pub struct CallbackGuard {
    record: Arc<SocketRecord>,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.record.in_callback.store(false, Ordering::SeqCst);
    }
}

/// A pending mutation to the live table, queued by `register`/`unregister`
/// and applied only by the sync thread.
pub enum DeferredOp {
    Add(Arc<SocketRecord>),
    Remove(Arc<SocketRecord>),
}

impl DeferredOp {
    fn descriptor(&self) -> Descriptor {
        match self {
            DeferredOp::Add(r) | DeferredOp::Remove(r) => r.descriptor,
        }
    }
}

/// The registration table: a live list the event thread polls, a deferred
/// queue of pending mutations, and the mutex/condvar pair guarding both.
///
/// Public operations enqueue or inspect; only [`RegistrationTable::drain_deferred`]
/// (called exclusively by the sync thread) ever mutates the live list.
pub struct RegistrationTable {
    inner: Mutex<Inner>,
    pub(crate) sync_cond: Condvar,
}

struct Inner {
    live: KeyedList<Descriptor, Arc<SocketRecord>>,
    deferred: VecDeque<DeferredOp>,
}

impl RegistrationTable {
    pub fn new() -> RegistrationTable {
        RegistrationTable {
            inner: Mutex::new(Inner {
                live: KeyedList::new(),
                deferred: VecDeque::new(),
            }),
            sync_cond: Condvar::new(),
        }
    }

    /// Enqueues an ADD. Fails `InvalidArg` on an empty or unrecognized mask,
    /// `BadSocket` on an invalid descriptor, and rejects a descriptor that is
    /// already live or already has a queued ADD with `Error::Internal` — a
    /// double registration is a caller bug, not a routine error condition.
    pub fn register(
        &self,
        descriptor: Descriptor,
        mask: EventMask,
        callback: Callback,
        context: Box<dyn Any + Send + Sync>,
        hints: SocketHints,
    ) -> Result<()> {
        if mask.is_empty() || mask.has_unknown_bits() {
            return Err(Error::InvalidArg);
        }
        if !descriptor.is_valid() {
            return Err(Error::BadSocket);
        }

        let mut inner = self.lock();

        if inner.live.contains(&descriptor) {
            return Err(Error::Internal(format!(
                "descriptor {descriptor} is already live"
            )));
        }
        if inner
            .deferred
            .iter()
            .any(|op| matches!(op, DeferredOp::Add(r) if r.descriptor == descriptor))
        {
            return Err(Error::Internal(format!(
                "descriptor {descriptor} already has a queued registration"
            )));
        }

        let record = Arc::new(SocketRecord::new(descriptor, mask, callback, context, hints));
        inner.deferred.push_back(DeferredOp::Add(record));
        self.sync_cond.notify_one();
        Ok(())
    }

    /// Updates the effective interest mask for `descriptor`. If the
    /// descriptor is live, the record's mask is updated directly — it takes
    /// effect no later than the next poll snapshot. If it is only queued, the
    /// queued ADD's record is rewritten in place: no second deferred entry is
    /// created.
    pub fn modify(&self, descriptor: Descriptor, new_mask: EventMask) -> Result<()> {
        if new_mask.is_empty() || new_mask.has_unknown_bits() {
            return Err(Error::InvalidArg);
        }

        let inner = self.lock();

        if let Some(record) = inner.live.find(&descriptor) {
            record.set_interest_mask(new_mask);
            return Ok(());
        }

        for op in inner.deferred.iter() {
            if let DeferredOp::Add(record) = op {
                if record.descriptor == descriptor {
                    record.set_interest_mask(new_mask);
                    return Ok(());
                }
            }
        }

        Err(Error::AsNoSocket)
    }

    /// Enqueues a REMOVE. Succeeds whether `descriptor` is currently live or
    /// still only queued; a queued ADD followed by an immediate REMOVE simply
    /// never gets materialized into the live table once the sync thread
    /// drains it (the ADD remains in the deque so ordering is preserved, but
    /// `drain_deferred` skips applying it — see that method).
    pub fn unregister(&self, descriptor: Descriptor) -> Result<()> {
        let mut inner = self.lock();

        let record = if let Some(record) = inner.live.find(&descriptor) {
            record.clone()
        } else if let Some(DeferredOp::Add(record)) = inner
            .deferred
            .iter()
            .find(|op| matches!(op, DeferredOp::Add(r) if r.descriptor == descriptor))
        {
            record.clone()
        } else {
            return Err(Error::AsNoSocket);
        };

        inner.deferred.push_back(DeferredOp::Remove(record));
        self.sync_cond.notify_one();
        Ok(())
    }

    /// Builds the three `select()` descriptor sets from the live table.
    /// Called only by the event thread, which holds no other lock while
    /// calling this. Returns the largest live descriptor, or `None` if the
    /// table is empty.
    pub fn snapshot(
        &self,
        read: &mut FdSet,
        write: &mut FdSet,
        err: &mut FdSet,
    ) -> Option<Descriptor> {
        let inner = self.lock();

        read.clear();
        write.clear();
        err.clear();

        let mut max_fd = None;
        inner.live.iterate(|_, record| {
            let mask = record.interest_mask();
            let fd = record.descriptor.raw();

            if mask.wants_read_set() {
                read.insert(fd);
            }
            if mask.wants_write_set() {
                write.insert(fd);
            }
            if mask.wants_err_set() {
                err.insert(fd);
            }

            max_fd = Some(max_fd.map_or(record.descriptor, |m: Descriptor| {
                if record.descriptor.raw() > m.raw() {
                    record.descriptor
                } else {
                    m
                }
            }));
            true
        });

        max_fd
    }

    /// Looks up a live record snapshot for the event thread's DISPATCH phase.
    pub fn find_live(&self, descriptor: Descriptor) -> Option<Arc<SocketRecord>> {
        self.lock().live.find(&descriptor).cloned()
    }

    /// Visits every currently-live descriptor. Used by the event thread to
    /// turn a raw `FdSet` membership test back into a list of candidates
    /// without re-deriving descriptor-to-record lookups under a second lock.
    pub fn for_each_live_descriptor<F: FnMut(Descriptor)>(&self, mut f: F) {
        let inner = self.lock();
        inner.live.iterate(|k, _| {
            f(*k);
            true
        });
    }

    pub fn live_len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn live_contains(&self, descriptor: Descriptor) -> bool {
        self.lock().live.contains(&descriptor)
    }

    /// The sync thread's sole entry point: waits for work (or `sync_timeout`,
    /// whichever comes first), then drains the deferred queue into the live
    /// table. Returns the removed records that need a synthetic `Removed`
    /// callback delivered (done by the caller, outside the lock).
    ///
    /// A `Remove` whose record still has `in_callback` set is pushed back
    /// onto the front of the queue rather than applied, so it's retried on
    /// the very next drain instead of being skipped a full `sync_timeout`.
    pub fn drain_deferred(
        &self,
        shutdown: &AtomicBool,
        sync_timeout: std::time::Duration,
    ) -> Vec<Arc<SocketRecord>> {
        let mut inner = self.lock();

        while !shutdown.load(Ordering::SeqCst) && inner.deferred.is_empty() {
            let (guard, _timeout_result) =
                self.sync_cond.wait_timeout(inner, sync_timeout).unwrap();
            inner = guard;
        }

        // Snapshotted before applying this batch: only a descriptor whose
        // Add was processed in a *prior* drain cycle could have been
        // observed live by the event thread (it only ever snapshots the
        // live table between drains, never mid-batch). An Add and Remove
        // for the same descriptor landing in the same batch must coalesce
        // to a no-op — the descriptor was never live long enough to be
        // observed.
        let mut previously_live = std::collections::HashSet::new();
        inner.live.iterate(|k, _| {
            previously_live.insert(*k);
            true
        });

        let mut removed = Vec::new();
        let batch: Vec<DeferredOp> = inner.deferred.drain(..).collect();

        for op in batch {
            match op {
                DeferredOp::Add(record) => {
                    inner.live.add(record.descriptor, record);
                }
                DeferredOp::Remove(record) => {
                    if record.is_in_callback() {
                        inner.deferred.push_front(DeferredOp::Remove(record));
                        continue;
                    }
                    if inner.live.contains(&record.descriptor) {
                        inner.live.remove(&record.descriptor);
                        if previously_live.contains(&record.descriptor) {
                            removed.push(record);
                        }
                        // else: the descriptor's Add was applied earlier in
                        // this very batch — it was never live at the start
                        // of this drain, so no synthetic callback is owed;
                        // it was never observed as registered.
                    }
                    // else: the descriptor was only ever queued (an Add
                    // immediately followed by a Remove before the sync
                    // thread ran, with neither surviving to this batch) —
                    // nothing to remove from the live table either.
                }
            }
        }

        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            panic!(
                "bal: registration table mutex poisoned — an internal invariant was violated ({:?})",
                poisoned
            )
        })
    }
}

impl Default for RegistrationTable {
    fn default() -> Self {
        RegistrationTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn noop_callback() -> Callback {
        Arc::new(|_, _, _| {})
    }

    #[test]
    fn register_rejects_empty_mask() {
        let table = RegistrationTable::new();
        let err = table
            .register(
                Descriptor(3),
                EventMask::empty(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArg));
    }

    #[test]
    fn register_rejects_invalid_descriptor() {
        let table = RegistrationTable::new();
        let err = table
            .register(
                Descriptor::INVALID,
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadSocket));
    }

    #[test]
    fn register_then_drain_makes_descriptor_live() {
        let table = RegistrationTable::new();
        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();

        assert!(!table.live_contains(Descriptor(3)));
        let shutdown = AtomicBool::new(false);
        let removed = table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));
        assert!(removed.is_empty());
        assert!(table.live_contains(Descriptor(3)));
    }

    #[test]
    fn modify_coalesces_with_queued_add() {
        let table = RegistrationTable::new();
        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.modify(Descriptor(3), EventMask::write()).unwrap();

        let shutdown = AtomicBool::new(false);
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));

        assert_eq!(table.live_len(), 1);
        let record = table.find_live(Descriptor(3)).unwrap();
        assert_eq!(record.interest_mask(), EventMask::write());
    }

    #[test]
    fn unregister_of_still_queued_add_never_materializes() {
        let table = RegistrationTable::new();
        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.unregister(Descriptor(3)).unwrap();

        let shutdown = AtomicBool::new(false);
        let removed = table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));

        assert!(removed.is_empty());
        assert!(!table.live_contains(Descriptor(3)));
        assert_eq!(table.live_len(), 0);
    }

    #[test]
    fn register_unregister_register_leaves_descriptor_live_exactly_once() {
        let table = RegistrationTable::new();
        let shutdown = AtomicBool::new(false);

        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));
        table.unregister(Descriptor(3)).unwrap();
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));
        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));

        assert!(table.live_contains(Descriptor(3)));
        assert_eq!(table.live_len(), 1);
    }

    #[test]
    fn remove_of_in_callback_record_is_retried_not_dropped() {
        let table = RegistrationTable::new();
        let shutdown = AtomicBool::new(false);

        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));

        let record = table.find_live(Descriptor(3)).unwrap();
        let guard = record.enter_callback();

        table.unregister(Descriptor(3)).unwrap();
        let removed = table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));
        assert!(removed.is_empty());
        assert!(table.live_contains(Descriptor(3)), "must stay live while in callback");

        drop(guard);
        let removed = table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));
        assert_eq!(removed.len(), 1);
        assert!(!table.live_contains(Descriptor(3)));
    }

    #[test]
    fn snapshot_returns_max_fd_and_populates_sets_by_mask() {
        let table = RegistrationTable::new();
        let shutdown = AtomicBool::new(false);

        table
            .register(
                Descriptor(3),
                EventMask::read(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table
            .register(
                Descriptor(7),
                EventMask::write() | EventMask::error(),
                noop_callback(),
                Box::new(()),
                SocketHints::default(),
            )
            .unwrap();
        table.drain_deferred(&shutdown, std::time::Duration::from_millis(10));

        let mut read = FdSet::empty();
        let mut write = FdSet::empty();
        let mut err = FdSet::empty();
        let max_fd = table.snapshot(&mut read, &mut write, &mut err).unwrap();

        assert_eq!(max_fd, Descriptor(7));
        assert!(read.contains(3));
        assert!(!read.contains(7));
        assert!(write.contains(7));
        assert!(err.contains(7));
    }

    #[test]
    fn concurrent_register_modify_unregister_keeps_live_table_consistent() {
        use std::thread;

        let table = Arc::new(RegistrationTable::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let drains_done = Arc::new(AtomicUsize::new(0));

        for i in 0..64 {
            table
                .register(
                    Descriptor(i),
                    EventMask::read(),
                    noop_callback(),
                    Box::new(()),
                    SocketHints::default(),
                )
                .unwrap();
        }

        let drainer = {
            let table = table.clone();
            let shutdown = shutdown.clone();
            let drains_done = drains_done.clone();
            thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    table.drain_deferred(&shutdown, std::time::Duration::from_millis(20));
                    drains_done.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let mut workers = Vec::new();
        for t in 0..4 {
            let table = table.clone();
            workers.push(thread::spawn(move || {
                for i in 0..64u64 {
                    if i % 4 != t {
                        continue;
                    }
                    let d = Descriptor(i as i32);
                    let _ = table.modify(d, EventMask::write());
                    if i % 8 == t {
                        let _ = table.unregister(d);
                    }
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }

        while drains_done.load(Ordering::SeqCst) < 3 {
            thread::yield_now();
        }
        shutdown.store(true, Ordering::SeqCst);
        table.sync_cond.notify_all();
        drainer.join().unwrap();

        let mut seen = std::collections::HashSet::new();
        table.lock_for_test().live.iterate(|k, _| {
            assert!(seen.insert(*k), "descriptor {k} appeared twice in the live table");
            true
        });
    }

    impl RegistrationTable {
        fn lock_for_test(&self) -> std::sync::MutexGuard<'_, Inner> {
            self.lock()
        }
    }
}
