use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::event::Event;
use crate::registration::RegistrationTable;

/// Runs until `shutdown` is observed. Drains the deferred queue into the live
/// table on every wake, delivering a synthetic [`Event::Removed`] for each
/// record actually taken out of the live table (outside the registration
/// lock — [`RegistrationTable::drain_deferred`] never calls back into caller
/// code while holding it).
pub fn run(table: &RegistrationTable, shutdown: &AtomicBool, sync_timeout: Duration) {
    loop {
        let removed = table.drain_deferred(shutdown, sync_timeout);

        for record in removed {
            // A descriptor whose interest mask already included a terminal
            // event (Close/Invalid) was told about its own teardown through
            // that delivery; Removed is only owed when it wasn't.
            if record.has_observed_terminal_event() {
                continue;
            }

            // `drain_deferred` only re-queues the Remove when `in_callback`
            // was already observed true — that check and this one are both
            // snapshots, not a held lock, so without `lock_dispatch` the
            // event thread could be a few instructions away from calling
            // `deliver` for this same descriptor. Block on the same lock it
            // uses so the two invocations never overlap.
            let _dispatch_guard = record.lock_dispatch();
            let _guard = record.enter_callback();
            let callback = record.callback.clone();
            let context: &(dyn std::any::Any + Send + Sync) = &*record.context;

            let result = catch_unwind(AssertUnwindSafe(|| {
                callback(record.descriptor, Event::Removed, context);
            }));

            if let Err(panic) = result {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                log::error!("bal: Removed callback for descriptor {} panicked: {msg}", record.descriptor);
            }
        }

        if shutdown.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
    }
}
