use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::event::Event;
use crate::platform::probe;
use crate::platform::select::{self, FdSet};
use crate::registration::RegistrationTable;

/// Runs until `shutdown` is observed. One iteration is
/// BUILD (snapshot the live table) → POLL (`select`) → DISPATCH (decode and
/// deliver) → IDLE (loop back to BUILD).
pub fn run(table: &RegistrationTable, shutdown: &AtomicBool, poll_timeout: std::time::Duration) {
    let mut read = FdSet::empty();
    let mut write = FdSet::empty();
    let mut err = FdSet::empty();

    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }

        let max_fd = table.snapshot(&mut read, &mut write, &mut err);
        let max_fd_raw = max_fd.map_or(-1, |d| d.raw());

        match select::select(&mut read, &mut write, &mut err, max_fd_raw, poll_timeout) {
            Ok(0) => continue,
            Ok(_) => dispatch_ready(table, &read, &write, &err),
            Err(e) => {
                log::error!("bal: select() failed: {e}");
                crate::error::__set_last_error(
                    &crate::error::Error::Os(e),
                    "event_thread::run",
                    file!(),
                    line!(),
                );
            }
        }

        if shutdown.load(Ordering::Acquire) {
            return;
        }
    }
}

fn dispatch_ready(table: &RegistrationTable, read: &FdSet, write: &FdSet, err: &FdSet) {
    let mut candidates = Vec::new();
    table_candidates(table, read, write, err, &mut candidates);

    for descriptor in candidates {
        let Some(record) = table.find_live(descriptor) else {
            continue;
        };

        // A terminal event (Close/Invalid) was already delivered for this
        // descriptor; it stays in the live table (readable-at-EOF, say)
        // until the sync thread applies its REMOVE, but §4.3 promises
        // exactly one terminal delivery, not one per poll iteration in the
        // meantime.
        if record.has_observed_terminal_event() {
            continue;
        }

        let mask = record.interest_mask();
        let fd = descriptor.raw();
        let in_read = read.contains(fd);
        let in_write = write.contains(fd);
        let in_err = err.contains(fd);

        let mut events = Vec::with_capacity(2);

        if in_read && mask.is_accept() && record.is_listening() {
            events.push(Event::Accept);
        } else if in_read && mask.is_readable() {
            match probe::peek_is_eof(fd) {
                Ok(true) => {
                    record.set_terminal_event_observed();
                    events.push(Event::Close);
                }
                Ok(false) => events.push(Event::Read),
                Err(e) => {
                    log::warn!("bal: peek on fd {fd} failed: {e}");
                    record.set_terminal_event_observed();
                    events.push(Event::Invalid);
                }
            }
        }

        if in_write && record.is_connect_pending() {
            match probe::socket_error(fd) {
                Ok(0) => {
                    record.clear_connect_pending();
                    events.push(Event::Connect);
                }
                Ok(code) => {
                    record.clear_connect_pending();
                    events.push(Event::ConnFail(code));
                }
                Err(e) => {
                    record.clear_connect_pending();
                    events.push(Event::ConnFail(e.raw_os_error().unwrap_or(-1)));
                }
            }
        } else if in_write && mask.is_writable() {
            events.push(Event::Write);
        }

        if in_err {
            match probe::socket_error(fd) {
                Ok(0) => {}
                Ok(code) => events.push(Event::Error(code)),
                Err(_) => {
                    record.set_terminal_event_observed();
                    events.push(Event::Invalid);
                }
            }
        }

        for event in events {
            deliver(&record, descriptor, event);
        }
    }
}

fn table_candidates(
    table: &RegistrationTable,
    read: &FdSet,
    write: &FdSet,
    err: &FdSet,
    out: &mut Vec<Descriptor>,
) {
    // Candidates are re-validated with `find_live` as each is processed, so a
    // descriptor removed between BUILD and this DISPATCH pass is tolerated.
    let mut seen = std::collections::HashSet::new();
    table.for_each_live_descriptor(|d| {
        let fd = d.raw();
        if (read.contains(fd) || write.contains(fd) || err.contains(fd)) && seen.insert(d) {
            out.push(d);
        }
    });
}

fn deliver(record: &Arc<crate::registration::SocketRecord>, descriptor: Descriptor, event: Event) {
    // Held for the whole call so the sync thread's synthetic `Removed`
    // delivery for this same descriptor can't run concurrently with it.
    let _dispatch_guard = record.lock_dispatch();
    let _guard = record.enter_callback();
    let callback = record.callback.clone();
    let context: &(dyn std::any::Any + Send + Sync) = &*record.context;

    let result = catch_unwind(AssertUnwindSafe(|| {
        callback(descriptor, event, context);
    }));

    if let Err(panic) = result {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::error!("bal: callback for descriptor {descriptor} panicked: {msg}");
    }
}
