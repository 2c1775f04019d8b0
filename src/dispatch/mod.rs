//! The two worker threads that drive polling and registration-table churn.
//!
//! [`event_thread`] owns the `select()` loop and callback dispatch.
//! [`sync_thread`] owns all mutation of the live registration table, draining
//! the deferred queue that `register`/`modify`/`unregister` enqueue into.

pub mod event_thread;
pub mod sync_thread;
