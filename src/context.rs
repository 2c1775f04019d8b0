use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::descriptor::Descriptor;
use crate::dispatch::{event_thread, sync_thread};
use crate::error::{Error, Result};
use crate::event::EventMask;
use crate::registration::{Callback, RegistrationTable, SocketHints};

/// An independent instance of the event/sync thread pair plus the
/// registration table they share. Most callers only ever need the
/// process-wide default reached through the free functions [`init`],
/// [`cleanup`], [`register`], [`modify`], [`unregister`]; `Context::new` is
/// for running more than one independently-shut-down dispatcher in the same
/// process.
pub struct Context {
    table: std::sync::Arc<RegistrationTable>,
    shutdown: std::sync::Arc<AtomicBool>,
    config: Config,
    threads: Mutex<Option<Threads>>,
}

struct Threads {
    event: JoinHandle<()>,
    sync: JoinHandle<()>,
}

impl Context {
    /// Spawns the event and sync threads. If either fails to spawn, any
    /// thread that did spawn is signalled to shut down and joined before the
    /// error is returned — no half-started context is left behind.
    pub fn new(config: Config) -> Result<Context> {
        let table = std::sync::Arc::new(RegistrationTable::new());
        let shutdown = std::sync::Arc::new(AtomicBool::new(false));

        let event_handle = {
            let table = table.clone();
            let shutdown = shutdown.clone();
            let poll_timeout = config.poll_timeout;
            std::thread::Builder::new()
                .name("bal-event".into())
                .spawn(move || event_thread::run(&table, &shutdown, poll_timeout))
        };

        let event_handle = match event_handle {
            Ok(h) => h,
            Err(e) => {
                return Err(Error::Internal(format!("failed to spawn event thread: {e}")));
            }
        };

        let sync_handle = {
            let table = table.clone();
            let shutdown = shutdown.clone();
            let sync_timeout = config.sync_timeout;
            std::thread::Builder::new()
                .name("bal-sync".into())
                .spawn(move || sync_thread::run(&table, &shutdown, sync_timeout))
        };

        let sync_handle = match sync_handle {
            Ok(h) => h,
            Err(e) => {
                shutdown.store(true, Ordering::Release);
                let _ = event_handle.join();
                return Err(Error::Internal(format!("failed to spawn sync thread: {e}")));
            }
        };

        Ok(Context {
            table,
            shutdown,
            config,
            threads: Mutex::new(Some(Threads {
                event: event_handle,
                sync: sync_handle,
            })),
        })
    }

    pub fn register(
        &self,
        descriptor: Descriptor,
        mask: EventMask,
        callback: Callback,
        context: Box<dyn Any + Send + Sync>,
        hints: SocketHints,
    ) -> Result<()> {
        self.table.register(descriptor, mask, callback, context, hints)
    }

    pub fn modify(&self, descriptor: Descriptor, new_mask: EventMask) -> Result<()> {
        self.table.modify(descriptor, new_mask)
    }

    pub fn unregister(&self, descriptor: Descriptor) -> Result<()> {
        self.table.unregister(descriptor)
    }

    /// Signals shutdown, wakes the sync thread, and joins both threads with a
    /// best-effort bound of `join_timeout`. A thread still stuck past the
    /// bound (e.g. inside a hung callback) is logged and detached rather than
    /// blocked on forever — native threads cannot be force-joined.
    pub fn shutdown_and_join(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.table.sync_cond.notify_all();

        let Some(Threads { event, sync }) = self.threads.lock().unwrap().take() else {
            return;
        };

        join_with_timeout("bal-event", event, self.config.join_timeout);
        join_with_timeout("bal-sync", sync, self.config.join_timeout);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Waits up to `timeout` for `handle` to finish, polling at short intervals
/// since `JoinHandle::join` itself has no timeout variant. Past the bound the
/// thread is abandoned (its `JoinHandle` dropped) and an internal error is
/// recorded rather than blocking the caller indefinitely.
fn join_with_timeout(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    if handle.is_finished() {
        let _ = handle.join();
        return;
    }

    let deadline = Instant::now() + timeout;
    let mut handle = Some(handle);

    while Instant::now() < deadline {
        if handle.as_ref().unwrap().is_finished() {
            let _ = handle.take().unwrap().join();
            return;
        }
        std::thread::park_timeout(Duration::from_millis(20));
    }

    log::error!("bal: {name} thread did not join within {timeout:?}; detaching it");
    crate::error::__set_last_error(
        &Error::Internal(format!("{name} thread did not shut down within {timeout:?}")),
        "Context::shutdown_and_join",
        file!(),
        line!(),
    );
    // Dropping the handle detaches the thread; it keeps running but no longer
    // blocks cleanup().
}

static DEFAULT: OnceLock<Mutex<Option<Context>>> = OnceLock::new();

fn default_slot() -> &'static Mutex<Option<Context>> {
    DEFAULT.get_or_init(|| Mutex::new(None))
}

/// Initializes the process-wide default context. Fails `DupeInit` if already
/// initialized.
pub fn init() -> Result<()> {
    let mut slot = default_slot().lock().unwrap();
    if slot.is_some() {
        return Err(Error::DupeInit);
    }
    *slot = Some(Context::new(Config::from_env())?);
    Ok(())
}

/// Tears down the process-wide default context. Fails `NotInit` if not
/// initialized.
pub fn cleanup() -> Result<()> {
    let mut slot = default_slot().lock().unwrap();
    let Some(ctx) = slot.take() else {
        return Err(Error::NotInit);
    };
    ctx.shutdown_and_join();
    Ok(())
}

fn with_default<F, T>(f: F) -> Result<T>
where
    F: FnOnce(&Context) -> Result<T>,
{
    let slot = default_slot().lock().unwrap();
    match slot.as_ref() {
        Some(ctx) => f(ctx),
        None => Err(Error::NotInit),
    }
}

pub fn register(
    descriptor: Descriptor,
    mask: EventMask,
    callback: Callback,
    context: Box<dyn Any + Send + Sync>,
    hints: SocketHints,
) -> Result<()> {
    with_default(|ctx| ctx.register(descriptor, mask, callback, context, hints))
}

pub fn modify(descriptor: Descriptor, new_mask: EventMask) -> Result<()> {
    with_default(|ctx| ctx.modify(descriptor, new_mask))
}

pub fn unregister(descriptor: Descriptor) -> Result<()> {
    with_default(|ctx| ctx.unregister(descriptor))
}
