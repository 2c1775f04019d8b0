//! An echo server driven entirely by the event dispatcher: ACCEPT on the
//! listener spawns per-connection registrations, READ echoes back what it
//! receives, and CLOSE/Removed tear the registration down.
//!
//! The original example this replaces spun on `sched_yield` without ever
//! calling `accept`, so its ACCEPT path was never actually exercised; this
//! version accepts from the ACCEPT callback itself.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bal::socket::{TcpListener, TcpStream};
use bal::{Descriptor, Event, EventMask, SocketHints};

struct Shared {
    listener: TcpListener,
    streams: Mutex<HashMap<Descriptor, TcpStream>>,
}

fn main() {
    env_logger::init();

    bal::init().expect("bal::init");

    let listener = TcpListener::bind("127.0.0.1:7878").expect("bind");
    let local_addr = listener.local_addr().expect("local_addr");
    println!("listening on {local_addr}");

    let listener_fd = listener.descriptor();
    let shared = Arc::new(Shared {
        listener,
        streams: Mutex::new(HashMap::new()),
    });

    let shared_for_accept = shared.clone();
    bal::register(
        listener_fd,
        EventMask::accept(),
        Arc::new(move |_descriptor, event, _ctx| {
            if let Event::Accept = event {
                on_accept(&shared_for_accept);
            }
        }),
        Box::new(()),
        SocketHints { listening: true, connect_pending: false },
    )
    .expect("register listener");

    let running = Arc::new(AtomicBool::new(true));
    let running_for_ctrlc = running.clone();
    ctrlc_once(move || running_for_ctrlc.store(false, Ordering::SeqCst));

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    bal::unregister(listener_fd).ok();
    bal::cleanup().expect("bal::cleanup");
}

fn on_accept(shared: &Arc<Shared>) {
    loop {
        let (stream, peer) = match shared.listener.accept() {
            Ok(pair) => pair,
            Err(_) => return,
        };

        log::info!("accepted connection from {peer}");
        let descriptor = stream.descriptor();

        shared.streams.lock().unwrap().insert(descriptor, stream);

        let shared_for_read = shared.clone();
        bal::register(
            descriptor,
            EventMask::read() | EventMask::close() | EventMask::error(),
            Arc::new(move |descriptor, event, _ctx| on_connection_event(&shared_for_read, descriptor, event)),
            Box::new(()),
            SocketHints::default(),
        )
        .ok();
    }
}

fn on_connection_event(shared: &Arc<Shared>, descriptor: Descriptor, event: Event) {
    match event {
        Event::Read => {
            let mut buf = [0u8; 4096];
            let mut streams = shared.streams.lock().unwrap();
            let Some(stream) = streams.get_mut(&descriptor) else { return };

            match stream.read(&mut buf) {
                Ok(0) => {
                    drop(streams);
                    bal::unregister(descriptor).ok();
                }
                Ok(n) => {
                    let _ = stream.write_all(&buf[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => {
                    drop(streams);
                    bal::unregister(descriptor).ok();
                }
            }
        }
        Event::Close => {
            // Close is a terminal event, so no separate Removed delivery
            // follows once the sync thread applies this unregister — this
            // delivery is the teardown acknowledgment, so clean up directly.
            bal::unregister(descriptor).ok();
            shared.streams.lock().unwrap().remove(&descriptor);
        }
        Event::Error(_) => {
            // Error is not terminal, so Removed still follows once the sync
            // thread applies this unregister; that's where cleanup happens.
            bal::unregister(descriptor).ok();
        }
        Event::Removed => {
            shared.streams.lock().unwrap().remove(&descriptor);
        }
        _ => {}
    }
}

/// Installs a one-shot SIGINT handler without pulling in a signal-handling
/// crate: spawns a thread that blocks on a libc `sigwait`.
fn ctrlc_once<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::spawn(move || {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGINT);
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
            let mut sig: libc::c_int = 0;
            libc::sigwait(&set, &mut sig);
        }
        f();
    });
}
