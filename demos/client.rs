//! A client demonstrating the CONNECT/CONN_FAIL path: it starts a
//! non-blocking connect to an address supplied on the command line (default
//! `127.0.0.1:7878`, matching `demos/server.rs`) and reports which of the two
//! terminal events the dispatcher delivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bal::socket::TcpStream;
use bal::{Event, EventMask, SocketHints};

fn main() {
    env_logger::init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:7878".to_string());

    bal::init().expect("bal::init");

    let stream = TcpStream::connect_nonblocking(&addr).expect("connect_nonblocking");
    let descriptor = stream.descriptor();
    let done = Arc::new(AtomicBool::new(false));

    let removed = Arc::new(AtomicBool::new(false));

    let done2 = done.clone();
    let removed2 = removed.clone();
    bal::register(
        descriptor,
        EventMask::connect() | EventMask::conn_fail() | EventMask::error(),
        Arc::new(move |_descriptor, event, _ctx| match event {
            Event::Connect => {
                println!("connected to {addr}");
                done2.store(true, Ordering::SeqCst);
            }
            Event::ConnFail(code) => {
                println!("connect to {addr} failed: os error {code}");
                done2.store(true, Ordering::SeqCst);
            }
            Event::Error(code) => {
                println!("socket error: os error {code}");
                done2.store(true, Ordering::SeqCst);
            }
            Event::Removed => {
                // None of the armed events are terminal (Close/Invalid), so
                // the sync thread owes this descriptor exactly one synthetic
                // Removed delivery once it has applied our unregister. Only
                // once we've observed it is it safe to close the descriptor.
                removed2.store(true, Ordering::SeqCst);
            }
            _ => {}
        }),
        Box::new(()),
        SocketHints { listening: false, connect_pending: true },
    )
    .expect("register stream");

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !done.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    bal::unregister(descriptor).ok();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !removed.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    // Only safe to let `stream`'s Drop close the descriptor now that the sync
    // thread has acknowledged the unregister and no callback can still be
    // executing for it.
    drop(stream);
    bal::cleanup().expect("bal::cleanup");
}
