//! bipio Echo Server
//!
//! Single host thread, never blocks on I/O: it polls the listener, reads
//! whatever each connection has buffered, and writes it back. The engine's
//! reactor thread does the actual waiting and moves bytes in the
//! background.
//!
//! Usage:
//!     cargo build --release -p bipio-echo
//!     ./target/release/bipio-echo [port] [address]
//!
//! Test with:
//!     echo "hello" | nc localhost 9999
//!
//! Environment:
//!     BIPIO_LOG_LEVEL=debug   engine logging
//!     BIPIO_BUFFER_SIZE=8192  per-connection buffer size

use bipio::prelude::*;
use bipio::{kerror, kinfo, kprintln, kwarn, ReactorStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static RUNNING: AtomicBool = AtomicBool::new(true);

/// Host loop sleep when a pass made no progress
const IDLE_SLEEP: Duration = Duration::from_millis(1);

// ── Per-connection state ──

struct Conn {
    stream: Stream,
    /// Read but not yet accepted by `write`
    backlog: Vec<u8>,
}

#[derive(Default)]
struct Stats {
    accepts: u64,
    closes: u64,
    bytes_in: u64,
    bytes_out: u64,
}

impl Stats {
    fn print(&self, elapsed: Duration, reactor: Option<&ReactorStats>) {
        kprintln!(
            "bipio-echo: {:.1}s accepts={} closes={} in={} out={}",
            elapsed.as_secs_f64(),
            self.accepts,
            self.closes,
            self.bytes_in,
            self.bytes_out
        );
        if let Some(r) = reactor {
            kprintln!(
                "bipio-echo: reactor iterations={} wakeups={} dispatches={} peak_watch={}",
                r.iterations, r.wakeups, r.dispatches, r.peak_watch
            );
        }
    }
}

/// One pass over a connection. Returns (progressed, keep).
fn service(conn: &mut Conn, stats: &mut Stats) -> (bool, bool) {
    let mut progressed = false;

    // Flush what the outbound buffer could not take last time
    if !conn.backlog.is_empty() {
        match conn.stream.write(&conn.backlog) {
            Ok(0) => return (false, true),
            Ok(n) => {
                conn.backlog.drain(..n);
                stats.bytes_out += n as u64;
                progressed = true;
            }
            Err(e) => {
                kwarn!("bipio-echo: write failed: {}", e);
                return (progressed, false);
            }
        }
        if !conn.backlog.is_empty() {
            return (progressed, true);
        }
    }

    match conn.stream.read(None) {
        Ok(ReadOutcome::Data(bytes)) => {
            stats.bytes_in += bytes.len() as u64;
            conn.backlog = bytes;
            (true, true)
        }
        Ok(ReadOutcome::Empty) => (progressed, true),
        Ok(ReadOutcome::EndOfStream(err)) => {
            if let Some(e) = err {
                kwarn!("bipio-echo: connection ended: {}", e);
            }
            (progressed, false)
        }
        Err(e) => {
            kerror!("bipio-echo: read failed: {}", e);
            (progressed, false)
        }
    }
}

fn run(port: u16, address: &str) -> Result<(), SetupError> {
    let config = EngineConfig::from_env();
    config.print();
    let mut engine = Engine::start(config)?;

    let listener = Socket::create(&engine.handle(), Protocol::Tcp)?;
    listener.listen(address, port, None)?;
    let bound = listener.local_addr()?;
    kprintln!("bipio-echo: listening on {}", bound);

    let mut conns: Vec<Conn> = Vec::new();
    let mut stats = Stats::default();
    let start = Instant::now();
    let mut last_stats = start;

    // ── Host loop ──
    while RUNNING.load(Ordering::Relaxed) {
        let mut progressed = false;

        loop {
            match listener.accept() {
                Ok(Some(stream)) => {
                    stats.accepts += 1;
                    progressed = true;
                    conns.push(Conn {
                        stream,
                        backlog: Vec::new(),
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    kwarn!("bipio-echo: {}", e);
                    break;
                }
            }
        }

        conns.retain_mut(|conn| {
            let (moved, keep) = service(conn, &mut stats);
            progressed |= moved;
            if !keep {
                stats.closes += 1;
                conn.stream.close();
            }
            keep
        });

        if last_stats.elapsed() >= Duration::from_secs(5) {
            stats.print(start.elapsed(), None);
            last_stats = Instant::now();
        }

        if !progressed {
            thread::sleep(IDLE_SLEEP);
        }
    }

    kinfo!("bipio-echo: shutting down ({} open connections)", conns.len());
    drop(conns);
    drop(listener);
    let reactor = engine.shutdown();
    stats.print(start.elapsed(), Some(&reactor));
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(9999);
    let address = args.get(2).map(String::as_str).unwrap_or("0.0.0.0");

    // SIGINT handler for clean shutdown
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_sigint as libc::sighandler_t);
    }

    if let Err(e) = run(port, address) {
        kprintln!("bipio-echo: {}", e);
        std::process::exit(1);
    }
}

extern "C" fn handle_sigint(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}
