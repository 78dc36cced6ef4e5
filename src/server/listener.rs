//! Thread-per-connection accept loop shared by both transports.
//!
//! The listener is non-blocking and polled so the loop notices the shutdown
//! flag within `ACCEPT_BACKOFF`. Connection threads are tracked and joined on
//! shutdown; finished ones are reaped on every accept.

#![allow(missing_docs)]

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::errors::{PasteError, Result};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Default)]
struct ConnectionTracker {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ConnectionTracker {
    fn track(&self, handle: thread::JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn active(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    fn join_all(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Running accept loop. Dropping the handle stops it and joins every
/// connection thread.
pub struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    connections: Arc<ConnectionTracker>,
}

impl ServerHandle {
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Connection threads still running.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.connections.active()
    }

    /// Whether the accept loop has exited (after shutdown or a fatal accept error).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.join.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }

    /// Stop accepting, then wait for in-flight connections to finish.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take()
            && handle.join().is_err()
        {
            eprintln!("[PASTES-SERVER] {} accept loop panicked", self.name);
        }
        self.connections.join_all();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind `addr` and serve every connection with `handler` on its own thread.
pub fn bind_and_spawn<F>(name: &'static str, addr: &str, handler: F) -> Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr) + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).map_err(|e| PasteError::net(name, e))?;
    spawn_listener(name, listener, handler)
}

/// Run the accept loop for an already-bound listener.
pub fn spawn_listener<F>(name: &'static str, listener: TcpListener, handler: F) -> Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr) + Send + Sync + 'static,
{
    listener
        .set_nonblocking(true)
        .map_err(|e| PasteError::net(name, e))?;
    let local_addr = listener.local_addr().map_err(|e| PasteError::net(name, e))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let connections = Arc::new(ConnectionTracker::default());
    let handler = Arc::new(handler);

    let shutdown_flag = Arc::clone(&shutdown);
    let tracker = Arc::clone(&connections);
    let join = thread::Builder::new()
        .name(format!("pastes-{name}-accept"))
        .spawn(move || {
            accept_loop(name, &listener, &shutdown_flag, &tracker, &handler);
        })
        .map_err(|e| PasteError::Runtime {
            details: format!("failed to spawn {name} accept loop: {e}"),
        })?;

    Ok(ServerHandle {
        name,
        local_addr,
        shutdown,
        join: Some(join),
        connections,
    })
}

fn accept_loop<F>(
    name: &'static str,
    listener: &TcpListener,
    shutdown: &AtomicBool,
    tracker: &ConnectionTracker,
    handler: &Arc<F>,
) where
    F: Fn(TcpStream, SocketAddr) + Send + Sync + 'static,
{
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                // Accepted sockets inherit O_NONBLOCK on some platforms.
                if let Err(e) = stream.set_nonblocking(false) {
                    eprintln!("[PASTES-SERVER] {name}: dropping {addr}: {e}");
                    continue;
                }
                let handler = Arc::clone(handler);
                let spawned = thread::Builder::new()
                    .name(format!("pastes-{name}-conn"))
                    .spawn(move || handler(stream, addr));
                match spawned {
                    Ok(handle) => tracker.track(handle),
                    Err(e) => eprintln!("[PASTES-SERVER] {name}: failed to spawn connection thread: {e}"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_BACKOFF),
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
            ) => {}
            Err(e) => {
                eprintln!("[PASTES-SERVER] {name}: accept failed: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn serves_connections_and_shuts_down() {
        let mut server = bind_and_spawn("echo", "127.0.0.1:0", |mut stream, _addr| {
            let mut buf = [0_u8; 5];
            if stream.read_exact(&mut buf).is_ok() {
                let _ = stream.write_all(&buf);
            }
        })
        .unwrap();

        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);
        for _ in 0..3 {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
            let mut back = [0_u8; 5];
            client.read_exact(&mut back).unwrap();
            assert_eq!(&back, b"hello");
        }

        server.shutdown();
        assert!(server.is_stopped());
        assert_eq!(server.active_connections(), 0);
    }

    #[test]
    fn shutdown_waits_for_in_flight_connections() {
        let done = Arc::new(AtomicBool::new(false));
        let done_in_handler = Arc::clone(&done);
        let mut server = bind_and_spawn("slow", "127.0.0.1:0", move |_stream, _addr| {
            thread::sleep(Duration::from_millis(100));
            done_in_handler.store(true, Ordering::SeqCst);
        })
        .unwrap();

        let _client = TcpStream::connect(server.local_addr()).unwrap();
        while server.active_connections() == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        server.shutdown();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn bind_conflict_is_network_error() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind_and_spawn("dup", &addr, |_s, _a| {}).err().unwrap();
        assert_eq!(err.code(), "PST-3003");
    }
}
