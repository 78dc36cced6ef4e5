//! Write transport: one ingestion session per raw TCP connection.

#![allow(missing_docs)]

use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::ingest::copy::Deadline;
use crate::ingest::session::{IngestContext, SessionOutcome, run_session};

/// Upper bound on writing the one-line reply to a slow reader.
const REPLY_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long unread input is discarded before closing.
const LINGER: Duration = Duration::from_millis(200);
const LINGER_MAX_BYTES: u64 = 1024 * 1024;

/// Run an ingestion session on `stream`, then close it.
pub fn serve_connection(ctx: &IngestContext, mut stream: TcpStream, addr: SocketAddr) -> SessionOutcome {
    if let Err(e) = stream.set_write_timeout(Some(REPLY_WRITE_TIMEOUT)) {
        eprintln!("[PASTES-TCP] {addr}: failed to set write timeout: {e}");
    }
    let outcome = run_session(ctx, &mut stream, &addr.to_string());

    // Closing with unread input resets the connection, which can discard the
    // reply before the peer reads it.
    let _ = stream.shutdown(Shutdown::Write);
    drain(&mut stream);
    outcome
}

fn drain(stream: &mut TcpStream) {
    let deadline = Deadline::after(LINGER);
    let mut buf = [0_u8; 4096];
    let mut discarded: u64 = 0;
    while discarded < LINGER_MAX_BYTES {
        let Some(remaining) = deadline.remaining() else {
            return;
        };
        if stream.set_read_timeout(Some(remaining)).is_err() {
            return;
        }
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => discarded += n as u64,
        }
    }
}
