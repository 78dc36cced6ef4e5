//! Size- and time-bounded copy from a socket into a backing file.
//!
//! The deadline is absolute: before every read the socket's read timeout is
//! set to whatever time remains, so a trickling peer can not stretch a session
//! past it. Reaching the deadline is a normal end of input, not an error.

#![allow(missing_docs)]

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

const COPY_BUF_SIZE: usize = 8 * 1024;

// ──────────────────── deadline ────────────────────

/// Absolute expiration instant for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now. A zero timeout is bumped to 1ms so the
    /// first read still gets a chance.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let bounded = if timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            timeout
        };
        Self {
            expires_at: Instant::now() + bounded,
        }
    }

    #[must_use]
    pub const fn at(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    /// Time left, or `None` once expired.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

// ──────────────────── source trait ────────────────────

/// A byte source whose blocking reads can be bounded by a timeout.
pub trait DeadlineRead: Read {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl DeadlineRead for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_read_timeout(self, timeout)
    }
}

impl DeadlineRead for &TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

// ──────────────────── copy ────────────────────

/// Why a bounded copy stopped.
#[derive(Debug)]
pub enum CopyEnd {
    /// Peer closed its write half.
    Eof,
    /// The session deadline passed.
    DeadlineElapsed,
    /// `limit` bytes were copied; the source may hold more.
    LimitReached,
    /// Reading the source or writing the sink failed.
    Failed(io::Error),
}

impl CopyEnd {
    /// Whether the copy ended without an I/O failure.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Bytes transferred and the reason the copy stopped.
#[derive(Debug)]
pub struct CopyOutcome {
    pub bytes: u64,
    pub end: CopyEnd,
}

/// Copy from `src` into `dst` until EOF, `deadline`, `limit` bytes, or an
/// I/O failure, whichever comes first.
pub fn bounded_copy<R, W>(src: &mut R, dst: &mut W, limit: u64, deadline: Deadline) -> CopyOutcome
where
    R: DeadlineRead + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = [0_u8; COPY_BUF_SIZE];
    let mut bytes: u64 = 0;

    let end = loop {
        if bytes >= limit {
            break CopyEnd::LimitReached;
        }
        let Some(remaining) = deadline.remaining() else {
            break CopyEnd::DeadlineElapsed;
        };
        if let Err(e) = src.set_read_timeout(Some(remaining)) {
            break CopyEnd::Failed(e);
        }

        let want = usize::try_from(limit - bytes).map_or(buf.len(), |left| left.min(buf.len()));
        match src.read(&mut buf[..want]) {
            Ok(0) => break CopyEnd::Eof,
            Ok(n) => {
                if let Err(e) = dst.write_all(&buf[..n]) {
                    break CopyEnd::Failed(e);
                }
                bytes += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if deadline.is_expired() {
                    break CopyEnd::DeadlineElapsed;
                }
            }
            Err(e) => break CopyEnd::Failed(e),
        }
    };

    CopyOutcome { bytes, end }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: each step yields data, a timeout, or an error.
    enum Step {
        Data(Vec<u8>),
        Timeout,
        Fail(ErrorKind),
    }

    struct Scripted {
        steps: VecDeque<Step>,
        timeouts_set: Vec<Duration>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                timeouts_set: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Step::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.steps.push_front(Step::Data(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Step::Timeout) => {
                    std::thread::sleep(Duration::from_millis(30));
                    Err(ErrorKind::WouldBlock.into())
                }
                Some(Step::Fail(kind)) => Err(kind.into()),
            }
        }
    }

    impl DeadlineRead for Scripted {
        fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            if let Some(t) = timeout {
                self.timeouts_set.push(t);
            }
            Ok(())
        }
    }

    fn far() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    #[test]
    fn copies_until_eof() {
        let mut src = Scripted::new(vec![Step::Data(b"hello ".to_vec()), Step::Data(b"world".to_vec())]);
        let mut dst = Vec::new();
        let out = bounded_copy(&mut src, &mut dst, 100, far());
        assert_eq!(out.bytes, 11);
        assert!(matches!(out.end, CopyEnd::Eof));
        assert_eq!(dst, b"hello world");
    }

    #[test]
    fn stops_at_limit() {
        let mut src = Scripted::new(vec![Step::Data(vec![b'a'; 20])]);
        let mut dst = Vec::new();
        let out = bounded_copy(&mut src, &mut dst, 11, far());
        assert_eq!(out.bytes, 11);
        assert!(matches!(out.end, CopyEnd::LimitReached));
        assert_eq!(dst.len(), 11);
    }

    #[test]
    fn deadline_is_a_normal_end() {
        let mut src = Scripted::new(vec![
            Step::Data(b"partial".to_vec()),
            Step::Timeout,
            Step::Timeout,
            Step::Timeout,
            Step::Data(b"late".to_vec()),
        ]);
        let mut dst = Vec::new();
        let out = bounded_copy(&mut src, &mut dst, 100, Deadline::after(Duration::from_millis(40)));
        assert_eq!(out.bytes, 7);
        assert!(matches!(out.end, CopyEnd::DeadlineElapsed));
        assert!(out.end.is_clean());
    }

    #[test]
    fn expired_deadline_reads_nothing() {
        let mut src = Scripted::new(vec![Step::Data(b"never".to_vec())]);
        let mut dst = Vec::new();
        let past = Deadline::at(Instant::now().checked_sub(Duration::from_secs(1)).unwrap());
        let out = bounded_copy(&mut src, &mut dst, 100, past);
        assert_eq!(out.bytes, 0);
        assert!(matches!(out.end, CopyEnd::DeadlineElapsed));
    }

    #[test]
    fn read_timeout_tracks_remaining_time() {
        let mut src = Scripted::new(vec![Step::Data(b"a".to_vec()), Step::Data(b"b".to_vec())]);
        let mut dst = Vec::new();
        bounded_copy(&mut src, &mut dst, 100, Deadline::after(Duration::from_secs(5)));
        assert_eq!(src.timeouts_set.len(), 3);
        assert!(src.timeouts_set.iter().all(|t| *t <= Duration::from_secs(5)));
        assert!(src.timeouts_set.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn connection_reset_is_failure() {
        let mut src = Scripted::new(vec![
            Step::Data(b"abc".to_vec()),
            Step::Fail(ErrorKind::ConnectionReset),
        ]);
        let mut dst = Vec::new();
        let out = bounded_copy(&mut src, &mut dst, 100, far());
        assert_eq!(out.bytes, 3);
        assert!(matches!(&out.end, CopyEnd::Failed(e) if e.kind() == ErrorKind::ConnectionReset));
        assert!(!out.end.is_clean());
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut src = Scripted::new(vec![Step::Fail(ErrorKind::Interrupted), Step::Data(b"ok".to_vec())]);
        let mut dst = Vec::new();
        let out = bounded_copy(&mut src, &mut dst, 100, far());
        assert_eq!(out.bytes, 2);
        assert!(matches!(out.end, CopyEnd::Eof));
    }

    #[test]
    fn sink_failure_is_failure() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut src = Scripted::new(vec![Step::Data(b"abc".to_vec())]);
        let out = bounded_copy(&mut src, &mut Broken, 100, far());
        assert_eq!(out.bytes, 0);
        assert!(matches!(out.end, CopyEnd::Failed(_)));
    }
}
