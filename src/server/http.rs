//! Minimal blocking HTTP/1.1 plumbing for the read transport.
//!
//! Requests are read up to the header terminator and parsed with `httparse`;
//! bodies are never read. Every response closes the connection.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::io::{self, Read, Write};

use httparse::Status;

use crate::core::errors::{PasteError, Result};

const MAX_HEADER_BYTES: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;

/// Method and path of a parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path without query string.
    pub path: String,
}

impl HttpRequest {
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }
}

/// Read and parse one request head from `stream`.
pub fn read_request(stream: &mut (impl Read + ?Sized)) -> Result<HttpRequest> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    loop {
        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(PasteError::Http {
                    details: "connection closed before headers".to_string(),
                });
            }
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PasteError::net("http read", e)),
        };
        // Only the tail can complete a terminator split across reads.
        let search_from = buffer.len().saturating_sub(3);
        buffer.extend_from_slice(&chunk[..read]);
        if memchr::memmem::find(&buffer[search_from..], b"\r\n\r\n").is_some() {
            break;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(PasteError::Http {
                details: format!("request head exceeds {MAX_HEADER_BYTES} bytes"),
            });
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&buffer) {
        Ok(Status::Complete(_)) => {}
        Ok(Status::Partial) => {
            return Err(PasteError::Http {
                details: "partial request head".to_string(),
            });
        }
        Err(e) => {
            return Err(PasteError::Http {
                details: e.to_string(),
            });
        }
    }

    let method = request.method.ok_or_else(|| PasteError::Http {
        details: "missing method".to_string(),
    })?;
    let raw_path = request.path.ok_or_else(|| PasteError::Http {
        details: "missing path".to_string(),
    })?;
    let path = raw_path.split_once('?').map_or(raw_path, |(path, _)| path);

    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
    })
}

/// Write status line and headers for a body of `content_length` bytes.
pub fn write_head(
    stream: &mut (impl Write + ?Sized),
    status: u16,
    content_type: &str,
    content_length: u64,
    extra_headers: &[(&str, &str)],
) -> io::Result<()> {
    let mut head = String::with_capacity(128);
    let _ = write!(
        head,
        "HTTP/1.1 {status} {}\r\nContent-Length: {content_length}\r\nContent-Type: {content_type}\r\nConnection: close\r\n",
        status_text(status),
    );
    for (name, value) in extra_headers {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())
}

/// Write a complete response. The body is omitted for `HEAD` requests but
/// `Content-Length` still describes it.
pub fn write_response(
    stream: &mut (impl Write + ?Sized),
    status: u16,
    content_type: &str,
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    let extra: &[(&str, &str)] = if status == 405 {
        &[("Allow", "GET, HEAD")]
    } else {
        &[]
    };
    write_head(stream, status, content_type, body.len() as u64, extra)?;
    if !head_only {
        stream.write_all(body)?;
    }
    stream.flush()
}

/// Plain-text error response.
pub fn write_status(stream: &mut (impl Write + ?Sized), status: u16, head_only: bool) -> io::Result<()> {
    let body = format!("{status} {}\n", status_text(status));
    write_response(stream, status, "text/plain; charset=utf-8", body.as_bytes(), head_only)
}

#[must_use]
pub const fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
