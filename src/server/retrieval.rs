//! Read transport: serve stored items over HTTP.
//!
//! Lookups go straight to the backing directory; the allocator is only asked
//! whether an identifier is still being written. Only single path segments made of identifier symbols ever reach
//! the filesystem, so request paths can not escape the directory.

#![allow(missing_docs)]

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::{PasteError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::server::http::{read_request, write_head, write_response, write_status};
use crate::server::page::IndexPage;
use crate::storage::allocator::Allocator;
use crate::storage::id_pool::ALPHABET;

/// Socket timeout for reading a request head and writing a response.
pub const HTTP_IO_TIMEOUT: Duration = Duration::from_secs(10);

const PASTE_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const INDEX_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Where a request path leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    Paste(&'a str),
    NotFound,
}

/// Map a request path to a route.
///
/// `/` and multi-segment paths get the index page. A single segment is an
/// identifier lookup when every byte is an identifier symbol; anything else
/// is not found.
#[must_use]
pub fn route(path: &str) -> Route<'_> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() || trimmed.contains('/') {
        return Route::Index;
    }
    if trimmed.bytes().all(|b| ALPHABET.contains(&b)) {
        Route::Paste(trimmed)
    } else {
        Route::NotFound
    }
}

/// Shared, read-only inputs of the read transport.
pub struct RetrievalContext {
    pub allocator: Arc<Allocator>,
    pub id_length: usize,
    pub index_html: String,
    pub logger: ActivityLoggerHandle,
}

impl RetrievalContext {
    #[must_use]
    pub fn new(
        allocator: Arc<Allocator>,
        id_length: usize,
        page: &IndexPage,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            allocator,
            id_length,
            index_html: page.render(),
            logger,
        }
    }
}

/// Serve one HTTP connection.
pub fn serve_connection(ctx: &RetrievalContext, stream: &mut TcpStream, client: &str) -> Result<()> {
    stream
        .set_read_timeout(Some(HTTP_IO_TIMEOUT))
        .and_then(|()| stream.set_write_timeout(Some(HTTP_IO_TIMEOUT)))
        .map_err(|e| PasteError::net("http setup", e))?;
    handle_request(ctx, stream, client)
}

/// Read one request from `stream` and answer it.
pub fn handle_request<S>(ctx: &RetrievalContext, stream: &mut S, client: &str) -> Result<()>
where
    S: Read + Write + ?Sized,
{
    let request = match read_request(stream) {
        Ok(request) => request,
        Err(err @ PasteError::Http { .. }) => {
            let _ = write_status(stream, 400, false);
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    let head_only = request.is_head();
    if request.method != "GET" && !head_only {
        return write_status(stream, 405, head_only).map_err(|e| PasteError::net("http write", e));
    }

    let written = match route(&request.path) {
        Route::Index => write_response(
            stream,
            200,
            INDEX_CONTENT_TYPE,
            ctx.index_html.as_bytes(),
            head_only,
        ),
        Route::NotFound => write_status(stream, 404, head_only),
        Route::Paste(id) => serve_paste(ctx, stream, id, client, head_only),
    };
    written.map_err(|e| PasteError::net("http write", e))
}

fn serve_paste<S>(
    ctx: &RetrievalContext,
    stream: &mut S,
    id: &str,
    client: &str,
    head_only: bool,
) -> io::Result<()>
where
    S: Write + ?Sized,
{
    let not_found = |stream: &mut S| {
        ctx.logger.send(ActivityEvent::PasteNotFound {
            id: id.to_string(),
            client: client.to_string(),
        });
        write_status(stream, 404, head_only)
    };

    // An in-flight upload may still be rolled back; its partial bytes are not served.
    if id.len() != ctx.id_length || ctx.allocator.is_in_flight(id) {
        return not_found(stream);
    }

    let path = ctx.allocator.item_path(id);
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return not_found(stream),
        Err(e) => {
            eprintln!("[PASTES-HTTP] failed to open {}: {e}", path.display());
            return write_status(stream, 500, head_only);
        }
    };
    let size = match file.metadata() {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return not_found(stream),
        Err(e) => {
            eprintln!("[PASTES-HTTP] failed to stat {}: {e}", path.display());
            return write_status(stream, 500, head_only);
        }
    };

    write_head(stream, 200, PASTE_CONTENT_TYPE, size, &[])?;
    if !head_only {
        // The open handle keeps serving even if the item is evicted meanwhile.
        io::copy(&mut (&mut file).take(size), stream)?;
    }
    stream.flush()?;

    ctx.logger.send(ActivityEvent::PasteServed {
        id: id.to_string(),
        client: client.to_string(),
        size_bytes: size,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StorageConfig;
    use std::io::Cursor;
    use std::path::Path;

    struct FakeConn {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakeConn {
        fn request(raw: &str) -> Self {
            Self {
                input: Cursor::new(raw.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }

        fn response(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for FakeConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context(dir: &Path) -> RetrievalContext {
        context_with(dir, 4)
    }

    /// The allocator pool is kept tiny; lookups only consult its in-flight set.
    fn context_with(dir: &Path, id_length: usize) -> RetrievalContext {
        let storage = StorageConfig {
            directory: dir.to_path_buf(),
            max_dir_size: 1_000,
            max_item_size: 100,
            id_length: 1,
            gc: false,
        };
        RetrievalContext::new(
            Arc::new(Allocator::open(&storage, None).unwrap()),
            id_length,
            &IndexPage {
                tcp_host: "tcp.localhost".to_string(),
                tcp_port: 9999,
                base_url: "http://localhost:4433".to_string(),
            },
            ActivityLoggerHandle::detached(),
        )
    }

    fn get(ctx: &RetrievalContext, path: &str) -> String {
        let mut conn = FakeConn::request(&format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n"));
        handle_request(ctx, &mut conn, "127.0.0.1:1").unwrap();
        conn.response()
    }

    #[test]
    fn routes() {
        assert_eq!(route("/"), Route::Index);
        assert_eq!(route(""), Route::Index);
        assert_eq!(route("/a/b"), Route::Index);
        assert_eq!(route("/ab12"), Route::Paste("ab12"));
        assert_eq!(route("/AB12"), Route::NotFound);
        assert_eq!(route("/..."), Route::NotFound);
        assert_eq!(route("/%2e%2e"), Route::NotFound);
        assert_eq!(route("/favicon.ico"), Route::NotFound);
    }

    #[test]
    fn stored_item_is_served_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ab12"), b"just testing!\n\x00\xff").unwrap();
        let resp = get(&context(tmp.path()), "/ab12");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(resp.contains("Content-Length: 16\r\n"));

        let mut conn = FakeConn::request("GET /ab12 HTTP/1.1\r\n\r\n");
        handle_request(&context(tmp.path()), &mut conn, "c").unwrap();
        assert!(conn.output.ends_with(b"\r\n\r\njust testing!\n\x00\xff"));
    }

    #[test]
    fn missing_item_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = get(&context(tmp.path()), "/zz99");
        assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn wrong_length_id_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("abc"), b"x").unwrap();
        let resp = get(&context(tmp.path()), "/abc");
        assert!(resp.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn in_flight_item_is_404_until_committed() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context_with(tmp.path(), 1);
        let lease = ctx.allocator.lease().unwrap();
        let id = lease.id().to_string();
        std::fs::write(ctx.allocator.item_path(&id), b"partial upload").unwrap();

        let resp = get(&ctx, &format!("/{id}"));
        assert!(resp.starts_with("HTTP/1.1 404"), "{resp}");

        lease.commit(14);
        let resp = get(&ctx, &format!("/{id}"));
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
        assert!(resp.ends_with("partial upload"));
    }

    #[test]
    fn nested_directory_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dddd")).unwrap();
        let resp = get(&context(tmp.path()), "/dddd");
        assert!(resp.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn root_serves_index_page() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = get(&context(tmp.path()), "/");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("text/html"));
        assert!(resp.contains("nc tcp.localhost 9999"));
    }

    #[test]
    fn head_has_no_body() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("ab12"), b"hello").unwrap();
        let mut conn = FakeConn::request("HEAD /ab12 HTTP/1.1\r\n\r\n");
        handle_request(&context(tmp.path()), &mut conn, "c").unwrap();
        let resp = conn.response();
        assert!(resp.contains("Content-Length: 5\r\n"));
        assert!(resp.ends_with("\r\n\r\n"));
    }

    #[test]
    fn other_methods_are_405() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = FakeConn::request("POST /ab12 HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        handle_request(&context(tmp.path()), &mut conn, "c").unwrap();
        assert!(conn.response().starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn malformed_request_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = FakeConn::request("\x01\x02\r\n\r\n");
        let err = handle_request(&context(tmp.path()), &mut conn, "c").unwrap_err();
        assert_eq!(err.code(), "PST-3004");
        assert!(conn.response().starts_with("HTTP/1.1 400"));
    }
}
