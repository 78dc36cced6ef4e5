#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use paste_store::core::config::Config;
use paste_store::logger::activity::ActivityLoggerHandle;
use paste_store::server::PasteServer;
use paste_store::storage::allocator::Allocator;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pastes") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "pastes.exe" } else { "pastes" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve pastes binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("pastes-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env_remove("PASTES_OUTPUT_FORMAT")
        .output()
        .expect("execute pastes command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Write a config file rooted at `root` and return its path.
pub fn write_config(root: &Path, extra: &str) -> PathBuf {
    let path = root.join("config.toml");
    let body = format!(
        "[storage]\ndirectory = {dir:?}\n\n[paths]\nlock_file = {lock:?}\n\n{extra}\n",
        dir = root.join("pastes").to_string_lossy(),
        lock = root.join("pastes.lock").to_string_lossy(),
    );
    fs::write(&path, body).expect("write config");
    path
}

// ──────────────────── in-process server ────────────────────

/// A running server on ephemeral loopback ports.
pub struct TestServer {
    pub server: PasteServer,
    pub allocator: Arc<Allocator>,
    pub config: Config,
}

impl TestServer {
    pub fn start(root: &Path, tweak: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.server.tcp_port = 0;
        config.server.web_port = 0;
        config.storage.directory = root.join("pastes");
        config.ingest.timeout_ms = 2_000;
        config.paths.lock_file = root.join("pastes.lock");
        tweak(&mut config);
        config.finalize().expect("valid test config");

        let logger = ActivityLoggerHandle::detached();
        let allocator =
            Arc::new(Allocator::open(&config.storage, Some(logger.clone())).expect("open allocator"));
        let server =
            PasteServer::start(&config, Arc::clone(&allocator), logger).expect("start server");
        Self {
            server,
            allocator,
            config,
        }
    }

    /// Send `payload` over the write transport and return the reply.
    pub fn paste(&self, payload: &[u8]) -> String {
        paste_to(self.server.tcp_addr(), payload)
    }

    /// `GET path` over the read transport; returns (status, body).
    pub fn get(&self, path: &str) -> (u16, Vec<u8>) {
        http_request(self.server.web_addr(), "GET", path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

pub fn paste_to(addr: SocketAddr, payload: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect tcp");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("set timeout");
    stream.write_all(payload).expect("write payload");
    stream.shutdown(Shutdown::Write).expect("half close");
    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read reply");
    reply
}

pub fn http_request(addr: SocketAddr, method: &str, path: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect http");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("set timeout");
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .expect("write request");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read response");

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    (status, raw[split + 4..].to_vec())
}

/// Identifier at the end of a URL reply.
pub fn id_from_reply(reply: &str) -> String {
    reply
        .trim_end()
        .rsplit('/')
        .next()
        .expect("url has a path")
        .to_string()
}
