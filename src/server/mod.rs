//! Network transports: raw TCP for writes, HTTP for reads.

pub mod http;
pub mod listener;
pub mod page;
pub mod retrieval;
pub mod tcp;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::errors::{PasteError, Result};
use crate::ingest::session::IngestContext;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::server::listener::{ServerHandle, spawn_listener};
use crate::server::page::IndexPage;
use crate::server::retrieval::RetrievalContext;
use crate::storage::allocator::Allocator;

/// Both transports, running.
pub struct PasteServer {
    tcp: ServerHandle,
    http: ServerHandle,
    public_base_url: String,
}

impl PasteServer {
    /// Bind both listeners and start serving.
    ///
    /// Ports configured as 0 bind ephemerally; the public URL and index page
    /// use the ports actually bound.
    pub fn start(config: &Config, allocator: Arc<Allocator>, logger: ActivityLoggerHandle) -> Result<Self> {
        let tcp_listener =
            TcpListener::bind(config.tcp_bind_addr()).map_err(|e| PasteError::net("tcp bind", e))?;
        let web_listener =
            TcpListener::bind(config.web_bind_addr()).map_err(|e| PasteError::net("http bind", e))?;
        let tcp_port = local_port(&tcp_listener)?;
        let web_port = local_port(&web_listener)?;

        let public_base_url = config.public_base_url_for(web_port);
        let page = IndexPage {
            tcp_host: config.display_tcp_host(),
            tcp_port: config.display_tcp_port(tcp_port),
            base_url: public_base_url.clone(),
        };

        let retrieval = Arc::new(RetrievalContext::new(
            Arc::clone(&allocator),
            config.storage.id_length,
            &page,
            logger.clone(),
        ));
        let ingest = Arc::new(IngestContext::from_config(
            config,
            allocator,
            public_base_url.clone(),
            logger.clone(),
        ));

        let http = spawn_listener("http", web_listener, move |mut stream, addr| {
            if let Err(err) = retrieval::serve_connection(&retrieval, &mut stream, &addr.to_string())
                && !matches!(err, PasteError::Network { .. })
            {
                eprintln!("[PASTES-HTTP] {addr}: {err}");
            }
        })?;
        let tcp = spawn_listener("tcp", tcp_listener, move |stream, addr| {
            tcp::serve_connection(&ingest, stream, addr);
        })?;

        for handle in [&tcp, &http] {
            logger.send(ActivityEvent::ListenerStarted {
                transport: handle.name(),
                addr: handle.local_addr().to_string(),
            });
        }

        Ok(Self {
            tcp,
            http,
            public_base_url,
        })
    }

    /// Address the write transport is bound to.
    #[must_use]
    pub const fn tcp_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    /// Address the read transport is bound to.
    #[must_use]
    pub const fn web_addr(&self) -> SocketAddr {
        self.http.local_addr()
    }

    /// Prefix of every URL handed back to writers.
    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Whether either accept loop has died on its own.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.tcp.is_stopped() || self.http.is_stopped()
    }

    /// Stop both accept loops and join every connection thread.
    pub fn shutdown(&mut self) {
        self.tcp.shutdown();
        self.http.shutdown();
    }
}

fn local_port(listener: &TcpListener) -> Result<u16> {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| PasteError::net("local_addr", e))
}
