//! Static index page served for `/` and any non-identifier path.

#![allow(missing_docs)]

/// Where clients should send pastes and where they read them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    pub tcp_host: String,
    pub tcp_port: u16,
    pub base_url: String,
}

impl IndexPage {
    /// Render the page. Values are HTML-escaped.
    #[must_use]
    pub fn render(&self) -> String {
        let host = escape(&self.tcp_host);
        let base = escape(&self.base_url);
        let port = self.tcp_port;
        format!(
            "<!DOCTYPE html>\n\
             <html><head><meta charset=\"utf-8\"><title>pastes</title></head>\n\
             <body>\n\
             <h3>Send some text and read it back</h3>\n\
             <pre><code>$ echo just testing! | nc {host} {port}\n\
             {base}/test\n\
             $ curl {base}/test\n\
             just testing!\n\
             </code></pre>\n\
             </body></html>\n"
        )
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
