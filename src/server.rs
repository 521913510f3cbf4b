//! Development web server with live reload.
//!
//! Files come from the build's output sink: the in-memory store in
//! development, so a stale on-disk output is never served. HTML responses get a small script that listens on a
//! server-sent event stream and reloads the page when a watch step finishes.

use crate::build::{BuildContext, OutputSink};
use crate::reload::ReloadHub;
use std::io::Write;
use percent_encoding::percent_decode_str;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

/// Path of the live-reload event stream
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Interval between keep-alive comments on idle event streams
const KEEPALIVE: Duration = Duration::from_secs(15);

/// Script injected into every HTML response
pub const LIVERELOAD_SCRIPT: &str = "<script>(function(){var s=new EventSource('/__livereload');\
s.addEventListener('reload',function(){location.reload();});})();</script>";

/// Error starting or running the dev server
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    #[error("cannot listen on {addr}: {message}")]
    Bind { addr: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub path: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Content type by file extension.
pub fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Insert the live-reload script before the last `</body>`, or append it.
pub fn inject_livereload(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], LIVERELOAD_SCRIPT, &html[idx..]),
        None => format!("{}{}", html, LIVERELOAD_SCRIPT),
    }
}

/// Map a request URL to an output path.
///
/// Strips the query string, decodes percent escapes and maps `/` and
/// directory paths to `index.html`. Returns `None` for paths escaping the
/// output root.
pub fn request_path(url: &str) -> Option<String> {
    let path = url.split(&['?', '#'][..]).next().unwrap_or("");
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let trimmed = decoded.trim_start_matches('/');

    if Path::new(trimmed).components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }

    if trimmed.is_empty() {
        Some("index.html".to_string())
    } else if trimmed.ends_with('/') {
        Some(format!("{}index.html", trimmed))
    } else {
        Some(trimmed.to_string())
    }
}

/// The dev server.
#[derive(Debug)]
pub struct DevServer {
    output: Arc<dyn OutputSink>,
    hub: ReloadHub,
    cors: bool,
    addr: String,
}

impl DevServer {
    pub fn new(ctx: &BuildContext, hub: ReloadHub) -> Self {
        let server = &ctx.config().server;
        Self {
            output: Arc::clone(ctx.output()),
            hub,
            cors: server.cors,
            addr: format!("{}:{}", server.host, server.port),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.output.read(path).ok().flatten()
    }

    /// Look up the file a URL refers to.
    pub fn lookup(&self, url: &str) -> Option<Served> {
        let path = request_path(url)?;
        let (path, body) = match self.read(&path) {
            Some(body) => (path, body),
            None => {
                // `/about` serves `about/index.html` or `about.html`
                let dir_index = format!("{}/index.html", path);
                let html = format!("{}.html", path);
                [dir_index, html].into_iter().find_map(|p| self.read(&p).map(|b| (p, b)))?
            }
        };

        let content_type = content_type(&path);
        let body = if content_type.starts_with("text/html") {
            inject_livereload(&String::from_utf8_lossy(&body)).into_bytes()
        } else {
            body
        };
        Some(Served { path, content_type, body })
    }

    fn header(name: &str, value: &str) -> Option<Header> {
        Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
    }

    fn cors_headers(&self) -> Vec<Header> {
        if !self.cors {
            return Vec::new();
        }
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, HEAD, OPTIONS"),
            ("Access-Control-Allow-Headers", "*"),
        ]
        .iter()
        .filter_map(|(n, v)| Self::header(n, v))
        .collect()
    }

    fn handle(&self, request: Request) {
        let method = request.method().clone();
        let url = request.url().to_string();
        tracing::debug!("{} {}", method, url);

        let result = if method == Method::Options {
            let mut response = Response::empty(StatusCode(204));
            for h in self.cors_headers() {
                response.add_header(h);
            }
            request.respond(response)
        } else if url.split('?').next() == Some(LIVERELOAD_PATH) {
            self.stream_events(request);
            return;
        } else if method != Method::Get && method != Method::Head {
            request.respond(Response::empty(StatusCode(405)))
        } else {
            match self.lookup(&url) {
                Some(served) => {
                    let mut response = Response::from_data(served.body);
                    if let Some(h) = Self::header("Content-Type", served.content_type) {
                        response.add_header(h);
                    }
                    if let Some(h) = Self::header("Cache-Control", "no-cache") {
                        response.add_header(h);
                    }
                    for h in self.cors_headers() {
                        response.add_header(h);
                    }
                    request.respond(response)
                }
                None => {
                    let mut response =
                        Response::from_string(format!("Not found: {}", url)).with_status_code(404);
                    for h in self.cors_headers() {
                        response.add_header(h);
                    }
                    request.respond(response)
                }
            }
        };

        if let Err(e) = result {
            tracing::debug!("failed to respond to {}: {}", url, e);
        }
    }

    /// Hold a server-sent event stream open until the client disconnects.
    fn stream_events(&self, request: Request) {
        let events = self.hub.subscribe();
        let mut writer = request.into_writer();

        let mut head = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n",
        );
        if self.cors {
            head.push_str("Access-Control-Allow-Origin: *\r\n");
        }
        head.push_str("\r\n: connected\n\n");
        if writer.write_all(head.as_bytes()).and_then(|_| writer.flush()).is_err() {
            return;
        }

        loop {
            let chunk = match events.recv_timeout(KEEPALIVE) {
                Ok(event) => format!("event: reload\ndata: {}\n\n", event.category),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => ": ping\n\n".to_string(),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            };
            if writer.write_all(chunk.as_bytes()).and_then(|_| writer.flush()).is_err() {
                break;
            }
        }
        tracing::debug!("live-reload client disconnected");
    }

    /// Bind and serve until the process stops.
    pub fn serve(self) -> Result<(), ServerError> {
        let server = Server::http(&self.addr)
            .map_err(|e| ServerError::Bind { addr: self.addr.clone(), message: e.to_string() })?;
        tracing::info!("serving on http://{}", self.addr);

        let this = Arc::new(self);
        for request in server.incoming_requests() {
            let this = Arc::clone(&this);
            std::thread::spawn(move || this.handle(request));
        }
        Ok(())
    }
}
