//! # oxide-web-hyper
//!
//! A [`ServerPort`] serving HTTP/1.1 with `hyper` on the `tokio` runtime.
//!
//! ```no_run
//! use oxide_web::{Router, Server, ServerSettings};
//! use oxide_web_hyper::HyperPort;
//!
//! # async fn run() -> oxide_web::Result<()> {
//! let router = Router::new().get("/hello", |call| Box::pin(async move { call.ok("Hello World!") }));
//! let server = Server::new(HyperPort::new(), router, ServerSettings::default())?;
//! server.start().await?;
//! println!("listening on {:?}", server.runtime_port());
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::SET_COOKIE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use oxide_web::{
    BoxFuture, Dispatcher, Method, Request, Response, Result, ServerPort, ServerSettings, WebError,
};

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// `hyper` transport adapter.
pub struct HyperPort {
    running: Mutex<Option<Running>>,
    body_limit: usize,
}

impl HyperPort {
    /// Default request body limit (2 MiB).
    pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

    /// Creates a stopped port.
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
            body_limit: Self::DEFAULT_BODY_LIMIT,
        }
    }

    /// Largest request body accepted; bigger ones get a 413.
    #[must_use]
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Address bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state().as_ref().map(|running| running.addr)
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HyperPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerPort for HyperPort {
    fn start<'a>(
        &'a self,
        settings: &'a ServerSettings,
        dispatcher: Arc<Dispatcher>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.started() {
                return Err(WebError::Transport("port already started".to_string()));
            }

            let listener =
                TcpListener::bind(SocketAddr::new(settings.bind_address, settings.bind_port))
                    .await?;
            let addr = listener.local_addr()?;
            let (shutdown, stopped) = oneshot::channel();

            let mut state = self.state();
            if state.is_some() {
                return Err(WebError::Transport("port already started".to_string()));
            }
            let task = tokio::spawn(accept_loop(
                listener,
                dispatcher,
                self.body_limit,
                stopped,
            ));
            *state = Some(Running {
                addr,
                shutdown,
                task,
            });
            debug!(%addr, "listening");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(running) = self.state().take() else {
                return Ok(());
            };
            // The loop may already be gone if it panicked; the join below
            // reports that.
            let _ = running.shutdown.send(());
            running
                .task
                .await
                .map_err(|e| WebError::Transport(format!("listener task failed: {e}")))?;
            debug!(addr = %running.addr, "stopped listening");
            Ok(())
        })
    }

    fn runtime_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    fn started(&self) -> bool {
        self.state().is_some()
    }
}

impl std::fmt::Debug for HyperPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperPort")
            .field("local_addr", &self.local_addr())
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    body_limit: usize,
    mut stopped: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let dispatcher = Arc::clone(&dispatcher);

                tokio::task::spawn(async move {
                    let service = service_fn(move |req| {
                        let dispatcher = Arc::clone(&dispatcher);
                        handle_request(req, dispatcher, remote, body_limit)
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(error = %err, %remote, "error serving connection");
                    }
                });
            }
        }
    }
}

async fn handle_request(
    req: hyper::Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
    remote: SocketAddr,
    body_limit: usize,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let response = match to_request(req, remote, body_limit).await {
        Ok(request) => dispatcher.dispatch(request).await,
        Err(response) => response,
    };
    Ok(to_hyper(response))
}

/// Converts a hyper request, or answers straight away when it cannot be
/// dispatched.
async fn to_request(
    req: hyper::Request<Incoming>,
    remote: SocketAddr,
    body_limit: usize,
) -> std::result::Result<Request, Response> {
    let (parts, body) = req.into_parts();

    let Some(method) = Method::parse(parts.method.as_str()) else {
        warn!(method = %parts.method, "unsupported method");
        return Err(Response::new(501).body("Not Implemented"));
    };

    let mut request = Request::new(method, parts.uri.path()).remote_addr(remote);
    if let Some(query) = parts.uri.query() {
        request = request.query(query);
    }

    for (key, value) in &parts.headers {
        match value.to_str() {
            Ok(v) => request.headers.add(key.as_str(), v),
            Err(_) => debug!(header = %key, "skipping non-ASCII header"),
        }
    }

    request.body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit = body_limit, path = %request.path, "request body too large");
            return Err(Response::new(413).body("Payload Too Large"));
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Err(Response::new(400).body("Bad Request"));
        }
    };

    Ok(request)
}

fn to_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = hyper::Response::builder().status(status);

    for (key, value) in response.headers.iter() {
        builder = builder.header(key, value);
    }
    for cookie in &response.cookies {
        builder = builder.header(SET_COOKIE, cookie.to_string());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "invalid response");
            let mut fallback =
                hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
