//! Request pipeline: before filters, route, error resolution, after filters.

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use crate::call::{Call, CallResult, Halt};
use crate::codec::{BodyCodec, Codecs};
use crate::declaration::{Action, Handler};
use crate::fault::{Fault, FaultType};
use crate::request::{PathParams, Request};
use crate::resource::{Resource, ResourceProvider};
use crate::response::Response;
use crate::session::SessionStore;
use crate::table::RoutingTable;

/// Name of the session cookie unless configured otherwise.
pub const DEFAULT_SESSION_COOKIE: &str = "OXIDESESSION";

/// How the before/route phase of a callback ended.
#[derive(Debug)]
enum Outcome {
    Continue,
    Halted(Halt),
    Failed(Fault),
    NotFound,
}

/// Runs requests through a routing table.
///
/// The table is immutable, so one dispatcher serves any number of
/// concurrent requests through a shared reference.
///
/// # Example
///
/// ```
/// use oxide_web::{Dispatcher, Request, Router, RoutingTable};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let router = Router::new().get("/hello", |call| Box::pin(async move { call.ok("Hello World!") }));
/// let dispatcher = Dispatcher::new(RoutingTable::build(&router).unwrap());
///
/// let response = dispatcher.dispatch(Request::get("/hello")).await;
/// assert_eq!(response.status, 200);
/// assert_eq!(response.body_string(), Some("Hello World!".to_string()));
///
/// let response = dispatcher.dispatch(Request::get("/missing")).await;
/// assert_eq!(response.status, 404);
/// # });
/// ```
pub struct Dispatcher {
    table: RoutingTable,
    codecs: Arc<Codecs>,
    sessions: Option<Arc<dyn SessionStore>>,
    session_cookie: Arc<str>,
}

impl Dispatcher {
    /// Creates a dispatcher without session store and with the default
    /// codecs.
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table,
            codecs: Arc::new(Codecs::default()),
            sessions: None,
            session_cookie: Arc::from(DEFAULT_SESSION_COOKIE),
        }
    }

    /// Sets the store backing `Call::session`.
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Sets the session cookie name.
    #[must_use]
    pub fn with_session_cookie(mut self, name: impl AsRef<str>) -> Self {
        self.session_cookie = Arc::from(name.as_ref());
        self
    }

    /// Registers a body codec, replacing the one for the same content type.
    #[must_use]
    pub fn with_codec(mut self, codec: impl BodyCodec + 'static) -> Self {
        Arc::make_mut(&mut self.codecs).register(Arc::new(codec));
        self
    }

    /// The routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Handles one request. Never fails: every outcome, faults and panics
    /// included, ends up in the returned response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method;
        let path = request.path.clone();

        let sessions = self
            .sessions
            .as_ref()
            .map(|store| (Arc::clone(store), Arc::clone(&self.session_cookie)));
        let mut call = Call::with_context(request, Arc::clone(&self.codecs), sessions);

        let mut outcome = self.before_phase(&mut call).await;
        if matches!(outcome, Outcome::Continue) {
            outcome = self.route_phase(&mut call).await;
        }
        self.resolve(&mut call, outcome).await;
        self.after_phase(&mut call).await;

        let response = call.into_response();
        debug!(
            %method,
            %path,
            status = response.status,
            elapsed = ?started.elapsed(),
            "request handled"
        );
        response
    }

    async fn before_phase(&self, call: &mut Call) -> Outcome {
        let method = call.request.method;
        let path = call.request.path.clone();

        for (pattern, handler) in self.table.before_filters() {
            let Some(params) = pattern.matches(method, &path) else {
                continue;
            };
            trace!(filter = pattern.pattern(), "before filter");
            match run(call, params, handler).await {
                Outcome::Continue => {}
                stop => return stop,
            }
        }
        Outcome::Continue
    }

    async fn route_phase(&self, call: &mut Call) -> Outcome {
        let method = call.request.method;
        let path = call.request.path.clone();

        for (pattern, action) in self.table.routes() {
            let Some(params) = pattern.matches(method, &path) else {
                continue;
            };
            match action {
                Action::Handler(handler) => {
                    trace!(route = pattern.pattern(), "route matched");
                    return run(call, params, handler).await;
                }
                Action::Resources(provider) => {
                    let resource = match fetch(provider, params.tail().unwrap_or("")).await {
                        Ok(Some(resource)) => resource,
                        Ok(None) => continue,
                        Err(e) => return Outcome::Failed(e.into()),
                    };
                    trace!(route = pattern.pattern(), "resource found");
                    call.request.params = params;
                    call.response.status = 200;
                    call.response.set_content_type(resource.content_type);
                    call.response.set_body(resource.bytes);
                    return Outcome::Continue;
                }
            }
        }
        Outcome::NotFound
    }

    async fn after_phase(&self, call: &mut Call) {
        let method = call.request.method;
        let path = call.request.path.clone();

        for (pattern, handler) in self.table.after_filters() {
            let Some(params) = pattern.matches(method, &path) else {
                continue;
            };
            trace!(filter = pattern.pattern(), "after filter");
            let outcome = run(call, params, handler).await;
            self.resolve(call, outcome).await;
        }
    }

    async fn resolve(&self, call: &mut Call, outcome: Outcome) {
        match outcome {
            Outcome::Continue => {}
            Outcome::NotFound => self.resolve_not_found(call).await,
            Outcome::Halted(halt) => self.resolve_halt(call, &halt).await,
            Outcome::Failed(fault) => self.resolve_fault(call, &fault).await,
        }
    }

    async fn resolve_not_found(&self, call: &mut Call) {
        let body = format!("{} {} not found", call.request.method, call.request.path);
        call.response.status = 404;
        call.response.set_body(body);
        if let Some(handler) = self.table.status_handler(404) {
            let result = AssertUnwindSafe(handler(call)).catch_unwind().await;
            finish_error_handler(call, result);
        }
    }

    async fn resolve_halt(&self, call: &mut Call, halt: &Halt) {
        halt.apply(&mut call.response);

        if let Some(handler) = halt.status.and_then(|s| self.table.status_handler(s)) {
            let result = AssertUnwindSafe(handler(call)).catch_unwind().await;
            finish_error_handler(call, result);
            return;
        }

        if let Some(handler) = self.table.exact_fault_handler(&FaultType::CODED) {
            let fault = Fault::coded(
                halt.effective_status(),
                halt.body.clone().unwrap_or_default(),
            );
            let result = AssertUnwindSafe(handler(call, &fault)).catch_unwind().await;
            finish_error_handler(call, result);
        }
    }

    async fn resolve_fault(&self, call: &mut Call, fault: &Fault) {
        if let Some(handler) = self.table.fault_handler(&fault.kind()) {
            debug!(fault = %fault, "fault handler selected");
            let result = AssertUnwindSafe(handler(call, fault)).catch_unwind().await;
            finish_error_handler(call, result);
            return;
        }

        warn!(
            method = %call.request.method,
            path = %call.request.path,
            fault = %fault,
            "unhandled fault"
        );
        match fault.status() {
            Some(status) => {
                call.response.status = status;
                call.response.set_body(fault.message().to_string());
            }
            None => internal_error(&mut call.response),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("declarations", &self.table.len())
            .field("codecs", &self.codecs)
            .field("sessions", &self.sessions.is_some())
            .field("session_cookie", &self.session_cookie)
            .finish()
    }
}

/// Runs a filter or route handler with the parameters bound by its own
/// pattern.
/// Fetches a resource on the blocking pool when a tokio runtime is
/// available, inline otherwise.
async fn fetch(
    provider: &Arc<dyn ResourceProvider>,
    path: &str,
) -> io::Result<Option<Resource>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return provider.fetch(path);
    };
    let provider = Arc::clone(provider);
    let path = path.to_string();
    runtime
        .spawn_blocking(move || provider.fetch(&path))
        .await
        .map_err(io::Error::other)?
}

async fn run(call: &mut Call, params: PathParams, handler: &Handler) -> Outcome {
    call.request.params = params;
    let result = AssertUnwindSafe(handler(call)).catch_unwind().await;
    match result {
        Ok(Ok(())) => call.take_halt().map_or(Outcome::Continue, Outcome::Halted),
        Ok(Err(fault)) => {
            call.take_halt();
            Outcome::Failed(fault)
        }
        Err(payload) => {
            call.take_halt();
            Outcome::Failed(panic_fault(payload.as_ref()))
        }
    }
}

/// Applies what an error handler did. A halt from the handler is final;
/// a failure of the handler itself ends in a plain 500.
fn finish_error_handler(call: &mut Call, result: std::thread::Result<CallResult>) {
    match result {
        Ok(Ok(())) => {
            if let Some(halt) = call.take_halt() {
                halt.apply(&mut call.response);
            }
        }
        Ok(Err(fault)) => {
            call.take_halt();
            error!(fault = %fault, "error handler failed");
            internal_error(&mut call.response);
        }
        Err(payload) => {
            call.take_halt();
            let fault = panic_fault(payload.as_ref());
            error!(fault = %fault, "error handler panicked");
            internal_error(&mut call.response);
        }
    }
}

fn internal_error(response: &mut Response) {
    response.status = 500;
    response.set_body("Internal Server Error");
}

fn panic_fault(payload: &(dyn Any + Send)) -> Fault {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "callback panicked".to_string());
    error!(panic = %message, "callback panicked");
    Fault::new(FaultType::PANIC, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;

    fn dispatcher(router: &Router) -> Dispatcher {
        Dispatcher::new(RoutingTable::build(router).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let response = dispatcher(&Router::new())
            .dispatch(Request::get("/missing"))
            .await;
        assert_eq!(response.status, 404);
        assert_eq!(
            response.body_string(),
            Some("GET /missing not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_halt_without_status_is_500() {
        let router = Router::new().get("/halt", |call| {
            Box::pin(async move {
                call.response.set_body("kept");
                call.halt_with(Halt::new())
            })
        });
        let response = dispatcher(&router).dispatch(Request::get("/halt")).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body_string(), Some("kept".to_string()));
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let router = Router::new()
            .get("/boom", |call| {
                Box::pin(async move {
                    if call.request.path == "/boom" {
                        panic!("boom");
                    }
                    call.ok("unreachable")
                })
            })
            .fault(FaultType::PANIC, |call, fault| {
                Box::pin(async move { call.send(500, format!("caught {}", fault.message())) })
            });
        let response = dispatcher(&router).dispatch(Request::get("/boom")).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body_string(), Some("caught boom".to_string()));
    }

    #[tokio::test]
    async fn test_unhandled_fault_keeps_headers() {
        let router = Router::new().get("/fail", |call| {
            Box::pin(async move {
                call.response.headers.set("X-Before-Fault", "yes");
                Err(Fault::illegal_state("broken"))
            })
        });
        let response = dispatcher(&router).dispatch(Request::get("/fail")).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.headers.get("X-Before-Fault"), Some("yes"));
        assert_eq!(
            response.body_string(),
            Some("Internal Server Error".to_string())
        );
    }

    #[tokio::test]
    async fn test_unhandled_coded_fault_uses_its_status() {
        let router = Router::new().get("/coded", |_call| {
            Box::pin(async move { Err(Fault::coded(403, "forbidden")) })
        });
        let response = dispatcher(&router).dispatch(Request::get("/coded")).await;
        assert_eq!(response.status, 403);
        assert_eq!(response.body_string(), Some("forbidden".to_string()));
    }

    #[tokio::test]
    async fn test_failing_error_handler_is_500() {
        let router = Router::new()
            .get("/halt", |call| Box::pin(async move { call.halt(418, "teapot") }))
            .error(418, |_call| {
                Box::pin(async move { Err(Fault::illegal_state("handler broke")) })
            });
        let response = dispatcher(&router).dispatch(Request::get("/halt")).await;
        assert_eq!(response.status, 500);
        assert_eq!(
            response.body_string(),
            Some("Internal Server Error".to_string())
        );
    }

    #[tokio::test]
    async fn test_error_handler_halt_is_applied() {
        let router = Router::new()
            .get("/halt", |call| Box::pin(async move { call.halt_status(401) }))
            .error(401, |call| Box::pin(async move { call.halt(403, "no") }));
        let response = dispatcher(&router).dispatch(Request::get("/halt")).await;
        assert_eq!(response.status, 403);
        assert_eq!(response.body_string(), Some("no".to_string()));
    }

    #[tokio::test]
    async fn test_custom_session_cookie() {
        let router = Router::new().get("/session", |call| {
            Box::pin(async move {
                let session = call.session()?;
                call.ok(session.id().to_string())
            })
        });
        let dispatcher = dispatcher(&router)
            .with_session_store(Arc::new(crate::session::MemorySessionStore::new()))
            .with_session_cookie("SID");
        let response = dispatcher.dispatch(Request::get("/session")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.cookies.len(), 1);
        assert_eq!(response.cookies[0].name, "SID");
        assert_eq!(
            response.body_string().as_deref(),
            Some(response.cookies[0].value.as_str())
        );
    }

    struct RecordingResources(Arc<std::sync::Mutex<Option<std::thread::ThreadId>>>);

    impl ResourceProvider for RecordingResources {
        fn fetch(&self, _path: &str) -> io::Result<Option<Resource>> {
            *self.0.lock().unwrap() = Some(std::thread::current().id());
            Ok(Some(Resource {
                bytes: b"data".to_vec(),
                content_type: "text/plain".to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn test_resources_are_read_off_the_runtime_thread() {
        let reader = Arc::new(std::sync::Mutex::new(None));
        let router = Router::new().resources("/*", RecordingResources(Arc::clone(&reader)));
        let response = dispatcher(&router).dispatch(Request::get("/a.txt")).await;
        assert_eq!(response.body_string(), Some("data".to_string()));

        let reader = reader.lock().unwrap().unwrap();
        assert_ne!(reader, std::thread::current().id());
    }

    #[test]
    fn test_resources_without_runtime_are_read_inline() {
        let router = Router::new().resources(
            "/*",
            crate::resource::MemoryResources::new().file("a.txt", "inline"),
        );
        let dispatcher = dispatcher(&router);
        let response = futures::executor::block_on(dispatcher.dispatch(Request::get("/a.txt")));
        assert_eq!(response.body_string(), Some("inline".to_string()));
    }
}
