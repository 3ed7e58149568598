//! Router builder.
//!
//! A [`Router`] is a tree of declarations: routes, filters, error handlers
//! and nested groups, each group contributing a path prefix. Nothing is
//! compiled here; [`RoutingTable::build`](crate::RoutingTable::build) flattens
//! the tree into absolute patterns.

use std::sync::Arc;

use crate::call::{Call, CallResult};
use crate::cors::CorsFilter;
use crate::declaration::{fault_handler, handler, Action, BoxFuture, FaultHandler, Handler};
use crate::fault::{Fault, FaultType};
use crate::request::{Method, Methods};
use crate::resource::ResourceProvider;

/// Template of the unscoped filters: everything below the enclosing group.
pub(crate) const ALL: &str = "*";

#[derive(Clone)]
pub(crate) enum Entry {
    Route {
        methods: Methods,
        path: String,
        action: Action,
    },
    Before {
        path: String,
        handler: Handler,
    },
    After {
        path: String,
        handler: Handler,
    },
    Status {
        status: u16,
        handler: Handler,
    },
    Fault {
        fault_type: FaultType,
        handler: FaultHandler,
    },
    Group {
        prefix: String,
        router: Router,
    },
}

/// Declarative set of routes, filters and error handlers.
///
/// # Example
///
/// ```
/// use oxide_web::Router;
///
/// let router = Router::new()
///     .get("/hello", |call| Box::pin(async move { call.ok("Hello World!") }))
///     .path("/nested", |r| {
///         r.before_all(|call| Box::pin(async move {
///             call.response.headers.set("b_nested", "true");
///             Ok(())
///         }))
///         .get("/hello", |call| Box::pin(async move { call.ok("Second level greeting") }))
///     });
/// ```
#[derive(Clone, Default)]
pub struct Router {
    entries: Vec<Entry>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a GET route.
    #[must_use]
    pub fn get<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Get), path, handler)
    }

    /// Adds a HEAD route.
    #[must_use]
    pub fn head<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Head), path, handler)
    }

    /// Adds a POST route.
    #[must_use]
    pub fn post<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Post), path, handler)
    }

    /// Adds a PUT route.
    #[must_use]
    pub fn put<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Put), path, handler)
    }

    /// Adds a PATCH route.
    #[must_use]
    pub fn patch<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Patch), path, handler)
    }

    /// Adds a DELETE route.
    #[must_use]
    pub fn delete<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Delete), path, handler)
    }

    /// Adds an OPTIONS route.
    #[must_use]
    pub fn options<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Options), path, handler)
    }

    /// Adds a TRACE route.
    #[must_use]
    pub fn trace<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::one(Method::Trace), path, handler)
    }

    /// Adds a route answering every method.
    #[must_use]
    pub fn any<F>(self, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.route(Methods::Any, path, handler)
    }

    /// Adds a route for a set of methods.
    #[must_use]
    pub fn route<F>(mut self, methods: Methods, path: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.entries.push(Entry::Route {
            methods,
            path: path.to_string(),
            action: Action::Handler(handler(f)),
        });
        self
    }

    /// Serves GET requests under `path` from a resource provider.
    ///
    /// `path` is usually a wildcard such as `/web/*`; the wildcard tail is
    /// the resource path. A miss lets the following routes try.
    #[must_use]
    pub fn resources(mut self, path: &str, provider: impl ResourceProvider + 'static) -> Self {
        self.entries.push(Entry::Route {
            methods: Methods::one(Method::Get),
            path: path.to_string(),
            action: Action::Resources(Arc::new(provider)),
        });
        self
    }

    /// Adds a filter run before the routes matching `path`.
    #[must_use]
    pub fn before<F>(mut self, path: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.entries.push(Entry::Before {
            path: path.to_string(),
            handler: handler(f),
        });
        self
    }

    /// Adds a filter run before every request under this router.
    #[must_use]
    pub fn before_all<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.before(ALL, f)
    }

    /// Adds a filter run after the routes matching `path`, whatever the
    /// outcome of the route.
    #[must_use]
    pub fn after<F>(mut self, path: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.entries.push(Entry::After {
            path: path.to_string(),
            handler: handler(f),
        });
        self
    }

    /// Adds a filter run after every request under this router.
    #[must_use]
    pub fn after_all<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.after(ALL, f)
    }

    /// Handles halts with `status`, and the not-found outcome for 404.
    ///
    /// Error handlers are global: declaring one inside a group makes no
    /// difference.
    #[must_use]
    pub fn error<F>(mut self, status: u16, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
    {
        self.entries.push(Entry::Status {
            status,
            handler: handler(f),
        });
        self
    }

    /// Handles faults of `fault_type` and its subtypes.
    #[must_use]
    pub fn fault<F>(mut self, fault_type: FaultType, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Call, &'a Fault) -> BoxFuture<'a, CallResult>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(Entry::Fault {
            fault_type,
            handler: fault_handler(f),
        });
        self
    }

    /// Declares a nested group under `prefix`.
    #[must_use]
    pub fn path(self, prefix: &str, build: impl FnOnce(Router) -> Router) -> Self {
        self.mount(prefix, build(Router::new()))
    }

    /// Mounts an existing router under `prefix`.
    #[must_use]
    pub fn mount(mut self, prefix: &str, router: Router) -> Self {
        self.entries.push(Entry::Group {
            prefix: prefix.to_string(),
            router,
        });
        self
    }

    /// Adds CORS handling to every request under this router.
    #[must_use]
    pub fn cors(self, filter: CorsFilter) -> Self {
        let filter = Arc::new(filter);
        let preflight = Arc::clone(&filter);
        self.before_all(move |call| {
            let filter = Arc::clone(&preflight);
            Box::pin(async move { filter.preflight(call) })
        })
        .after_all(move |call| {
            let filter = Arc::clone(&filter);
            Box::pin(async move { filter.allow_origin(call) })
        })
    }

    /// Number of declarations, nested ones included.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Group { router, .. } => router.len(),
                _ => 1,
            })
            .sum()
    }

    /// Returns whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("declarations", &self.len())
            .finish()
    }
}
