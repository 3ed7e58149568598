//! Callback types and the compiled declarations of a routing table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::call::{Call, CallResult};
use crate::fault::{Fault, FaultType};
use crate::path::PathPattern;
use crate::resource::ResourceProvider;

/// A boxed future for async callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A route handler, filter or status error handler.
///
/// # Example
///
/// ```
/// use oxide_web::{BoxFuture, Call, CallResult};
///
/// fn hello(call: &mut Call) -> BoxFuture<'_, CallResult> {
///     Box::pin(async move { call.ok("Hello World!") })
/// }
/// ```
pub type Handler = Arc<dyn for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync>;

/// A handler for faults of a given type.
pub type FaultHandler =
    Arc<dyn for<'a> Fn(&'a mut Call, &'a Fault) -> BoxFuture<'a, CallResult> + Send + Sync>;

/// What a matched route does.
#[derive(Clone)]
pub enum Action {
    /// Run a handler.
    Handler(Handler),
    /// Serve the wildcard tail from a resource provider.
    Resources(Arc<dyn ResourceProvider>),
}

/// One flattened entry of a routing table.
#[derive(Clone)]
pub enum Declaration {
    /// A route.
    Route {
        /// Absolute pattern and methods.
        pattern: PathPattern,
        /// What to do on match.
        action: Action,
    },
    /// A filter run before the route.
    Before {
        /// Absolute pattern; filters answer to any method.
        pattern: PathPattern,
        /// Callback.
        handler: Handler,
    },
    /// A filter run after the route, whatever happened before.
    After {
        /// Absolute pattern; filters answer to any method.
        pattern: PathPattern,
        /// Callback.
        handler: Handler,
    },
    /// Handler for halts carrying `status` (and for the not-found outcome
    /// when `status` is 404).
    ErrorStatus {
        /// Exact status.
        status: u16,
        /// Callback.
        handler: Handler,
    },
    /// Handler for faults of `fault_type` or its subtypes.
    ErrorFault {
        /// Declared fault type.
        fault_type: FaultType,
        /// Callback.
        handler: FaultHandler,
    },
}

impl Declaration {
    /// Short name of the declaration kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Route { .. } => "route",
            Self::Before { .. } => "before",
            Self::After { .. } => "after",
            Self::ErrorStatus { .. } => "error-status",
            Self::ErrorFault { .. } => "error-fault",
        }
    }

    /// Pattern of routes and filters.
    pub fn pattern(&self) -> Option<&PathPattern> {
        match self {
            Self::Route { pattern, .. }
            | Self::Before { pattern, .. }
            | Self::After { pattern, .. } => Some(pattern),
            Self::ErrorStatus { .. } | Self::ErrorFault { .. } => None,
        }
    }
}

impl std::fmt::Debug for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Route { pattern, action } => {
                let target = match action {
                    Action::Handler(_) => "handler",
                    Action::Resources(_) => "resources",
                };
                write!(f, "route {} {} -> {target}", pattern.methods(), pattern.pattern())
            }
            Self::Before { pattern, .. } | Self::After { pattern, .. } => {
                write!(f, "{} {}", self.kind(), pattern.pattern())
            }
            Self::ErrorStatus { status, .. } => write!(f, "error {status}"),
            Self::ErrorFault { fault_type, .. } => write!(f, "error {fault_type}"),
        }
    }
}

pub(crate) fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Call) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn fault_handler<F>(f: F) -> FaultHandler
where
    F: for<'a> Fn(&'a mut Call, &'a Fault) -> BoxFuture<'a, CallResult> + Send + Sync + 'static,
{
    Arc::new(f)
}
