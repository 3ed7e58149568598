//! # oxide-web
//!
//! An embeddable HTTP routing and filter-dispatch engine.
//!
//! This crate provides:
//! - Path patterns with parameters and wildcards
//! - Nested route groups with scoped before/after filters
//! - Halts: early exits that still run the after filters
//! - Error handlers keyed by status code and by fault type
//! - Sessions, cookies, typed bodies and static resources
//!
//! The transport is not part of this crate: a [`ServerPort`] feeds decoded
//! requests to a [`Dispatcher`] (see `oxide-web-hyper`).
//!
//! ## Quick Start
//!
//! ```
//! use oxide_web::{Dispatcher, Request, Router, RoutingTable};
//!
//! let router = Router::new()
//!     .get("/hello", |call| Box::pin(async move { call.ok("Hello World!") }))
//!     .get("/users/{id}", |call| {
//!         Box::pin(async move {
//!             let id = call.request.params.get("id").unwrap_or("unknown").to_string();
//!             call.ok(format!("User: {id}"))
//!         })
//!     });
//!
//! let dispatcher = Dispatcher::new(RoutingTable::build(&router).unwrap());
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let response = dispatcher.dispatch(Request::get("/users/123")).await;
//! assert_eq!(response.body_string(), Some("User: 123".to_string()));
//! # });
//! ```
//!
//! ## Filters and halts
//!
//! Before filters run in declaration order, outer groups first. A filter
//! that halts skips the remaining before filters and the route; after
//! filters always run.
//!
//! ```
//! use oxide_web::Router;
//!
//! let router = Router::new()
//!     .before_all(|call| {
//!         Box::pin(async move {
//!             if call.request.get_header("Authorization").is_none() {
//!                 return call.halt(401, "Unauthorized");
//!             }
//!             Ok(())
//!         })
//!     })
//!     .after_all(|call| {
//!         Box::pin(async move {
//!             call.response.headers.set("X-Served-By", "oxide-web");
//!             Ok(())
//!         })
//!     })
//!     .path("/admin", |r| {
//!         r.before_all(|call| {
//!             Box::pin(async move {
//!                 call.attributes.insert("area", "admin".to_string());
//!                 Ok(())
//!             })
//!         })
//!         .get("/", |call| Box::pin(async move { call.ok("admin home") }))
//!     });
//! ```
//!
//! ## Error handlers
//!
//! ```
//! use oxide_web::{Fault, FaultType, Router};
//!
//! let router = Router::new()
//!     .get("/fail", |_call| {
//!         Box::pin(async move { Err(Fault::illegal_state("Message")) })
//!     })
//!     .error(404, |call| Box::pin(async move { call.send(404, "Nothing here") }))
//!     .fault(FaultType::ILLEGAL_STATE, |call, fault| {
//!         Box::pin(async move { call.send(505, fault.message().to_string()) })
//!     });
//! ```

mod call;
mod codec;
mod cookie;
mod cors;
mod declaration;
mod dispatcher;
mod error;
mod fault;
mod headers;
mod path;
mod request;
mod resource;
mod response;
mod router;
mod server;
mod session;
mod settings;
mod table;

pub use call::{Attributes, Call, CallResult, Halt};
pub use codec::{BodyCodec, Codecs, FormCodec, JsonCodec};
pub use cookie::Cookie;
pub use cors::CorsFilter;
pub use declaration::{Action, BoxFuture, Declaration, FaultHandler, Handler};
pub use dispatcher::{Dispatcher, DEFAULT_SESSION_COOKIE};
pub use error::{Result, WebError};
pub use fault::{Fault, FaultType};
pub use headers::Headers;
pub use path::{PathPattern, PathSegment};
pub use request::{Method, Methods, PathParams, QueryParams, Request};
pub use resource::{content_type, DirectoryResources, MemoryResources, Resource, ResourceProvider};
pub use response::Response;
pub use router::Router;
pub use server::{Server, ServerPort};
pub use session::{MemorySessionStore, Session, SessionAttributes, SessionStore};
pub use settings::ServerSettings;
pub use table::RoutingTable;
