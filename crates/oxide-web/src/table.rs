//! Flattened routing table.

use crate::declaration::{Action, Declaration, FaultHandler, Handler};
use crate::error::Result;
use crate::fault::FaultType;
use crate::path::{join, PathPattern};
use crate::request::{Method, Methods, PathParams};
use crate::router::{Entry, Router};

/// Immutable, ordered list of every declaration of one or more routers,
/// with absolute patterns.
///
/// Declaration order is kept: it decides which route wins when several
/// match and the order filters run in.
#[derive(Clone, Default)]
pub struct RoutingTable {
    declarations: Vec<Declaration>,
}

impl RoutingTable {
    /// Flattens a router tree.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_web::{Method, Router, RoutingTable};
    ///
    /// let router = Router::new().path("/nested", |r| {
    ///     r.get("/", |call| Box::pin(async move { call.ok("root") }))
    ///         .get("/hello", |call| Box::pin(async move { call.ok("hello") }))
    /// });
    /// let table = RoutingTable::build(&router).unwrap();
    /// assert_eq!(table.len(), 2);
    /// assert!(table.find_route(Method::Get, "/nested/hello").is_some());
    /// assert!(table.find_route(Method::Post, "/nested/hello").is_none());
    /// ```
    pub fn build(router: &Router) -> Result<Self> {
        Self::build_all(std::slice::from_ref(router))
    }

    /// Flattens several routers into one table, in order.
    pub fn build_all(routers: &[Router]) -> Result<Self> {
        let mut declarations = Vec::new();
        for router in routers {
            flatten(router, "", &mut declarations)?;
        }
        tracing::debug!(declarations = declarations.len(), "routing table built");
        Ok(Self { declarations })
    }

    /// Every declaration, in table order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Routes, in table order.
    pub fn routes(&self) -> impl Iterator<Item = (&PathPattern, &Action)> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Route { pattern, action } => Some((pattern, action)),
            _ => None,
        })
    }

    /// Before filters, in table order.
    pub fn before_filters(&self) -> impl Iterator<Item = (&PathPattern, &Handler)> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Before { pattern, handler } => Some((pattern, handler)),
            _ => None,
        })
    }

    /// After filters, in table order.
    pub fn after_filters(&self) -> impl Iterator<Item = (&PathPattern, &Handler)> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::After { pattern, handler } => Some((pattern, handler)),
            _ => None,
        })
    }

    /// Error handlers, status and fault keyed, in table order.
    pub fn error_handlers(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter(|d| {
            matches!(
                d,
                Declaration::ErrorStatus { .. } | Declaration::ErrorFault { .. }
            )
        })
    }

    /// The first handler declared for `status`.
    pub fn status_handler(&self, status: u16) -> Option<&Handler> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::ErrorStatus {
                status: declared,
                handler,
            } if *declared == status => Some(handler),
            _ => None,
        })
    }

    /// The handler of the most derived declared type `kind` is an instance
    /// of. Among handlers at the same distance the first declared wins.
    pub fn fault_handler(&self, kind: &FaultType) -> Option<&FaultHandler> {
        let mut best: Option<(usize, &FaultHandler)> = None;
        for declaration in &self.declarations {
            let Declaration::ErrorFault {
                fault_type,
                handler,
            } = declaration
            else {
                continue;
            };
            if let Some(distance) = kind.distance_to(fault_type) {
                if best.is_none_or(|(d, _)| distance < d) {
                    best = Some((distance, handler));
                }
            }
        }
        best.map(|(_, handler)| handler)
    }

    /// The first handler declared exactly for `kind`, ignoring subtyping.
    pub fn exact_fault_handler(&self, kind: &FaultType) -> Option<&FaultHandler> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::ErrorFault {
                fault_type,
                handler,
            } if fault_type == kind => Some(handler),
            _ => None,
        })
    }

    /// The first route matching `method` and `path` with its parameters.
    ///
    /// Resource routes are reported like any other; whether the resource
    /// exists is only known when fetching it.
    pub fn find_route(&self, method: Method, path: &str) -> Option<(&PathPattern, &Action, PathParams)> {
        self.routes().find_map(|(pattern, action)| {
            pattern
                .matches(method, path)
                .map(|params| (pattern, action, params))
        })
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.declarations).finish()
    }
}

fn flatten(router: &Router, prefix: &str, out: &mut Vec<Declaration>) -> Result<()> {
    for entry in router.entries() {
        match entry {
            Entry::Route {
                methods,
                path,
                action,
            } => out.push(Declaration::Route {
                pattern: PathPattern::compile(&join(prefix, path), methods.clone())?,
                action: action.clone(),
            }),
            Entry::Before { path, handler } => out.push(Declaration::Before {
                pattern: PathPattern::compile(&join(prefix, path), Methods::Any)?,
                handler: handler.clone(),
            }),
            Entry::After { path, handler } => out.push(Declaration::After {
                pattern: PathPattern::compile(&join(prefix, path), Methods::Any)?,
                handler: handler.clone(),
            }),
            Entry::Status { status, handler } => out.push(Declaration::ErrorStatus {
                status: *status,
                handler: handler.clone(),
            }),
            Entry::Fault {
                fault_type,
                handler,
            } => out.push(Declaration::ErrorFault {
                fault_type: *fault_type,
                handler: handler.clone(),
            }),
            Entry::Group {
                prefix: group,
                router,
            } => flatten(router, &join(prefix, group), out)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Call, CallResult};
    use crate::declaration::BoxFuture;
    use crate::error::WebError;
    use crate::fault::Fault;

    fn ok(call: &mut Call) -> BoxFuture<'_, CallResult> {
        Box::pin(async move { call.ok("ok") })
    }

    fn on_fault<'a>(call: &'a mut Call, _fault: &'a Fault) -> BoxFuture<'a, CallResult> {
        Box::pin(async move { call.ok("fault") })
    }

    fn patterns(table: &RoutingTable) -> Vec<String> {
        table
            .declarations()
            .iter()
            .filter_map(|d| d.pattern().map(|p| format!("{} {}", d.kind(), p.pattern())))
            .collect()
    }

    #[test]
    fn test_flattening_keeps_declaration_order() {
        let router = Router::new()
            .before_all(ok)
            .get("/hello", ok)
            .path("/nested", |r| {
                r.before_all(ok)
                    .before("/", ok)
                    .get("/", ok)
                    .path("/secondLevel", |r| r.get("/hello", ok))
                    .after_all(ok)
            })
            .get("/last", ok);

        let table = RoutingTable::build(&router).unwrap();
        assert_eq!(
            patterns(&table),
            vec![
                "before /*",
                "route /hello",
                "before /nested/*",
                "before /nested",
                "route /nested",
                "route /nested/secondLevel/hello",
                "after /nested/*",
                "route /last",
            ]
        );
        assert_eq!(table.routes().count(), 4);
        assert_eq!(table.before_filters().count(), 3);
        assert_eq!(table.after_filters().count(), 1);
    }

    #[test]
    fn test_slashes_are_normalized() {
        let router = Router::new().path("/a/", |r| r.get("b/", ok).path("//c", |r| r.get("", ok)));
        let table = RoutingTable::build(&router).unwrap();
        assert_eq!(patterns(&table), vec!["route /a/b", "route /a/c"]);
    }

    #[test]
    fn test_first_route_wins() {
        let router = Router::new()
            .get("/web/file.txt", ok)
            .any("/web/*", ok)
            .post("/web/file.txt", ok);
        let table = RoutingTable::build(&router).unwrap();

        let (pattern, _, _) = table.find_route(Method::Get, "/web/file.txt").unwrap();
        assert_eq!(pattern.pattern(), "/web/file.txt");
        let (pattern, _, params) = table.find_route(Method::Post, "/web/file.txt").unwrap();
        assert_eq!(pattern.pattern(), "/web/*");
        assert_eq!(params.tail(), Some("file.txt"));
    }

    #[test]
    fn test_error_handlers_are_global() {
        let router = Router::new()
            .path("/nested", |r| r.error(404, ok).fault(FaultType::ANY, on_fault))
            .fault(FaultType::ILLEGAL_ARGUMENT, on_fault);
        let table = RoutingTable::build(&router).unwrap();
        assert!(table.status_handler(404).is_some());
        assert!(table.status_handler(500).is_none());
        assert_eq!(table.error_handlers().count(), 3);
    }

    #[test]
    fn test_most_derived_fault_handler() {
        let any: FaultHandler = std::sync::Arc::new(on_fault);
        let argument: FaultHandler = std::sync::Arc::new(on_fault);
        let table = RoutingTable {
            declarations: vec![
                Declaration::ErrorFault {
                    fault_type: FaultType::ANY,
                    handler: any.clone(),
                },
                Declaration::ErrorFault {
                    fault_type: FaultType::ILLEGAL_ARGUMENT,
                    handler: argument.clone(),
                },
            ],
        };

        let found = table.fault_handler(&FaultType::BODY).unwrap();
        assert!(std::sync::Arc::ptr_eq(found, &argument));
        let found = table.fault_handler(&FaultType::ILLEGAL_STATE).unwrap();
        assert!(std::sync::Arc::ptr_eq(found, &any));
        assert!(table.exact_fault_handler(&FaultType::CODED).is_none());
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let router = Router::new().path("/files/{*rest}", |r| r.get("/x", ok));
        assert!(matches!(
            RoutingTable::build(&router),
            Err(WebError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_build_all_concatenates() {
        let first = Router::new().get("/a", ok);
        let second = Router::new().get("/a", ok).get("/b", ok);
        let table = RoutingTable::build_all(&[first, second]).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.find_route(Method::Get, "/b").is_some());
    }
}
