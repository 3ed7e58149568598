#![allow(dead_code)]

use oxide_web::{BoxFuture, Call, CallResult, Dispatcher, Method, Request, Response, Router, RoutingTable};

pub fn dispatcher(router: &Router) -> Dispatcher {
    let table = RoutingTable::build(router)
        .unwrap_or_else(|e| panic!("Failed to build routing table: {e}"));
    Dispatcher::new(table)
}

pub async fn get(dispatcher: &Dispatcher, path: &str) -> Response {
    dispatcher.dispatch(Request::get(path)).await
}

pub async fn call(dispatcher: &Dispatcher, method: Method, path: &str) -> Response {
    dispatcher.dispatch(Request::new(method, path)).await
}

pub fn body(response: &Response) -> String {
    response
        .body_string()
        .unwrap_or_else(|| panic!("Body is not UTF-8: {:?}", response.body))
}

/// Filter body setting header `name` to `true`.
pub fn flag<'a>(call: &'a mut Call, name: &'static str) -> BoxFuture<'a, CallResult> {
    Box::pin(async move {
        call.response.headers.set(name, "true");
        Ok(())
    })
}

pub fn ok<'a>(call: &'a mut Call, body: &'static str) -> BoxFuture<'a, CallResult> {
    Box::pin(async move { call.ok(body) })
}

pub fn assert_headers(response: &Response, headers: &[&str]) {
    for header in headers {
        assert!(
            response.headers.contains(header),
            "Missing header {header} in {:?}",
            response.headers
        );
    }
}
