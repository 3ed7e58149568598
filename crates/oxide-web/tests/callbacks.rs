mod common;

use std::sync::Arc;

use common::{body, dispatcher, get};
use oxide_web::{
    Cookie, CorsFilter, Dispatcher, MemorySessionStore, Method, Request, Router, RoutingTable,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    value: String,
}

#[tokio::test]
async fn test_send_and_response_mutation() {
    let router = Router::new()
        .get("/call", |call| {
            Box::pin(async move {
                call.ok("Response body")?;
                call.send(400, "Invalid request")
            })
        })
        .get("/response", |call| {
            Box::pin(async move {
                call.response.set_body("Hello");
                call.response.headers.set("FOO", "bar");
                call.response.status = 401;
                call.response.set_content_type("text/xml");
                Ok(())
            })
        });
    let dispatcher = dispatcher(&router);

    let response = get(&dispatcher, "/call").await;
    assert_eq!(response.status, 400);
    assert_eq!(body(&response), "Invalid request");

    let response = get(&dispatcher, "/response").await;
    assert_eq!(response.status, 401);
    assert_eq!(response.headers.get("foo"), Some("bar"));
    assert_eq!(response.content_type(), Some("text/xml"));
}

#[tokio::test]
async fn test_request_accessors() {
    let router = Router::new().post("/request", |call| {
        Box::pin(async move {
            let request = &call.request;
            let summary = format!(
                "{} {} {} {} {}",
                request.content_type().unwrap_or_default(),
                request.accept().unwrap_or_default(),
                request.user_agent().unwrap_or_default(),
                request.origin().unwrap_or_default(),
                request.remote_addr.map(|a| a.port()).unwrap_or_default(),
            );
            call.ok(summary)
        })
    });
    let dispatcher = dispatcher(&router);

    let request = Request::post("/request")
        .header("Content-Type", "application/json")
        .header("Accept", "text/plain")
        .header("User-Agent", "tests")
        .header("Origin", "http://localhost")
        .remote_addr("127.0.0.1:4000".parse().unwrap());
    let response = dispatcher.dispatch(request).await;
    assert_eq!(
        body(&response),
        "application/json text/plain tests http://localhost 4000"
    );
}

#[tokio::test]
async fn test_typed_bodies_and_objects() {
    let router = Router::new()
        .post("/items", |call| {
            Box::pin(async move {
                let items: Vec<Item> = call.body_objects()?;
                call.send_object(201, &items)
            })
        })
        .post("/item", |call| {
            Box::pin(async move {
                let item: Item = call.body()?;
                call.send_object(200, &item)
            })
        });
    let dispatcher = dispatcher(&router);

    let response = dispatcher
        .dispatch(Request::post("/items").body(r#"{"value":"single"}"#))
        .await;
    assert_eq!(response.status, 201);
    assert_eq!(body(&response), r#"[{"value":"single"}]"#);

    let response = dispatcher
        .dispatch(
            Request::post("/item")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("Accept", "application/x-www-form-urlencoded")
                .body("value=from+form"),
        )
        .await;
    assert_eq!(
        response.content_type(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(body(&response), "value=from%20form");
}

#[tokio::test]
async fn test_redirect_and_cookies() {
    let router = Router::new()
        .get("/redirect", |call| Box::pin(async move { call.redirect("/call") }))
        .get("/cookie", |call| {
            Box::pin(async move {
                let foo = call.request.cookie("foo").unwrap_or_default();
                call.response
                    .add_cookie(Cookie::new("new_foo", foo).max_age(3600).secure(true));
                call.response.remove_cookie("foo");
                Ok(())
            })
        });
    let dispatcher = dispatcher(&router);

    let response = get(&dispatcher, "/redirect").await;
    assert_eq!(response.status, 302);
    assert_eq!(response.headers.get("Location"), Some("/call"));

    let response = dispatcher
        .dispatch(Request::get("/cookie").header("Cookie", "foo=bar; other=1"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.cookies.len(), 2);
    assert_eq!(response.cookies[0].value, "bar");
    assert_eq!(response.cookies[0].max_age, Some(3600));
    assert!(response.cookies[0].secure);
    assert!(response.cookies[1].is_removal());
}

#[tokio::test]
async fn test_sessions_span_requests() {
    let router = Router::new()
        .get("/login", |call| {
            Box::pin(async move {
                let session = call.session()?;
                session.set("user", "foo")?;
                call.ok(session.id().to_string())
            })
        })
        .get("/me", |call| {
            Box::pin(async move {
                let session = call.session()?;
                let user: Option<String> = session.get("user")?;
                call.ok(format!("{} {}", user.unwrap_or_default(), session.is_new()))
            })
        })
        .get("/logout", |call| {
            Box::pin(async move {
                call.session()?.invalidate()?;
                call.ok("bye")
            })
        });
    let table = RoutingTable::build(&router).unwrap();
    let dispatcher =
        Dispatcher::new(table).with_session_store(Arc::new(MemorySessionStore::new()));

    let login = get(&dispatcher, "/login").await;
    let id = body(&login);
    assert_eq!(login.cookies[0].name, "OXIDESESSION");
    assert_eq!(login.cookies[0].value, id);
    assert!(login.cookies[0].http_only);

    let cookie = format!("OXIDESESSION={id}");
    let me = dispatcher
        .dispatch(Request::get("/me").header("Cookie", cookie.clone()))
        .await;
    assert_eq!(body(&me), "foo false");
    assert!(me.cookies.is_empty());

    dispatcher
        .dispatch(Request::get("/logout").header("Cookie", cookie.clone()))
        .await;
    let me = dispatcher
        .dispatch(Request::get("/me").header("Cookie", cookie))
        .await;
    assert_eq!(body(&me), " true");
}

#[tokio::test]
async fn test_halt_without_status_is_500() {
    let router = Router::new().get("/halt", |call| {
        Box::pin(async move { call.halt_with(oxide_web::Halt::new().with_body("Body Message")) })
    });
    let dispatcher = dispatcher(&router);

    let response = get(&dispatcher, "/halt").await;
    assert_eq!(response.status, 500);
    assert_eq!(body(&response), "Body Message");
}

#[tokio::test]
async fn test_cors_preflight_and_origin() {
    let router = Router::new()
        .cors(CorsFilter::new(&["https://example.com"]))
        .get("/api", |call| common::ok(call, "data"));
    let dispatcher = dispatcher(&router);

    let preflight = dispatcher
        .dispatch(
            Request::new(Method::Options, "/api").header("Origin", "https://example.com"),
        )
        .await;
    assert_eq!(preflight.status, 204);
    assert_eq!(
        preflight.headers.get("Access-Control-Allow-Origin"),
        Some("https://example.com")
    );

    let response = dispatcher
        .dispatch(Request::get("/api").header("Origin", "https://example.com"))
        .await;
    assert_eq!(body(&response), "data");
    assert_eq!(
        response.headers.get("Access-Control-Allow-Origin"),
        Some("https://example.com")
    );

    let rejected = dispatcher
        .dispatch(Request::new(Method::Options, "/api").header("Origin", "https://evil.com"))
        .await;
    assert_eq!(rejected.status, 403);
}
