//! Per-request exchange context handed to every callback.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::Codecs;
use crate::cookie::Cookie;
use crate::fault::Fault;
use crate::request::Request;
use crate::response::Response;
use crate::session::{Session, SessionStore};

/// What a callback returns. Halting is not an error: it is recorded in the
/// call and the callback returns `Ok(())`.
pub type CallResult = Result<(), Fault>;

/// Request-scoped values shared between filters and handlers.
///
/// Values are not schema-checked: any `Send + Sync` value can be stored and
/// is read back by type.
#[derive(Default)]
pub struct Attributes {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Reads a value; `None` when absent or of another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Mutable access to a value.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Removes a value, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Returns whether `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys currently set.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// An explicit short-circuit of the before/route phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Halt {
    /// Status to answer with; 500 when absent.
    pub status: Option<u16>,
    /// Body replacing the current response body, when present.
    pub body: Option<String>,
}

impl Halt {
    /// Status used by halts that do not name one.
    pub const DEFAULT_STATUS: u16 = 500;

    /// A halt without status nor body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Status the response ends with.
    pub fn effective_status(&self) -> u16 {
        self.status.unwrap_or(Self::DEFAULT_STATUS)
    }

    pub(crate) fn apply(&self, response: &mut Response) {
        response.status = self.effective_status();
        if let Some(body) = &self.body {
            response.set_body(body.clone());
        }
    }
}

struct SessionContext {
    store: Arc<dyn SessionStore>,
    cookie: Arc<str>,
}

/// The exchange context of one request.
///
/// Owned by the dispatch handling the request and lent to each callback in
/// turn; nothing in it is shared with other requests except the session
/// store.
pub struct Call {
    /// The request. `request.params` holds the parameters bound by the
    /// declaration currently running.
    pub request: Request,
    /// The response being built.
    pub response: Response,
    /// Request-scoped attributes.
    pub attributes: Attributes,
    halt: Option<Halt>,
    codecs: Arc<Codecs>,
    sessions: Option<SessionContext>,
    session: Option<Session>,
}

impl Call {
    /// A call with default codecs and no session store.
    pub fn new(request: Request) -> Self {
        Self::with_context(request, Arc::new(Codecs::default()), None)
    }

    pub(crate) fn with_context(
        request: Request,
        codecs: Arc<Codecs>,
        sessions: Option<(Arc<dyn SessionStore>, Arc<str>)>,
    ) -> Self {
        Self {
            request,
            response: Response::ok(),
            attributes: Attributes::new(),
            halt: None,
            codecs,
            sessions: sessions.map(|(store, cookie)| SessionContext { store, cookie }),
            session: None,
        }
    }

    /// Answers 200 with `body`.
    pub fn ok(&mut self, body: impl Into<Vec<u8>>) -> CallResult {
        self.send(200, body)
    }

    /// Answers with any status. Status handlers are not engaged.
    pub fn send(&mut self, status: u16, body: impl Into<Vec<u8>>) -> CallResult {
        self.response.status = status;
        self.response.set_body(body);
        Ok(())
    }

    /// Answers with `value` encoded by the codec the client accepts.
    pub fn send_object<T: Serialize>(&mut self, status: u16, value: &T) -> CallResult {
        let codec = self.codecs.for_response(&self.request).clone();
        let bytes = codec.encode(&serde_json::to_value(value)?)?;
        self.response.set_content_type(codec.content_type());
        self.send(status, bytes)
    }

    /// Browser redirect (302).
    pub fn redirect(&mut self, url: impl Into<String>) -> CallResult {
        self.response.status = 302;
        self.response.headers.set("Location", url);
        Ok(())
    }

    /// Halts with a status and a body.
    pub fn halt(&mut self, status: u16, body: impl Into<String>) -> CallResult {
        self.halt_with(Halt::new().with_status(status).with_body(body))
    }

    /// Halts with a status, keeping the current body.
    pub fn halt_status(&mut self, status: u16) -> CallResult {
        self.halt_with(Halt::new().with_status(status))
    }

    /// Sets the halt slot. Return the result straight away to stop the
    /// current callback; the dispatcher skips the remaining before filters and
    /// the route, then runs the after filters.
    pub fn halt_with(&mut self, halt: Halt) -> CallResult {
        self.halt = Some(halt);
        Ok(())
    }

    /// The pending halt, if a callback halted.
    pub fn halted(&self) -> Option<&Halt> {
        self.halt.as_ref()
    }

    /// Returns whether a callback halted.
    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub(crate) fn take_halt(&mut self) -> Option<Halt> {
        self.halt.take()
    }

    /// The request body decoded into `T` by the codec of its content type.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, Fault> {
        Ok(serde_json::from_value(self.body_value()?)?)
    }

    /// The request body decoded as a list of `T`; a single object yields a
    /// one-element list.
    pub fn body_objects<T: DeserializeOwned>(&self) -> Result<Vec<T>, Fault> {
        match self.body_value()? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(Fault::from))
                .collect(),
            single => Ok(vec![serde_json::from_value(single)?]),
        }
    }

    fn body_value(&self) -> Result<Value, Fault> {
        Ok(self.codecs.for_request(&self.request).decode(&self.request.body)?)
    }

    /// The session of this client, created on first access.
    ///
    /// A new session sets the session cookie on the response.
    pub fn session(&mut self) -> Result<Session, Fault> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let ctx = self
            .sessions
            .as_ref()
            .ok_or_else(|| Fault::illegal_state("no session store configured"))?;

        let known = match self.request.cookie(&ctx.cookie) {
            Some(id) => ctx.store.get(&id)?.map(|_| id),
            None => None,
        };

        let session = match known {
            Some(id) => Session::new(id, false, Arc::clone(&ctx.store)),
            None => {
                let id = ctx.store.create()?;
                self.response.add_cookie(
                    Cookie::new(&*ctx.cookie, id.clone())
                        .path("/")
                        .http_only(true),
                );
                Session::new(id, true, Arc::clone(&ctx.store))
            }
        };

        self.session = Some(session.clone());
        Ok(session)
    }

    /// Consumes the call, keeping the response.
    pub fn into_response(self) -> Response {
        self.response
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("attributes", &self.attributes)
            .field("halt", &self.halt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultType;
    use crate::session::MemorySessionStore;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Item {
        value: String,
    }

    fn with_store(request: Request, store: Arc<dyn SessionStore>) -> Call {
        Call::with_context(
            request,
            Arc::new(Codecs::default()),
            Some((store, Arc::from("SESSION"))),
        )
    }

    #[test]
    fn test_attributes() {
        let mut attributes = Attributes::new();
        attributes.insert("A", "V".to_string());
        attributes.insert("count", 1_u32);

        assert_eq!(attributes.get::<String>("A"), Some(&"V".to_string()));
        assert_eq!(attributes.get::<u64>("count"), None);
        *attributes.get_mut::<u32>("count").unwrap() += 1;
        assert_eq!(attributes.get::<u32>("count"), Some(&2));
        assert!(attributes.remove("A"));
        assert!(!attributes.contains("A"));
        assert_eq!(attributes.len(), 1);
    }

    #[test]
    fn test_send_and_halt() {
        let mut call = Call::new(Request::get("/call"));
        call.ok("Response body").unwrap();
        call.send(400, "Invalid request").unwrap();
        assert_eq!(call.response.status, 400);
        assert!(!call.is_halted());

        call.halt(401, "Go away!").unwrap();
        assert_eq!(
            call.halted(),
            Some(&Halt::new().with_status(401).with_body("Go away!"))
        );
        assert_eq!(call.take_halt().unwrap().effective_status(), 401);
        assert!(!call.is_halted());
    }

    #[test]
    fn test_halt_apply() {
        let mut response = Response::text("kept");
        Halt::new().apply(&mut response);
        assert_eq!(response.status, 500);
        assert_eq!(response.body_string(), Some("kept".to_string()));
    }

    #[test]
    fn test_redirect() {
        let mut call = Call::new(Request::get("/redirect"));
        call.redirect("/call").unwrap();
        assert_eq!(call.response.status, 302);
        assert_eq!(call.response.headers.get("Location"), Some("/call"));
    }

    #[test]
    fn test_typed_bodies() {
        let call = Call::new(Request::post("/").body(r#"{"value":"a"}"#));
        assert_eq!(call.body::<Item>().unwrap(), Item { value: "a".into() });
        assert_eq!(call.body_objects::<Item>().unwrap().len(), 1);

        let list = Call::new(Request::post("/").body(r#"[{"value":"a"},{"value":"b"}]"#));
        assert_eq!(list.body_objects::<Item>().unwrap().len(), 2);

        let form = Call::new(
            Request::post("/")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body("value=from+form"),
        );
        assert_eq!(form.body::<Item>().unwrap().value, "from form");

        let broken = Call::new(Request::post("/").body("{"));
        assert!(broken.body::<Item>().unwrap_err().is_a(&FaultType::BODY));
    }

    #[test]
    fn test_send_object() {
        let mut call = Call::new(Request::get("/"));
        call.send_object(201, &Item { value: "x".into() }).unwrap();
        assert_eq!(call.response.status, 201);
        assert_eq!(call.response.content_type(), Some("application/json"));
        assert_eq!(call.response.body_string(), Some(r#"{"value":"x"}"#.into()));
    }

    #[test]
    fn test_session_without_store() {
        let mut call = Call::new(Request::get("/session"));
        let fault = call.session().unwrap_err();
        assert!(fault.is_a(&FaultType::ILLEGAL_STATE));
    }

    #[test]
    fn test_session_lifecycle() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let mut first = with_store(Request::get("/session"), Arc::clone(&store));
        let session = first.session().unwrap();
        assert!(session.is_new());
        session.set("user", "foo").unwrap();
        assert_eq!(first.session().unwrap().id(), session.id());
        assert_eq!(first.response.cookies.len(), 1);
        assert_eq!(first.response.cookies[0].name, "SESSION");

        let cookie = format!("SESSION={}", session.id());
        let mut second = with_store(
            Request::get("/session").header("Cookie", cookie),
            Arc::clone(&store),
        );
        let again = second.session().unwrap();
        assert!(!again.is_new());
        assert_eq!(again.get::<String>("user").unwrap(), Some("foo".into()));
        assert!(second.response.cookies.is_empty());

        let mut stale = with_store(
            Request::get("/session").header("Cookie", "SESSION=unknown"),
            store,
        );
        assert!(stale.session().unwrap().is_new());
    }
}
