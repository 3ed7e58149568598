//! Server: binds routers to a transport.

use std::sync::Arc;

use tracing::info;

use crate::declaration::BoxFuture;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::router::Router;
use crate::session::{MemorySessionStore, SessionStore};
use crate::settings::ServerSettings;
use crate::table::RoutingTable;

/// A transport able to listen and feed requests to a dispatcher.
///
/// Implementations decode each request, call
/// [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) and write the
/// response back.
pub trait ServerPort: Send + Sync {
    /// Starts listening as `settings` say.
    fn start<'a>(
        &'a self,
        settings: &'a ServerSettings,
        dispatcher: Arc<Dispatcher>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Stops listening. Stopping a stopped port does nothing.
    fn stop(&self) -> BoxFuture<'_, Result<()>>;

    /// The port actually bound, once started.
    fn runtime_port(&self) -> Option<u16>;

    /// Returns whether the port is listening.
    fn started(&self) -> bool;
}

/// Routers served through a transport.
pub struct Server {
    settings: ServerSettings,
    port: Box<dyn ServerPort>,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// A server for a single router.
    pub fn new(
        port: impl ServerPort + 'static,
        router: Router,
        settings: ServerSettings,
    ) -> Result<Self> {
        Self::with_routers(port, vec![router], settings)
    }

    /// A server for several routers, tried in order.
    ///
    /// Routers are mounted under the context path when one is set, and
    /// sessions are kept in a [`MemorySessionStore`].
    pub fn with_routers(
        port: impl ServerPort + 'static,
        routers: Vec<Router>,
        settings: ServerSettings,
    ) -> Result<Self> {
        Self::with_session_store(
            port,
            routers,
            settings,
            Arc::new(MemorySessionStore::new()),
        )
    }

    /// Like [`Server::with_routers`] with another session store.
    pub fn with_session_store(
        port: impl ServerPort + 'static,
        routers: Vec<Router>,
        settings: ServerSettings,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        settings.validate()?;

        let routers = if settings.has_context_path() {
            routers
                .into_iter()
                .map(|router| Router::new().mount(&settings.context_path, router))
                .collect()
        } else {
            routers
        };

        let dispatcher = Dispatcher::new(RoutingTable::build_all(&routers)?)
            .with_session_store(store)
            .with_session_cookie(&settings.session_cookie);
        Ok(Self::from_dispatcher(port, dispatcher, settings))
    }

    /// A server around an already configured dispatcher. The context path
    /// of `settings` is not applied.
    pub fn from_dispatcher(
        port: impl ServerPort + 'static,
        dispatcher: Dispatcher,
        settings: ServerSettings,
    ) -> Self {
        Self {
            settings,
            port: Box::new(port),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Starts listening.
    pub async fn start(&self) -> Result<()> {
        self.port
            .start(&self.settings, Arc::clone(&self.dispatcher))
            .await?;
        info!(
            server = %self.settings.server_name,
            address = %self.settings.bind_address,
            port = ?self.runtime_port(),
            context_path = %self.settings.context_path,
            "server started"
        );
        Ok(())
    }

    /// Stops listening.
    pub async fn stop(&self) -> Result<()> {
        self.port.stop().await?;
        info!(server = %self.settings.server_name, "server stopped");
        Ok(())
    }

    /// Returns whether the server is listening.
    pub fn started(&self) -> bool {
        self.port.started()
    }

    /// The port actually bound, once started.
    pub fn runtime_port(&self) -> Option<u16> {
        self.port.runtime_port()
    }

    /// Settings in use.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// The dispatcher fed by the transport.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("settings", &self.settings)
            .field("dispatcher", &self.dispatcher)
            .field("started", &self.started())
            .finish_non_exhaustive()
    }
}
