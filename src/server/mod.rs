//! Async TCP dispatcher using Tokio.
//!
//! Accepts TCP connections and runs each HTTP/1.x request through the
//! middleware pipeline and router. One request is served per connection;
//! every response carries `Connection: close`.
//!
//! Concurrency is bounded by a semaphore with [`ServerConfig::workers`]
//! permits: the accept loop takes a permit before accepting, so surplus
//! connections wait in the kernel backlog.

mod builder;
pub mod config;

use std::fmt;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub use builder::{BuildError, ServerBuilder};
pub use config::{ConfigError, ServerConfig};

use crate::context::Context;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::middleware::{MiddlewareHandler, MiddlewareStack, Pipeline};
use crate::plugin::{HookError, Plugin, PluginError, PluginRegistry};
use crate::router::Router;

/// Errors that end [`Server::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("plugin {name:?} failed to start: {source}")]
    PluginStart {
        name: String,
        #[source]
        source: HookError,
    },

    #[error("server was already started")]
    AlreadyStarted,
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Listening(SocketAddr),
    Stopped,
}

// State shared between the server, its handles, and its workers.
struct Shared {
    config: ServerConfig,
    started: AtomicBool,
    stop_requested: AtomicBool,
    running: AtomicBool,
    active_connections: AtomicUsize,
    total_requests: AtomicU64,
    shutdown: Notify,
    lifecycle: watch::Sender<Lifecycle>,
}

/// A cloneable handle for observing and stopping a [`Server`].
///
/// Handles stay valid after the server stops; they just report it as stopped.
///
/// # Examples
///
/// ```rust,no_run
/// use switchyard::{Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::new(ServerConfig::default())?;
///     let handle = server.handle();
///
///     tokio::spawn(async move {
///         let _ = tokio::signal::ctrl_c().await;
///         handle.stop();
///     });
///
///     server.start().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Asks the accept loop to stop.
    ///
    /// Idempotent, and a no-op before [`Server::start`] is called. A stop
    /// requested while the server is still starting (from a plugin's start
    /// hook, say) is honoured as soon as the listener is bound. Only touches
    /// atomic flags and a [`Notify`], so it is safe to call from any task.
    pub fn stop(&self) {
        if !self.shared.started.load(Ordering::SeqCst) {
            return;
        }
        if !self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            info!("stop requested");
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.shutdown.notify_one();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Connections currently being processed.
    pub fn active_connections(&self) -> usize {
        self.shared.active_connections.load(Ordering::SeqCst)
    }

    /// Requests that parsed successfully and were dispatched.
    pub fn total_requests(&self) -> u64 {
        self.shared.total_requests.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// The bound address while the server is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.shared.lifecycle.borrow() {
            Lifecycle::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// Waits until the server is listening and returns its address, or `None`
    /// if startup failed or the server already stopped.
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.shared.lifecycle.subscribe();
        let state = match rx.wait_for(|state| *state != Lifecycle::Idle).await {
            Ok(state) => *state,
            Err(_) => return None,
        };
        match state {
            Lifecycle::Listening(addr) => Some(addr),
            _ => None,
        }
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("bind_address", &self.shared.config.bind_address)
            .field("running", &self.is_running())
            .field("active_connections", &self.active_connections())
            .field("total_requests", &self.total_requests())
            .finish()
    }
}

/// The switchyard HTTP server.
///
/// Routes, middleware and plugins are registered on the server before
/// [`start`](Self::start); `start` then freezes them into a shared pipeline
/// for the rest of the run.
///
/// # Examples
///
/// ```rust,no_run
/// use switchyard::{Context, Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::new(ServerConfig::default().with_bind_address("127.0.0.1:8080"))?;
///     server.router().get("/", |mut ctx: Context| async move {
///         ctx.text("Hello!");
///         ctx
///     })?;
///     server.start().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    shared: Arc<Shared>,
    router: Router,
    middleware: MiddlewareStack,
    plugins: PluginRegistry,
}

impl Server {
    /// Creates an idle server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` fails validation.
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (lifecycle, _) = watch::channel(Lifecycle::Idle);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                started: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                active_connections: AtomicUsize::new(0),
                total_requests: AtomicU64::new(0),
                shutdown: Notify::new(),
                lifecycle,
            }),
            router: Router::new(),
            middleware: MiddlewareStack::new(),
            plugins: PluginRegistry::new(),
        })
    }

    /// The router that will serve requests.
    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Appends a middleware; middleware run in the order they are added.
    pub fn wrap(&mut self, middleware: MiddlewareHandler) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Loads a plugin, registering its routes and middleware.
    ///
    /// # Errors
    ///
    /// See [`PluginRegistry::add`].
    pub fn add_plugin(&mut self, plugin: impl Plugin + 'static) -> Result<(), PluginError> {
        let handle = self.handle();
        self.plugins.add(
            Box::new(plugin),
            &handle,
            &mut self.router,
            &mut self.middleware,
        )
    }

    /// Unloads a plugin after calling its `shutdown` hook.
    pub fn remove_plugin(&mut self, name: &str) -> Option<Box<dyn Plugin>> {
        self.plugins.remove(name)
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name)
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Starts plugins, binds, and serves until [`ServerHandle::stop`] is called.
    ///
    /// After the stop request the listener is closed, in-flight requests get
    /// [`ServerConfig::drain_timeout`] to finish, and then the plugins' stop and
    /// shutdown hooks run.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] on a second call.
    /// - [`ServerError::PluginStart`] when a plugin's start hook fails; no socket is opened.
    /// - [`ServerError::Bind`] when the address cannot be bound.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        if let Err(e) = self.plugins.start_all() {
            self.shared.lifecycle.send_replace(Lifecycle::Stopped);
            return Err(e);
        }

        let (listener, local_addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.plugins.notify_stop();
                self.shared.lifecycle.send_replace(Lifecycle::Stopped);
                return Err(e);
            }
        };

        let shared = Arc::clone(&self.shared);
        let workers = shared.config.workers;
        if shared.stop_requested.load(Ordering::SeqCst) {
            info!(address = %local_addr, "stop requested during startup");
        } else {
            shared.running.store(true, Ordering::SeqCst);
            shared.lifecycle.send_replace(Lifecycle::Listening(local_addr));
            info!(address = %local_addr, workers, "switchyard listening");
        }

        let pipeline = Arc::new(Pipeline::new(
            mem::take(&mut self.middleware),
            mem::take(&mut self.router),
        ));
        let permits = Arc::new(Semaphore::new(workers));

        loop {
            if shared.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            let permit = tokio::select! {
                _ = shared.shutdown.notified() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer_addr) = tokio::select! {
                _ = shared.shutdown.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        if shared.stop_requested.load(Ordering::SeqCst) {
                            break;
                        }
                        error!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let guard = ConnectionGuard::new(Arc::clone(&shared), permit);
            let pipeline = Arc::clone(&pipeline);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, pipeline, &guard.shared).await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
                drop(guard);
            });
        }

        drop(listener);
        shared.running.store(false, Ordering::SeqCst);
        self.drain(&permits).await;
        self.plugins.stop_all();
        shared.lifecycle.send_replace(Lifecycle::Stopped);
        info!(
            total_requests = shared.total_requests.load(Ordering::SeqCst),
            "switchyard stopped"
        );
        Ok(())
    }

    async fn bind(&self) -> Result<(TcpListener, SocketAddr), ServerError> {
        let addr = self.shared.config.bind_address.as_str();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok((listener, local_addr))
    }

    // Waits until every worker permit is back or the drain timeout expires.
    async fn drain(&self, permits: &Semaphore) {
        let config = &self.shared.config;
        let all = u32::try_from(config.workers).unwrap_or(u32::MAX);
        let in_flight = self.shared.active_connections.load(Ordering::SeqCst);
        if in_flight > 0 {
            info!(in_flight, "draining in-flight requests");
        }
        if timeout(config.drain_timeout(), permits.acquire_many(all))
            .await
            .is_err()
        {
            warn!(
                still_active = self.shared.active_connections.load(Ordering::SeqCst),
                timeout = ?config.drain_timeout(),
                "drain timed out; stopping plugins anyway"
            );
        }
    }
}

// Holds a worker slot and the active-connection count for one connection.
// Dropping it releases both, even if the worker panics.
struct ConnectionGuard {
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    fn new(shared: Arc<Shared>, permit: OwnedSemaphorePermit) -> Self {
        shared.active_connections.fetch_add(1, Ordering::SeqCst);
        Self {
            shared,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.shared.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

// What the worker got off the socket.
enum Incoming {
    Request(Request),
    Rejected(StatusCode),
    Closed,
}

/// Serves a single request on `stream`, then closes it.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    shared: &Shared,
) -> Result<(), io::Error> {
    let config = &shared.config;

    let response = match read_request(&mut stream, peer_addr, config).await? {
        Incoming::Closed => {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(());
        }
        Incoming::Rejected(status) => Response::plain(status),
        Incoming::Request(request) => {
            shared.total_requests.fetch_add(1, Ordering::SeqCst);
            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let ctx = Context::new(request);
            let task = tokio::spawn(async move { pipeline.execute(ctx).await });
            match task.await {
                Ok(ctx) => ctx.into_response(),
                Err(e) if e.is_panic() => {
                    error!(peer = %peer_addr, "request handler panicked");
                    Response::plain(StatusCode::InternalServerError)
                }
                Err(e) => {
                    error!(peer = %peer_addr, error = %e, "request task failed");
                    Response::plain(StatusCode::InternalServerError)
                }
            }
        }
    };

    let bytes = response.into_bytes();
    match config.write_timeout() {
        Some(limit) => timeout(limit, stream.write_all(&bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "response write timed out"))??,
        None => stream.write_all(&bytes).await?,
    }
    stream.flush().await?;
    stream.shutdown().await
}

/// Reads until the head and the announced body are buffered.
///
/// Returns [`Incoming::Rejected`] with the status to answer when the request
/// is malformed, too large, or too slow.
async fn read_request(
    stream: &mut TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
) -> Result<Incoming, io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = match config.read_timeout() {
            Some(limit) => match timeout(limit, stream.read_buf(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    warn!(peer = %peer_addr, "read timed out — sending 408");
                    return Ok(Incoming::Rejected(StatusCode::RequestTimeout));
                }
            },
            None => stream.read_buf(&mut buf).await?,
        };

        if bytes_read == 0 {
            if buf.is_empty() {
                return Ok(Incoming::Closed);
            }
            warn!(peer = %peer_addr, buffered = buf.len(), "peer closed mid-request — sending 400");
            return Ok(Incoming::Rejected(StatusCode::BadRequest));
        }

        if buf.len() > config.max_request_bytes {
            warn!(peer = %peer_addr, "request too large — sending 413");
            return Ok(Incoming::Rejected(StatusCode::PayloadTooLarge));
        }

        match Request::parse_head(&buf) {
            Ok(head) if head.total_len() > config.max_request_bytes => {
                warn!(
                    peer = %peer_addr,
                    content_length = head.content_length,
                    "request too large — sending 413"
                );
                return Ok(Incoming::Rejected(StatusCode::PayloadTooLarge));
            }
            Ok(head) if buf.len() >= head.total_len() => {
                return Ok(match Request::parse(&buf) {
                    Ok(request) => Incoming::Request(request),
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                        Incoming::Rejected(StatusCode::BadRequest)
                    }
                });
            }
            // Head complete, body still arriving.
            Ok(_) => continue,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                return Ok(Incoming::Rejected(StatusCode::BadRequest));
            }
        }
    }
}
