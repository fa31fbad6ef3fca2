//! HTTP server and graceful shutdown.
//!
//! # Lifecycle
//!
//! [`Server::start`] binds the listener and spawns the accept loop, then
//! returns a [`Running`] server right away. The caller decides what ends it,
//! usually [`Running::wait_for`] with [`TerminationTrigger::os`].
//!
//! On the first termination request the server:
//! 1. Moves to `Draining` and fixes the deadline (`now + shutdown_grace`).
//! 2. Stops `listener.accept()` and drops the listener.
//! 3. Asks every open connection to finish its in-flight request and close.
//! 4. Waits for all connections or the deadline, whichever comes first.
//!    Connections still open at the deadline are aborted.
//! 5. Moves to `Stopped`.
//!
//! Further termination requests while draining are logged and ignored.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::cors::{Cors, CorsLayer};
use tower_http::timeout::{Timeout, TimeoutLayer};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownContext, TerminationTrigger};
use crate::router::Router;

/// The full per-request stack: CORS outermost, then the response deadline.
type AppService = Cors<Timeout<Dispatcher>>;

/// The HTTP server, before it is started.
pub struct Server {
    config: ServerConfig,
    router: Router,
    cors: CorsLayer,
    lifecycle: Lifecycle,
}

impl Server {
    /// A server for `router`. No origins get CORS headers until
    /// [`with_cors`](Server::with_cors) is called.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self { config, router, cors: CorsLayer::new(), lifecycle: Lifecycle::new() }
    }

    pub fn with_cors(mut self, cors: CorsLayer) -> Self {
        self.cors = cors;
        self
    }

    /// Observes lifecycle transitions from `Idle` onwards.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Binds the listener and spawns the accept loop.
    ///
    /// Returns [`Error::Bind`] without ever entering `Serving` when the address
    /// cannot be bound.
    pub async fn start(self) -> Result<Running, Error> {
        let addr = self.config.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let service = ServiceBuilder::new()
            .layer(self.cors)
            .layer(TimeoutLayer::new(self.config.write_timeout()))
            .service(Dispatcher::new(self.router));

        let handle = ServerHandle {
            lifecycle: self.lifecycle,
            stop: CancellationToken::new(),
            context: Arc::new(OnceLock::new()),
            grace: self.config.shutdown_grace(),
        };
        handle.lifecycle.advance(LifecycleState::Serving);
        info!(addr = %local_addr, "product-api listening");

        let timeouts = ConnTimeouts {
            read: self.config.read_timeout(),
            idle: self.config.idle_timeout(),
        };
        let task = tokio::spawn(accept_loop(listener, service, timeouts, handle.clone()));

        Ok(Running { handle, task, local_addr })
    }

    /// Starts the server and runs it until `trigger` fires and draining ends.
    pub async fn run(self, trigger: TerminationTrigger) -> Result<ShutdownReport, Error> {
        Ok(self.start().await?.wait_for(trigger).await)
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable control surface of a running server.
///
/// Safe to use from any task while requests are being served.
#[derive(Clone)]
pub struct ServerHandle {
    lifecycle: Lifecycle,
    stop: CancellationToken,
    context: Arc<OnceLock<ShutdownContext>>,
    grace: Duration,
}

impl ServerHandle {
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Begins draining. Returns `true` only for the call that started it;
    /// later calls change nothing and do not move the deadline.
    pub fn shutdown(&self) -> bool {
        if !self.lifecycle.advance(LifecycleState::Draining) {
            return false;
        }
        let ctx = *self.context.get_or_init(|| ShutdownContext::begin(self.grace));
        info!(grace_ms = ctx.remaining().as_millis() as u64, "graceful shutdown started");
        self.stop.cancel();
        true
    }

    /// The shutdown context, once draining has begun.
    pub fn shutdown_context(&self) -> Option<ShutdownContext> {
        self.context.get().copied()
    }
}

// ── Running server ────────────────────────────────────────────────────────────

/// Outcome of a completed shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections that finished on their own during the drain.
    pub drained: usize,
    /// Connections still open at the deadline and forcibly closed.
    pub abandoned: usize,
}

/// A server whose accept loop is running in the background.
pub struct Running {
    handle: ServerHandle,
    task: JoinHandle<ShutdownReport>,
    local_addr: SocketAddr,
}

impl Running {
    /// The bound address; useful when the configured port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Blocks until `trigger` fires, then drains and stops.
    ///
    /// A trigger whose senders are all gone counts as a termination request.
    pub async fn wait_for(self, mut trigger: TerminationTrigger) -> ShutdownReport {
        match trigger.recv().await {
            Some(signal) => info!(?signal, "termination requested"),
            None => info!("termination trigger closed"),
        }

        let Running { handle, task, .. } = self;
        handle.shutdown();

        let stopped = finish(handle.clone(), task);
        tokio::pin!(stopped);

        let mut listening = true;
        loop {
            tokio::select! {
                report = &mut stopped => return report,
                signal = trigger.recv(), if listening => match signal {
                    Some(signal) => {
                        if !handle.shutdown() {
                            warn!(?signal, "already draining, ignoring termination request");
                        }
                    }
                    None => listening = false,
                },
            }
        }
    }

    /// Drains and stops without waiting for a trigger.
    pub async fn shutdown(self) -> ShutdownReport {
        self.handle.shutdown();
        finish(self.handle, self.task).await
    }
}

async fn finish(handle: ServerHandle, task: JoinHandle<ShutdownReport>) -> ShutdownReport {
    let report = task.await.unwrap_or_else(|e| {
        error!("accept loop failed: {e}");
        ShutdownReport::default()
    });
    handle.lifecycle.advance(LifecycleState::Stopped);
    info!(drained = report.drained, abandoned = report.abandoned, "product-api stopped");
    report
}

// ── Accept loop ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct ConnTimeouts {
    read: Duration,
    idle: Duration,
}

async fn accept_loop(
    listener: TcpListener,
    service: AppService,
    timeouts: ConnTimeouts,
    handle: ServerHandle,
) -> ShutdownReport {
    // Every connection task lives here so the drain can wait on, or abort,
    // whatever is still open.
    let mut tasks = JoinSet::new();
    let close = CancellationToken::new();

    loop {
        tokio::select! {
            // Shutdown first: once draining starts, queued connections are
            // not accepted.
            biased;

            () = handle.stop.cancelled() => break,

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, peer, service.clone(), timeouts, close.clone()));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    let ctx = handle
        .shutdown_context()
        .unwrap_or_else(|| ShutdownContext::begin(handle.grace));
    let open = tasks.len();
    info!(open, "stopped accepting, draining connections");
    close.cancel();

    let drained = tokio::time::timeout_at(ctx.deadline(), async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    match drained {
        Ok(()) => ShutdownReport { drained: open, abandoned: 0 },
        Err(_) => {
            let abandoned = tasks.len();
            warn!(abandoned, "grace period elapsed, closing remaining connections; their requests are lost");
            tasks.shutdown().await;
            ShutdownReport { drained: open - abandoned, abandoned }
        }
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: AppService,
    timeouts: ConnTimeouts,
    close: CancellationToken,
) {
    let activity = Arc::new(Activity::new());

    // Called once per request on the connection, not once per connection.
    let svc = {
        let activity = Arc::clone(&activity);
        service_fn(move |req| {
            let guard = activity.begin();
            let service = service.clone();
            async move {
                let res = service.oneshot(req).await;
                drop(guard);
                res
            }
        })
    };

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read);
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(%peer, "connection error: {e}");
                }
                return;
            }
            () = close.cancelled() => {
                conn.as_mut().graceful_shutdown();
                break;
            }
            () = tokio::time::sleep_until(activity.next_idle_check(timeouts.idle)) => {
                if activity.is_idle(timeouts.idle) {
                    debug!(%peer, "closing idle connection");
                    conn.as_mut().graceful_shutdown();
                    break;
                }
            }
        }
    }

    if let Err(e) = conn.await {
        debug!(%peer, "connection error while closing: {e}");
    }
}

/// Request bookkeeping for one connection, used for idle reclaim.
struct Activity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), last_active: Mutex::new(Instant::now()) }
    }

    fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard(Arc::clone(self))
    }

    /// When the connection could next be idle for a full `idle` period.
    fn next_idle_check(&self, idle: Duration) -> Instant {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            Instant::now() + idle
        } else {
            *self.last_active.lock() + idle
        }
    }

    fn is_idle(&self, idle: Duration) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.last_active.lock().elapsed() >= idle
    }
}

struct ActivityGuard(Arc<Activity>);

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        *self.0.last_active.lock() = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_only_after_quiet_period() {
        let activity = Arc::new(Activity::new());
        let idle = Duration::from_secs(5);
        assert!(!activity.is_idle(idle));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(activity.is_idle(idle));

        let guard = activity.begin();
        assert!(!activity.is_idle(idle));
        assert!(activity.next_idle_check(idle) > Instant::now());
        drop(guard);
        assert!(!activity.is_idle(idle));
    }
}
