// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Relay Server: listener lifecycle and connection dispatch.
//
// One `RelayServer` owns at most one listening socket. Control calls
// (`start`, `stop`, `restart`) are serialized by an async mutex; the current
// state is published through a watch channel so `status()` never waits on a
// control call in progress.
//
// # Shutdown
//
// `stop()` wakes the accept loop, which drops the listener and hands back
// the set of running handlers. Handlers get the configured grace period to
// finish; after that the abandon flag is raised and whatever is still
// running reports `Failed(Cancelled)`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use printrelay_core::config::ServerConfig;
use printrelay_core::error::{StartError, StopError};
use printrelay_core::types::{EventKind, Job, ServerState, StateChange};
use printrelay_sink::PrintSink;

use crate::connection::{HandlerContext, handle_connection};
use crate::events::{EventBus, EventStream};
use crate::port_guard::{DEFAULT_RETRY_DELAY, PortGuard};
use crate::process::{ProcessInspector, SystemInspector};

/// Pause after a failed `accept()` so a persistent error cannot spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long abandoned handlers get to report before they are aborted.
const ABANDON_WAIT: Duration = Duration::from_millis(500);

/// The bound socket and the config it was started with.
#[derive(Debug, Clone)]
struct ListenerInfo {
    config: ServerConfig,
    local_addr: SocketAddr,
}

/// Handles for a running accept loop.
struct Running {
    shutdown: Arc<Notify>,
    abandon_tx: watch::Sender<bool>,
    accept_task: JoinHandle<JoinSet<Job>>,
    grace: Duration,
}

/// Counts a handler as in flight until dropped, aborts included.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// TCP print relay forwarding every connection to one printer.
pub struct RelayServer {
    sink: Arc<dyn PrintSink>,
    inspector: Arc<dyn ProcessInspector>,
    events: EventBus,
    state_tx: watch::Sender<ServerState>,
    listener_tx: watch::Sender<Option<ListenerInfo>>,
    control: Mutex<Option<Running>>,
    active: Arc<AtomicUsize>,
    rejected: Arc<AtomicU64>,
    port_retry_delay: Duration,
}

impl RelayServer {
    /// A stopped server delivering to `sink`.
    pub fn new(sink: Arc<dyn PrintSink>) -> Self {
        Self::with_inspector(sink, Arc::new(SystemInspector::new()))
    }

    /// A stopped server using `inspector` to resolve port conflicts.
    pub fn with_inspector(sink: Arc<dyn PrintSink>, inspector: Arc<dyn ProcessInspector>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        let (listener_tx, _) = watch::channel(None);
        Self {
            sink,
            inspector,
            events: EventBus::default(),
            state_tx,
            listener_tx,
            control: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            port_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Wait between terminating a stale instance and probing again.
    pub fn with_port_retry_delay(mut self, delay: Duration) -> Self {
        self.port_retry_delay = delay;
        self
    }

    // -- control --------------------------------------------------------------

    /// Bind the configured port and start relaying.
    pub async fn start(&self, config: ServerConfig) -> Result<(), StartError> {
        let mut control = self.control.lock().await;
        self.start_locked(&mut control, config).await
    }

    /// Stop accepting, drain in-flight jobs and release the port.
    pub async fn stop(&self) -> Result<(), StopError> {
        let mut control = self.control.lock().await;
        let result = self.stop_locked(&mut control).await;
        if let Err(e) = &result {
            self.refuse(e.to_string());
        }
        result
    }

    /// Stop (if running) and start again with `config`.
    pub async fn restart(&self, config: ServerConfig) -> Result<(), StartError> {
        let mut control = self.control.lock().await;
        match self.stop_locked(&mut control).await {
            Ok(()) | Err(StopError::NotRunning) => {}
        }
        self.start_locked(&mut control, config).await
    }

    async fn start_locked(
        &self,
        control: &mut Option<Running>,
        config: ServerConfig,
    ) -> Result<(), StartError> {
        if control.is_some() {
            let e = StartError::AlreadyRunning;
            self.refuse(e.to_string());
            return Err(e);
        }
        if let Err(reason) = config.validate().and_then(|()| check_job_cap(&config)) {
            warn!(reason = %reason, "refusing to start with invalid configuration");
            let e = StartError::InvalidConfig(reason);
            self.refuse(e.to_string());
            return Err(e);
        }

        self.transition(ServerState::Starting, None);

        let listener = match self.open_listener(&config).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port = config.port, error = %e, "relay server failed to start");
                self.transition(ServerState::Failed, Some(e.to_string()));
                self.transition(ServerState::Stopped, None);
                return Err(e);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                let e = StartError::Bind {
                    addr: SocketAddr::new(config.bind_address, config.port),
                    source,
                };
                self.transition(ServerState::Failed, Some(e.to_string()));
                self.transition(ServerState::Stopped, None);
                return Err(e);
            }
        };

        let shutdown = Arc::new(Notify::new());
        let (abandon_tx, abandon) = watch::channel(false);
        let ctx = HandlerContext {
            sink: Arc::clone(&self.sink),
            events: self.events.clone(),
            printer: Arc::from(config.printer_name.as_str()),
            idle_timeout: config.idle_timeout(),
            max_job_bytes: config.max_job_bytes,
            abandon,
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            ctx,
            Arc::new(Semaphore::new(config.max_in_flight_jobs)),
            config.max_in_flight_jobs,
            Arc::clone(&shutdown),
            Arc::clone(&self.active),
            Arc::clone(&self.rejected),
        ));

        info!(
            addr = %local_addr,
            printer = %config.printer_name,
            sink = self.sink.kind(),
            "relay server listening"
        );
        *control = Some(Running {
            shutdown,
            abandon_tx,
            accept_task,
            grace: config.grace_period(),
        });
        self.listener_tx
            .send_replace(Some(ListenerInfo { config, local_addr }));
        self.transition(ServerState::Listening, None);
        Ok(())
    }

    async fn open_listener(&self, config: &ServerConfig) -> Result<TcpListener, StartError> {
        PortGuard::new(config.bind_address, Arc::clone(&self.inspector))
            .with_reclaim(config.reclaim_stale_instances)
            .with_retry_delay(self.port_retry_delay)
            .ensure_available(config.port)
            .await?;

        let addr = SocketAddr::new(config.bind_address, config.port);
        TcpListener::bind(addr)
            .await
            .map_err(|source| StartError::Bind { addr, source })
    }

    async fn stop_locked(&self, control: &mut Option<Running>) -> Result<(), StopError> {
        let Some(running) = control.take() else {
            return Err(StopError::NotRunning);
        };
        self.transition(ServerState::Stopping, None);

        running.shutdown.notify_one();
        let mut handlers = match running.accept_task.await {
            Ok(handlers) => handlers,
            Err(e) => {
                error!(error = %e, "accept loop ended abnormally");
                JoinSet::new()
            }
        };
        self.listener_tx.send_replace(None);

        if !handlers.is_empty() {
            info!(
                pending = handlers.len(),
                grace_ms = running.grace.as_millis() as u64,
                "waiting for in-flight jobs"
            );
        }
        if tokio::time::timeout(running.grace, drain(&mut handlers))
            .await
            .is_err()
        {
            warn!(
                remaining = handlers.len(),
                "grace period over; cancelling in-flight jobs"
            );
            let _ = running.abandon_tx.send(true);
            if tokio::time::timeout(ABANDON_WAIT, drain(&mut handlers))
                .await
                .is_err()
            {
                handlers.abort_all();
                drain(&mut handlers).await;
            }
        }

        self.transition(ServerState::Stopped, None);
        info!("relay server stopped");
        Ok(())
    }

    /// Report a refused control call. The state does not move, so the
    /// change is published with `from == to`.
    fn refuse(&self, reason: String) {
        let state = self.status();
        debug!(%state, reason = %reason, "control call refused");
        self.events.publish(EventKind::StateChange(StateChange {
            from: state,
            to: state,
            reason: Some(reason),
        }));
    }

    fn transition(&self, to: ServerState, reason: Option<String>) {
        let from = self.state_tx.send_replace(to);
        debug!(%from, %to, "server state changed");
        self.events
            .publish(EventKind::StateChange(StateChange { from, to, reason }));
    }

    // -- observation ----------------------------------------------------------

    pub fn status(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    /// Follow state changes without subscribing to the full event feed.
    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Address the listener is bound to, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener_tx.borrow().as_ref().map(|info| info.local_addr)
    }

    /// Config the running listener was started with.
    pub fn config(&self) -> Option<ServerConfig> {
        self.listener_tx.borrow().as_ref().map(|info| info.config.clone())
    }

    /// Connections currently being handled.
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Connections closed because the in-flight cap was reached.
    pub fn rejected_connections(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Live events from now on.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(running) = self.control.get_mut().as_ref() {
            running.shutdown.notify_one();
            let _ = running.abandon_tx.send(true);
        }
    }
}

/// The in-flight semaphore cannot hold more than `Semaphore::MAX_PERMITS`.
fn check_job_cap(config: &ServerConfig) -> Result<(), String> {
    if config.max_in_flight_jobs > Semaphore::MAX_PERMITS {
        return Err(format!(
            "max_in_flight_jobs must be at most {}",
            Semaphore::MAX_PERMITS
        ));
    }
    Ok(())
}

async fn drain(handlers: &mut JoinSet<Job>) {
    while let Some(result) = handlers.join_next().await {
        log_handler_exit(result);
    }
}

fn log_handler_exit(result: Result<Job, tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "connection handler panicked");
        }
    }
}

/// Accept until told to stop. Returns the handlers still running.
async fn accept_loop(
    listener: TcpListener,
    ctx: HandlerContext,
    permits: Arc<Semaphore>,
    limit: usize,
    shutdown: Arc<Notify>,
    active: Arc<AtomicUsize>,
    rejected: Arc<AtomicU64>,
) -> JoinSet<Job> {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                        rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(peer = %peer, limit, "too many jobs in flight; connection refused");
                        drop(stream);
                        continue;
                    };
                    let in_flight = InFlight::enter(&active);
                    let ctx = ctx.clone();
                    handlers.spawn(async move {
                        let _permit = permit;
                        let _in_flight = in_flight;
                        handle_connection(stream, peer, ctx).await
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },

            Some(result) = handlers.join_next(), if !handlers.is_empty() => {
                log_handler_exit(result);
            }
        }
    }

    debug!(in_flight = handlers.len(), "accept loop stopped");
    drop(listener);
    handlers
}
