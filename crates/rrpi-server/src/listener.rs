//! TCP listener: accepts clients and runs one session thread per connection.
//!
//! The listener outlives any individual session. Each session gets fresh
//! handler state from the [`Hardware`] factory; sessions sharing a physical
//! device are not coordinated, so a warning is logged when more than one is
//! active.

use std::collections::HashSet;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use rrpi_protocol::SizeMode;
use tracing::{debug, error, info, warn};

use crate::config::{Hardware, ServerConfig};
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::metrics::metric_defs;
use crate::session::{log_outcome, Session};

// ============================================================================
// Session tracking
// ============================================================================

/// Ids of the sessions currently running.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<RwLock<HashSet<u64>>>,
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session start; returns the number now active.
    pub fn register(&self, id: u64) -> usize {
        let mut active = self.active.write();
        active.insert(id);
        active.len()
    }

    /// Record a session end.
    pub fn unregister(&self, id: u64) {
        self.active.write().remove(&id);
    }

    /// Number of active sessions.
    pub fn active(&self) -> usize {
        self.active.read().len()
    }

    /// Whether `id` is active.
    pub fn is_active(&self, id: u64) -> bool {
        self.active.read().contains(&id)
    }

    /// Register `id` and return a guard that unregisters it when dropped,
    /// including when the session thread unwinds.
    pub fn enter(&self, id: u64) -> (SessionGuard, usize) {
        let active = self.register(id);
        metrics::gauge!(metric_defs::SESSIONS_ACTIVE.name).set(active as f64);
        let guard = SessionGuard {
            tracker: self.clone(),
            id,
        };
        (guard, active)
    }
}

/// Keeps a session registered for as long as it lives.
#[derive(Debug)]
pub struct SessionGuard {
    tracker: SessionTracker,
    id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.unregister(self.id);
        metrics::gauge!(metric_defs::SESSIONS_ACTIVE.name).set(self.tracker.active() as f64);
        if thread::panicking() {
            error!(session = self.id, "session thread panicked");
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// A bound server socket.
pub struct Listener {
    listener: TcpListener,
    hardware: Arc<dyn Hardware>,
    size_mode: SizeMode,
    tracker: SessionTracker,
    next_id: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl Listener {
    /// Bind according to `config`, using its backend.
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let hardware: Arc<dyn Hardware> = Arc::from(config.backend.hardware()?);
        Self::bind_with(config.socket_addr(), hardware, config.size_mode)
    }

    /// Bind `addr` with an explicit hardware factory.
    pub fn bind_with(
        addr: SocketAddr,
        hardware: Arc<dyn Hardware>,
        size_mode: SizeMode,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, %size_mode, "listening");
        Ok(Listener {
            listener,
            hardware,
            size_mode,
            tracker: SessionTracker::new(),
            next_id: AtomicU64::new(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound address (useful after binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Active session tracking.
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Handle that stops the accept loop from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle, ServerError> {
        Ok(ShutdownHandle {
            flag: self.shutdown.clone(),
            addr: self.local_addr()?,
        })
    }

    /// Accept connections until shut down. Session threads are detached.
    pub fn serve(&self) -> Result<(), ServerError> {
        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    // A session that cannot start does not stop the server
                    if let Err(e) = self.spawn_session(stream) {
                        error!(error = %e, "could not start session");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Per-connection accept failures do not stop the server
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        info!("listener stopped");
        Ok(())
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<ListenerHandle, ServerError> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown_handle()?;
        let tracker = self.tracker.clone();
        let thread = thread::Builder::new()
            .name("rrpi-listener".to_string())
            .spawn(move || {
                if let Err(e) = self.serve() {
                    error!(error = %e, "listener failed");
                }
            })?;
        Ok(ListenerHandle {
            addr,
            shutdown,
            tracker,
            thread,
        })
    }

    fn spawn_session(&self, stream: TcpStream) -> Result<(), ServerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = stream.peer_addr().ok();
        // Replies are small and latency-bound
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = id, error = %e, "could not disable Nagle");
        }

        let (guard, active) = self.tracker.enter(id);
        metrics::counter!(metric_defs::SESSIONS_ACCEPTED.name).increment(1);
        info!(session = id, peer = ?peer, "client connected");
        if active > 1 {
            warn!(
                active,
                "multiple sessions active; hardware access is not coordinated between them"
            );
        }

        let dispatcher = Dispatcher::new(self.hardware.spi(), self.hardware.radio());
        let size_mode = self.size_mode;
        // On a spawn failure the closure, and with it the guard, is dropped
        thread::Builder::new()
            .name(format!("rrpi-session-{}", id))
            .spawn(move || {
                let _guard = guard;
                let mut session = Session::new(id, stream, dispatcher, size_mode);
                let outcome = session.run();
                log_outcome(id, &outcome);
            })?;
        Ok(())
    }
}

/// Stops a listener's accept loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Set the stop flag and wake the blocked `accept`.
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake {
                SocketAddr::V4(_) => std::net::Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
            });
        }
        if let Err(e) = TcpStream::connect(wake) {
            debug!(error = %e, "wake-up connection failed");
        }
    }
}

/// A listener running on its own thread.
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    tracker: SessionTracker,
    thread: JoinHandle<()>,
}

impl ListenerHandle {
    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Active session tracking.
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Stop accepting and wait for the accept thread to exit.
    pub fn shutdown(self) {
        self.shutdown.shutdown();
        if self.thread.join().is_err() {
            error!("listener thread panicked");
        }
    }
}
