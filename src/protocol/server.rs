use std::{
    collections::HashMap,
    io,
    net::{self, SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::stats::{AggregateError, PoolError, ThreadPool};

use super::{
    DEFAULT_PORT, ProtocolTransport, Request, Response, Session, Shutdown,
    transport::TransportError,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("computation failed: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("failed to start compute pool: {0}")]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Threads in the process-wide compute pool.
    pub compute_threads: usize,
    /// Largest worker count a single array may request.
    pub max_workers_per_request: u32,
    /// How long in-flight sessions may keep running after shutdown.
    pub grace_period: Duration,
    /// Close sessions that send nothing for this long.
    pub idle_timeout: Option<Duration>,
    /// How often blocked loops check for shutdown.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            compute_threads: thread::available_parallelism().map_or(4, |n| n.get()),
            max_workers_per_request: 64,
            grace_period: Duration::from_secs(5),
            idle_timeout: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Streams of live sessions, kept so shutdown can force them closed.
type Registry = Arc<Mutex<HashMap<u64, TcpStream>>>;

pub struct StatServer {
    listener: TcpListener,
    config: ServerConfig,
    pool: Arc<ThreadPool>,
    shutdown: Shutdown,
    registry: Registry,
}

/// Everything a connection thread needs besides its stream.
#[derive(Clone)]
struct SessionContext {
    pool: Arc<ThreadPool>,
    max_workers: u32,
    shutdown: Shutdown,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

enum Wait {
    Ready,
    Closed,
    Idle,
    Shutdown,
}

impl StatServer {
    pub fn bind(config: ServerConfig, shutdown: Shutdown) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.address)?;
        listener.set_nonblocking(true)?;
        let pool = ThreadPool::new(config.compute_threads.max(1))?;

        Ok(Self {
            listener,
            config,
            pool: Arc::new(pool),
            shutdown,
            registry: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until shutdown, then drains live sessions.
    pub fn listen(self) -> Result<(), ServerError> {
        info!(
            "listening at {} with {} compute threads",
            self.local_addr()?,
            self.pool.size()
        );

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0u64;

        while !self.shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Some(handle) = self.spawn_session(next_id, stream, peer) {
                        sessions.push(handle);
                    }
                    next_id += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.poll_interval);
                }
                Err(_) if self.shutdown.is_triggered() => break,
                Err(e) => {
                    warn!("accept failed: {e}");
                    thread::sleep(self.config.poll_interval);
                }
            }
            sessions.retain(|h| !h.is_finished());
        }

        info!("shutting down; waiting on {} sessions", sessions.len());
        self.drain(sessions);
        Ok(())
    }

    fn spawn_session(&self, id: u64, stream: TcpStream, peer: SocketAddr) -> Option<JoinHandle<()>> {
        let control = match stream.set_nonblocking(false).and_then(|_| stream.try_clone()) {
            Ok(control) => control,
            Err(e) => {
                warn!("dropping connection from {peer}: {e}");
                return None;
            }
        };
        lock(&self.registry).insert(id, control);

        let ctx = SessionContext {
            pool: Arc::clone(&self.pool),
            max_workers: self.config.max_workers_per_request,
            shutdown: self.shutdown.clone(),
            poll_interval: self.config.poll_interval,
            idle_timeout: self.config.idle_timeout,
        };
        let registry = Arc::clone(&self.registry);

        let spawned = thread::Builder::new()
            .name(format!("tally-session-{id}"))
            .spawn(move || {
                match handle_connection(stream, peer, ctx) {
                    Ok(()) => info!("closed connection with {peer}"),
                    Err(e) => warn!("closed connection with {peer}: {e}"),
                }
                lock(&registry).remove(&id);
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("failed to start session for {peer}: {e}");
                lock(&self.registry).remove(&id);
                None
            }
        }
    }

    /// Gives live sessions the grace period, then closes their sockets.
    fn drain(&self, sessions: Vec<JoinHandle<()>>) {
        let deadline = Instant::now() + self.config.grace_period;
        while !lock(&self.registry).is_empty() && Instant::now() < deadline {
            thread::sleep(self.config.poll_interval);
        }

        for (id, stream) in lock(&self.registry).drain() {
            warn!("forcing session {id} closed");
            if let Err(e) = stream.shutdown(net::Shutdown::Both) {
                debug!("session {id} already closed: {e}");
            }
        }

        for handle in sessions {
            if handle.join().is_err() {
                warn!("session thread panicked");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: SessionContext,
) -> Result<(), ServerError> {
    info!("connected client: {peer}");
    let control = stream.try_clone()?;
    let mut transport = ProtocolTransport::new(stream);
    let mut session = Session::new(Arc::clone(&ctx.pool), ctx.max_workers);

    loop {
        match wait_for_message(&control, &ctx)? {
            Wait::Ready => {}
            Wait::Closed => {
                debug!("client {peer} disconnected");
                return Ok(());
            }
            Wait::Idle => {
                info!("client {peer} idle for too long");
                return Ok(());
            }
            Wait::Shutdown => return Ok(()),
        }

        let req = match transport.read_request() {
            Ok(req) => req,
            Err(e) if e.is_disconnect() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match &req {
            Request::SubmitArray { workers, values } => info!(
                "received array of size {}, workers: {workers} from {peer}",
                values.len()
            ),
            other => debug!("received request {:#04x} from {peer}", other.discriminator()),
        }

        let resp = session.handle(req)?;
        if let Some(Response::Compute(status)) = &resp {
            info!(
                "compute for {peer} over {} arrays: {status:?}",
                session.submitted()
            );
        }
        if let Some(resp) = resp {
            transport.write_response(&resp)?;
        }
    }
}

/// Blocks until the next message starts arriving, polling for shutdown.
fn wait_for_message(control: &TcpStream, ctx: &SessionContext) -> io::Result<Wait> {
    control.set_read_timeout(Some(ctx.poll_interval))?;
    let idle_since = Instant::now();
    let mut next = [0u8; 1];

    let outcome = loop {
        if ctx.shutdown.is_triggered() {
            break Wait::Shutdown;
        }
        match control.peek(&mut next) {
            Ok(0) => break Wait::Closed,
            Ok(_) => break Wait::Ready,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                if ctx
                    .idle_timeout
                    .is_some_and(|limit| idle_since.elapsed() >= limit)
                {
                    break Wait::Idle;
                }
            }
            Err(e) => return Err(e),
        }
    };

    // A message in progress is read to completion without a timeout.
    control.set_read_timeout(None)?;
    Ok(outcome)
}
