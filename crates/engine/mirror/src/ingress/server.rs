use super::{
    routes::{classify, Reply, Route},
    Direction, IngressContext, IngressError, IngressJob, IngressState, PendingDirection,
};
use parking_lot::Mutex;
use std::{
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tiny_http::{Request, Server};
use tracing::{debug, error, info, warn};

/// How long the accept loop blocks before rechecking the running flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Upper bound on how long `stop` waits for the accept thread.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Local HTTP listener for refresh notifications and movement commands.
///
/// `/notify` only appends to the job queue; the refresh itself runs later on
/// the owning thread. Movement commands are answered by a small worker pool
/// and only write the pending direction. Neither path touches scene state.
pub struct CommandIngressServer {
    bind_address: String,
    context: IngressContext,
    worker_count: usize,
    state: Arc<Mutex<IngressState>>,
    running: Arc<AtomicBool>,
    server: Option<Arc<Server>>,
    accept_thread: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl CommandIngressServer {
    pub fn new(bind_address: impl Into<String>, context: IngressContext, worker_count: usize) -> Self {
        Self {
            bind_address: bind_address.into(),
            context,
            worker_count: worker_count.max(1),
            state: Arc::new(Mutex::new(IngressState::Stopped)),
            running: Arc::new(AtomicBool::new(false)),
            server: None,
            accept_thread: None,
            local_addr: None,
        }
    }

    pub fn state(&self) -> IngressState {
        *self.state.lock()
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds the listener and starts the accept thread.
    ///
    /// A bind failure is returned as-is; there is no retry.
    pub fn start(&mut self) -> Result<SocketAddr, IngressError> {
        {
            let mut state = self.state.lock();
            if *state != IngressState::Stopped {
                return Err(IngressError::InvalidState(*state));
            }
            *state = IngressState::Starting;
        }

        match self.bind_and_spawn() {
            Ok(addr) => {
                *self.state.lock() = IngressState::Listening;
                info!(%addr, "ingress server listening");
                Ok(addr)
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                self.server = None;
                *self.state.lock() = IngressState::Stopped;
                error!(addr = %self.bind_address, error = %err, "ingress server failed to start");
                Err(err)
            }
        }
    }

    fn bind_and_spawn(&mut self) -> Result<SocketAddr, IngressError> {
        let bind_failed = |source| IngressError::ListenerBindFailed {
            addr: self.bind_address.clone(),
            source,
        };

        let listener = TcpListener::bind(&self.bind_address).map_err(bind_failed)?;
        let addr = listener.local_addr().map_err(bind_failed)?;
        let server = Server::from_listener(listener, None)
            .map_err(|e| bind_failed(std::io::Error::other(e.to_string())))?;
        let server = Arc::new(server);

        self.running.store(true, Ordering::Release);
        let pool = WorkerPool::spawn(self.worker_count, self.context.direction.clone());
        let accept_thread = {
            let server = server.clone();
            let context = self.context.clone();
            let running = self.running.clone();
            thread::Builder::new()
                .name("ingress-accept".into())
                .spawn(move || accept_loop(server, context, pool, running))
                .map_err(IngressError::Spawn)?
        };

        self.server = Some(server);
        self.accept_thread = Some(accept_thread);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Closes the listener and waits a bounded time for the accept thread.
    /// In-flight worker replies are not drained.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.lock();
            if *state != IngressState::Listening {
                return;
            }
            *state = IngressState::Stopping;
        }

        self.running.store(false, Ordering::Release);
        if let Some(server) = self.server.take() {
            server.unblock();
        }

        if let Some(handle) = self.accept_thread.take() {
            let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("ingress accept thread panicked");
                }
            } else {
                warn!("ingress accept thread did not exit in time, detaching");
            }
        }

        self.local_addr = None;
        *self.state.lock() = IngressState::Stopped;
        info!("ingress server stopped");
    }
}

impl Drop for CommandIngressServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    server: Arc<Server>,
    context: IngressContext,
    pool: WorkerPool,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        let request = match server.recv_timeout(ACCEPT_POLL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                if running.load(Ordering::Acquire) {
                    error!(error = %err, "ingress accept loop failed");
                }
                break;
            }
        };
        dispatch(request, &context, &pool);
    }
    debug!("ingress accept loop exited");
}

fn dispatch(request: Request, context: &IngressContext, pool: &WorkerPool) {
    match classify(request.method().as_str(), request.url()) {
        Route::Preflight => respond(request, Reply::preflight()),
        Route::Notify => {
            let seq = context.jobs.push(IngressJob::RefreshRequested);
            info!(seq, "refresh requested");
            respond(request, Reply::notify_accepted());
        }
        Route::Command(direction) => pool.submit(request, direction),
        Route::Unknown(path) => {
            debug!(%path, "unknown route");
            respond(request, Reply::not_found());
        }
    }
}

fn respond(request: Request, reply: Reply) {
    if let Err(err) = request.respond(reply.into_response()) {
        debug!(error = %err, "client went away before the reply");
    }
}

/// Records a movement command and answers its request.
fn run_command(request: Request, command: Direction, pending: &PendingDirection) {
    pending.set(command);
    debug!(command = command.name(), "movement command");
    respond(request, Reply::command(command));
}

/// Fixed set of threads answering immediate commands, fire-and-forget.
struct WorkerPool {
    sender: Option<mpsc::Sender<(Request, Direction)>>,
    workers: Vec<JoinHandle<()>>,
    direction: Arc<PendingDirection>,
}

impl WorkerPool {
    fn spawn(count: usize, direction: Arc<PendingDirection>) -> Self {
        let (sender, receiver) = mpsc::channel::<(Request, Direction)>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..count)
            .filter_map(|index| {
                let receiver = receiver.clone();
                let direction = direction.clone();
                thread::Builder::new()
                    .name(format!("ingress-worker-{index}"))
                    .spawn(move || loop {
                        let next = receiver.lock().recv();
                        match next {
                            Ok((request, command)) => run_command(request, command, &direction),
                            Err(_) => break,
                        }
                    })
                    .map_err(|err| warn!(index, error = %err, "failed to spawn ingress worker"))
                    .ok()
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            direction,
        }
    }

    fn submit(&self, request: Request, command: Direction) {
        let rejected = match (&self.sender, self.workers.is_empty()) {
            (Some(sender), false) => sender.send((request, command)).err().map(|e| e.0),
            _ => Some((request, command)),
        };
        // No worker available: answer on the accepting thread instead.
        if let Some((request, command)) = rejected {
            run_command(request, command, &self.direction);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
