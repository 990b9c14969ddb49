use std::{
    io,
    net::{SocketAddr, TcpListener, ToSocketAddrs},
    path::PathBuf,
    sync::Arc,
    thread,
    time::Duration,
};

use crate::{
    audit::AuditLog,
    config::{LogDestination, ServerConfig},
    dispatcher::{ServeContext, WorkerPool},
    error::ServerError,
    shutdown::ShutdownCoordinator,
};

/// How long the accept loop sleeps when no connection is pending before it
/// looks at the stop flag again.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct FileServer {
    socket: TcpListener,
    threads: usize,
    context: Arc<ServeContext>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl FileServer {
    pub fn new(
        addr: impl ToSocketAddrs,
        root: impl Into<PathBuf>,
        threads: usize,
        audit: AuditLog,
    ) -> Result<FileServer, ServerError> {
        if threads == 0 {
            return Err(ServerError::NoWorkers);
        }
        let socket = TcpListener::bind(addr).map_err(ServerError::Bind)?;
        socket.set_nonblocking(true)?;

        let context = Arc::new(ServeContext::new(root.into(), audit));
        let shutdown = Arc::new(ShutdownCoordinator::new(context.clone()));
        Ok(FileServer {
            socket,
            threads,
            context,
            shutdown,
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<FileServer, ServerError> {
        let audit = match &config.log {
            LogDestination::Stderr => AuditLog::stderr(),
            LogDestination::File(path) => {
                AuditLog::create(path).map_err(|source| ServerError::LogFile {
                    path: path.clone(),
                    source,
                })?
            }
        };
        FileServer::new(config.addr, config.root.clone(), config.threads, audit)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle used to request shutdown from another thread, e.g. a signal
    /// handler.
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    /// Serves until shutdown is triggered, then drains. Returns once every
    /// worker has exited and the audit log is flushed.
    pub fn run(self) -> Result<(), ServerError> {
        let pool = WorkerPool::spawn(self.threads, self.context.clone())?;
        log::info!(
            "Serving {} on {} with {} workers",
            self.context.root.display(),
            self.socket.local_addr()?,
            pool.len()
        );

        self.accept_loop();

        let FileServer {
            socket, shutdown, ..
        } = self;
        drop(socket);
        shutdown.drain(pool);
        Ok(())
    }

    fn accept_loop(&self) {
        while !self.shutdown.is_stopping() {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    log::debug!("New connection: {peer}");
                    if let Err(e) = stream.set_nonblocking(false) {
                        log::warn!("Failed to configure connection from {peer}: {e}");
                        continue;
                    }
                    if self.context.queue.enqueue(stream).is_err() {
                        log::debug!("Dropping connection from {peer}: shutting down");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Accept error: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }
}
