//! Running → Draining → Terminated.
//!
//! Triggering only stops acceptance and wakes idle workers. A worker in the
//! middle of a request finishes it first; a worker waiting on the access gate
//! is not woken and keeps waiting until access is granted.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::dispatcher::{ServeContext, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

pub struct ShutdownCoordinator {
    phase: Mutex<Phase>,
    phase_changed: Condvar,
    context: Arc<ServeContext>,
}

impl ShutdownCoordinator {
    pub fn new(context: Arc<ServeContext>) -> ShutdownCoordinator {
        ShutdownCoordinator {
            phase: Mutex::new(Phase::Running),
            phase_changed: Condvar::new(),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        *self.lock()
    }

    pub fn is_stopping(&self) -> bool {
        self.phase() != Phase::Running
    }

    /// Stops acceptance and wakes every idle worker. Later calls do nothing.
    pub fn trigger(&self) {
        let mut phase = self.lock();
        if *phase != Phase::Running {
            return;
        }
        *phase = Phase::Draining;
        log::info!("Shutdown requested, draining workers");
        self.context.queue.close();
        self.phase_changed.notify_all();
    }

    /// Waits for every worker to exit, drops connections that were never
    /// dequeued and flushes the audit log. The log itself is closed when the
    /// last holder of the serve context, normally the server, is dropped.
    pub fn drain(&self, pool: WorkerPool) {
        self.trigger();
        pool.join();

        let dropped = self.context.queue.drain();
        if !dropped.is_empty() {
            log::warn!("Dropping {} queued connections", dropped.len());
        }
        drop(dropped);

        if let Err(e) = self.context.audit.flush() {
            log::error!("Failed to flush audit log: {e}");
        }

        *self.lock() = Phase::Terminated;
        self.phase_changed.notify_all();
        log::info!("All workers stopped");
    }

    /// Blocks until the drain has finished or `timeout` elapses. Returns
    /// whether the coordinator reached [`Phase::Terminated`].
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        let (phase, _) = self
            .phase_changed
            .wait_timeout_while(self.lock(), timeout, |phase| *phase != Phase::Terminated)
            .unwrap_or_else(PoisonError::into_inner);
        *phase == Phase::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use std::{net::TcpListener, net::TcpStream, thread};

    fn context() -> (tempfile::TempDir, Arc<ServeContext>) {
        let root = tempfile::tempdir().unwrap();
        let audit = AuditLog::create(&root.path().join("audit.log")).unwrap();
        let context = Arc::new(ServeContext::new(root.path().to_path_buf(), audit));
        (root, context)
    }

    #[test]
    fn idle_workers_exit_on_trigger() {
        let (_root, context) = context();
        let pool = WorkerPool::spawn(3, context.clone()).unwrap();
        let shutdown = Arc::new(ShutdownCoordinator::new(context.clone()));
        assert_eq!(shutdown.phase(), Phase::Running);

        let drainer = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.drain(pool))
        };
        shutdown.trigger();
        assert!(shutdown.is_stopping());
        assert!(shutdown.wait_terminated(Duration::from_secs(5)));
        drainer.join().unwrap();
        assert!(context.queue.is_closed());
    }

    #[test]
    fn trigger_is_idempotent() {
        let (_root, context) = context();
        let shutdown = ShutdownCoordinator::new(context);
        shutdown.trigger();
        shutdown.trigger();
        assert_eq!(shutdown.phase(), Phase::Draining);
        assert!(!shutdown.wait_terminated(Duration::from_millis(10)));
    }

    #[test]
    fn undequeued_connections_are_dropped() {
        let (_root, context) = context();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        context.queue.enqueue(server).unwrap();

        let shutdown = ShutdownCoordinator::new(context.clone());
        shutdown.trigger();
        // Workers started after the trigger find the queue closed.
        let pool = WorkerPool::spawn(2, context.clone()).unwrap();
        shutdown.drain(pool);

        assert_eq!(shutdown.phase(), Phase::Terminated);
        assert!(context.queue.is_empty());

        let mut buf = Vec::new();
        let mut client = client;
        std::io::Read::read_to_end(&mut client, &mut buf).unwrap();
        assert!(buf.is_empty(), "dropped connection got a response");
    }

    #[test]
    fn gate_waiter_is_not_woken_by_shutdown() {
        let (_root, context) = context();
        let shutdown = ShutdownCoordinator::new(context.clone());
        let write = context.gate.write();

        let reader = {
            let context = context.clone();
            thread::spawn(move || {
                let _read = context.gate.read();
            })
        };
        while context.gate.snapshot().waiting_readers == 0 {
            thread::yield_now();
        }

        shutdown.trigger();
        thread::sleep(Duration::from_millis(50));
        assert!(!reader.is_finished());

        drop(write);
        reader.join().unwrap();
    }
}
