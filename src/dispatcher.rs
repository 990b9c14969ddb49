//! Fixed pool of worker threads draining the admission queue.

use std::{
    net::TcpStream,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::{
    access::AccessCoordinator,
    audit::AuditLog,
    error::ServerError,
    queue::AdmissionQueue,
    worker::{ConnectedState, Connected, FinishedState, Finished, RequestWorker, Routed},
};

/// State shared by the listener and every worker.
pub struct ServeContext {
    pub root: PathBuf,
    pub queue: AdmissionQueue<TcpStream>,
    pub gate: AccessCoordinator,
    pub audit: AuditLog,
}

impl ServeContext {
    pub fn new(root: PathBuf, audit: AuditLog) -> ServeContext {
        ServeContext {
            root,
            queue: AdmissionQueue::new(),
            gate: AccessCoordinator::new(),
            audit,
        }
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `count` workers. If any of them cannot be started the ones that
    /// did are stopped again before the error is returned.
    pub fn spawn(count: usize, context: Arc<ServeContext>) -> Result<WorkerPool, ServerError> {
        if count == 0 {
            return Err(ServerError::NoWorkers);
        }

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let shared = context.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || run_worker(index, &shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    context.queue.close();
                    WorkerPool { workers }.join();
                    return Err(ServerError::SpawnWorker { index, source });
                }
            }
        }

        Ok(WorkerPool { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit.
    pub fn join(self) {
        for (index, worker) in self.workers.into_iter().enumerate() {
            if worker.join().is_err() {
                log::error!("Worker {index} panicked");
            }
        }
    }
}

fn run_worker(index: usize, context: &ServeContext) {
    log::debug!("Worker {index} started");
    while let Some(stream) = context.queue.dequeue() {
        handle_connection(stream, context);
    }
    log::debug!("Worker {index} exiting");
}

/// Serves exactly one request on `stream`, then closes it.
pub fn handle_connection(stream: TcpStream, context: &ServeContext) {
    let worker = RequestWorker::<Connected>::accept(stream, context.root.clone());

    match worker.read_request() {
        Routed::Fetch(worker) => {
            let _access = context.gate.read();
            complete(worker.fetch(), &context.audit);
        }
        Routed::Store(worker) => {
            let _access = context.gate.write();
            complete(worker.store(), &context.audit);
        }
        Routed::Append(worker) => {
            let _access = context.gate.write();
            complete(worker.append(), &context.audit);
        }
        Routed::Finished(worker) => complete(worker, &context.audit),
    }
}

fn complete(worker: RequestWorker<Finished>, audit: &AuditLog) {
    if let Some(record) = worker.close() {
        audit.record(&record);
    }
}
