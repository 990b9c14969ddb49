#![allow(dead_code)]

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use httpserver::{AuditLog, FileClient, FileServer, ServerError, ShutdownCoordinator};
use tempfile::TempDir;

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Arc<ShutdownCoordinator>,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
    root: TempDir,
    logs: TempDir,
}

impl TestServer {
    pub fn start(threads: usize) -> TestServer {
        let root = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let audit = AuditLog::create(&logs.path().join("audit.log")).unwrap();

        let server = FileServer::new("127.0.0.1:0", root.path(), threads, audit).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());

        TestServer {
            addr,
            shutdown,
            thread: Some(thread),
            root,
            logs,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn client(&self) -> FileClient {
        FileClient::connect_to(self.addr).unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |thread| !thread.is_finished())
    }

    /// Triggers shutdown, waits for `run` to return and hands back the audit
    /// log lines.
    pub fn stop(mut self) -> Vec<String> {
        self.shutdown.trigger();
        self.join()
    }

    /// Waits for `run` to return without triggering anything.
    pub fn join(&mut self) -> Vec<String> {
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
        fs::read_to_string(self.logs.path().join("audit.log"))
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Lets the listener and workers pick up what was just sent.
pub fn settle() {
    thread::sleep(Duration::from_millis(200));
}

pub fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}
