//! Concurrent file-serving daemon: `GET`, `PUT` and `APPEND` over plain
//! HTTP/1.1, one request per connection.
//!
//! Accepted connections go through an [`AdmissionQueue`] to a fixed
//! [`WorkerPool`]. Each worker drives a [`worker::RequestWorker`] under the
//! global [`AccessCoordinator`]: fetches share it, stores and appends hold it
//! alone.

pub mod access;
pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod file_client;
pub mod listener;
pub mod queue;
pub mod request;
pub mod shutdown;
pub mod status;
pub mod worker;

pub use access::AccessCoordinator;
pub use audit::{AuditLog, LogRecord};
pub use dispatcher::WorkerPool;
pub use error::ServerError;
pub use file_client::{FileClient, Response};
pub use listener::FileServer;
pub use queue::AdmissionQueue;
pub use shutdown::{Phase, ShutdownCoordinator};
pub use status::Status;
