use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind the listening socket")]
    Bind(#[source] io::Error),
    #[error("Failed to start worker {index}")]
    SpawnWorker {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open log file {}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("The server needs at least one worker thread")]
    NoWorkers,
    #[error(transparent)]
    IO(#[from] io::Error),
}
