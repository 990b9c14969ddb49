use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    net::TcpStream,
    path::{Path, PathBuf},
};

use crate::{
    audit::LogRecord,
    request::{self, RequestError, RequestMethod},
    status::Status,
};

/// Unit of every socket and file transfer.
pub const CHUNK_SIZE: usize = 4096;

/// What the audit record needs once the request line has been recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: RequestMethod,
    pub path: String,
    pub request_id: u64,
}

/// Declared body length and the part of the body that came in with the head.
#[derive(Debug)]
pub struct PendingBody {
    pub length: u64,
    pub prefix: Vec<u8>,
}

#[typestate::typestate]
pub mod worker {
    use super::{PendingBody, RequestHead};
    use crate::{audit::LogRecord, status::Status};
    use std::{fs::File, net::TcpStream, path::PathBuf};

    #[automaton]
    pub struct RequestWorker {
        pub stream: TcpStream,
        pub root: PathBuf,
        pub head: Option<RequestHead>,
    }

    #[state]
    pub struct Connected;
    pub trait Connected {
        fn accept(stream: TcpStream, root: PathBuf) -> Connected;
        fn read_request(self) -> Routed;
    }

    #[state]
    pub struct Fetch {
        pub target: PathBuf,
    }
    pub trait Fetch {
        fn begin_fetch(self) -> FetchStep;
    }

    #[state]
    pub struct Streaming {
        pub file: File,
        pub remaining: u64,
    }
    pub trait Streaming {
        fn send_chunk(self) -> FetchStep;
    }

    #[state]
    pub struct Store {
        pub target: PathBuf,
        pub body: PendingBody,
    }
    pub trait Store {
        fn begin_store(self) -> StoreStep;
    }

    #[state]
    pub struct Append {
        pub target: PathBuf,
        pub body: PendingBody,
    }
    pub trait Append {
        fn begin_append(self) -> StoreStep;
    }

    #[state]
    pub struct Receiving {
        pub file: File,
        pub remaining: u64,
        pub success: Status,
    }
    pub trait Receiving {
        fn receive_chunk(self) -> StoreStep;
    }

    #[state]
    pub struct Finished {
        pub status: Status,
        pub respond: bool,
    }
    pub trait Finished {
        fn close(self) -> Option<LogRecord>;
    }

    pub enum Routed {
        #[metadata(label = "Read access needed")]
        Fetch,
        #[metadata(label = "Write access needed")]
        Store,
        #[metadata(label = "Write access needed")]
        Append,
        #[metadata(label = "Rejected before any file access")]
        Finished,
    }

    pub enum FetchStep {
        #[metadata(label = "File has more bytes to send")]
        Streaming,
        #[metadata(label = "End of response")]
        Finished,
    }

    pub enum StoreStep {
        #[metadata(label = "Body has more bytes to receive")]
        Receiving,
        #[metadata(label = "End of request")]
        Finished,
    }
}

pub use worker::*;

fn finished(
    stream: TcpStream,
    root: PathBuf,
    head: Option<RequestHead>,
    status: Status,
    respond: bool,
) -> RequestWorker<Finished> {
    RequestWorker {
        stream,
        root,
        head,
        state: Finished { status, respond },
    }
}

//
// State transitions
//

impl ConnectedState for RequestWorker<Connected> {
    fn accept(stream: TcpStream, root: PathBuf) -> RequestWorker<Connected> {
        RequestWorker {
            stream,
            root,
            head: None,
            state: Connected,
        }
    }

    fn read_request(mut self) -> Routed {
        let buffer = match request::read_head(&mut self.stream) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::debug!("Failed to read request head: {e}");
                Vec::new()
            }
        };

        let parsed = match request::parse(&buffer) {
            Ok(parsed) => parsed,
            Err(RequestError::BadRequestLine) => {
                return Routed::Finished(finished(
                    self.stream,
                    self.root,
                    None,
                    Status::BadRequest,
                    true,
                ))
            }
            Err(RequestError::BadHeaders {
                method,
                path,
                request_id,
            }) => {
                let head = RequestHead {
                    method,
                    path,
                    request_id,
                };
                return Routed::Finished(finished(
                    self.stream,
                    self.root,
                    Some(head),
                    Status::BadRequest,
                    true,
                ));
            }
        };

        let target = self.root.join(&parsed.path);
        let body = PendingBody {
            length: parsed.content_length,
            prefix: parsed.body_prefix,
        };
        let head = Some(RequestHead {
            method: parsed.method.clone(),
            path: parsed.path,
            request_id: parsed.request_id,
        });

        match parsed.method {
            RequestMethod::Get => Routed::Fetch(RequestWorker {
                stream: self.stream,
                root: self.root,
                head,
                state: Fetch { target },
            }),
            RequestMethod::Put => Routed::Store(RequestWorker {
                stream: self.stream,
                root: self.root,
                head,
                state: Store { target, body },
            }),
            RequestMethod::Append => Routed::Append(RequestWorker {
                stream: self.stream,
                root: self.root,
                head,
                state: Append { target, body },
            }),
            RequestMethod::Unsupported(_) => Routed::Finished(finished(
                self.stream,
                self.root,
                head,
                Status::NotImplemented,
                true,
            )),
        }
    }
}

impl FetchState for RequestWorker<Fetch> {
    fn begin_fetch(mut self) -> FetchStep {
        let (file, size) = match open_for_fetch(&self.state.target) {
            Ok(opened) => opened,
            Err(status) => {
                return FetchStep::Finished(finished(self.stream, self.root, self.head, status, true))
            }
        };

        if let Err(e) = self.stream.write_all(Status::Ok.header(size).as_bytes()) {
            log::debug!("Failed to send response header: {e}");
            return FetchStep::Finished(finished(
                self.stream,
                self.root,
                self.head,
                Status::InternalServerError,
                true,
            ));
        }

        FetchStep::Streaming(RequestWorker {
            stream: self.stream,
            root: self.root,
            head: self.head,
            state: Streaming {
                file,
                remaining: size,
            },
        })
    }
}

impl StreamingState for RequestWorker<Streaming> {
    // A failure here still answers 500 even though a 200 header is already on
    // the wire.
    fn send_chunk(mut self) -> FetchStep {
        if self.state.remaining == 0 {
            return FetchStep::Finished(finished(self.stream, self.root, self.head, Status::Ok, false));
        }

        let mut buffer = [0; CHUNK_SIZE];
        let want = self.state.remaining.min(CHUNK_SIZE as u64) as usize;
        let sent = match read_retrying(&mut self.state.file, &mut buffer[..want]) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => self.stream.write_all(&buffer[..n]).map(|_| n),
            Err(e) => Err(e),
        };

        match sent {
            Ok(n) => {
                self.state.remaining -= n as u64;
                FetchStep::Streaming(self)
            }
            Err(e) => {
                log::debug!("Fetch stopped with {} bytes unsent: {e}", self.state.remaining);
                FetchStep::Finished(finished(
                    self.stream,
                    self.root,
                    self.head,
                    Status::InternalServerError,
                    true,
                ))
            }
        }
    }
}

impl StoreState for RequestWorker<Store> {
    fn begin_store(self) -> StoreStep {
        match open_for_store(&self.state.target) {
            Ok((file, success)) => {
                start_receiving(self.stream, self.root, self.head, file, self.state.body, success)
            }
            Err(status) => StoreStep::Finished(finished(self.stream, self.root, self.head, status, true)),
        }
    }
}

impl AppendState for RequestWorker<Append> {
    fn begin_append(self) -> StoreStep {
        match open_for_append(&self.state.target) {
            Ok(file) => {
                start_receiving(self.stream, self.root, self.head, file, self.state.body, Status::Ok)
            }
            Err(status) => StoreStep::Finished(finished(self.stream, self.root, self.head, status, true)),
        }
    }
}

impl ReceivingState for RequestWorker<Receiving> {
    fn receive_chunk(mut self) -> StoreStep {
        let mut buffer = [0; CHUNK_SIZE];
        let want = self.state.remaining.min(CHUNK_SIZE as u64) as usize;
        let written = match read_retrying(&mut self.stream, &mut buffer[..want]) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => self.state.file.write_all(&buffer[..n]).map(|_| n),
            Err(e) => Err(e),
        };

        match written {
            Ok(n) => {
                self.state.remaining -= n as u64;
                if self.state.remaining > 0 {
                    return StoreStep::Receiving(self);
                }
                let status = self.state.success;
                StoreStep::Finished(finished(self.stream, self.root, self.head, status, true))
            }
            Err(e) => {
                log::debug!("Body stopped with {} bytes outstanding: {e}", self.state.remaining);
                StoreStep::Finished(finished(
                    self.stream,
                    self.root,
                    self.head,
                    Status::InternalServerError,
                    true,
                ))
            }
        }
    }
}

impl FinishedState for RequestWorker<Finished> {
    fn close(mut self) -> Option<LogRecord> {
        let status = self.state.status;
        if self.state.respond {
            if let Err(e) = self.stream.write_all(status.response().as_bytes()) {
                log::debug!("Failed to send {status} response: {e}");
            }
        }

        let record = self.head.map(|head| LogRecord {
            method: head.method.as_str().to_string(),
            path: head.path,
            status,
            request_id: head.request_id,
        });
        match &record {
            Some(record) => log::debug!("Completed {record}"),
            None => log::debug!("Rejected unrecognized request with {status}"),
        }
        record
    }
}

//
// Auxiliary functions
//

impl RequestWorker<Fetch> {
    /// Runs the fetch to completion.
    pub fn fetch(self) -> RequestWorker<Finished> {
        let mut step = self.begin_fetch();
        loop {
            step = match step {
                FetchStep::Streaming(worker) => worker.send_chunk(),
                FetchStep::Finished(worker) => return worker,
            }
        }
    }
}

impl RequestWorker<Store> {
    /// Runs the create or overwrite to completion.
    pub fn store(self) -> RequestWorker<Finished> {
        receive_all(self.begin_store())
    }
}

impl RequestWorker<Append> {
    /// Runs the append to completion.
    pub fn append(self) -> RequestWorker<Finished> {
        receive_all(self.begin_append())
    }
}

fn receive_all(mut step: StoreStep) -> RequestWorker<Finished> {
    loop {
        step = match step {
            StoreStep::Receiving(worker) => worker.receive_chunk(),
            StoreStep::Finished(worker) => return worker,
        }
    }
}

// When the buffered prefix already covers the declared length only the needed
// bytes are written and the socket is not read again.
fn start_receiving(
    stream: TcpStream,
    root: PathBuf,
    head: Option<RequestHead>,
    mut file: File,
    body: PendingBody,
    success: Status,
) -> StoreStep {
    let PendingBody { length, prefix } = body;
    let buffered = prefix.len() as u64;

    if buffered >= length {
        let status = match file.write_all(&prefix[..length as usize]) {
            Ok(()) => success,
            Err(e) => {
                log::warn!("Failed to write request body: {e}");
                Status::InternalServerError
            }
        };
        return StoreStep::Finished(finished(stream, root, head, status, true));
    }

    if let Err(e) = file.write_all(&prefix) {
        log::warn!("Failed to write request body: {e}");
        return StoreStep::Finished(finished(
            stream,
            root,
            head,
            Status::InternalServerError,
            true,
        ));
    }

    StoreStep::Receiving(RequestWorker {
        stream,
        root,
        head,
        state: Receiving {
            file,
            remaining: length - buffered,
            success,
        },
    })
}

fn status_for(e: &io::Error) -> Status {
    match e.kind() {
        io::ErrorKind::NotFound => Status::NotFound,
        io::ErrorKind::PermissionDenied => Status::Forbidden,
        _ => Status::InternalServerError,
    }
}

fn open_for_fetch(target: &Path) -> Result<(File, u64), Status> {
    let metadata = fs::metadata(target).map_err(|e| status_for(&e))?;
    if metadata.is_dir() {
        return Err(Status::Forbidden);
    }
    let file = File::open(target).map_err(|e| status_for(&e))?;
    Ok((file, metadata.len()))
}

/// Truncates an existing file on open, before any body byte is written.
fn open_for_store(target: &Path) -> Result<(File, Status), Status> {
    match fs::metadata(target) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(target)
            .map(|file| (file, Status::Created))
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => Status::Forbidden,
                _ => Status::InternalServerError,
            }),
        Err(e) => Err(status_for(&e)),
        Ok(metadata) if metadata.is_dir() => Err(Status::Forbidden),
        Ok(_) => OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(target)
            .map(|file| (file, Status::Ok))
            .map_err(|e| status_for(&e)),
    }
}

fn open_for_append(target: &Path) -> Result<File, Status> {
    let metadata = fs::metadata(target).map_err(|e| status_for(&e))?;
    if metadata.is_dir() {
        return Err(Status::Forbidden);
    }
    OpenOptions::new()
        .append(true)
        .open(target)
        .map_err(|e| status_for(&e))
}

fn read_retrying<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buffer) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
