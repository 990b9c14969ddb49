use std::fmt;

pub const PROTOCOL: &str = "HTTP/1.1";

/// Outcome of one request: the code written on the status line and in the
/// audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }

    /// Complete response whose body is the reason phrase plus a newline.
    pub fn response(self) -> String {
        let body = format!("{}\n", self.reason());
        format!("{}{}", self.header(body.len() as u64), body)
    }

    /// Status line and headers announcing a body of `content_length` bytes.
    pub fn header(self, content_length: u64) -> String {
        format!("{PROTOCOL} {}\r\nContent-Length: {content_length}\r\n\r\n", self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}
