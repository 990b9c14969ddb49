use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
};

/// A parsed server reply. `trailing` holds anything sent after the announced
/// body, such as the 500 that follows a fetch cut short mid-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub reason: String,
    pub body: Vec<u8>,
    pub trailing: Vec<u8>,
}

impl Response {
    pub fn parse(bytes: &[u8]) -> io::Result<Response> {
        let head_end = bytes
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or_else(|| invalid("response head is not terminated"))?;
        let head = std::str::from_utf8(&bytes[..head_end]).map_err(|_| invalid("response head is not UTF-8"))?;

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let (code, reason) = match (parts.next(), parts.next(), parts.next()) {
            (Some("HTTP/1.1"), Some(code), reason) => (
                code.parse().map_err(|_| invalid("bad status code"))?,
                reason.unwrap_or_default().to_string(),
            ),
            _ => return Err(invalid("bad status line")),
        };

        let content_length: usize = lines
            .filter_map(|line| line.split_once(": "))
            .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .ok_or_else(|| invalid("missing Content-Length"))?;

        let rest = &bytes[head_end + 4..];
        let body_len = content_length.min(rest.len());
        Ok(Response {
            code,
            reason,
            body: rest[..body_len].to_vec(),
            trailing: rest[body_len..].to_vec(),
        })
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// One connection carries one request.
pub struct FileClient {
    stream: TcpStream,
}

impl FileClient {
    pub fn connect_to(addr: impl ToSocketAddrs) -> io::Result<FileClient> {
        Ok(FileClient {
            stream: TcpStream::connect(addr)?,
        })
    }

    /// Sends raw bytes; a request can be delivered in several pieces.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    /// Stops sending so the server sees end of stream.
    pub fn finish_sending(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    pub fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Reads until the server closes the connection.
    pub fn read_to_close(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_response(self) -> io::Result<Response> {
        Response::parse(&self.read_to_close()?)
    }

    pub fn get(mut self, path: &str, request_id: u64) -> io::Result<Response> {
        self.send(format!("GET /{path} HTTP/1.1\r\nRequest-Id: {request_id}\r\n\r\n").as_bytes())?;
        self.read_response()
    }

    pub fn put(self, path: &str, body: &[u8], request_id: u64) -> io::Result<Response> {
        self.upload("PUT", path, body, request_id)
    }

    pub fn append(self, path: &str, body: &[u8], request_id: u64) -> io::Result<Response> {
        self.upload("APPEND", path, body, request_id)
    }

    fn upload(mut self, method: &str, path: &str, body: &[u8], request_id: u64) -> io::Result<Response> {
        let head = format!(
            "{method} /{path} HTTP/1.1\r\nContent-Length: {}\r\nRequest-Id: {request_id}\r\n\r\n",
            body.len()
        );
        self.send(head.as_bytes())?;
        self.send(body)?;
        self.read_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_body_and_trailing_bytes() {
        let response = Response::parse(
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabcHTTP/1.1 500 Internal Server Error\r\n",
        )
        .unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.body, b"abc");
        assert!(response.trailing.starts_with(b"HTTP/1.1 500"));
    }

    #[test]
    fn short_body_is_kept_as_received() {
        let response =
            Response::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").unwrap();
        assert_eq!(response.body, b"abc");
        assert!(response.trailing.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Response::parse(b"").is_err());
        assert!(Response::parse(b"nonsense\r\n\r\n").is_err());
        assert!(Response::parse(b"HTTP/1.1 200 OK\r\n\r\n").is_err());
    }
}
