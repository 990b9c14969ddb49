//! Recognition of the request head.
//!
//! The head is read into a fixed buffer; whatever follows the blank line in
//! that buffer is the start of the body and is handed to the write
//! handlers as the buffered prefix.

use std::{
    borrow::Cow,
    fmt,
    io::{self, Read},
};

use thiserror::Error;

pub const HEAD_BUFFER_SIZE: usize = 4096;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const METHOD_MAX: usize = 8;
const PATH_MAX: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Put,
    Append,
    Unsupported(String),
}

impl RequestMethod {
    pub fn from_token(token: &str) -> RequestMethod {
        if token.eq_ignore_ascii_case("GET") {
            RequestMethod::Get
        } else if token.eq_ignore_ascii_case("PUT") {
            RequestMethod::Put
        } else if token.eq_ignore_ascii_case("APPEND") {
            RequestMethod::Append
        } else {
            RequestMethod::Unsupported(token.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Put => "PUT",
            RequestMethod::Append => "APPEND",
            RequestMethod::Unsupported(token) => token,
        }
    }

    /// Store and append need a header block and a declared body length.
    pub fn is_write(&self) -> bool {
        matches!(self, RequestMethod::Put | RequestMethod::Append)
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: RequestMethod,
    /// Request path without its leading `/`.
    pub path: String,
    /// Declared body length; always 0 for methods that take no body.
    pub content_length: u64,
    /// Body bytes that arrived in the same read as the head.
    pub body_prefix: Vec<u8>,
    pub request_id: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request line not recognized")]
    BadRequestLine,
    #[error("malformed header block for {method} /{path}")]
    BadHeaders {
        method: RequestMethod,
        path: String,
        request_id: u64,
    },
}

/// Reads until the head is complete, the buffer fills, or the peer stops
/// sending.
///
/// Only store and append wait for the blank line. Any other request is
/// complete once its request line is in, so a bare `GET /a HTTP/1.1\r\n` is
/// answered with whatever headers came in the same reads.
pub fn read_head<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; HEAD_BUFFER_SIZE];
    let mut filled = 0;

    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if head_complete(&buffer[..filled]) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buffer.truncate(filled);
    Ok(buffer)
}

fn head_complete(buffer: &[u8]) -> bool {
    if find(buffer, HEAD_TERMINATOR).is_some() {
        return true;
    }
    if find(buffer, b"\r\n").is_none() {
        return false;
    }
    // A full first line that is not a request line will never become one.
    match RequestLine::scan(buffer) {
        Some(line) => !RequestMethod::from_token(line.method).is_write(),
        None => true,
    }
}

pub fn parse(buffer: &[u8]) -> Result<ParsedRequest, RequestError> {
    let line = RequestLine::scan(buffer).ok_or(RequestError::BadRequestLine)?;
    let method = RequestMethod::from_token(line.method);

    let terminator = find(buffer, HEAD_TERMINATOR);
    let (block, body_prefix) = match terminator {
        // The request line's own CRLF may open the terminator.
        Some(at) => (&buffer[line.len..at + 2], &buffer[at + HEAD_TERMINATOR.len()..]),
        None => (&buffer[line.len..], &buffer[buffer.len()..]),
    };
    let headers = HeaderBlock::scan(block);
    let request_id = headers.request_id();

    let content_length = if method.is_write() {
        match (terminator, headers.malformed, headers.content_length()) {
            (Some(_), false, Some(length)) => length,
            _ => {
                return Err(RequestError::BadHeaders {
                    method,
                    path: line.path.to_string(),
                    request_id,
                })
            }
        }
    } else {
        0
    };

    Ok(ParsedRequest {
        method,
        path: line.path.to_string(),
        content_length,
        body_prefix: body_prefix.to_vec(),
        request_id,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_path_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'
}

fn is_header_name_byte(byte: u8) -> bool {
    is_path_byte(byte) || byte == b'-'
}

struct RequestLine<'a> {
    method: &'a str,
    path: &'a str,
    /// Bytes consumed, including the CRLF.
    len: usize,
}

impl<'a> RequestLine<'a> {
    // METHOD SP "/" PATH SP "HTTP/1.1" CRLF
    fn scan(buffer: &'a [u8]) -> Option<RequestLine<'a>> {
        let method_len = buffer.iter().take_while(|b| b.is_ascii_alphabetic()).count();
        if !(1..=METHOD_MAX).contains(&method_len) {
            return None;
        }
        let rest = buffer[method_len..].strip_prefix(b" /")?;

        let path_len = rest.iter().take_while(|b| is_path_byte(**b)).count();
        if !(1..=PATH_MAX).contains(&path_len) {
            return None;
        }
        let tail = rest[path_len..].strip_prefix(b" HTTP/1.1\r\n")?;

        Some(RequestLine {
            method: std::str::from_utf8(&buffer[..method_len]).ok()?,
            path: std::str::from_utf8(&rest[..path_len]).ok()?,
            len: buffer.len() - tail.len(),
        })
    }
}

#[derive(Default)]
struct HeaderBlock {
    fields: Vec<(String, String)>,
    malformed: bool,
}

impl HeaderBlock {
    fn scan(block: &[u8]) -> HeaderBlock {
        let text: Cow<'_, str> = String::from_utf8_lossy(block);
        let mut headers = HeaderBlock::default();

        for line in text.split_terminator("\r\n") {
            match header_field(line) {
                Some((name, value)) => headers.fields.push((name.to_string(), value.to_string())),
                None => headers.malformed = true,
            }
        }
        headers
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn content_length(&self) -> Option<u64> {
        self.get("Content-Length").and_then(parse_decimal)
    }

    fn request_id(&self) -> u64 {
        self.get("Request-Id").and_then(parse_decimal).unwrap_or(0)
    }
}

// name ":" SP+ value
fn header_field(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once(':')?;
    if name.is_empty() || !name.bytes().all(is_header_name_byte) {
        return None;
    }
    let value = rest.strip_prefix(' ')?.trim_start_matches(' ');
    if value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn parse_decimal(value: &str) -> Option<u64> {
    let value = value.trim_end();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
