//! Minimal HTTP/1.1 plumbing over `TcpStream`: one request per connection.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub raw_path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Read one request. Bodies are accepted up to `max_body` bytes and only
/// when a `Content-Length` header is present.
pub fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let mut request = parse_head(&data[..header_end])?;
    let length = match request.headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if length > max_body {
        return Err(anyhow!("request body of {} bytes exceeds {}", length, max_body));
    }

    let mut body = data.split_off(header_end + 4);
    while body.len() < length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(length);
    request.body = body;
    Ok(request)
}

fn parse_head(head: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        raw_path: raw_path.to_string(),
        headers,
        body: Vec::new(),
    })
}

impl HttpRequest {
    /// Body of the `multipart/form-data` part named `field`.
    pub fn form_part(&self, field: &str) -> Result<&[u8]> {
        let content_type = self
            .headers
            .get("content-type")
            .ok_or_else(|| anyhow!("missing content-type"))?;
        if !content_type
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
        {
            return Err(anyhow!("expected multipart/form-data, got {}", content_type));
        }
        let boundary = content_type
            .split(';')
            .filter_map(|param| param.trim().split_once('='))
            .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
            .map(|(_, value)| value.trim_matches('"'))
            .ok_or_else(|| anyhow!("multipart boundary missing"))?;
        multipart_field(&self.body, boundary, field)
    }
}

fn multipart_field<'a>(body: &'a [u8], boundary: &str, field: &str) -> Result<&'a [u8]> {
    let delimiter = format!("--{}", boundary);
    let needle = format!(" name=\"{}\"", field);
    let mut rest = body;
    while let Some(start) = find(rest, delimiter.as_bytes()) {
        rest = &rest[start + delimiter.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        let head_end = find(rest, b"\r\n\r\n").ok_or_else(|| anyhow!("truncated multipart part"))?;
        let head = String::from_utf8_lossy(&rest[..head_end]);
        let content = &rest[head_end + 4..];
        let end = find(content, format!("\r\n{}", delimiter).as_bytes())
            .ok_or_else(|| anyhow!("unterminated multipart part"))?;
        if head.contains(&needle) {
            return Ok(&content[..end]);
        }
        rest = &content[end + 2..];
    }
    Err(anyhow!("form field '{}' not found", field))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

pub fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

pub fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = if status == 204 {
        format!("{}\r\nConnection: close\r\n\r\n", status_line(status))
    } else {
        format!(
            "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
            status_line = status_line(status),
            content_type = content_type,
            len = body.len()
        )
    };
    stream.write_all(header.as_bytes())?;
    if status != 204 {
        stream.write_all(body)?;
    }
    stream.flush()?;
    Ok(())
}

/// Build a `multipart/form-data` body with a single file part.
/// Returns the content-type header value and the body.
pub fn form_body(field: &str, filename: &str, mime: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("rover-{:016x}", rand::random::<u64>());
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            boundary, field, filename, mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(content_type: &str, body: Vec<u8>) -> HttpRequest {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        HttpRequest {
            method: "POST".into(),
            path: "/detect".into(),
            raw_path: "/detect".into(),
            headers,
            body,
        }
    }

    #[test]
    fn extracts_named_part_from_built_form() {
        let payload = b"\xFF\xD8binary\r\n--not-a-boundary\xFF\xD9";
        let (content_type, body) = form_body("image", "image.jpg", "image/jpeg", payload);
        let request = request_with(&content_type, body);
        assert_eq!(request.form_part("image").unwrap(), payload);
    }

    #[test]
    fn skips_other_parts() {
        let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\nhello\r\n\
--XYZ\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.jpg\"\r\n\r\nJPEG\r\n--XYZ--\r\n"
            .to_vec();
        let request = request_with("multipart/form-data; boundary=\"XYZ\"", body);
        assert_eq!(request.form_part("image").unwrap(), b"JPEG");
        assert_eq!(request.form_part("meta").unwrap(), b"hello");
        assert!(request.form_part("other").is_err());
    }

    #[test]
    fn rejects_non_multipart_requests() {
        let request = request_with("application/json", b"{}".to_vec());
        assert!(request.form_part("image").is_err());
    }

    #[test]
    fn parses_request_head() {
        let request = parse_head(b"GET /cmd/left?x=1 HTTP/1.1\r\nHost: rover\r\nContent-Length: 0").unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/cmd/left");
        assert_eq!(request.raw_path, "/cmd/left?x=1");
        assert_eq!(request.headers.get("host").map(String::as_str), Some("rover"));
    }
}
