//! Minimal HTTP/1.0-style messages
//!
//! Requests and responses are plain text: a start line, `Name: Value`
//! headers, a blank line and an optional body. Each message travels as one
//! transport payload.

use thiserror::Error;

/// Version carried by every message
pub const HTTP_VERSION: &str = "HTTP/1.0";

const CLIENT_AGENT: &str = "ReliableUDPClient/1.0";
const SERVER_NAME: &str = "ReliableUDPServer/1.0";
const CRLF: &str = "\r\n";
const HEADER_END: &str = "\r\n\r\n";

/// HTTP layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Message is not valid UTF-8")]
    NotUtf8,

    #[error("Empty start line")]
    EmptyStartLine,

    #[error("Malformed status line: {0}")]
    MalformedStatusLine(String),
}

/// An HTTP-style request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    /// Client GET request
    pub fn get(path: &str) -> Self {
        Request {
            method: "GET".to_string(),
            path: path.to_string(),
            version: HTTP_VERSION.to_string(),
            headers: vec![
                ("Host".to_string(), "localhost".to_string()),
                ("User-Agent".to_string(), CLIENT_AGENT.to_string()),
                ("Connection".to_string(), "close".to_string()),
            ],
            body: String::new(),
        }
    }

    /// Client POST request with a plain-text body
    pub fn post(path: &str, body: &str) -> Self {
        Request {
            method: "POST".to_string(),
            path: path.to_string(),
            version: HTTP_VERSION.to_string(),
            headers: vec![
                ("Host".to_string(), "localhost".to_string()),
                ("User-Agent".to_string(), CLIENT_AGENT.to_string()),
                ("Content-Length".to_string(), body.len().to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Connection".to_string(), "close".to_string()),
            ],
            body: body.to_string(),
        }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let start = format!("{} {} {}", self.method, self.path, self.version);
        render(&start, &self.headers, &self.body)
    }

    /// Parse a request; the path defaults to `/` when absent
    pub fn parse(bytes: &[u8]) -> Result<Self, HttpError> {
        let text = std::str::from_utf8(bytes).map_err(|_| HttpError::NotUtf8)?;
        let (start, headers, body) = split_message(text);

        let mut parts = start.split_whitespace();
        let method = parts.next().ok_or(HttpError::EmptyStartLine)?;
        let path = parts.next().unwrap_or("/");
        let version = parts.next().unwrap_or(HTTP_VERSION);

        Ok(Request {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
            body,
        })
    }
}

/// An HTTP-style response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    /// Headers in arrival order
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    /// HTML response with the server's standard headers
    pub fn html(status: u16, reason: &str, content: String) -> Self {
        Response {
            version: HTTP_VERSION.to_string(),
            status,
            reason: reason.to_string(),
            headers: vec![
                ("Content-Length".to_string(), content.len().to_string()),
                ("Content-Type".to_string(), "text/html".to_string()),
                ("Server".to_string(), SERVER_NAME.to_string()),
            ],
            body: content,
        }
    }

    pub fn not_found() -> Self {
        Response::html(
            404,
            "Not Found",
            "<html><body><h1>404 Not Found</h1></body></html>".to_string(),
        )
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let start = format!("{} {} {}", self.version, self.status, self.reason);
        render(&start, &self.headers, &self.body)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, HttpError> {
        let text = std::str::from_utf8(bytes).map_err(|_| HttpError::NotUtf8)?;
        let (start, headers, body) = split_message(text);

        let mut parts = start.splitn(3, ' ');
        let version = parts.next().filter(|v| !v.is_empty());
        let status = parts.next().and_then(|s| s.parse::<u16>().ok());
        let (Some(version), Some(status)) = (version, status) else {
            return Err(HttpError::MalformedStatusLine(start.to_string()));
        };

        Ok(Response {
            version: version.to_string(),
            status,
            reason: parts.next().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Server behaviour: echo GET paths and POST bodies, 404 for anything else
pub fn respond(request: &Request) -> Response {
    match request.method.as_str() {
        "GET" => Response::html(
            200,
            "OK",
            format!("<html><body><h1>You requested {}</h1></body></html>", request.path),
        ),
        "POST" => {
            tracing::info!(body = %request.body, "POST body");
            Response::html(
                200,
                "OK",
                format!("<html><body><h1>POST Received: {}</h1></body></html>", request.body),
            )
        }
        _ => Response::not_found(),
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn render(start: &str, headers: &[(String, String)], body: &str) -> Vec<u8> {
    let mut out = String::with_capacity(start.len() + body.len() + 64 * headers.len());
    out.push_str(start);
    out.push_str(CRLF);
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str(CRLF);
    }
    out.push_str(CRLF);
    out.push_str(body);
    out.into_bytes()
}

/// Start line, headers up to the first blank line, body after `\r\n\r\n`
fn split_message(text: &str) -> (&str, Vec<(String, String)>, String) {
    let (head, body) = match text.find(HEADER_END) {
        Some(index) => (&text[..index], &text[index + HEADER_END.len()..]),
        None => (text, ""),
    };

    let mut lines = head.split(CRLF);
    let start = lines.next().unwrap_or_default();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    (start, headers, body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_wire_format() {
        let bytes = Request::get("/index.html").to_bytes();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "GET /index.html HTTP/1.0\r\n\
             Host: localhost\r\n\
             User-Agent: ReliableUDPClient/1.0\r\n\
             Connection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_post_wire_format() {
        let bytes = Request::post("/submit", "name=Project").to_bytes();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "POST /submit HTTP/1.0\r\n\
             Host: localhost\r\n\
             User-Agent: ReliableUDPClient/1.0\r\n\
             Content-Length: 12\r\n\
             Content-Type: text/plain\r\n\
             Connection: close\r\n\r\n\
             name=Project"
        );
    }

    #[test]
    fn test_parse_request() {
        let request = Request::parse(&Request::post("/submit", "a=b").to_bytes()).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/submit");
        assert_eq!(request.version, "HTTP/1.0");
        assert_eq!(request.header("content-length"), Some("3"));
        assert_eq!(request.body, "a=b");
    }

    #[test]
    fn test_parse_request_defaults() {
        let request = Request::parse(b"GET").unwrap();
        assert_eq!(request.path, "/");
        assert!(request.headers.is_empty());
        assert!(request.body.is_empty());

        assert_eq!(Request::parse(b""), Err(HttpError::EmptyStartLine));
        assert_eq!(Request::parse(&[0xff, 0xfe]), Err(HttpError::NotUtf8));
    }

    #[test]
    fn test_header_values_trimmed() {
        let request = Request::parse(b"GET / HTTP/1.0\r\nX-Test :  spaced  \r\nbad line\r\n\r\n")
            .unwrap();
        assert_eq!(request.headers, vec![("X-Test".to_string(), "spaced".to_string())]);
    }

    #[test]
    fn test_respond_get() {
        let response = respond(&Request::get("/index.html"));
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            "<html><body><h1>You requested /index.html</h1></body></html>"
        );
        assert_eq!(response.header("Server"), Some("ReliableUDPServer/1.0"));
        assert_eq!(
            response.header("Content-Length"),
            Some(response.body.len().to_string().as_str())
        );
    }

    #[test]
    fn test_respond_post() {
        let response = respond(&Request::post("/submit", "name=Project"));
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            "<html><body><h1>POST Received: name=Project</h1></body></html>"
        );
    }

    #[test]
    fn test_respond_unknown_method() {
        let request = Request::parse(b"DELETE /x HTTP/1.0\r\n\r\n").unwrap();
        let response = respond(&request);
        assert_eq!(response.status, 404);
        assert_eq!(response.reason, "Not Found");
        assert!(String::from_utf8(response.to_bytes())
            .unwrap()
            .starts_with("HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn test_response_roundtrip() {
        let response = respond(&Request::get("/a"));
        let parsed = Response::parse(&response.to_bytes()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_malformed_status_line() {
        assert!(matches!(
            Response::parse(b"HTTP/1.0 abc\r\n\r\n"),
            Err(HttpError::MalformedStatusLine(_))
        ));
    }
}
