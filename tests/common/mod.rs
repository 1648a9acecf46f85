#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use azure_cloudsvc_rs::{ManagementClient, PollOptions};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEADER_BYTES: usize = 64 * 1024;

pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Mock management endpoint answering each connection with the next canned
/// response.
pub struct MockServer {
    pub base_url: String,
    requests: mpsc::Receiver<CapturedRequest>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut stream);
                let _ = tx.send(request);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests: rx,
            handle: Some(handle),
        }
    }

    pub fn client(&self, subscription_id: &str) -> ManagementClient {
        ManagementClient::builder(subscription_id)
            .expect("builder")
            .base_url(&self.base_url)
            .expect("base url")
            .poll_options(PollOptions {
                interval: Duration::from_millis(5),
                max_attempts: 10,
                timeout: Duration::from_secs(5),
            })
            .build()
            .expect("build")
    }

    /// Waits for the server thread and returns every request it saw.
    pub fn finish(mut self) -> Vec<CapturedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("mock server");
        }
        self.requests.try_iter().collect()
    }
}

pub fn response_with_body(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));
    response
}

pub fn xml_response(status: &str, body: &str) -> String {
    response_with_body(status, &[("Content-Type", "application/xml")], body)
}

pub fn empty_response(status: &str) -> String {
    response_with_body(status, &[], "")
}

pub fn accepted_response(operation_id: &str) -> String {
    response_with_body("202 Accepted", &[("x-ms-request-id", operation_id)], "")
}

pub fn operation_response(operation_id: &str, status: &str) -> String {
    xml_response(
        "200 OK",
        &format!(
            r#"<Operation xmlns="http://schemas.microsoft.com/windowsazure"><ID>{operation_id}</ID><Status>{status}</Status><HttpStatusCode>200</HttpStatusCode></Operation>"#
        ),
    )
}

fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .expect("read timeout");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() >= MAX_HEADER_BYTES {
            panic!("request headers too large");
        }
        let read = stream.read(&mut chunk).unwrap_or(0);
        if read == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let header_str = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = header_str.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let full_path = parts.next().unwrap_or("");

    let mut path_parts = full_path.splitn(2, '?');
    let path = path_parts.next().unwrap_or("").to_string();
    let query_str = path_parts.next().unwrap_or("");
    let mut query = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query_str.as_bytes()) {
        query.insert(key.to_string(), value.to_string());
    }

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = value.parse().unwrap_or(0);
            }
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk).unwrap_or(0);
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    CapturedRequest {
        method,
        path,
        headers,
        query,
        body,
    }
}
