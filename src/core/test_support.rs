// ─── Test Support ───
// Minimal HTTP/1.1 server serving canned responses to the installers,
// the release fetcher and the auth exchange.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone)]
struct Route {
    status: u16,
    body: Vec<u8>,
    /// Content-Length to announce; larger than `body` simulates a dropped connection.
    declared_len: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
pub struct TestServerBuilder {
    routes: HashMap<String, Route>,
}

impl TestServerBuilder {
    pub fn route(mut self, path: &str, status: u16, body: Vec<u8>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                status,
                body,
                declared_len: None,
            },
        );
        self
    }

    pub fn json_route(self, path: &str, value: serde_json::Value) -> Self {
        self.route(path, 200, value.to_string().into_bytes())
    }

    pub fn truncated_route(mut self, path: &str, declared_len: usize, body: Vec<u8>) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                status: 200,
                body,
                declared_len: Some(declared_len),
            },
        );
        self
    }

    /// Every service hop of a Microsoft login, ending in the profile `Notch`.
    pub fn xbox_login(self, owns_game: bool) -> Self {
        let items = if owns_game {
            serde_json::json!([{"name": "product_minecraft"}, {"name": "game_minecraft"}])
        } else {
            serde_json::json!([])
        };
        self.json_route("/xbl/user/authenticate", serde_json::json!({"Token": "xbl-token"}))
            .json_route(
                "/xsts/xsts/authorize",
                serde_json::json!({"Token": "xsts-token", "DisplayClaims": {"xui": [{"uhs": "hash"}]}}),
            )
            .json_route(
                "/mc/authentication/login_with_xbox",
                serde_json::json!({"access_token": "mc-token", "expires_in": 86400}),
            )
            .json_route("/mc/entitlements/mcstore", serde_json::json!({"items": items}))
            .json_route(
                "/mc/minecraft/profile",
                serde_json::json!({"id": "0123abcd", "name": "Notch"}),
            )
    }

    pub async fn spawn(self) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(self.routes));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task_routes = routes.clone();
        let task_requests = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = task_routes.clone();
                let requests = task_requests.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, routes, requests).await;
                });
            }
        });

        TestServer {
            addr,
            routes,
            requests,
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub fn start() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    /// Add a route after start, for bodies that embed the server's own URL.
    pub fn mount(&self, path: &str, status: u16, body: Vec<u8>) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                status,
                body,
                declared_len: None,
            },
        );
    }

    pub fn mount_json(&self, path: &str, value: serde_json::Value) {
        self.mount(path, 200, value.to_string().into_bytes());
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn total_hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let route = {
        let routes = routes.lock().unwrap();
        routes
            .get(&path)
            .or_else(|| routes.get(path.split('?').next().unwrap_or_default()))
            .cloned()
    };

    requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body,
    });

    let route = route.unwrap_or(Route {
        status: 404,
        body: b"not found".to_vec(),
        declared_len: None,
    });

    let announced = route.declared_len.unwrap_or(route.body.len());
    let head = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status, announced
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&route.body).await?;
    socket.flush().await?;
    socket.shutdown().await?;
    Ok(())
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Build an in-memory zip archive from `(name, contents)` pairs.
/// Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
