//! Shared test support: a canned-response FRED stub server and fixtures.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Route table: URL path (without query) -> (status, JSON body).
/// Query-sensitive routes can register under `path?needle`, matched when
/// the query string contains the needle.
#[derive(Debug, Clone, Default)]
pub struct StubRoutes {
    routes: HashMap<String, (u16, String)>,
}

impl StubRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, status: u16, body: serde_json::Value) -> Self {
        self.routes.insert(key.to_string(), (status, body.to_string()));
        self
    }

    fn resolve(&self, path: &str, query: &str) -> (u16, String) {
        // Most specific first: path?needle entries.
        for (key, response) in &self.routes {
            if let Some((route_path, needle)) = key.split_once('?') {
                if route_path == path && query.contains(needle) {
                    return response.clone();
                }
            }
        }
        if let Some(response) = self.routes.get(path) {
            return response.clone();
        }
        (
            404,
            serde_json::json!({"error_code": 404, "error_message": "no stub route"}).to_string(),
        )
    }
}

/// Spawn a minimal HTTP/1.1 server answering from the route table. Returns
/// the base URL to point the gateway at.
pub async fn spawn_fred_stub(routes: StubRoutes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 1024];
                // GET requests only; read until the header terminator.
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) => return,
                        Ok(n) => {
                            buffer.extend_from_slice(&chunk[..n]);
                            if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        },
                        Err(_) => return,
                    }
                }

                let request = String::from_utf8_lossy(&buffer);
                let target = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/");
                let (path, query) = target.split_once('?').unwrap_or((target, ""));

                let (status, body) = routes.resolve(path, query);
                let reason = match status {
                    200 => "OK",
                    400 => "Bad Request",
                    429 => "Too Many Requests",
                    500 => "Internal Server Error",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{addr}")
}

/// FRED-shaped series metadata body.
pub fn series_meta_body(id: &str, title: &str, units: &str) -> serde_json::Value {
    serde_json::json!({
        "seriess": [{
            "id": id,
            "title": title,
            "units": units,
            "frequency": "Monthly",
            "frequency_short": "M",
            "seasonal_adjustment": "Seasonally Adjusted",
            "seasonal_adjustment_short": "SA",
            "observation_start": "2020-01-01",
            "observation_end": "2021-12-01",
            "popularity": 90,
            "notes": "test series"
        }]
    })
}

/// FRED-shaped observations body: monthly dates starting 2020-01-01.
pub fn monthly_observations_body(start_value: f64, step: f64, months: usize) -> serde_json::Value {
    let observations: Vec<serde_json::Value> = (0..months)
        .map(|i| {
            let year = 2020 + (i / 12);
            let month = (i % 12) + 1;
            serde_json::json!({
                "realtime_start": "2025-01-01",
                "realtime_end": "2025-01-01",
                "date": format!("{year:04}-{month:02}-01"),
                "value": format!("{}", start_value + step * i as f64),
            })
        })
        .collect();
    serde_json::json!({ "observations": observations })
}

/// Observations body for an explicit list of (date, value) pairs; `None`
/// becomes the provider's "." marker.
pub fn observations_body(pairs: &[(&str, Option<f64>)]) -> serde_json::Value {
    let observations: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(date, value)| {
            serde_json::json!({
                "realtime_start": "2025-01-01",
                "realtime_end": "2025-01-01",
                "date": date,
                "value": value.map(|v| v.to_string()).unwrap_or_else(|| ".".to_string()),
            })
        })
        .collect();
    serde_json::json!({ "observations": observations })
}
