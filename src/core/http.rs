use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

pub const APP_USER_AGENT: &str = concat!("UnixLauncher/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared client for Mojang, loader metadata, Microsoft and GitHub calls.
/// Bodies are requested uncompressed so SHA-1 checks run on the bytes as served.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}
