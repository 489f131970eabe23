//! Shared `reqwest` client construction.

use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("building the shared HTTP client never fails with this config")
}
