use axum::body::Bytes;
use http::StatusCode;
use reqwest::Client;
use tracing::debug;

/// Upstream reply relayed back to the caller unchanged.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// POST `body` verbatim to the EVM node at `url`.
pub async fn forward(client: &Client, url: &str, body: Bytes) -> Result<ProxiedResponse, reqwest::Error> {
    let response = client
        .post(url)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let body = response.bytes().await?;
    debug!("EVM RPC replied HTTP {} ({} bytes)", status, body.len());

    Ok(ProxiedResponse { status, body })
}
