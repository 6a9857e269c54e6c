// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Remote readable over HTTP range requests.
//!
//! [`RemoteReadable::open`] must succeed before the readable is used: it
//! sends a `HEAD` request, requires a `Content-Length` header and
//! `Accept-Ranges: bytes`, and records the length. Every `read` then issues
//! one `GET` with a `Range` header and expects `206 Partial Content`.

use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tracing::debug;

use super::{check_range, Readable};
use crate::core::{HttpConfig, Result, SourceError};

/// A byte stream fetched in one `GET`, with its declared length.
pub type RemoteStream = (Box<dyn Read + Send>, u64);

/// A remote object read through HTTP byte ranges.
#[derive(Debug)]
pub struct RemoteReadable {
    url: String,
    client: Client,
    size: Option<u64>,
}

impl RemoteReadable {
    /// Create a readable for `url`. No request is sent until [`open`](Self::open).
    pub fn new(url: impl Into<String>, http: &HttpConfig) -> Result<Self> {
        let url = url.into();
        let client = build_client(&url, http)?;
        Ok(Self {
            url,
            client,
            size: None,
        })
    }

    /// Check reachability and range support, and learn the length.
    pub fn open(&mut self) -> Result<u64> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .map_err(|e| SourceError::unreachable(&self.url, e.to_string()))?;
        let response = check_status(&self.url, response)?;

        let accepts_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.split(',').any(|unit| unit.trim() == "bytes"));
        if !accepts_ranges {
            return Err(SourceError::RangeNotSupported {
                url: self.url.clone(),
            });
        }

        let size = declared_length(&self.url, &response)?;
        debug!(context = "RemoteReadable", url = %self.url, size, "Opened remote source");
        self.size = Some(size);
        Ok(size)
    }

    /// The URL this readable fetches from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Readable for RemoteReadable {
    fn size(&self) -> Result<u64> {
        self.size
            .ok_or_else(|| SourceError::not_initialized("RemoteReadable::size"))
    }

    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.size()?;
        check_range(offset, length, size)?;
        if length == 0 {
            return Ok(Vec::new());
        }

        let last = offset + length - 1;
        let response = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={offset}-{last}"))
            .send()
            .map_err(|e| SourceError::unreachable(&self.url, e.to_string()))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(SourceError::unreachable(
                &self.url,
                format!(
                    "range request bytes={offset}-{last} answered with {}",
                    response.status()
                ),
            ));
        }

        let body = response
            .bytes()
            .map_err(|e| SourceError::io("RemoteReadable", e.to_string()))?;
        if body.len() as u64 != length {
            return Err(SourceError::io(
                "RemoteReadable",
                format!("requested {length} bytes at {offset}, received {}", body.len()),
            ));
        }
        Ok(body.to_vec())
    }
}

/// Fetch `url` with a plain `GET`, requiring a declared length.
pub fn open_stream(url: &str, http: &HttpConfig) -> Result<RemoteStream> {
    let client = build_client(url, http)?;
    fetch_stream(&client, url)
}

fn fetch_stream(client: &Client, url: &str) -> Result<RemoteStream> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| SourceError::unreachable(url, e.to_string()))?;
    let response = check_status(url, response)?;
    let size = declared_length(url, &response)?;
    debug!(context = "RemoteReadable", url, size, "Fetching remote source as a stream");
    Ok((Box::new(response), size))
}

fn build_client(url: &str, http: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &http.headers {
        let name = HeaderName::from_str(name)
            .map_err(|e| SourceError::invalid_config(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SourceError::invalid_config(format!("header value for '{name}': {e}")))?;
        headers.insert(name, value);
    }

    Client::builder()
        .timeout(http.timeout_secs.map(Duration::from_secs))
        .user_agent(http.user_agent.clone())
        .default_headers(headers)
        .build()
        .map_err(|e| SourceError::unreachable(url, format!("cannot build HTTP client: {e}")))
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::unreachable(url, format!("server answered {status}")));
    }
    Ok(response)
}

/// Parse `Content-Length` from the headers.
///
/// `Response::content_length` reports the body size hint, which is zero for
/// `HEAD`, so the header is read directly.
fn declared_length(url: &str, response: &Response) -> Result<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| SourceError::MissingLength {
            url: url.to_string(),
        })
}
