//! HTTP access to the search engine.

use std::time::Duration;

use serde_json::Value as Json;
use tracing::debug;

use crate::config::SearchSettings;
use crate::error::{DataProviderError, Result};

const WINDOW_TOO_LARGE: &str = "Result window is too large";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Status and decoded body of one engine response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Json,
}

/// Sends requests relative to the configured index URL.
pub trait Transport: Send + Sync {
    fn send(&self, method: Method, path: &str, body: Option<&Json>) -> Result<Response>;
}

/// Blocking `reqwest` client shared by every query of a backend.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpTransport {
    pub fn from_settings(settings: &SearchSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DataProviderError::BackendRequest(e.to_string()))?;
        Ok(Self {
            client,
            url: settings.resolved_url()?.trim_end_matches('/').to_string(),
            credentials: settings.resolved_credentials()?,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, method: Method, path: &str, body: Option<&Json>) -> Result<Response> {
        let url = format!("{}{}", self.url, path);
        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%url, ?method, "search request");
        let response = request
            .send()
            .map_err(|e| DataProviderError::BackendRequest(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .json::<Json>()
            .map_err(|e| DataProviderError::BackendRequest(format!("invalid response body: {}", e)))?;
        Ok(Response { status, body })
    }
}

fn reason(failure: &Json) -> Option<&str> {
    failure.pointer("/reason/reason").and_then(Json::as_str)
}

/// Turn an engine response into its body, or the matching error.
pub fn check_response(response: Response, search: bool) -> Result<Json> {
    let Response { status, body } = response;

    if status == 200 {
        if !search {
            return Ok(body);
        }
        // A multi-index search succeeds as long as one shard answers.
        if let Some(shards) = body.get("_shards") {
            let count = |key: &str| shards.get(key).and_then(Json::as_u64).unwrap_or(0);
            if count("total").saturating_sub(count("skipped")).saturating_sub(count("failed")) == 0
                && count("total") > 0
            {
                let message = shards
                    .pointer("/failures/0")
                    .and_then(reason)
                    .unwrap_or("all shards failed")
                    .to_string();
                if message.contains(WINDOW_TOO_LARGE) {
                    return Err(DataProviderError::ResultWindow);
                }
                return Err(DataProviderError::BackendQuery(message));
            }
        }
        return Ok(body);
    }

    let error = body.get("error").cloned().unwrap_or(Json::Null);
    let root_cause = error.pointer("/root_cause/0/reason").and_then(Json::as_str);

    match status {
        400 => {
            let parse_exception = error.pointer("/failed_shards/0/reason/caused_by/type").and_then(Json::as_str)
                == Some("parse_exception");
            if parse_exception {
                Err(DataProviderError::BackendQuery("Malformed query.".into()))
            } else if let Some(reason) = root_cause {
                Err(DataProviderError::BackendQuery(format!(
                    "Request error with HTTP code 400. Reason: {}",
                    reason
                )))
            } else {
                Err(DataProviderError::BackendQuery(
                    "Request error with HTTP code 400. Unknown reason".into(),
                ))
            }
        }
        500 if root_cause.is_some_and(|r| r.contains(WINDOW_TOO_LARGE)) => Err(DataProviderError::ResultWindow),
        _ => Err(DataProviderError::BackendRequest(format!("Request error with HTTP code {}.", status))),
    }
}
