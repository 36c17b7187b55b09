//! Shared REST plumbing used by every dialect driver.
//!
//! A [`RestRequest`] is a dialect-relative description of one HTTP call;
//! [`RestClient`] resolves it against the node's base URL, stamps the auth
//! and identity headers, and normalizes the response: `204 No Content` and
//! non-success statuses both come back as `Ok(None)` so callers can treat
//! "the backend had nothing to say" uniformly.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use crate::error::DriverError;
use crate::{ClientIdentity, NodeProfile};

/// One REST call against a backend node, described relative to the
/// dialect's base path (`/loadtracks`, `/sessions/{id}/players/{guild}`,
/// and so on).
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub path: String,
    pub method: Method,
    /// Query string parameters.
    pub params: Vec<(String, String)>,
    /// JSON request body, when the method carries one.
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::POST,
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::PATCH,
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::DELETE,
            params: Vec::new(),
            body: None,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// The first value of a query parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP client bound to one node's REST endpoint.
pub struct RestClient {
    http: reqwest::Client,
    /// Fully resolved base, e.g. `http://localhost:2333/v4`.
    base_url: String,
    auth: String,
    node_name: String,
    /// FrequenC wraps non-JSON response bodies instead of failing on them.
    wrap_non_json: bool,
}

impl RestClient {
    /// Builds a client for `profile`, with `base` as the dialect's path
    /// prefix (may be empty for dialects that prefix per-request).
    pub fn new(
        profile: &NodeProfile,
        identity: &ClientIdentity,
        base: &str,
    ) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .user_agent(&identity.user_agent)
            .build()?;
        Ok(Self {
            http,
            base_url: profile.http_url(base),
            auth: profile.auth.clone(),
            node_name: profile.name.clone(),
            wrap_non_json: false,
        })
    }

    /// Makes the client wrap non-JSON response bodies as
    /// `{ "rawData": "<text>" }` instead of erroring on them.
    pub fn wrap_non_json(mut self) -> Self {
        self.wrap_non_json = true;
        self
    }

    /// Executes `request` and returns the parsed response body.
    ///
    /// `Ok(None)` covers both `204 No Content` and non-success statuses;
    /// the latter is logged but deliberately not an error, matching how
    /// backends report "nothing found" for loads and decodes.
    pub async fn execute(
        &self,
        request: RestRequest,
    ) -> Result<Option<Value>, DriverError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(
            node = %self.node_name,
            method = %request.method,
            url,
            "sending rest request"
        );

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(AUTHORIZATION, &self.auth);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            tracing::debug!(
                node = %self.node_name,
                path = request.path,
                "rest request returned no content"
            );
            return Ok(None);
        }
        if !status.is_success() {
            tracing::debug!(
                node = %self.node_name,
                %status,
                path = request.path,
                "rest request failed; treating response as empty"
            );
            return Ok(None);
        }

        if self.wrap_non_json {
            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.starts_with("application/json"));
            if !is_json {
                let text = response.text().await?;
                return Ok(Some(json!({ "rawData": text })));
            }
        }

        let value = response.json::<Value>().await?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_request_constructors_set_method() {
        assert_eq!(RestRequest::get("/info").method, Method::GET);
        assert_eq!(
            RestRequest::patch("/sessions/a", json!({})).method,
            Method::PATCH
        );
        assert_eq!(RestRequest::delete("/x").method, Method::DELETE);
        assert_eq!(RestRequest::post("/x", json!({})).method, Method::POST);
    }

    #[test]
    fn test_rest_request_param_lookup() {
        let request = RestRequest::get("/loadtracks").with_params(vec![
            ("identifier".into(), "ytsearch:azur lane".into()),
        ]);
        assert_eq!(request.param("identifier"), Some("ytsearch:azur lane"));
        assert_eq!(request.param("missing"), None);
    }
}
