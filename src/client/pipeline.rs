//! The request pipeline: token check, attempt loop, classification, decoding.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::auth::Tokens;
use crate::error::{ClassifiedError, SynclineError};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::{cancelled_error, interruptible_sleep, until_cancelled, with_timeout};

use super::classify::{classify_response, classify_transport, CallContext, RawResponse};
use super::request::{decode_body, ApiResponse, RequestBody, RequestSpec};
use super::ApiClient;

/// A 2xx response before decoding.
struct Delivered {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl ApiClient {
    /// Run `spec` and decode the JSON body into `T`.
    ///
    /// An empty body (204) decodes from `null`, so `T = ()` or `Option<_>`
    /// fits endpoints that return nothing.
    pub async fn execute<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, SynclineError> {
        self.execute_raw(spec).await?.into_json()
    }

    /// Run `spec` and return the raw bytes of a binary response (PDF etc).
    pub async fn execute_bytes(&self, spec: RequestSpec) -> Result<Vec<u8>, SynclineError> {
        self.execute_raw(spec).await?.into_bytes()
    }

    /// Run `spec` through the pipeline.
    ///
    /// The token is checked (and refreshed if needed) once, before the first
    /// attempt. Attempts then repeat while the retry policy allows, each
    /// bounded by the request timeout and the caller's cancellation token.
    pub async fn execute_raw(&self, spec: RequestSpec) -> Result<ApiResponse, SynclineError> {
        let span = tracing::info_span!(
            "execute",
            provider = self.adapter.name(),
            request_id = %Uuid::new_v4(),
            method = %spec.method,
            path = %spec.path,
        );
        self.run(spec).instrument(span).await
    }

    async fn run(&self, spec: RequestSpec) -> Result<ApiResponse, SynclineError> {
        if is_cancelled(spec.cancel.as_ref()) {
            return Err(cancelled_error().into());
        }

        // A refresh in progress is abandoned on cancellation, like any attempt.
        let tokens = until_cancelled(spec.cancel.as_ref(), self.tokens.ensure_fresh()).await?;
        let url = self.resolve_url(&spec, &tokens)?;
        let policy = if spec.skip_retry {
            self.retry.without_retries()
        } else {
            self.retry.clone()
        };

        let delivered = self.attempt_loop(&spec, &url, &tokens, &policy).await?;
        let body = decode_body(
            delivered.status,
            delivered.content_type.as_deref(),
            delivered.body,
        )?;
        Ok(ApiResponse {
            status: delivered.status,
            content_type: delivered.content_type,
            body,
        })
    }

    async fn attempt_loop(
        &self,
        spec: &RequestSpec,
        url: &Url,
        tokens: &Tokens,
        policy: &RetryPolicy,
    ) -> Result<Delivered, ClassifiedError> {
        let timeout = spec.timeout.unwrap_or(self.settings.timeout);
        let mut attempt: u32 = 0;

        loop {
            debug!(%url, attempt, "sending request");
            let error = match self.attempt(spec, url, tokens, timeout).await {
                Ok(delivered) => return Ok(delivered),
                Err(error) => error,
            };

            // Cancellation is final, whatever its classification.
            if is_cancelled(spec.cancel.as_ref()) {
                return Err(error);
            }

            let Some(delay) = policy.decide(&error, attempt).delay() else {
                debug!(kind = %error.kind, status = ?error.http_status, attempt, "giving up");
                return Err(error);
            };

            warn!(
                kind = %error.kind,
                status = ?error.http_status,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "request failed, retrying"
            );
            if !delay.is_zero() {
                interruptible_sleep(self.clock.as_ref(), delay, spec.cancel.as_ref()).await?;
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        spec: &RequestSpec,
        url: &Url,
        tokens: &Tokens,
        timeout: Duration,
    ) -> Result<Delivered, ClassifiedError> {
        let request = self.build_request(spec, url, tokens)?;

        let (status, content_type, retry_after, body) =
            with_timeout(timeout, spec.cancel.as_ref(), async {
                let response = request
                    .send()
                    .await
                    .map_err(|err| classify_transport(&err))?;
                let status = response.status().as_u16();
                let content_type = header_string(response.headers(), CONTENT_TYPE);
                let retry_after = header_string(response.headers(), RETRY_AFTER);
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| classify_transport(&err))?;
                Ok::<_, ClassifiedError>((status, content_type, retry_after, body.to_vec()))
            })
            .await?;

        if !(200..300).contains(&status) {
            let text = String::from_utf8_lossy(&body);
            let raw = RawResponse {
                status,
                retry_after: retry_after.as_deref(),
                body: &text,
            };
            let detail = self.adapter.parse_api_error(status, &text);
            if let Some(error) = classify_response(
                &raw,
                CallContext::Resource,
                detail,
                self.settings.default_retry_after_secs,
            ) {
                return Err(error);
            }
        }

        Ok(Delivered {
            status,
            content_type,
            body,
        })
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
        url: &Url,
        tokens: &Tokens,
    ) -> Result<reqwest::RequestBuilder, ClassifiedError> {
        let mut headers = HeaderMap::new();
        let (auth_name, auth_value) = self.adapter.auth_scheme().header_for(&tokens.access_token);
        insert_header(&mut headers, &auth_name, &auth_value)?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut request = self.http.request(spec.method.clone(), url.clone());
        match &spec.body {
            Some(RequestBody::Json(value)) => {
                let payload = serde_json::to_vec(value).map_err(|err| {
                    ClassifiedError::validation(format!("cannot encode request body: {err}"))
                })?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                request = request.body(payload);
            }
            Some(RequestBody::Form(fields)) => {
                request = request.form(fields);
            }
            Some(RequestBody::Bytes { content_type, data }) => {
                insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type)?;
                request = request.body(data.clone());
            }
            None => {}
        }

        for (name, value) in self.adapter.default_headers() {
            insert_header(&mut headers, &name, &value)?;
        }
        for (name, value) in &spec.headers {
            insert_header(&mut headers, name, value)?;
        }

        Ok(request.headers(headers))
    }

    fn resolve_url(&self, spec: &RequestSpec, tokens: &Tokens) -> Result<Url, SynclineError> {
        let raw = if spec.is_absolute() {
            spec.path.clone()
        } else {
            let base = self.adapter.base_url(tokens)?;
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                spec.path.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&raw).map_err(|err| {
            SynclineError::Configuration(format!("invalid request URL {raw}: {err}"))
        })?;
        let present: Vec<(&str, &str)> = spec
            .query
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|value| (key.as_str(), value)))
            .collect();
        if !present.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in present {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Insert, replacing any earlier value, so later sources win.
fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ClassifiedError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| ClassifiedError::validation(format!("invalid header name {name}: {err}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| ClassifiedError::validation(format!("invalid value for header {name}: {err}")))?;
    headers.insert(name, value);
    Ok(())
}
