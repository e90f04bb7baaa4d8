//! Document-automation provider: templates, documents and the
//! poll-until-ready helper for freshly created documents.

use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{ClientAuthMethod, TokenEndpoint, Tokens};
use crate::client::{ApiClient, ApiErrorDetail, IntoPage, Page, RequestSpec};
use crate::error::{ClassifiedError, ErrorKind, SynclineError};
use crate::util::clock::Clock;

use super::{string_field, AuthScheme, ProviderAdapter};

const DEFAULT_BASE_URL: &str = "https://api.pandadoc.com";
const API_PATH: &str = "/public/v1";

/// Status of a document whose content is still being generated.
pub const STATUS_UPLOADED: &str = "document.uploaded";

#[derive(Debug, Clone)]
pub struct DocgenAdapter {
    base_url: String,
    auth: AuthScheme,
}

impl Default for DocgenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocgenAdapter {
    /// OAuth (bearer) access.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth: AuthScheme::Bearer,
        }
    }

    /// Authenticate with a workspace API key held in `Tokens::access_token`.
    pub fn with_api_key(mut self) -> Self {
        self.auth = AuthScheme::ApiKey {
            header: "Authorization".to_string(),
            prefix: Some("API-Key".to_string()),
        };
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl ProviderAdapter for DocgenAdapter {
    fn name(&self) -> &str {
        "docgen"
    }

    fn base_url(&self, _tokens: &Tokens) -> Result<String, SynclineError> {
        Ok(format!("{}{API_PATH}", self.base_url))
    }

    fn auth_scheme(&self) -> AuthScheme {
        self.auth.clone()
    }

    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        Some(TokenEndpoint::new(
            format!("{}/oauth2/access_token", self.base_url),
            ClientAuthMethod::RequestBody,
        ))
    }

    fn parse_api_error(&self, _status: u16, body: &str) -> ApiErrorDetail {
        // {"type": "request_error", "detail": "..." | {...}}
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return ApiErrorDetail::default();
        };
        let code = string_field(&value, &["type"]);
        let message = match value.get("detail") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(detail @ Value::Object(_)) => Some(detail.to_string()),
            _ => string_field(&value, &["message"]),
        };
        let kind_hint = match code.as_deref() {
            Some("authorization_error" | "permission_error") => Some(ErrorKind::Auth),
            Some("not_found") => Some(ErrorKind::NotFound),
            _ => None,
        };
        ApiErrorDetail {
            message,
            code,
            kind_hint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
}

impl DocumentSummary {
    pub fn is_ready(&self) -> bool {
        self.status != STATUS_UPLOADED
    }
}

#[derive(Debug, Deserialize)]
struct ResultList<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl<T> IntoPage<T> for ResultList<T> {
    fn into_page(self) -> Result<Page<T>, SynclineError> {
        // No total or next link: only a short page ends the listing.
        Ok(Page::sized(self.results))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Body of `POST /documents` from a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateDocument {
    pub name: String,
    pub template_uuid: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Recipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TemplateToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateToken {
    pub name: String,
    pub value: String,
}

/// Bounds for [`DocgenClient::wait_for_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

/// Typed operations over an [`ApiClient`] built with [`DocgenAdapter`].
#[derive(Debug, Clone)]
pub struct DocgenClient {
    api: ApiClient,
}

impl DocgenClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn list_templates(
        &self,
        page_size: usize,
    ) -> BoxStream<'_, Result<TemplateSummary, SynclineError>> {
        self.api
            .iterate_pages::<TemplateSummary, ResultList<TemplateSummary>, _>(page_size, |cursor| {
                RequestSpec::get("/templates")
                    .query("page", cursor.page_index + 1)
                    .query("count", cursor.page_size)
            })
    }

    /// Documents, optionally filtered by status (e.g. `document.completed`).
    pub fn list_documents(
        &self,
        page_size: usize,
        status: Option<&str>,
    ) -> BoxStream<'_, Result<DocumentSummary, SynclineError>> {
        let status = status.map(str::to_string);
        self.api
            .iterate_pages::<DocumentSummary, ResultList<DocumentSummary>, _>(
                page_size,
                move |cursor| {
                    RequestSpec::get("/documents")
                        .query("page", cursor.page_index + 1)
                        .query("count", cursor.page_size)
                        .query_opt("status", status.clone())
                },
            )
    }

    /// Create a document from a template. The new document starts in
    /// [`STATUS_UPLOADED`]; see [`wait_for_document`](Self::wait_for_document).
    pub async fn create_document_from_template(
        &self,
        request: &CreateDocument,
    ) -> Result<DocumentSummary, SynclineError> {
        self.api
            .execute(RequestSpec::post("/documents").json(request)?)
            .await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<DocumentSummary, SynclineError> {
        self.api
            .execute(RequestSpec::get(format!("/documents/{document_id}")))
            .await
    }

    /// Poll until the document leaves [`STATUS_UPLOADED`].
    ///
    /// Each check is an ordinary `execute` (with its own retries); between
    /// checks the client's clock sleeps `options.interval`. Fails with a
    /// retryable server error when the document is still processing after
    /// `options.max_attempts` checks.
    pub async fn wait_for_document(
        &self,
        document_id: &str,
        options: PollOptions,
    ) -> Result<DocumentSummary, SynclineError> {
        for check in 1..=options.max_attempts.max(1) {
            let document = self.get_document(document_id).await?;
            if document.is_ready() {
                return Ok(document);
            }
            debug!(document_id, check, status = %document.status, "document not ready");
            if check < options.max_attempts {
                self.api.clock().sleep(options.interval).await;
            }
        }

        Err(ClassifiedError::new(
            ErrorKind::Server,
            format!(
                "document {document_id} still processing after {} checks",
                options.max_attempts
            ),
        )
        .into())
    }

    pub async fn download_document(&self, document_id: &str) -> Result<Vec<u8>, SynclineError> {
        self.api
            .execute_bytes(
                RequestSpec::get(format!("/documents/{document_id}/download"))
                    .header("Accept", "application/pdf"),
            )
            .await
    }
}
