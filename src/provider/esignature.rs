//! E-signature provider: account-scoped REST API with user-info discovery.

use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{ClientAuthMethod, TokenEndpoint, Tokens};
use crate::client::{ApiClient, ApiErrorDetail, IntoPage, Page, RequestSpec};
use crate::config::Environment;
use crate::error::{ErrorKind, SynclineError};

use super::{required_routing, string_field, ProviderAdapter};

const SANDBOX_AUTH_URL: &str = "https://account-d.docusign.com";
const PRODUCTION_AUTH_URL: &str = "https://account.docusign.com";
const API_PATH: &str = "/restapi/v2.1/accounts";

/// Routing key for the account's API host (`https://na3.docusign.net`).
pub const BASE_URI: &str = "base_uri";
/// Routing key for the account id embedded in every path.
pub const ACCOUNT_ID: &str = "account_id";

/// Error codes the provider returns for bad or insufficient credentials.
const AUTH_ERROR_CODES: &[&str] = &[
    "AUTHORIZATION_INVALID_TOKEN",
    "USER_AUTHENTICATION_FAILED",
    "PARTNER_AUTHENTICATION_FAILED",
    "USER_LACKS_PERMISSIONS",
];

#[derive(Debug, Clone)]
pub struct ESignatureAdapter {
    auth_url: String,
}

impl ESignatureAdapter {
    pub fn new(environment: Environment) -> Self {
        let auth_url = if environment.is_sandbox() {
            SANDBOX_AUTH_URL
        } else {
            PRODUCTION_AUTH_URL
        };
        Self {
            auth_url: auth_url.to_string(),
        }
    }

    /// Point token exchange and discovery at another OAuth host.
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl ProviderAdapter for ESignatureAdapter {
    fn name(&self) -> &str {
        "esignature"
    }

    fn base_url(&self, tokens: &Tokens) -> Result<String, SynclineError> {
        let base_uri = required_routing(tokens, self.name(), BASE_URI)?;
        let account_id = required_routing(tokens, self.name(), ACCOUNT_ID)?;
        Ok(format!(
            "{}{API_PATH}/{account_id}",
            base_uri.trim_end_matches('/')
        ))
    }

    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        Some(TokenEndpoint::new(
            format!("{}/oauth/token", self.auth_url),
            ClientAuthMethod::BasicHeader,
        ))
    }

    fn userinfo_url(&self) -> Option<String> {
        Some(format!("{}/oauth/userinfo", self.auth_url))
    }

    fn parse_api_error(&self, _status: u16, body: &str) -> ApiErrorDetail {
        // {"errorCode": "ENVELOPE_DOES_NOT_EXIST", "message": "..."}
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return ApiErrorDetail::default();
        };
        let code = string_field(&value, &["errorCode"]);
        let kind_hint = code
            .as_deref()
            .filter(|code| AUTH_ERROR_CODES.contains(code))
            .map(|_| ErrorKind::Auth);
        ApiErrorDetail {
            message: string_field(&value, &["message"]),
            code,
            kind_hint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_name: Option<String>,
    pub base_uri: String,
    #[serde(default)]
    pub is_default: bool,
}

impl UserInfo {
    /// The default account, or the first one listed.
    pub fn default_account(&self) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| account.is_default)
            .or_else(|| self.accounts.first())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub template_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub shared: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateList {
    #[serde(default)]
    envelope_templates: Vec<Template>,
    next_uri: Option<String>,
}

impl IntoPage<Template> for TemplateList {
    fn into_page(self) -> Result<Page<Template>, SynclineError> {
        let has_more = self.next_uri.as_deref().is_some_and(|uri| !uri.is_empty());
        Ok(Page::new(self.envelope_templates, has_more).with_next(self.next_uri))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub envelope_id: String,
    pub status: String,
    pub email_subject: Option<String>,
    pub created_date_time: Option<String>,
    pub sent_date_time: Option<String>,
    pub completed_date_time: Option<String>,
}

impl Envelope {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }
}

/// Typed operations over an [`ApiClient`] built with [`ESignatureAdapter`].
#[derive(Debug, Clone)]
pub struct ESignatureClient {
    api: ApiClient,
}

impl ESignatureClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Identity of the token owner, with the accounts it can reach.
    pub async fn user_info(&self) -> Result<UserInfo, SynclineError> {
        let url = self.api.adapter().userinfo_url().ok_or_else(|| {
            SynclineError::Configuration("provider has no user-info endpoint".to_string())
        })?;
        self.api.execute(RequestSpec::get(url)).await
    }

    /// Resolve the default account and store its routing on the client.
    ///
    /// Returns the updated tokens so the caller can persist them.
    pub async fn discover_account(&self) -> Result<Tokens, SynclineError> {
        let info = self.user_info().await?;
        let account = info.default_account().ok_or_else(|| {
            SynclineError::InvalidResponse(format!("user {} has no accounts", info.sub))
        })?;

        let tokens = self
            .api
            .tokens()
            .await
            .with_routing(BASE_URI, account.base_uri.trim_end_matches('/'))
            .with_routing(ACCOUNT_ID, account.account_id.as_str());
        self.api.update_tokens(tokens.clone()).await;
        Ok(tokens)
    }

    /// All templates in the account, fetched `page_size` at a time.
    pub fn list_templates(&self, page_size: usize) -> BoxStream<'_, Result<Template, SynclineError>> {
        self.api
            .iterate_pages::<Template, TemplateList, _>(page_size, move |cursor| {
                RequestSpec::get("/templates")
                    .query("start_position", cursor.offset)
                    .query("count", cursor.page_size)
            })
    }

    pub async fn get_envelope(&self, envelope_id: &str) -> Result<Envelope, SynclineError> {
        self.api
            .execute(RequestSpec::get(format!("/envelopes/{envelope_id}")))
            .await
    }

    /// Download one document of an envelope as PDF. `document_id` may be
    /// `"combined"` for all documents merged.
    pub async fn download_document(
        &self,
        envelope_id: &str,
        document_id: &str,
    ) -> Result<Vec<u8>, SynclineError> {
        self.api
            .execute_bytes(
                RequestSpec::get(format!("/envelopes/{envelope_id}/documents/{document_id}"))
                    .header("Accept", "application/pdf"),
            )
            .await
    }
}
