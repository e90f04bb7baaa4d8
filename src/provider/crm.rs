//! CRM provider: instance-routed REST API with SOQL queries, tasks and file
//! attachments.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{ClientAuthMethod, TokenEndpoint, Tokens};
use crate::client::{ApiClient, ApiErrorDetail, IntoPage, Page, RequestSpec};
use crate::config::Environment;
use crate::error::{ErrorKind, SynclineError};

use super::{required_routing, string_field, ProviderAdapter};

const SANDBOX_LOGIN_URL: &str = "https://test.salesforce.com";
const PRODUCTION_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_API_VERSION: &str = "v59.0";

/// Routing key for the org's instance host, returned by the token endpoint.
pub const INSTANCE_URL: &str = "instance_url";

/// Session lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CrmAdapter {
    login_url: String,
}

impl CrmAdapter {
    pub fn new(environment: Environment) -> Self {
        let login_url = if environment.is_sandbox() {
            SANDBOX_LOGIN_URL
        } else {
            PRODUCTION_LOGIN_URL
        };
        Self {
            login_url: login_url.to_string(),
        }
    }

    /// Use a My Domain or test login host.
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl ProviderAdapter for CrmAdapter {
    fn name(&self) -> &str {
        "crm"
    }

    /// The instance host. Paths carry `/services/data/<version>` themselves so
    /// `nextRecordsUrl` links resolve against the same base.
    fn base_url(&self, tokens: &Tokens) -> Result<String, SynclineError> {
        Ok(required_routing(tokens, self.name(), INSTANCE_URL)?
            .trim_end_matches('/')
            .to_string())
    }

    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        Some(
            TokenEndpoint::new(
                format!("{}/services/oauth2/token", self.login_url),
                ClientAuthMethod::RequestBody,
            )
            .with_routing_fields(&[INSTANCE_URL])
            .with_default_expires_in(DEFAULT_SESSION_LIFETIME),
        )
    }

    fn userinfo_url(&self) -> Option<String> {
        Some(format!("{}/services/oauth2/userinfo", self.login_url))
    }

    fn parse_api_error(&self, _status: u16, body: &str) -> ApiErrorDetail {
        // [{"message": "...", "errorCode": "INVALID_FIELD", "fields": [...]}]
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return ApiErrorDetail::default();
        };
        let first = match &value {
            Value::Array(errors) => errors.first(),
            other => Some(other),
        };
        let Some(first) = first else {
            return ApiErrorDetail::default();
        };

        let code = string_field(first, &["errorCode", "error"]);
        let kind_hint = match code.as_deref() {
            Some("INVALID_SESSION_ID" | "INVALID_AUTH_HEADER") => Some(ErrorKind::Auth),
            Some("NOT_FOUND" | "INVALID_CROSS_REFERENCE_KEY") => Some(ErrorKind::NotFound),
            _ => None,
        };
        ApiErrorDetail {
            message: string_field(first, &["message", "error_description"]),
            code,
            kind_hint,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult<T> {
    done: bool,
    #[serde(default = "Vec::new")]
    records: Vec<T>,
    next_records_url: Option<String>,
}

impl<T> IntoPage<T> for QueryResult<T> {
    fn into_page(self) -> Result<Page<T>, SynclineError> {
        let has_more = !self.done && self.next_records_url.is_some();
        Ok(Page::new(self.records, has_more).with_next(self.next_records_url))
    }
}

/// Response of an sObject create.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateResult {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Body of a `Task` create.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewTask {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Related record (account, opportunity).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub what_id: Option<String>,
    /// Related person (contact, lead).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_date: Option<String>,
}

impl NewTask {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            description: None,
            what_id: None,
            who_id: None,
            status: None,
            activity_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn related_to(mut self, what_id: impl Into<String>) -> Self {
        self.what_id = Some(what_id.into());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ContentVersionUpload<'a> {
    title: &'a str,
    path_on_client: &'a str,
    version_data: String,
    first_publish_location_id: &'a str,
}

/// Typed operations over an [`ApiClient`] built with [`CrmAdapter`].
#[derive(Debug, Clone)]
pub struct CrmClient {
    api: ApiClient,
    api_version: String,
}

impl CrmClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn data_path(&self, suffix: &str) -> String {
        format!("/services/data/{}/{suffix}", self.api_version)
    }

    /// Run a SOQL query and stream every matching record.
    ///
    /// The provider chooses the batch size; `batch_size` is passed as a hint
    /// and iteration follows `nextRecordsUrl` until `done`.
    pub fn query<T>(
        &self,
        soql: &str,
        batch_size: Option<u32>,
    ) -> BoxStream<'_, Result<T, SynclineError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let first = self.data_path("query");
        let soql = soql.to_string();
        self.api
            .iterate_pages::<T, QueryResult<T>, _>(0, move |cursor| {
                let spec = match &cursor.next {
                    Some(next) => RequestSpec::get(next.clone()),
                    None => RequestSpec::get(first.clone()).query("q", &soql),
                };
                match batch_size {
                    Some(size) => spec.header("Sforce-Query-Options", format!("batchSize={size}")),
                    None => spec,
                }
            })
    }

    pub async fn get_record<T: DeserializeOwned>(
        &self,
        sobject: &str,
        id: &str,
    ) -> Result<T, SynclineError> {
        self.api
            .execute(RequestSpec::get(self.data_path(&format!("sobjects/{sobject}/{id}"))))
            .await
    }

    /// Create a follow-up task. Not retried on failure: a retry after a
    /// lost response could create a duplicate.
    pub async fn create_task(&self, task: &NewTask) -> Result<CreateResult, SynclineError> {
        self.api
            .execute(
                RequestSpec::post(self.data_path("sobjects/Task"))
                    .json(task)?
                    .skip_retry(),
            )
            .await
    }

    /// Upload a file as a content version published to `parent_id`.
    pub async fn attach_file(
        &self,
        parent_id: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<CreateResult, SynclineError> {
        let upload = ContentVersionUpload {
            title: file_name,
            path_on_client: file_name,
            version_data: STANDARD.encode(data),
            first_publish_location_id: parent_id,
        };
        self.api
            .execute(
                RequestSpec::post(self.data_path("sobjects/ContentVersion"))
                    .json(&upload)?
                    .skip_retry(),
            )
            .await
    }
}
