//! Accounting provider: realm-scoped REST API with a SQL-like query
//! endpoint and Fault-shaped error bodies.

use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{ClientAuthMethod, TokenEndpoint, Tokens};
use crate::client::{ApiClient, ApiErrorDetail, IntoPage, Page, RequestSpec};
use crate::config::Environment;
use crate::error::{ErrorKind, SynclineError};

use super::{required_routing, ProviderAdapter};

const SANDBOX_API_URL: &str = "https://sandbox-quickbooks.api.intuit.com";
const PRODUCTION_API_URL: &str = "https://quickbooks.api.intuit.com";
const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const DEFAULT_MINOR_VERSION: u32 = 73;

/// Routing key for the company (realm) id from the OAuth redirect.
pub const REALM_ID: &str = "realm_id";

#[derive(Debug, Clone)]
pub struct AccountingAdapter {
    api_url: String,
    token_url: String,
}

impl AccountingAdapter {
    pub fn new(environment: Environment) -> Self {
        let api_url = if environment.is_sandbox() {
            SANDBOX_API_URL
        } else {
            PRODUCTION_API_URL
        };
        Self {
            api_url: api_url.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

impl ProviderAdapter for AccountingAdapter {
    fn name(&self) -> &str {
        "accounting"
    }

    fn base_url(&self, tokens: &Tokens) -> Result<String, SynclineError> {
        let realm_id = required_routing(tokens, self.name(), REALM_ID)?;
        Ok(format!("{}/v3/company/{realm_id}", self.api_url))
    }

    fn token_endpoint(&self) -> Option<TokenEndpoint> {
        Some(TokenEndpoint::new(
            self.token_url.clone(),
            ClientAuthMethod::BasicHeader,
        ))
    }

    fn parse_api_error(&self, _status: u16, body: &str) -> ApiErrorDetail {
        let Ok(envelope) = serde_json::from_str::<FaultEnvelope>(body) else {
            return ApiErrorDetail::default();
        };
        let fault = envelope.fault;
        let first = fault.errors.into_iter().next();
        let kind_hint = match fault.kind.as_deref() {
            Some("AuthenticationFault" | "AuthorizationFault") => Some(ErrorKind::Auth),
            Some("ValidationFault") => Some(ErrorKind::Validation),
            _ => None,
        };

        match first {
            Some(error) => ApiErrorDetail {
                message: match (error.message, error.detail) {
                    (Some(message), Some(detail)) if detail != message => {
                        Some(format!("{message}: {detail}"))
                    }
                    (message, detail) => message.or(detail),
                },
                code: error.code,
                kind_hint,
            },
            None => ApiErrorDetail {
                message: None,
                code: None,
                kind_hint,
            },
        }
    }
}

/// `{"Fault": {"Error": [{"Message", "Detail", "code"}], "type": "ValidationFault"}}`
#[derive(Debug, Deserialize)]
struct FaultEnvelope {
    #[serde(rename = "Fault", alias = "fault")]
    fault: Fault,
}

#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "Error", alias = "error", default)]
    errors: Vec<FaultError>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FaultError {
    #[serde(rename = "Message", alias = "message")]
    message: Option<String>,
    #[serde(rename = "Detail", alias = "detail")]
    detail: Option<String>,
    code: Option<String>,
}

/// Query response: `{"QueryResponse": {"<Entity>": [...], "startPosition": 1, ...}}`.
#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    response: serde_json::Map<String, Value>,
}

struct EntityPage<T> {
    items: Vec<T>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for EntityPage<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = QueryEnvelope::deserialize(deserializer)?;
        // The only array in the response is the entity list; an empty
        // result omits it entirely.
        let items = match envelope.response.into_iter().find(|(_, value)| value.is_array()) {
            Some((_, list)) => serde_json::from_value(list).map_err(serde::de::Error::custom)?,
            None => Vec::new(),
        };
        Ok(Self { items })
    }
}

impl<T> IntoPage<T> for EntityPage<T> {
    fn into_page(self) -> Result<Page<T>, SynclineError> {
        Ok(Page::sized(self.items))
    }
}

/// `{"value": "58", "name": "Acme"}` pointer to another entity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Reference {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Reference {
    pub fn to(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailAddress {
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    pub id: String,
    pub display_name: Option<String>,
    pub company_name: Option<String>,
    pub primary_email_addr: Option<EmailAddress>,
    pub balance: Option<f64>,
    pub active: Option<bool>,
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentLine {
    pub amount: f64,
    pub linked_txn: Vec<LinkedTxn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkedTxn {
    pub txn_id: String,
    pub txn_type: String,
}

/// Body of `POST /payment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewPayment {
    pub customer_ref: Reference,
    pub total_amt: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line: Vec<PaymentLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_date: Option<String>,
}

impl NewPayment {
    pub fn new(customer_id: impl Into<String>, total_amt: f64) -> Self {
        Self {
            customer_ref: Reference::to(customer_id),
            total_amt,
            line: Vec::new(),
            txn_date: None,
        }
    }

    /// Apply `amount` of the payment to an invoice.
    pub fn applied_to_invoice(mut self, invoice_id: impl Into<String>, amount: f64) -> Self {
        self.line.push(PaymentLine {
            amount,
            linked_txn: vec![LinkedTxn {
                txn_id: invoice_id.into(),
                txn_type: "Invoice".to_string(),
            }],
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Payment {
    pub id: String,
    pub total_amt: f64,
    pub customer_ref: Reference,
    pub sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    #[serde(rename = "Customer")]
    customer: Customer,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    #[serde(rename = "Payment")]
    payment: Payment,
}

/// Typed operations over an [`ApiClient`] built with [`AccountingAdapter`].
#[derive(Debug, Clone)]
pub struct AccountingClient {
    api: ApiClient,
    minor_version: u32,
}

impl AccountingClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            minor_version: DEFAULT_MINOR_VERSION,
        }
    }

    pub fn with_minor_version(mut self, minor_version: u32) -> Self {
        self.minor_version = minor_version;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn get(&self, path: impl Into<String>) -> RequestSpec {
        RequestSpec::get(path).query("minorversion", self.minor_version)
    }

    /// Stream the rows of `select` (e.g. `SELECT * FROM Invoice WHERE Balance > '0'`),
    /// appending `STARTPOSITION`/`MAXRESULTS` per page.
    pub fn query<T>(&self, select: &str, page_size: usize) -> BoxStream<'_, Result<T, SynclineError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let select = select.trim().to_string();
        let minor_version = self.minor_version;
        self.api
            .iterate_pages::<T, EntityPage<T>, _>(page_size, move |cursor| {
                // STARTPOSITION is 1-based.
                let statement = format!(
                    "{select} STARTPOSITION {} MAXRESULTS {}",
                    cursor.offset + 1,
                    cursor.page_size
                );
                RequestSpec::get("/query")
                    .query("query", statement)
                    .query("minorversion", minor_version)
            })
    }

    pub fn list_customers(&self, page_size: usize) -> BoxStream<'_, Result<Customer, SynclineError>> {
        self.query("SELECT * FROM Customer", page_size)
    }

    pub async fn get_customer(&self, customer_id: &str) -> Result<Customer, SynclineError> {
        let response: CustomerResponse = self
            .api
            .execute(self.get(format!("/customer/{customer_id}")))
            .await?;
        Ok(response.customer)
    }

    /// Record a payment. Sent once: a payment is not safe to repeat.
    pub async fn create_payment(&self, payment: &NewPayment) -> Result<Payment, SynclineError> {
        let response: PaymentResponse = self
            .api
            .execute(
                RequestSpec::post("/payment")
                    .query("minorversion", self.minor_version)
                    .json(payment)?
                    .skip_retry(),
            )
            .await?;
        Ok(response.payment)
    }

    pub async fn download_invoice_pdf(&self, invoice_id: &str) -> Result<Vec<u8>, SynclineError> {
        self.api
            .execute_bytes(
                self.get(format!("/invoice/{invoice_id}/pdf"))
                    .header("Accept", "application/pdf"),
            )
            .await
    }
}
