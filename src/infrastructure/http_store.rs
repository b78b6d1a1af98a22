use crate::config::StoreSettings;
use crate::domain::expense::{ExpenseId, ExpenseListing, ExpenseRecord, ExpenseUpdate, NewExpense};
use crate::domain::ports::{ExpenseStore, RecordClient};
use crate::error::{AccrualError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Single-record response, bare or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordResponse {
    Envelope { data: ExpenseRecord },
    Bare(ExpenseRecord),
}

impl RecordResponse {
    fn into_record(self) -> ExpenseRecord {
        match self {
            Self::Envelope { data } | Self::Bare(data) => data,
        }
    }
}

/// Expense store reached over HTTP.
///
/// Every request carries the configured timeout and is sent exactly once.
#[derive(Debug, Clone)]
pub struct HttpExpenseStore {
    base_url: String,
    http: reqwest::Client,
}

impl HttpExpenseStore {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.call_timeout)
            .build()
            .map_err(|e| AccrualError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/expenses", self.base_url)
    }

    fn item_url(&self, id: &ExpenseId) -> String {
        format!("{}/expenses/{}", self.base_url, id)
    }

    /// Sends the request and maps non-success statuses onto the error taxonomy.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        id: Option<&ExpenseId>,
    ) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "record store rejected request");
        match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(AccrualError::NotFound(id.to_string())),
            (StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS, _) => Err(
                AccrualError::Transport(format!("store returned {status}: {body}")),
            ),
            (status, _) if status.is_server_error() => Err(AccrualError::Transport(format!(
                "store returned {status}: {body}"
            ))),
            (status, _) => Err(AccrualError::Protocol(format!(
                "store returned {status}: {body}"
            ))),
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AccrualError::Protocol(format!("unexpected response body: {e}")))
    }
}

#[async_trait]
impl RecordClient for HttpExpenseStore {
    async fn list(&self) -> Result<Vec<ExpenseRecord>> {
        let response = self.send(self.http.get(self.collection_url()), None).await?;
        let listing: ExpenseListing = Self::read_json(response).await?;
        Ok(listing.into_records())
    }

    async fn get(&self, id: &ExpenseId) -> Result<ExpenseRecord> {
        let response = self.send(self.http.get(self.item_url(id)), Some(id)).await?;
        let record: RecordResponse = Self::read_json(response).await?;
        Ok(record.into_record())
    }

    async fn update(&self, id: &ExpenseId, fields: &ExpenseUpdate) -> Result<ExpenseRecord> {
        let request = self.http.put(self.item_url(id)).json(fields);
        let response = self.send(request, Some(id)).await?;
        let record: RecordResponse = Self::read_json(response).await?;
        Ok(record.into_record())
    }
}

#[async_trait]
impl ExpenseStore for HttpExpenseStore {
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        let request = self.http.post(self.collection_url()).json(&expense);
        let response = self.send(request, None).await?;
        let record: RecordResponse = Self::read_json(response).await?;
        Ok(record.into_record())
    }

    async fn delete(&self, id: &ExpenseId) -> Result<()> {
        self.send(self.http.delete(self.item_url(id)), Some(id))
            .await?;
        Ok(())
    }
}
