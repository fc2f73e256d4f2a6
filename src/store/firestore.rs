//! Firestore REST backend for API-key lookup.
//!
//! Resolves a key with a single structured query:
//! `<collection> WHERE <api_keys_field> ARRAY_CONTAINS <key> LIMIT 1`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RecordStore, StoreError};
use crate::auth::Principal;

/// Public Firestore REST endpoint.
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";

/// Connection and query settings for [`FirestoreRecordStore`].
#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    /// Base URL of the REST API (an emulator URL in development).
    pub base_url: String,
    /// Google Cloud project identifier.
    pub project_id: String,
    /// Database name, usually `(default)`.
    pub database: String,
    /// Collection holding one document per principal.
    pub collection: String,
    /// Array field listing the API keys a principal owns.
    pub api_keys_field: String,
    /// OAuth2 access token sent as a bearer credential, if any.
    pub access_token: Option<String>,
}

impl FirestoreOptions {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_FIRESTORE_URL.to_string(),
            project_id: project_id.into(),
            database: "(default)".to_string(),
            collection: "users".to_string(),
            api_keys_field: "apiKeys".to_string(),
            access_token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents:runQuery",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database
        )
    }
}

/// Record store backed by a Firestore users collection.
#[derive(Clone)]
pub struct FirestoreRecordStore {
    options: FirestoreOptions,
    client: reqwest::Client,
}

impl FirestoreRecordStore {
    /// Creates a store with a default HTTP client.
    pub fn new(options: FirestoreOptions) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(options, client))
    }

    /// Creates a store sharing an existing HTTP client.
    pub fn with_client(options: FirestoreOptions, client: reqwest::Client) -> Self {
        Self { options, client }
    }

    fn query_body<'a>(&'a self, api_key: &'a str) -> RunQueryRequest<'a> {
        RunQueryRequest {
            structured_query: StructuredQuery {
                from: [CollectionSelector {
                    collection_id: &self.options.collection,
                }],
                filter: Filter {
                    field_filter: FieldFilter {
                        field: FieldReference {
                            field_path: &self.options.api_keys_field,
                        },
                        op: "ARRAY_CONTAINS",
                        value: Value {
                            string_value: api_key,
                        },
                    },
                },
                limit: 1,
            },
        }
    }
}

#[async_trait]
impl RecordStore for FirestoreRecordStore {
    async fn find_principal(&self, api_key: &str) -> Result<Principal, StoreError> {
        let mut request = self
            .client
            .post(self.options.run_query_url())
            .json(&self.query_body(api_key));

        if let Some(token) = &self.options.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Unavailable(status.to_string()));
        }

        let rows: Vec<RunQueryResponse> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let document = rows
            .into_iter()
            .find_map(|row| row.document)
            .ok_or(StoreError::NotFound)?;

        let principal_id = document
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Decode(format!("bad document name '{}'", document.name)))?;

        debug!(principal = %principal_id, "resolved api key");
        Ok(Principal::new(principal_id))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest<'a> {
    structured_query: StructuredQuery<'a>,
}

#[derive(Serialize)]
struct StructuredQuery<'a> {
    from: [CollectionSelector<'a>; 1],
    #[serde(rename = "where")]
    filter: Filter<'a>,
    limit: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSelector<'a> {
    collection_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter<'a> {
    field_filter: FieldFilter<'a>,
}

#[derive(Serialize)]
struct FieldFilter<'a> {
    field: FieldReference<'a>,
    op: &'static str,
    value: Value<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldReference<'a> {
    field_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Value<'a> {
    string_value: &'a str,
}

// Rows without a document only carry `readTime` and mean "no match".
#[derive(Deserialize)]
struct RunQueryResponse {
    document: Option<Document>,
}

#[derive(Deserialize)]
struct Document {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_query_url_targets_configured_database() {
        let options = FirestoreOptions::new("demo").with_base_url("http://localhost:8081/");
        assert_eq!(
            options.run_query_url(),
            "http://localhost:8081/v1/projects/demo/databases/(default)/documents:runQuery"
        );
    }

    #[test]
    fn query_body_matches_array_membership() {
        let store = FirestoreRecordStore::with_client(
            FirestoreOptions::new("demo"),
            reqwest::Client::new(),
        );

        let body = serde_json::to_value(store.query_body("secret")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "users" }],
                    "where": {
                        "fieldFilter": {
                            "field": { "fieldPath": "apiKeys" },
                            "op": "ARRAY_CONTAINS",
                            "value": { "stringValue": "secret" }
                        }
                    },
                    "limit": 1
                }
            })
        );
    }
}
