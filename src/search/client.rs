//! HTTP client wrapper for the Azure AI Search REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

use super::SearchIndex;
use super::filters::escape_literal;
use super::types::{
    IndexActionResult, IndexResponse, SearchError, SearchHit, SearchQuery, SearchResponse,
    SearchResults,
};
use crate::config::SearchSettings;
use crate::http::{encode_segment, format_endpoint, normalize_base_url};
use crate::models::SearchDocument;

/// Lightweight HTTP client for one search index.
pub struct SearchService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) index_name: String,
    pub(crate) api_version: String,
}

impl SearchService {
    /// Construct a client for the configured endpoint and index.
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .ok_or_else(|| SearchError::InvalidUrl("search endpoint is not configured".into()))?;
        let client = Client::builder().user_agent("jobdesk/0.1").build()?;
        let base_url = normalize_base_url(endpoint).map_err(SearchError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            index = %settings.index_name,
            has_api_key = settings.api_key.is_some(),
            "Initialized search HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
            index_name: settings.index_name.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    /// Name of the index this client targets.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn index_actions(&self, actions: Vec<Value>) -> Result<Vec<IndexActionResult>, SearchError> {
        let count = actions.len();
        let response = self
            .request(
                Method::POST,
                &format!("indexes/{}/docs/index", self.index_name),
            )
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        // 207 means some actions failed; the body still lists every action.
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::MULTI_STATUS {
            let IndexResponse { value } = response.json().await?;
            tracing::debug!(
                index = %self.index_name,
                actions = count,
                failed = value.iter().filter(|result| !result.status).count(),
                "Index batch applied"
            );
            Ok(value)
        } else {
            let body = response.text().await.unwrap_or_default();
            let error = SearchError::UnexpectedStatus { status, body };
            tracing::error!(index = %self.index_name, error = %error, "Index batch failed");
            Err(error)
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())]);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), SearchError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = SearchError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Search request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl SearchIndex for SearchService {
    async fn get_document(&self, id: &str) -> Result<Option<SearchDocument>, SearchError> {
        let response = self
            .request(Method::GET, &document_path(&self.index_name, id))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn search(&self, query: SearchQuery) -> Result<SearchResults, SearchError> {
        let mut body = Map::new();
        body.insert("search".into(), Value::String(query.text));
        body.insert("top".into(), Value::from(query.top));
        body.insert("count".into(), Value::Bool(query.include_total_count));
        if query.skip > 0 {
            body.insert("skip".into(), Value::from(query.skip));
        }
        if let Some(filter) = query.filter {
            body.insert("filter".into(), Value::String(filter));
        }
        if let Some(order_by) = query.order_by {
            body.insert("orderby".into(), Value::String(order_by));
        }

        let response = self
            .request(
                Method::POST,
                &format!("indexes/{}/docs/search", self.index_name),
            )
            .json(&Value::Object(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = SearchError::UnexpectedStatus { status, body };
            tracing::error!(index = %self.index_name, error = %error, "Search query failed");
            return Err(error);
        }

        let SearchResponse { count, value } = response.json().await?;
        Ok(SearchResults {
            total_count: count,
            hits: value
                .into_iter()
                .map(|hit| SearchHit {
                    score: hit.score.unwrap_or(0.0),
                    document: hit.document,
                })
                .collect(),
        })
    }

    async fn upload(
        &self,
        documents: Vec<SearchDocument>,
    ) -> Result<Vec<IndexActionResult>, SearchError> {
        let mut actions = Vec::with_capacity(documents.len());
        for document in &documents {
            let mut action = match serde_json::to_value(document)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            action.insert("@search.action".into(), Value::String("upload".into()));
            actions.push(Value::Object(action));
        }
        self.index_actions(actions).await
    }

    async fn delete(&self, ids: Vec<String>) -> Result<Vec<IndexActionResult>, SearchError> {
        let actions = ids
            .into_iter()
            .map(|id| {
                let mut action = Map::new();
                action.insert("@search.action".into(), Value::String("delete".into()));
                action.insert(SearchDocument::KEY_FIELD.into(), Value::String(id));
                Value::Object(action)
            })
            .collect();
        self.index_actions(actions).await
    }

    async fn ensure_index(&self) -> Result<(), SearchError> {
        let path = format!("indexes/{}", self.index_name);
        let response = self.request(Method::GET, &path).send().await?;
        match response.status() {
            StatusCode::OK => {
                tracing::debug!(index = %self.index_name, "Index already exists");
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = SearchError::UnexpectedStatus { status, body };
                tracing::error!(index = %self.index_name, error = %error, "Index existence check failed");
                return Err(error);
            }
        }

        tracing::info!(index = %self.index_name, "Creating search index");
        let response = self
            .request(Method::PUT, &path)
            .json(&index_definition(&self.index_name))
            .send()
            .await?;
        self.ensure_success(response).await
    }
}

fn index_definition(name: &str) -> Value {
    json!({
        "name": name,
        "fields": [
            { "name": "Id", "type": "Edm.String", "key": true, "filterable": true },
            { "name": "Title", "type": "Edm.String", "searchable": true, "filterable": true },
            { "name": "Company", "type": "Edm.String", "searchable": true, "filterable": true },
            { "name": "Description", "type": "Edm.String", "searchable": true },
            { "name": "Location", "type": "Edm.String", "searchable": true, "filterable": true },
            { "name": "PostingDate", "type": "Edm.DateTimeOffset", "filterable": true, "sortable": true },
            { "name": "WorkdayId", "type": "Edm.String", "filterable": true },
            { "name": "IngestionTime", "type": "Edm.DateTimeOffset", "filterable": true, "sortable": true }
        ]
    })
}

/// Lookup path for one document. The key is written as an OData string literal so that no key
/// text, `..` included, can leave its path segment.
fn document_path(index: &str, key: &str) -> String {
    format!("indexes/{index}/docs('{}')", encode_segment(&escape_literal(key)))
}
