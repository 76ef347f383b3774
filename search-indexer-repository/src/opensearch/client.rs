//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts, IndicesForcemergeParts, IndicesRefreshParts},
    BulkParts, ClearScrollParts, DeleteByQueryParts, DeleteParts, IndexParts, OpenSearch, ScrollParts,
    SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::opensearch::queries::{
    build_clear_scroll, build_match_all_query, build_raw_uid_query, build_scroll_continuation,
    UidPage, UidScroll, RAW_QUERY_SCROLL_KEEP_ALIVE,
};
use search_indexer_shared::{IndexType, SearchDocument, Uid};

/// OpenSearch engine handle.
///
/// Maps the pipeline's engine operations onto OpenSearch APIs: commit is an
/// index refresh, optimize is a force-merge down to one segment, delete-all
/// is a `match_all` delete-by-query.
///
/// # Example
///
/// ```ignore
/// use search_indexer_repository::opensearch::IndexConfig;
/// let client = OpenSearchClient::new("http://localhost:9200", IndexConfig::default()).await?;
/// client.add_or_update(IndexType::Product, &SearchDocument::new(42)).await?;
/// client.commit(IndexType::Product).await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - Index naming for the deployment
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, prefix = %index_config.prefix, "Created OpenSearch client");

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Create the index with pipeline settings if it does not exist yet.
    pub async fn ensure_index(&self, index_type: IndexType) -> Result<(), SearchError> {
        if self.index_exists(index_type).await? {
            return Ok(());
        }

        let index = self.index_config.index_name(index_type);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        // 400 here means another writer created it first
        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 400 {
            return Err(SearchError::index(
                Self::failure_message("Index creation", response).await,
            ));
        }

        info!(index = %index, "Created search index");
        Ok(())
    }

    /// Scroll through every hit of a raw query. The last scroll id seen is
    /// left in `scroll_id` for the caller to release.
    async fn scroll_uids(
        &self,
        index: &str,
        raw_query: &str,
        scroll_id: &mut Option<String>,
    ) -> Result<Vec<Uid>, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .scroll(RAW_QUERY_SCROLL_KEEP_ALIVE)
            .body(build_raw_uid_query(raw_query))
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let mut scroll = UidScroll::new();
        let mut page = Self::uid_page("Search", response).await?;
        loop {
            if page.scroll_id.is_some() {
                *scroll_id = page.scroll_id.clone();
            }
            if !scroll.push(page) {
                break;
            }
            let Some(id) = scroll_id.as_deref() else {
                break;
            };
            let response = self
                .client
                .scroll(ScrollParts::None)
                .body(build_scroll_continuation(id))
                .send()
                .await
                .map_err(|e| SearchError::query(e.to_string()))?;
            page = Self::uid_page("Scroll", response).await?;
        }

        scroll.finish()
    }

    async fn uid_page(operation: &str, response: Response) -> Result<UidPage, SearchError> {
        if !response.status_code().is_success() {
            return Err(SearchError::query(
                Self::failure_message(operation, response).await,
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        Ok(UidPage::parse(&body))
    }

    /// Release a scroll context. Failures are logged only.
    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(build_clear_scroll(scroll_id))
            .send()
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to clear scroll context");
        }
    }

    async fn failure_message(operation: &str, response: Response) -> String {
        let status = response.status_code();
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "{} request failed", operation);
        format!("{} failed with status {}: {}", operation, status, body)
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    async fn add_or_update(
        &self,
        index_type: IndexType,
        document: &SearchDocument,
    ) -> Result<(), SearchError> {
        let index = self.index_config.index_name(index_type);
        let doc_id = document.document_id();

        let response = self
            .client
            .index(IndexParts::IndexId(&index, &doc_id))
            .body(Value::Object(document.fields.clone()))
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchError::index(
                Self::failure_message("Index", response).await,
            ));
        }

        debug!(index = %index, doc_id = %doc_id, "Document indexed");
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn add_documents(
        &self,
        index_type: IndexType,
        documents: &[SearchDocument],
    ) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }

        let index = self.index_config.index_name(index_type);
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            body.push(json!({"index": {"_index": index, "_id": doc.document_id()}}).into());
            body.push(Value::Object(doc.fields.clone()).into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(&index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchError::bulk_index(
                Self::failure_message("Bulk index", response).await,
            ));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        if response_body.get("errors").and_then(|e| e.as_bool()) == Some(true) {
            let failed = response_body
                .get("items")
                .and_then(|i| i.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| item.get("index").and_then(|i| i.get("error")).is_some())
                        .count()
                })
                .unwrap_or(0);
            return Err(SearchError::bulk_index(format!(
                "{} of {} documents failed",
                failed,
                documents.len()
            )));
        }

        debug!(index = %index, count = documents.len(), "Documents bulk indexed");
        Ok(())
    }

    async fn delete_document(&self, index_type: IndexType, uid: Uid) -> Result<(), SearchError> {
        let index = self.index_config.index_name(index_type);
        let doc_id = uid.to_string();

        let response = self
            .client
            .delete(DeleteParts::IndexId(&index, &doc_id))
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        // 404 is acceptable - document may not exist
        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(SearchError::delete(
                Self::failure_message("Delete", response).await,
            ));
        }

        debug!(index = %index, doc_id = %doc_id, "Document deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, index_type: IndexType) -> Result<(), SearchError> {
        self.ensure_index(index_type).await?;

        let index = self.index_config.index_name(index_type);
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[&index]))
            .body(build_match_all_query())
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchError::delete(
                Self::failure_message("Delete all", response).await,
            ));
        }

        info!(index = %index, "Removed all documents");
        Ok(())
    }

    async fn commit(&self, index_type: IndexType) -> Result<(), SearchError> {
        let index = self.index_config.index_name(index_type);
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&index]))
            .send()
            .await
            .map_err(|e| SearchError::commit(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchError::commit(
                Self::failure_message("Refresh", response).await,
            ));
        }

        debug!(index = %index, "Index committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn optimize(&self, index_type: IndexType) -> Result<(), SearchError> {
        let index = self.index_config.index_name(index_type);
        let response = self
            .client
            .indices()
            .forcemerge(IndicesForcemergeParts::Index(&[&index]))
            .max_num_segments(1)
            .send()
            .await
            .map_err(|e| SearchError::optimize(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchError::optimize(
                Self::failure_message("Force merge", response).await,
            ));
        }

        info!(index = %index, "Index optimized");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_uids(&self, index_type: IndexType, raw_query: &str) -> Result<Vec<Uid>, SearchError> {
        let index = self.index_config.index_name(index_type);
        let mut scroll_id = None;
        let result = self.scroll_uids(&index, raw_query, &mut scroll_id).await;
        if let Some(id) = scroll_id {
            self.clear_scroll(&id).await;
        }
        let uids = result?;

        debug!(index = %index, query = %raw_query, count = uids.len(), "Raw query resolved");
        Ok(uids)
    }

    async fn index_exists(&self, index_type: IndexType) -> Result<bool, SearchError> {
        let index = self.index_config.index_name(index_type);
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(SearchError::query(
                Self::failure_message("Index exists", response).await,
            )),
        }
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster health");
        Ok(status == "green" || status == "yellow")
    }
}
