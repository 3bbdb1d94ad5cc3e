use super::TableOperations;
use super::client::RestClient;
use super::types::{ApiResponse, Query, ResourceKind};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;
use url::Url;

fn primary_key(id: u64) -> Query {
    Query::where_clause(format!("PK_ID = {}", id))
}

impl RestClient {
    pub(crate) fn rows_url(&self, kind: ResourceKind, name: &str, query: &Query) -> Result<Url> {
        let q = query.to_json()?;
        self.url(&format!("{}/{}/rows", kind.path(), name), &[("q", &q)])
    }

    pub async fn get_view_rows_where(&self, view: &str, predicate: &str) -> Result<ApiResponse> {
        self.get_all_rows(ResourceKind::Views, view, &Query::where_clause(predicate))
            .await
    }

    pub async fn get_view_rows_by_query(&self, view: &str, query: &Query) -> Result<ApiResponse> {
        self.get_all_rows(ResourceKind::Views, view, query).await
    }

    pub async fn get_table_rows_where(&self, table: &str, predicate: &str) -> Result<ApiResponse> {
        self.get_all_rows(ResourceKind::Tables, table, &Query::where_clause(predicate))
            .await
    }

    pub async fn get_all_table_rows(&self, table: &str) -> Result<ApiResponse> {
        self.get_all_rows(ResourceKind::Tables, table, &Query::new())
            .await
    }

    pub async fn get_table_rows_by_query(&self, table: &str, query: &Query) -> Result<ApiResponse> {
        self.get_all_rows(ResourceKind::Tables, table, query).await
    }

    /// Single request, not paged; a primary key matches at most one row.
    pub async fn get_table_rows_by_id(&self, table: &str, id: u64) -> Result<ApiResponse> {
        let url = self.rows_url(ResourceKind::Tables, table, &primary_key(id))?;
        self.get(url).await
    }

    #[instrument(name = "Inserting row", skip(self, data))]
    pub async fn insert_table_row(&self, table: &str, data: &Value) -> Result<ApiResponse> {
        let url = self.url(&format!("tables/{}/rows", table), &[])?;
        self.post(url, data).await
    }

    pub async fn update_table_rows_where(
        &self,
        table: &str,
        predicate: &str,
        data: &Value,
    ) -> Result<ApiResponse> {
        self.update_table_rows_by_query(table, &Query::where_clause(predicate), data)
            .await
    }

    #[instrument(name = "Updating rows", skip(self, query, data))]
    pub async fn update_table_rows_by_query(
        &self,
        table: &str,
        query: &Query,
        data: &Value,
    ) -> Result<ApiResponse> {
        let url = self.rows_url(ResourceKind::Tables, table, query)?;
        self.put(url, data).await
    }

    pub async fn update_table_row_by_id(
        &self,
        table: &str,
        id: u64,
        data: &Value,
    ) -> Result<ApiResponse> {
        self.update_table_rows_by_query(table, &primary_key(id), data)
            .await
    }

    pub async fn delete_table_rows_where(&self, table: &str, predicate: &str) -> Result<ApiResponse> {
        self.delete_table_rows_by_query(table, &Query::where_clause(predicate))
            .await
    }

    #[instrument(name = "Deleting rows", skip(self, query))]
    pub async fn delete_table_rows_by_query(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<ApiResponse> {
        let url = self.rows_url(ResourceKind::Tables, table, query)?;
        self.delete(url).await
    }

    pub async fn delete_table_row_by_id(&self, table: &str, id: u64) -> Result<ApiResponse> {
        self.delete_table_rows_by_query(table, &primary_key(id))
            .await
    }

    /// Metadata of a DataPage, by its AppKey.
    pub async fn get_data_page_details(&self, app_key: &str) -> Result<ApiResponse> {
        let url = self.url(&format!("datapages/{}", app_key), &[])?;
        self.get(url).await
    }
}

#[async_trait]
impl TableOperations for RestClient {
    async fn get_all_rows(
        &self,
        kind: ResourceKind,
        name: &str,
        query: &Query,
    ) -> Result<ApiResponse> {
        RestClient::get_all_rows(self, kind, name, query).await
    }

    async fn insert_row(&self, table: &str, data: &Value) -> Result<ApiResponse> {
        self.insert_table_row(table, data).await
    }

    async fn update_rows(&self, table: &str, query: &Query, data: &Value) -> Result<ApiResponse> {
        self.update_table_rows_by_query(table, query, data).await
    }

    async fn delete_rows(&self, table: &str, query: &Query) -> Result<ApiResponse> {
        self.delete_table_rows_by_query(table, query).await
    }
}
