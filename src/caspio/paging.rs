use super::client::RestClient;
use super::types::{ApiResponse, Query, RESULT_FIELD, ResourceKind};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, instrument};

/// Largest page the backend returns.
pub const PAGE_SIZE: usize = 1000;

impl RestClient {
    /// Fetch every row matching `query`, following pages while each one is exactly full.
    ///
    /// A non-200 page, or one without a `Result` array, ends the walk and is returned with
    /// the rows gathered so far.
    #[instrument(name = "Fetching all rows", skip(self, query))]
    pub async fn get_all_rows(
        &self,
        kind: ResourceKind,
        name: &str,
        query: &Query,
    ) -> Result<ApiResponse> {
        let mut accumulator: Option<ApiResponse> = None;
        let mut page_number = 1;

        loop {
            let page_query = query.page(PAGE_SIZE, page_number);
            let url = self.rows_url(kind, name, &page_query)?;
            debug!(url = %url, page_number, "Fetching page");

            let current = self.get(url).await?;

            if !current.is_ok() {
                return Ok(merge_error_page(accumulator, current));
            }

            let Some(count) = current.rows().map(Vec::len) else {
                return Ok(merge_error_page(accumulator, current));
            };

            if count != PAGE_SIZE {
                return Ok(merge_page(accumulator, current));
            }

            accumulator = Some(merge_page(accumulator, current));
            page_number += 1;
        }
    }
}

/// Append `current`'s rows to the accumulator. The first page seeds it, so its status and
/// headers are the ones callers see.
pub(crate) fn merge_page(accumulator: Option<ApiResponse>, current: ApiResponse) -> ApiResponse {
    let Some(mut accumulator) = accumulator else {
        return current;
    };

    let rows = current.into_rows().unwrap_or_default();
    if let Some(Value::Array(merged)) = accumulator.body.get_mut(RESULT_FIELD) {
        merged.extend(rows);
    }

    accumulator
}

/// Fold the rows gathered so far into a failed page.
///
/// The failed page keeps its status, headers and other body fields; its `Result` becomes the
/// accumulated rows followed by whatever rows the failed page carried. With no accumulator, or
/// a body that is not a JSON object, the failed page is returned unchanged.
pub(crate) fn merge_error_page(
    accumulator: Option<ApiResponse>,
    mut current: ApiResponse,
) -> ApiResponse {
    let Some(accumulator) = accumulator else {
        return current;
    };

    if let Value::Object(body) = &mut current.body {
        let mut rows = accumulator.into_rows().unwrap_or_default();
        if let Some(Value::Array(page_rows)) = body.remove(RESULT_FIELD) {
            rows.extend(page_rows);
        }
        body.insert(RESULT_FIELD.to_string(), Value::Array(rows));
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caspio::client::mocks::{MockTokenProvider, mock_rest_client};
    use crate::caspio::types::test_helpers::{mock_page, mock_response, mock_rows};
    use crate::caspio::types::{PAGE_NUMBER_KEY, PAGE_SIZE_KEY, WHERE_KEY};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const ROWS_PATH: &str = "/rest/v2/tables/Orders/rows";

    /// Matches requests whose `q` parameter asks for the given page.
    struct PageNumber(u64);

    impl wiremock::Match for PageNumber {
        fn matches(&self, request: &Request) -> bool {
            page_query(request)
                .and_then(|q| q.get(PAGE_NUMBER_KEY).and_then(Value::as_u64))
                == Some(self.0)
        }
    }

    fn page_query(request: &Request) -> Option<Value> {
        request
            .url
            .query_pairs()
            .find(|(key, _)| key == "q")
            .and_then(|(_, q)| serde_json::from_str(&q).ok())
    }

    async fn mount_page(server: &MockServer, page: u64, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(ROWS_PATH))
            .and(PageNumber(page))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    fn rows_page(start: usize, count: usize) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("X-Page-Start", start.to_string())
            .set_body_json(json!({ "Result": mock_rows(start, count) }))
    }

    fn ids(response: &ApiResponse) -> Vec<u64> {
        response
            .rows()
            .unwrap()
            .iter()
            .map(|row| row["PK_ID"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_merge_page_seeds_from_first_page() {
        let first = mock_page(0, 2);
        let merged = merge_page(None, first.clone());

        assert_eq!(merged.body, first.body);
    }

    #[test]
    fn test_merge_page_concatenates_in_order() {
        let merged = merge_page(Some(mock_page(0, 2)), mock_page(2, 3));

        assert_eq!(ids(&merged), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_error_page_without_accumulator_is_identity() {
        let error = mock_response(500, json!({ "Code": "InternalError" }));
        let merged = merge_error_page(None, error);

        assert_eq!(merged.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(merged.body, json!({ "Code": "InternalError" }));
    }

    #[test]
    fn test_merge_error_page_carries_prior_rows() {
        let error = mock_response(
            400,
            json!({ "Code": "BadRequest", "Result": [{ "PK_ID": 99 }] }),
        );
        let merged = merge_error_page(Some(mock_page(0, 2)), error);

        assert_eq!(merged.status, StatusCode::BAD_REQUEST);
        assert_eq!(merged.body["Code"], "BadRequest");
        assert_eq!(ids(&merged), vec![0, 1, 99]);
    }

    #[test]
    fn test_merge_error_page_keeps_text_body() {
        let error = mock_response(502, json!("Bad Gateway"));
        let merged = merge_error_page(Some(mock_page(0, 2)), error);

        assert_eq!(merged.body, json!("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_get_all_rows_follows_full_pages() {
        let server = MockServer::start().await;
        mount_page(&server, 1, rows_page(0, PAGE_SIZE)).await;
        mount_page(&server, 2, rows_page(PAGE_SIZE, PAGE_SIZE)).await;
        mount_page(&server, 3, rows_page(2 * PAGE_SIZE, 500)).await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Tables, "Orders", &Query::where_clause("Status='Open'"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get("X-Page-Start").unwrap(),
            "0",
            "headers come from the first page"
        );
        let ids = ids(&response);
        assert_eq!(ids.len(), 2500);
        assert!(ids.windows(2).all(|pair| pair[0] + 1 == pair[1]));
    }

    #[tokio::test]
    async fn test_get_all_rows_sends_paged_query() {
        let server = MockServer::start().await;
        mount_page(&server, 1, rows_page(0, 3)).await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let query = Query::where_clause("Status='Open'").with("select", "PK_ID");
        client
            .get_all_rows(ResourceKind::Tables, "Orders", &query)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let q = page_query(&requests[0]).unwrap();
        assert_eq!(q[WHERE_KEY], "Status='Open'");
        assert_eq!(q["select"], "PK_ID");
        assert_eq!(q[PAGE_SIZE_KEY], PAGE_SIZE);
        assert_eq!(q[PAGE_NUMBER_KEY], 1);
    }

    #[tokio::test]
    async fn test_get_all_rows_single_short_page_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v2/views/OpenOrders/rows"))
            .and(PageNumber(1))
            .respond_with(rows_page(0, 0))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Views, "OpenOrders", &Query::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({ "Result": [] }));
        assert_eq!(response.headers.get("X-Page-Start").unwrap(), "0");
    }

    #[tokio::test]
    async fn test_get_all_rows_exact_multiple_needs_empty_final_page() {
        let server = MockServer::start().await;
        mount_page(&server, 1, rows_page(0, PAGE_SIZE)).await;
        mount_page(&server, 2, rows_page(PAGE_SIZE, 0)).await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Tables, "Orders", &Query::new())
            .await
            .unwrap();

        assert_eq!(response.rows().unwrap().len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_get_all_rows_oversized_page_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ROWS_PATH))
            .respond_with(rows_page(0, PAGE_SIZE + 1))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Tables, "Orders", &Query::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.rows().unwrap().len(), PAGE_SIZE + 1);
    }

    #[tokio::test]
    async fn test_get_all_rows_error_page_surfaces_status() {
        let server = MockServer::start().await;
        mount_page(&server, 1, rows_page(0, PAGE_SIZE)).await;
        mount_page(
            &server,
            2,
            ResponseTemplate::new(500).set_body_json(json!({ "Code": "InternalError", "Result": [] })),
        )
        .await;
        Mock::given(method("GET"))
            .and(path(ROWS_PATH))
            .and(PageNumber(3))
            .respond_with(rows_page(2 * PAGE_SIZE, 1))
            .expect(0)
            .mount(&server)
            .await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Tables, "Orders", &Query::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body["Code"], "InternalError");
        assert_eq!(response.rows().unwrap().len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_get_all_rows_malformed_page_stops() {
        let server = MockServer::start().await;
        mount_page(&server, 1, rows_page(0, PAGE_SIZE)).await;
        mount_page(
            &server,
            2,
            ResponseTemplate::new(200).set_body_json(json!({ "Result": "unexpected" })),
        )
        .await;

        let client = mock_rest_client(&server.uri(), Arc::new(MockTokenProvider::new(&["token"])));
        let response = client
            .get_all_rows(ResourceKind::Tables, "Orders", &Query::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.rows().unwrap().len(), PAGE_SIZE);
    }
}
