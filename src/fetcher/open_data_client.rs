use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use wreq::Client;
use wreq_util::Emulation;

use crate::config::ApiSection;

/// Field name to optional value. Only non-empty values become query filters.
pub type Filters<'a> = [(&'a str, Option<&'a str>)];

/// Anything that can answer a filtered dataset query with a JSON object.
///
/// Implementations never fail: transport and HTTP errors are logged and
/// reported as an empty object, so callers treat "no records" as a normal
/// outcome.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn query(&self, resource_id: &str, filters: &Filters<'_>) -> Value;
}

/// The `records` array of a query result, or an empty slice.
pub fn records(response: &Value) -> &[Value] {
    response
        .get("records")
        .and_then(|r| r.as_array())
        .map(|r| r.as_slice())
        .unwrap_or(&[])
}

pub fn has_records(response: &Value) -> bool {
    !records(response).is_empty()
}

/// Client for the open-data portal's `/resource/{id}` endpoint.
pub struct OpenDataClient {
    client: Client,
    base_url: Url,
    api_key: String,
    page_limit: u32,
    user_agent: String,
}

impl OpenDataClient {
    pub fn new(api: &ApiSection, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .emulation(Emulation::Firefox136)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        let mut base_url = Url::parse(&api.base_url)
            .with_context(|| format!("Invalid api.base_url: {}", api.base_url))?;
        // `Url::join` replaces the last segment unless the path ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(OpenDataClient {
            client,
            base_url,
            api_key: api_key.to_string(),
            page_limit: api.page_limit,
            user_agent: api.user_agent.clone(),
        })
    }

    pub fn build_query_url(&self, resource_id: &str, filters: &Filters<'_>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("resource/{}", resource_id))
            .with_context(|| format!("Invalid resource id: {}", resource_id))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-key", &self.api_key)
                .append_pair("format", "json")
                .append_pair("limit", &self.page_limit.to_string());

            for (field, value) in filters {
                if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                    query.append_pair(&format!("filters[{}]", field), value);
                }
            }
        }

        Ok(url)
    }

    async fn fetch_json(&self, url: Url) -> Result<Value> {
        let response = self
            .client
            .get(url.as_str())
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON response: {}", e))?;
        Ok(data)
    }
}

#[async_trait]
impl RecordSource for OpenDataClient {
    async fn query(&self, resource_id: &str, filters: &Filters<'_>) -> Value {
        let url = match self.build_query_url(resource_id, filters) {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not build query for {}: {}", resource_id, e);
                return Value::Object(Map::new());
            }
        };

        debug!("Querying {}", url.path());

        match self.fetch_json(url).await {
            Ok(data) => {
                info!(
                    "Fetched {} records from resource {}",
                    records(&data).len(),
                    resource_id
                );
                data
            }
            Err(e) => {
                warn!("Query for resource {} failed: {}", resource_id, e);
                Value::Object(Map::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_section(base_url: &str) -> ApiSection {
        ApiSection {
            base_url: base_url.to_string(),
            timeout_secs: 2,
            ..ApiSection::default()
        }
    }

    fn client(base_url: &str) -> OpenDataClient {
        OpenDataClient::new(&api_section(base_url), "test-key").unwrap()
    }

    #[test]
    fn test_empty_filters_add_no_filter_params() {
        let client = client("https://api.data.gov.in");
        let url = client
            .build_query_url("abc-123", &[("State", None), ("Year", Some("")), ("District", Some("  "))])
            .unwrap();

        assert_eq!(url.path(), "/resource/abc-123");
        assert!(url.query_pairs().all(|(k, _)| !k.starts_with("filters[")));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("api-key".to_string(), "test-key".to_string()),
                ("format".to_string(), "json".to_string()),
                ("limit".to_string(), "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_empty_filters_are_appended_in_order() {
        let client = client("https://api.data.gov.in");
        let url = client
            .build_query_url("abc-123", &[("State", Some("Kerala")), ("Year", Some("2019"))])
            .unwrap();

        let filters: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(k, _)| k.starts_with("filters["))
            .collect();
        assert_eq!(
            filters,
            vec![
                ("filters[State]".to_string(), "Kerala".to_string()),
                ("filters[Year]".to_string(), "2019".to_string()),
            ]
        );
    }

    #[test]
    fn test_base_path_is_kept_with_or_without_trailing_slash() {
        for base in ["http://mirror.local/api", "http://mirror.local/api/"] {
            let url = client(base).build_query_url("abc-123", &[]).unwrap();
            assert_eq!(url.path(), "/api/resource/abc-123", "base {}", base);
        }
    }

    #[tokio::test]
    async fn test_query_under_base_path_reaches_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/resource/district"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"State": "Goa"}]
            })))
            .mount(&server)
            .await;

        let client = client(&format!("{}/v1", server.uri()));
        let data = client.query("district", &[]).await;
        assert_eq!(records(&data).len(), 1);
    }

    #[tokio::test]
    async fn test_query_returns_parsed_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resource/district"))
            .and(query_param("filters[State]", "Kerala"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"State": "Kerala", "Avg_rainfall": "2500.5"}]
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let data = client.query("district", &[("State", Some("Kerala"))]).await;
        assert_eq!(records(&data).len(), 1);
        assert_eq!(records(&data)[0]["Avg_rainfall"], "2500.5");
    }

    #[tokio::test]
    async fn test_non_success_status_yields_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let data = client.query("district", &[]).await;
        assert_eq!(data, json!({}));
        assert!(!has_records(&data));
    }

    #[tokio::test]
    async fn test_invalid_json_yields_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        assert_eq!(client.query("district", &[]).await, json!({}));
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_empty_object() {
        // Port 9 (discard) is closed on test machines.
        let client = client("http://127.0.0.1:9");
        assert_eq!(client.query("district", &[]).await, json!({}));
    }

    #[test]
    fn test_records_helper_tolerates_missing_key() {
        assert!(records(&json!({"total": 0})).is_empty());
        assert!(records(&json!({"records": "oops"})).is_empty());
        assert_eq!(records(&json!({"records": [1, 2]})).len(), 2);
    }
}
