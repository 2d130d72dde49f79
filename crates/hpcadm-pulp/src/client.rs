//! HTTP client for the Pulp v2 API.

use crate::Result;
use hpcadm_core::client::{ServiceClient, ServiceClientBuilder, PULP_DEFAULT_TIMEOUT};
use hpcadm_core::settings::PulpSettings;
use hpcadm_core::Error;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Page size for criteria searches.
pub const SEARCH_PAGE_LIMIT: u64 = 1000;

/// Search criteria for Pulp `search/` endpoints.
///
/// `limit` and `skip` are managed by the client's pagination loop and
/// deliberately absent here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchCriteria {
    /// Mongo-style filter document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    /// Field projection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Content type restriction, e.g. `["rpm"]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_ids: Option<Vec<String>>,
    /// Sort specification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
}

impl SearchCriteria {
    /// Criteria restricted to rpm units, optionally filtered by a name
    /// regex.
    #[must_use]
    pub fn rpm_units(name_regex: Option<&str>) -> Self {
        let mut criteria = Self {
            fields: Some(json!({"unit": ["name", "version", "release", "arch"]})),
            type_ids: Some(vec!["rpm".to_string()]),
            ..Self::default()
        };
        if let Some(regex) = name_regex {
            criteria.filters = Some(json!({"unit": {"name": {"$regex": regex}}}));
        }
        criteria
    }

    /// Criteria matching repositories by id.
    #[must_use]
    pub fn repositories(ids: &[String]) -> Self {
        let mut criteria = Self::default();
        if !ids.is_empty() {
            criteria.filters = Some(json!({"id": {"$in": ids}}));
        }
        criteria
    }

    /// Criteria for tasks, optionally restricted to states, sorted by
    /// start time.
    #[must_use]
    pub fn tasks(states: &[String]) -> Self {
        let mut criteria = Self {
            sort: Some(json!([["start_time", "ascending"]])),
            ..Self::default()
        };
        if !states.is_empty() {
            criteria.filters = Some(json!({"state": {"$in": states}}));
        }
        criteria
    }
}

/// Client for the Pulp v2 REST API.
pub struct PulpClient {
    client: ServiceClient,
}

impl PulpClient {
    /// Builds a client from the settings file section.
    pub fn from_settings(settings: &PulpSettings) -> Result<Self> {
        let client = ServiceClientBuilder::new(
            "pulp",
            settings.base_url(),
            Duration::from_secs(PULP_DEFAULT_TIMEOUT),
        )?
        .with_basic_auth(settings.username.clone(), settings.password.clone())
        .build()?;
        Ok(Self { client })
    }

    /// Wraps an already-built service client. Used by tests.
    #[must_use]
    pub fn with_client(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Simple GET returning the decoded JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .execute_with_retry(Method::GET, path, query, |r| r, map_pulp_status)
            .await?;
        Ok(response.json().await?)
    }

    /// Criteria search with `limit`/`skip` pagination.
    ///
    /// `extra_body` fields (e.g. `"importers": 1`) are merged alongside
    /// the criteria. Pages accumulate until one comes back shorter than
    /// the limit.
    pub async fn search<T: DeserializeOwned>(
        &self,
        path: &str,
        criteria: &SearchCriteria,
        extra_body: Option<&Value>,
    ) -> Result<Vec<T>> {
        let mut criteria_value = serde_json::to_value(criteria)?;
        let mut results = Vec::new();
        let mut skip: u64 = 0;

        loop {
            if let Value::Object(map) = &mut criteria_value {
                map.insert("limit".to_string(), json!(SEARCH_PAGE_LIMIT));
                map.insert("skip".to_string(), json!(skip));
            }
            let mut body = json!({ "criteria": criteria_value });
            if let (Value::Object(body_map), Some(Value::Object(extra))) = (&mut body, extra_body) {
                for (key, value) in extra {
                    body_map.insert(key.clone(), value.clone());
                }
            }

            debug!(path, skip, "pulp criteria search page");
            let send_body = body.clone();
            let response = self
                .client
                .execute_with_retry(
                    Method::POST,
                    path,
                    &[],
                    move |r| r.json(&send_body),
                    map_pulp_status,
                )
                .await?;
            let page: Vec<T> = response.json().await?;

            let page_len = page.len() as u64;
            results.extend(page);
            if page_len < SEARCH_PAGE_LIMIT {
                break;
            }
            skip += SEARCH_PAGE_LIMIT;
        }

        Ok(results)
    }
}

fn map_pulp_status(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::ExternalServiceError {
            service: "pulp".to_string(),
            message: format!("authentication rejected ({status})"),
        },
        _ => Error::ExternalServiceError {
            service: "pulp".to_string(),
            message: format!("{status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    async fn test_client(server: &MockServer) -> PulpClient {
        let client = ServiceClientBuilder::new("pulp", server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_basic_auth("admin", SecretString::from("hunter2".to_string()))
            .build()
            .unwrap();
        PulpClient::with_client(client)
    }

    #[tokio::test]
    async fn search_sets_criteria_and_merges_extra_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/search/"))
            .and(body_partial_json(json!({
                "criteria": {"limit": 1000, "skip": 0},
                "importers": 1,
                "distributors": 1,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"display_name": "centos-7-base"}])),
            )
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let repos: Vec<Value> = client
            .search(
                "repositories/search/",
                &SearchCriteria::repositories(&[]),
                Some(&json!({"importers": 1, "distributors": 1})),
            )
            .await
            .unwrap();
        assert_eq!(repos.len(), 1);
    }

    #[tokio::test]
    async fn search_pages_until_short_page() {
        let server = MockServer::start().await;
        let full_page: Vec<Value> = (0..SEARCH_PAGE_LIMIT).map(|i| json!({"n": i})).collect();
        Mock::given(method("POST"))
            .and(path("/tasks/search/"))
            .respond_with(move |request: &Request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let skip = body["criteria"]["skip"].as_u64().unwrap();
                if skip == 0 {
                    ResponseTemplate::new(200).set_body_json(&full_page)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!([{"n": "last"}]))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let rows: Vec<Value> = client
            .search("tasks/search/", &SearchCriteria::tasks(&[]), None)
            .await
            .unwrap();
        assert_eq!(rows.len() as u64, SEARCH_PAGE_LIMIT + 1);
    }

    #[tokio::test]
    async fn rpm_criteria_carries_type_and_filter() {
        let criteria = SearchCriteria::rpm_units(Some("^kernel"));
        let value = serde_json::to_value(&criteria).unwrap();
        assert_eq!(value["type_ids"], json!(["rpm"]));
        assert_eq!(value["filters"]["unit"]["name"]["$regex"], json!("^kernel"));
    }

    #[tokio::test]
    async fn auth_failure_maps_to_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let err = client.get::<Value>("tasks/", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ExternalServiceError { .. }));
    }
}
