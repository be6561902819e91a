//! HTTP/JSON target client
//!
//! Expects a platform exposing:
//! - `POST {base}/auth/login` with `{"username", "password"}` returning `{"token"}`
//! - `POST|GET {base}/api/{resource}` for create and paged list
//! - `GET|PUT|DELETE {base}/api/{resource}/{id}` for read, update and delete
//!
//! Every entity request carries the session token as a bearer header.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use aging_core::{
    AgingError, AgingResult, Credentials, EntityClient, EntityId, EntityKind, EntityRegistry,
    ListFilter, Payload, SessionConnector,
};

/// Session connector for REST targets
#[derive(Clone)]
pub struct RestTarget {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token")]
    token: String,
}

impl RestTarget {
    /// Create a connector for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AgingResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn login(&self, credentials: &Credentials) -> AgingResult<String> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| AgingError::Authentication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgingError::Authentication(format!(
                "login returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| AgingError::Authentication(format!("malformed login response: {}", e)))?;
        Ok(login.token)
    }
}

#[async_trait]
impl SessionConnector for RestTarget {
    async fn connect(
        &self,
        credentials: &Credentials,
        worker_id: usize,
    ) -> AgingResult<EntityRegistry> {
        let token: Arc<str> = self.login(credentials).await?.into();
        tracing::debug!(worker_id, base_url = %self.base_url, "REST session established");

        let mut registry = EntityRegistry::new();
        for kind in EntityKind::ALL {
            registry.register(
                kind,
                Arc::new(RestEntityClient {
                    http: self.http.clone(),
                    collection_url: format!("{}/api/{}", self.base_url, kind.resource_path()),
                    kind,
                    token: Arc::clone(&token),
                }),
            );
        }
        Ok(registry)
    }
}

/// Entity client bound to one REST resource collection
struct RestEntityClient {
    http: Client,
    collection_url: String,
    kind: EntityKind,
    token: Arc<str>,
}

impl RestEntityClient {
    fn item_url(&self, id: &EntityId) -> String {
        format!("{}/{}", self.collection_url, id)
    }

    /// Turn non-success statuses into errors
    async fn check(&self, response: Response, id: Option<&EntityId>) -> AgingResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(AgingError::not_found(self.kind.as_str(), id.as_str()));
            }
        }

        let body = response.text().await.unwrap_or_default();
        Err(AgingError::rejected(status.as_u16(), body))
    }
}

#[async_trait]
impl EntityClient for RestEntityClient {
    async fn create(&self, payload: &Payload) -> AgingResult<EntityId> {
        let response = self
            .http
            .post(&self.collection_url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        let body: Value = self
            .check(response, None)
            .await?
            .json()
            .await
            .map_err(transport)?;

        extract_id(&body).ok_or_else(|| {
            AgingError::Serialization(format!("create {} response has no id: {}", self.kind, body))
        })
    }

    async fn read(&self, id: &EntityId) -> AgingResult<Value> {
        let response = self
            .http
            .get(self.item_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;

        self.check(response, Some(id))
            .await?
            .json()
            .await
            .map_err(transport)
    }

    async fn update(&self, id: &EntityId, payload: &Payload) -> AgingResult<Value> {
        let response = self
            .http
            .put(self.item_url(id))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        self.check(response, Some(id))
            .await?
            .json()
            .await
            .map_err(transport)
    }

    async fn delete(&self, id: &EntityId) -> AgingResult<bool> {
        let response = self
            .http
            .delete(self.item_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response, Some(id)).await?;
        Ok(true)
    }

    async fn list(&self, filter: &ListFilter) -> AgingResult<Vec<Value>> {
        let response = self
            .http
            .get(&self.collection_url)
            .bearer_auth(&self.token)
            .query(&[("page", filter.page), ("page_size", filter.page_size)])
            .send()
            .await
            .map_err(transport)?;

        let body: Value = self
            .check(response, None)
            .await?
            .json()
            .await
            .map_err(transport)?;

        extract_items(body).ok_or_else(|| {
            AgingError::Serialization(format!("list {} response is not a collection", self.kind))
        })
    }
}

fn transport(err: reqwest::Error) -> AgingError {
    AgingError::Transport(err.to_string())
}

/// Accepts `{"id": ..}` or `{"data": {"id": ..}}` with string or numeric ids
fn extract_id(body: &Value) -> Option<EntityId> {
    let id = body.get("id").or_else(|| body.get("data")?.get("id"))?;
    match id {
        Value::String(s) => Some(EntityId::new(s.clone())),
        Value::Number(n) => Some(EntityId::new(n.to_string())),
        _ => None,
    }
}

/// Accepts a bare array or an object wrapping one in `items` or `data`
fn extract_items(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(mut fields) => match fields.remove("items").or_else(|| fields.remove("data")) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_id_shapes() {
        assert_eq!(extract_id(&json!({ "id": "abc" })), Some(EntityId::new("abc")));
        assert_eq!(extract_id(&json!({ "id": 42 })), Some(EntityId::new("42")));
        assert_eq!(
            extract_id(&json!({ "data": { "id": "nested" } })),
            Some(EntityId::new("nested"))
        );
        assert_eq!(extract_id(&json!({ "name": "no id" })), None);
    }

    #[test]
    fn test_extract_items_shapes() {
        assert_eq!(extract_items(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(extract_items(json!({ "items": [1] })).unwrap().len(), 1);
        assert_eq!(extract_items(json!({ "data": [] })).unwrap().len(), 0);
        assert!(extract_items(json!({ "total": 3 })).is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let target = RestTarget::new("http://erp.local/", Duration::from_secs(5)).unwrap();
        assert_eq!(target.base_url(), "http://erp.local");
    }
}
