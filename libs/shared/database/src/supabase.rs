use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Failure modes of a single document-store round trip. A 409 is surfaced
/// as its own variant: the `citas` table carries a partial unique index on
/// (veterinarioId, fecha, hora) over non-cancelled rows, and booking relies
/// on the conflict being distinguishable from other API errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None)
            .await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Store API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Auth(error_text),
                404 => StoreError::NotFound(error_text),
                409 => StoreError::Conflict(error_text),
                code => StoreError::Api {
                    status: code,
                    body: error_text,
                },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Exact-match / range query against a collection. `path` carries the
    /// PostgREST filter string built by the caller.
    pub async fn select(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, StoreError> {
        self.request(Method::GET, path, Some(auth_token), None).await
    }

    /// Insert one row and return the stored representation. A unique-index
    /// violation surfaces as `StoreError::Conflict`.
    pub async fn insert_returning(
        &self,
        collection: &str,
        data: Value,
        auth_token: &str,
    ) -> Result<Value, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/{}", collection);
        let rows: Vec<Value> = self
            .request_with_headers(Method::POST, &path, Some(auth_token), Some(data), Some(headers))
            .await?;

        rows.into_iter().next().ok_or_else(|| StoreError::Api {
            status: 200,
            body: format!("insert into {} returned no representation", collection),
        })
    }

    /// Partial update of a single row by id, returning the new representation.
    pub async fn update_returning(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        auth_token: &str,
    ) -> Result<Value, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/{}?id=eq.{}", collection, id);
        let rows: Vec<Value> = self
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(data), Some(headers))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))
    }

    pub async fn delete(
        &self,
        collection: &str,
        id: &str,
        auth_token: &str,
    ) -> Result<(), StoreError> {
        let path = format!("/rest/v1/{}?id=eq.{}", collection, id);
        let _: Vec<Value> = self.request(Method::DELETE, &path, Some(auth_token), None).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
