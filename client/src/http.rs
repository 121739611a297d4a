//! HTTP implementation of [`RemoteClient`].
//!
//! Records live under `{base_url}/v0/{base_id}/{table_id}`:
//!
//! | Call   | Request                               | Response            |
//! |--------|---------------------------------------|---------------------|
//! | create | `POST /v0/{base}/{table}`             | record              |
//! | update | `PATCH /v0/{base}/{table}/{id}`       | record              |
//! | delete | `DELETE /v0/{base}/{table}/{id}`      | any 2xx             |
//! | list   | `GET /v0/{base}/{table}`              | `{"records": [..]}` |
//!
//! Create and update send `{"fields": {..}}`.

use crate::config::RemoteConfig;
use crate::remote::{RemoteClient, RemoteError, RemoteResult};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tablesync_engine::{Fields, Record, TableKey};

#[derive(Serialize)]
struct FieldsBody<'a> {
    fields: &'a Fields,
}

#[derive(Deserialize)]
struct ListBody {
    records: Vec<Record>,
}

/// Talks to a records API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpRemote {
    /// Creates a client for `base_url`, sending `api_token` as a bearer token.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Network(format!("invalid base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Network(format!(
                "invalid base url {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Creates a client from environment-derived configuration.
    pub fn from_config(config: &RemoteConfig, timeout: Duration) -> RemoteResult<Self> {
        Self::new(&config.api_url, config.api_token.clone(), timeout)
    }

    fn url(&self, table: &TableKey, record_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v0", table.base_id(), table.table_id()]);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };

        tracing::debug!(status = status.as_u16(), error = %message, "Request rejected");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Unauthorized(message))
            }
            _ => Err(RemoteError::ServerRejected {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    async fn create(&self, table: &TableKey, fields: &Fields) -> RemoteResult<Record> {
        let request = self
            .client
            .post(self.url(table, None))
            .json(&FieldsBody { fields });
        decode(self.send(request).await?).await
    }

    async fn update(
        &self,
        table: &TableKey,
        record_id: &str,
        fields: &Fields,
    ) -> RemoteResult<Record> {
        let request = self
            .client
            .patch(self.url(table, Some(record_id)))
            .json(&FieldsBody { fields });
        decode(self.send(request).await?).await
    }

    async fn delete(&self, table: &TableKey, record_id: &str) -> RemoteResult<()> {
        let request = self.client.delete(self.url(table, Some(record_id)));
        self.send(request).await?;
        Ok(())
    }

    async fn list(&self, table: &TableKey) -> RemoteResult<Vec<Record>> {
        let request = self.client.get(self.url(table, None));
        let body: ListBody = decode(self.send(request).await?).await?;
        Ok(body.records)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let status = response.status().as_u16();
    response.json().await.map_err(|e| {
        if e.is_decode() {
            RemoteError::ServerRejected {
                status,
                message: format!("invalid response body: {e}"),
            }
        } else {
            transport_error(e)
        }
    })
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(e.to_string())
    }
}
