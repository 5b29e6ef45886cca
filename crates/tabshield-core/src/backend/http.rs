use super::{Acquire, EvaluationBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::path::Path;
use tabshield_protocol::{
    encode_permutation, parse_costs, parse_scalar, Model, ProtectionType, RunQuery,
    SessionQuery, SessionStatus, SessionToken,
};
use tracing::trace;

/// Client for the solver server's line-oriented HTTP resources.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.base_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    fn checked(resp: Response) -> Result<Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(BackendError::Status(status.as_u16()))
        }
    }

    async fn get_text(
        &self,
        resource: &str,
        token: Option<&SessionToken>,
    ) -> Result<String, BackendError> {
        let mut req = self.client.get(self.url(resource));
        if let Some(token) = token {
            req = req.query(&SessionQuery {
                session: token.as_str(),
            });
        }
        let resp = Self::checked(req.send().await?)?;
        let body = resp.text().await?;
        trace!("GET {} -> {:?}", resource, body);
        Ok(body)
    }
}

#[async_trait]
impl EvaluationBackend for HttpBackend {
    async fn acquire_session(&self) -> Result<Acquire, BackendError> {
        let body = self.get_text("session", None).await?;
        Ok(match SessionToken::from_reply(&body)? {
            Some(token) => Acquire::Granted(token),
            None => Acquire::Busy,
        })
    }

    async fn capacity(&self) -> Result<u32, BackendError> {
        let body = self.get_text("limit", None).await?;
        Ok(parse_scalar("limit", &body)?)
    }

    async fn protocol_version(&self) -> Result<u32, BackendError> {
        let body = self.get_text("protocol", None).await?;
        Ok(parse_scalar("protocol", &body)?)
    }

    async fn submit(
        &self,
        token: &SessionToken,
        table: &Path,
        permutation: &[u64],
        protection: ProtectionType,
        model: Model,
        ceiling: f64,
    ) -> Result<(), BackendError> {
        let bytes = tokio::fs::read(table).await?;
        let resp = self
            .client
            .put(self.url("file"))
            .query(&SessionQuery {
                session: token.as_str(),
            })
            .body(bytes)
            .send()
            .await?;
        Self::checked(resp)?;

        let run = RunQuery {
            session: token.as_str(),
            protection,
            model,
            maxcost: ceiling,
        };
        let resp = self
            .client
            .put(self.url("perm"))
            .query(&run)
            .body(encode_permutation(permutation))
            .send()
            .await?;
        Self::checked(resp)?;
        Ok(())
    }

    async fn poll_status(&self, token: &SessionToken) -> Result<SessionStatus, BackendError> {
        let body = self.get_text("status", Some(token)).await?;
        let code: i32 = parse_scalar("status", &body)?;
        Ok(SessionStatus::from_code(code))
    }

    async fn fetch_result(&self, token: &SessionToken) -> Result<f64, BackendError> {
        let body = self.get_text("result", Some(token)).await?;
        Ok(parse_scalar("result", &body)?)
    }

    async fn fetch_costs(&self, token: &SessionToken) -> Result<Vec<f64>, BackendError> {
        let body = self.get_text("costs", Some(token)).await?;
        Ok(parse_costs(&body)?)
    }

    async fn fetch_elapsed(&self, token: &SessionToken) -> Result<u64, BackendError> {
        let body = self.get_text("time", Some(token)).await?;
        Ok(parse_scalar("time", &body)?)
    }

    async fn fetch_output_table(&self, token: &SessionToken) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .client
            .get(self.url("file"))
            .query(&SessionQuery {
                session: token.as_str(),
            })
            .send()
            .await?;
        let resp = Self::checked(resp)?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn release(&self, token: &SessionToken) -> Result<(), BackendError> {
        self.get_text("close", Some(token)).await?;
        Ok(())
    }
}
