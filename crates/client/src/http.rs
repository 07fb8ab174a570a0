//! `reqwest` transport against a Splice server.

use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use splice_core::config::ClientConfig;
use splice_core::upload::{
    CancelResponse, ChunkUploadQuery, ChunkUploadResponse, ErrorResponse, ExistsQuery,
    ExistsResponse, MergeRequest, MergeResponse,
};
use splice_core::{ArtifactName, ExistsOutcome, FileFingerprint, SessionDeclaration};
use std::time::Duration;

const INCOMPLETE_UPLOAD: &str = "incomplete_upload";

#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = Url::parse(&config.server)
            .map_err(|e| ClientError::Config(format!("invalid server URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Config(format!("failed to build API URL: {e}")))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = req.send().await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Map a non-success response onto the client's error classes.
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorResponse> = serde_json::from_str(&body).ok();

    if status.is_server_error() {
        let message = parsed.map(|e| e.message).unwrap_or(body);
        return Err(ClientError::Transient {
            status: Some(status.as_u16()),
            message,
        });
    }

    match parsed {
        Some(ErrorResponse {
            code,
            missing: Some(missing),
            ..
        }) if code == INCOMPLETE_UPLOAD => Err(ClientError::IncompleteUpload { missing }),
        Some(e) => Err(ClientError::Rejected {
            status: status.as_u16(),
            code: e.code,
            message: e.message,
        }),
        None => Err(ClientError::Rejected {
            status: status.as_u16(),
            code: "unknown".to_string(),
            message: body,
        }),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn check_exists(
        &self,
        name: &ArtifactName,
        fingerprint: &FileFingerprint,
        declaration: Option<SessionDeclaration>,
    ) -> ClientResult<ExistsOutcome> {
        let url = self.url("/v1/uploads/exists")?;
        let query = ExistsQuery {
            file_name: name.to_string(),
            fingerprint: fingerprint.to_hex(),
            file_size: declaration.map(|d| d.file_size),
            chunk_size: declaration.map(|d| d.chunk_size),
        };
        let response: ExistsResponse = self.send_json(self.http.get(url).query(&query)).await?;
        Ok(response.into_outcome()?)
    }

    async fn put_chunk(
        &self,
        fingerprint: &FileFingerprint,
        index: u32,
        declaration: SessionDeclaration,
        data: Bytes,
    ) -> ClientResult<ChunkUploadResponse> {
        let url = self.url(&format!("/v1/uploads/{fingerprint}/chunks/{index}"))?;
        let query = ChunkUploadQuery::from(declaration);
        self.send_json(self.http.put(url).query(&query).body(data))
            .await
    }

    async fn merge(
        &self,
        fingerprint: &FileFingerprint,
        name: &ArtifactName,
    ) -> ClientResult<MergeResponse> {
        let url = self.url(&format!("/v1/uploads/{fingerprint}/merge"))?;
        let body = MergeRequest {
            file_name: name.clone(),
        };
        self.send_json(self.http.post(url).json(&body)).await
    }

    async fn cancel(&self, fingerprint: &FileFingerprint) -> ClientResult<CancelResponse> {
        let url = self.url(&format!("/v1/uploads/{fingerprint}"))?;
        self.send_json(self.http.delete(url)).await
    }
}
