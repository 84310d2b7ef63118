//! Remote inference adapter
//!
//! Sends a translated request to an HTTP endpoint and turns the response
//! into an [`InferenceOutput`]. Used by every remote provider and by the
//! local engine, which serves the same OpenAI-shaped API on loopback.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::engine::EngineError;
use crate::sse;
use crate::translate::Translator;
use crate::types::{ChatRequest, InferenceOutput, StreamMode};

/// HTTP adapter shared by all engines
#[derive(Debug, Clone)]
pub struct RemoteAdapter {
    http: reqwest::Client,
}

impl RemoteAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Caller headers that are forwarded upstream
    ///
    /// Only `content-type` and `authorization` pass through; engines then
    /// overwrite auth with their own scheme.
    pub fn forwarded_headers(caller: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in [CONTENT_TYPE, AUTHORIZATION] {
            if let Some(value) = caller.get(&name) {
                headers.insert(name, value.clone());
            }
        }
        headers
    }

    /// Send a chat request
    ///
    /// In normalized stream mode transport failures surface as a single
    /// `Error` event. Whole-body and passthrough requests return them as `Err`.
    pub async fn send(
        &self,
        url: &str,
        headers: HeaderMap,
        request: &ChatRequest,
        translator: Arc<dyn Translator>,
        mode: StreamMode,
    ) -> Result<InferenceOutput, EngineError> {
        let payload = translator.transform_payload(request);
        if payload.is_empty() {
            log::warn!("Refusing to send empty payload to {}", url);
            return Err(EngineError::EmptyPayload);
        }

        let normalized_stream = request.stream && mode == StreamMode::Normalized;
        log::debug!("POST {} (stream={}, mode={:?})", url, request.stream, mode);

        let response = match self.http.post(url).headers(headers).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Request to {} failed: {}", url, e);
                if normalized_stream {
                    return Ok(InferenceOutput::Stream(sse::error_stream(e.to_string())));
                }
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            let err = upstream_error(response).await;
            log::error!("Upstream {} failed: {}", url, err);
            if normalized_stream {
                return Ok(InferenceOutput::Stream(sse::error_stream(err.to_string())));
            }
            return Err(err);
        }

        if !request.stream {
            let body: Value = response.json().await?;
            return Ok(InferenceOutput::Complete(translator.transform_response(body)));
        }

        match mode {
            StreamMode::Passthrough => {
                let bytes = response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|b| b.to_vec()).map_err(EngineError::from));
                Ok(InferenceOutput::Passthrough(Box::pin(bytes)))
            }
            StreamMode::Normalized => Ok(InferenceOutput::Stream(sse::relay(
                response.bytes_stream(),
                translator,
            ))),
        }
    }

    /// POST a JSON body and return the JSON response
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<Value, EngineError> {
        let response = self.http.post(url).headers(headers).json(body).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// GET a JSON document
    pub async fn get_json(&self, url: &str) -> Result<Value, EngineError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }
        Ok(response.json().await?)
    }
}

async fn upstream_error(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    EngineError::Upstream { status, body }
}
