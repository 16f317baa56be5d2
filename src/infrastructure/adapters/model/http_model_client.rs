//! HTTP Model Client - 调用外部模型推理服务
//!
//! 实现 ModelBackendPort trait，通过 HTTP 调用外部模型服务
//!
//! 外部模型 API:
//! POST {base_url}/models/{kind}
//! Request: {"image_data": "data:image/png;base64,...", "mask_data": "...", "options": {...}}
//! Response: {"image_data": "...", "mask_data": "...", "metadata": {...}}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::ports::{ModelBackendPort, ModelError, ModelRequest, ModelResponse};
use crate::domain::canvas::codec;

#[derive(Debug, Serialize)]
struct ModelHttpRequest<'a> {
    image_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_data: Option<String>,
    options: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ModelHttpResponse {
    image_data: String,
    #[serde(default)]
    mask_data: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// HTTP 模型客户端配置
#[derive(Debug, Clone)]
pub struct HttpModelClientConfig {
    /// 模型服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpModelClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 300,
        }
    }
}

impl HttpModelClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 模型客户端
pub struct HttpModelClient {
    client: Client,
    config: HttpModelClientConfig,
}

impl HttpModelClient {
    pub fn new(config: HttpModelClientConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn infer_url(&self, kind: &str) -> String {
        format!("{}/models/{}", self.config.base_url.trim_end_matches('/'), kind)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelBackendPort for HttpModelClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn infer(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let encode = |img: &image::RgbaImage| {
            codec::encode_png(img).map_err(|e| ModelError::InvalidResponse(e.to_string()))
        };
        let body = ModelHttpRequest {
            image_data: encode(&request.image)?,
            mask_data: request.mask.as_ref().map(encode).transpose()?,
            options: &request.options,
        };
        let url = self.infer_url(request.kind.as_str());

        tracing::debug!(
            url = %url,
            width = request.image.width(),
            height = request.image.height(),
            "Sending model infer request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else if e.is_connect() {
                    ModelError::NetworkError(format!("Cannot connect to model service: {}", e))
                } else {
                    ModelError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }

        let payload: ModelHttpResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let decode = |data: &str| {
            codec::decode_image(data).map_err(|e| ModelError::InvalidResponse(e.to_string()))
        };
        let image = decode(&payload.image_data)?;
        let mask = payload.mask_data.as_deref().map(decode).transpose()?;

        tracing::info!(
            kind = request.kind.as_str(),
            width = image.width(),
            height = image.height(),
            "Model inference completed"
        );

        Ok(ModelResponse {
            image,
            mask,
            metadata: payload.metadata,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(&self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
