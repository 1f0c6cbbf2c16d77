use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::models::{AlertHistoryPayload, AlertRecord, ViewKey};
use crate::views::{FetchError, ViewDataSource};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Clone)]
pub struct DashboardClient {
    inner: reqwest::Client,
    config: Arc<AppConfig>,
    base_url: String,
}

impl DashboardClient {
    pub fn new(config: AppConfig) -> ClientResult<Self> {
        let base_url = normalize_base_url(&config.api_base_url);

        #[cfg(not(target_arch = "wasm32"))]
        let builder = reqwest::Client::builder().timeout(config.request_timeout);
        // 浏览器 fetch 不支持客户端超时，由 ViewOrchestrator 的计时器兜底
        #[cfg(target_arch = "wasm32")]
        let builder = reqwest::Client::builder();

        let client = builder.build().context("failed to build reqwest client")?;

        Ok(Self {
            inner: client,
            config: Arc::new(config),
            base_url,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 单个视图子请求：`GET views/{key}/{section}`，时间片通过 `time` 查询参数传递。
    pub async fn get_view_section(
        &self,
        key: ViewKey,
        section: &str,
        scope: Option<&str>,
    ) -> ClientResult<Value> {
        let builder = self.view_section_request(key, section, scope)?;
        let envelope: ApiEnvelope<Value> = self.send(builder).await?;
        Ok(envelope.data.unwrap_or_else(|| Value::Object(Default::default())))
    }

    /// 启动时拉取历史告警，后端可能返回数组或 `{items: [...]}`。
    pub async fn fetch_alert_history(&self) -> ClientResult<Vec<AlertRecord>> {
        let builder = self.request(Method::GET, "alerts/history")?;
        let envelope: ApiEnvelope<HistoryData> = self.send(builder).await?;
        let records = envelope.data.map(HistoryData::into_records).unwrap_or_default();
        debug!(count = records.len(), "alert history fetched");
        Ok(records)
    }

    fn view_section_request(
        &self,
        key: ViewKey,
        section: &str,
        scope: Option<&str>,
    ) -> ClientResult<reqwest::RequestBuilder> {
        let path = format!("views/{}/{}", key.as_str(), section);
        let mut builder = self.request(Method::GET, &path)?;
        if let Some(time) = scope {
            builder = builder.query(&[("time", time)]);
        }
        Ok(builder)
    }

    fn request(&self, method: Method, path: &str) -> ClientResult<reqwest::RequestBuilder> {
        let url = self.join_path(path);
        let mut builder = self
            .inner
            .request(method, url)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = self.config.bearer_token() {
            builder = builder.header(header::AUTHORIZATION, token);
        }

        Ok(builder)
    }

    fn join_path(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T>(&self, builder: reqwest::RequestBuilder) -> ClientResult<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
    {
        let response = builder.send().await.map_err(ClientError::from)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::from)?;
        decode_envelope(status, &bytes)
    }
}

impl ViewDataSource for DashboardClient {
    fn fetch_section<'a>(
        &'a self,
        key: ViewKey,
        section: &'static str,
        scope: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
        async move {
            self.get_view_section(key, section, scope)
                .await
                .map_err(FetchError::from)
        }
        .boxed_local()
    }
}

fn normalize_base_url(input: &str) -> String {
    input.trim_end_matches('/').to_string()
}

fn decode_envelope<T>(status: StatusCode, bytes: &[u8]) -> ClientResult<ApiEnvelope<T>>
where
    T: DeserializeOwned,
{
    if bytes.is_empty() {
        return Err(ClientError::EmptyResponse(status));
    }

    let envelope: ApiEnvelope<T> = serde_json::from_slice(bytes).map_err(ClientError::from)?;

    if status.is_success() && envelope.success {
        Ok(envelope)
    } else if let Some(err) = envelope.error {
        Err(ClientError::Api(err.with_status(status)))
    } else {
        Err(ClientError::UnexpectedStatus {
            status,
            body: bytes.to_vec(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryData {
    List(Vec<AlertRecord>),
    Paged(AlertHistoryPayload),
}

impl HistoryData {
    fn into_records(self) -> Vec<AlertRecord> {
        match self {
            Self::List(items) => items,
            Self::Paged(page) => page.items,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(skip)]
    pub status: Option<StatusCode>,
}

impl ApiErrorBody {
    fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("网络错误: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("接口错误: {0}")]
    Api(ApiErrorBody),
    #[error("响应为空: {0}")]
    EmptyResponse(StatusCode),
    #[error("异常状态码 {status}")]
    UnexpectedStatus { status: StatusCode, body: Vec<u8> },
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api(body) => body.status,
            Self::EmptyResponse(status) => Some(*status),
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}
