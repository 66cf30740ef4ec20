//! Client for the design generation gateway.
//!
//! The gateway is opaque: it renders the views, extracts design features,
//! and is the authority on the account credit balance. Calls here are never
//! retried; a failed call is terminal for that attempt and the user must
//! re-trigger.

use std::time::Duration;

use async_trait::async_trait;
use db::models::tech_pack::TechPackKind;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("rate limited")]
    RateLimited,
    #[error("generation rejected: {reason}")]
    Rejected { status: u16, reason: String },
    #[error("json error: {0}")]
    Serde(String),
}

impl GatewayError {
    /// The string surfaced verbatim in the chat transcript.
    pub fn user_reason(&self) -> String {
        match self {
            Self::Rejected { reason, .. } if !reason.trim().is_empty() => reason.clone(),
            Self::InsufficientCredits => "Not enough credits for this generation.".to_string(),
            Self::Timeout => "The generation service timed out.".to_string(),
            _ => "Generation failed. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrontViewRequest {
    pub product_id: Uuid,
    pub owner_id: Uuid,
    pub prompt: String,
    pub is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_front_view_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontViewResult {
    pub front_view_url: String,
    /// AI-extracted design features, passed through opaquely.
    pub design_features: Option<serde_json::Value>,
    pub credits_used: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemainingViewsRequest {
    pub product_id: Uuid,
    pub approval_id: Uuid,
    pub front_view_url: String,
    /// View URLs of a prior revision whose structural/camera parameters
    /// (not design or color) anchor the new views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_anchor_views: Option<Vec<String>>,
}

/// The four dependent views. The gateway renders them atomically: either
/// all four arrive together or the call fails.
#[derive(Debug, Clone, Deserialize)]
pub struct RemainingViews {
    pub back: String,
    pub side: String,
    pub top: String,
    pub bottom: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TryOnRequest {
    pub product_id: Uuid,
    pub owner_id: Uuid,
    pub prompt: String,
    pub model_image_url: String,
    pub product_image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TryOnResult {
    pub try_on_image_url: String,
    pub credits_used: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TechPackRequest {
    pub product_id: Uuid,
    pub kind: TechPackKind,
    pub front_view_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TechPackResult {
    pub image_urls: Vec<String>,
    pub credits_used: i64,
}

#[derive(Debug, Deserialize)]
struct CreditBalanceResponse {
    balance: i64,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: Option<String>,
}

#[async_trait]
pub trait DesignGateway: Send + Sync {
    async fn generate_front_view(
        &self,
        req: &FrontViewRequest,
    ) -> Result<FrontViewResult, GatewayError>;

    async fn generate_remaining_views(
        &self,
        req: &RemainingViewsRequest,
    ) -> Result<RemainingViews, GatewayError>;

    async fn generate_try_on(&self, req: &TryOnRequest) -> Result<TryOnResult, GatewayError>;

    async fn generate_tech_pack(
        &self,
        req: &TechPackRequest,
    ) -> Result<TechPackResult, GatewayError>;

    async fn credit_balance(&self, owner_id: Uuid) -> Result<i64, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct HttpDesignGateway {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpDesignGateway {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(base_url: String, api_key: String) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("fabrica/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GatewayError> {
        let res = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::decode(res).await
    }

    async fn get<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R, GatewayError> {
        let res = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        Self::decode(res).await
    }

    async fn decode<R: for<'de> Deserialize<'de>>(
        res: reqwest::Response,
    ) -> Result<R, GatewayError> {
        match res.status() {
            s if s.is_success() => res
                .json::<R>()
                .await
                .map_err(|e| GatewayError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(GatewayError::InvalidApiKey),
            StatusCode::PAYMENT_REQUIRED => Err(GatewayError::InsufficientCredits),
            StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                let reason = serde_json::from_str::<GatewayErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.error)
                    .unwrap_or(body);
                Err(GatewayError::Rejected { status, reason })
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

#[async_trait]
impl DesignGateway for HttpDesignGateway {
    async fn generate_front_view(
        &self,
        req: &FrontViewRequest,
    ) -> Result<FrontViewResult, GatewayError> {
        self.post("/v1/generations/front-view", req).await
    }

    async fn generate_remaining_views(
        &self,
        req: &RemainingViewsRequest,
    ) -> Result<RemainingViews, GatewayError> {
        self.post("/v1/generations/remaining-views", req).await
    }

    async fn generate_try_on(&self, req: &TryOnRequest) -> Result<TryOnResult, GatewayError> {
        self.post("/v1/generations/try-on", req).await
    }

    async fn generate_tech_pack(
        &self,
        req: &TechPackRequest,
    ) -> Result<TechPackResult, GatewayError> {
        self.post("/v1/generations/tech-pack", req).await
    }

    async fn credit_balance(&self, owner_id: Uuid) -> Result<i64, GatewayError> {
        let res: CreditBalanceResponse = self
            .get(&format!("/v1/accounts/{owner_id}/credits"))
            .await?;
        Ok(res.balance)
    }
}
