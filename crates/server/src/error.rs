use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    chat::ChatError, tech_pack::TechPackError, workflow::WorkflowError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    TechPack(#[from] TechPackError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    NotFound(String),
}

fn workflow_status(e: &WorkflowError) -> StatusCode {
    match e {
        WorkflowError::EmptyPrompt
        | WorkflowError::EmptyEditFeedback
        | WorkflowError::NoFrontView => StatusCode::BAD_REQUEST,
        WorkflowError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
        WorkflowError::GenerationInProgress | WorkflowError::ApprovalConsumed => {
            StatusCode::CONFLICT
        }
        WorkflowError::ProductNotFound | WorkflowError::ApprovalNotFound => StatusCode::NOT_FOUND,
        WorkflowError::Gateway(_) | WorkflowError::IncompleteViews => StatusCode::BAD_GATEWAY,
        WorkflowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn tech_pack_status(e: &TechPackError) -> StatusCode {
    match e {
        TechPackError::MissingBaseViews(_) | TechPackError::NoActiveRevision => {
            StatusCode::CONFLICT
        }
        TechPackError::Gateway(_) => StatusCode::BAD_GATEWAY,
        TechPackError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Chat(e) => match e {
                ChatError::MessageCapReached => StatusCode::CONFLICT,
                ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
                ChatError::ProductNotFound => StatusCode::NOT_FOUND,
                ChatError::Assistant(_) => StatusCode::BAD_GATEWAY,
                ChatError::Workflow(e) => workflow_status(e),
                ChatError::TechPack(e) => tech_pack_status(e),
                ChatError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Workflow(e) => workflow_status(e),
            Self::TechPack(e) => tech_pack_status(e),
            Self::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
