//! The progressive generation workflow.
//!
//! A design cycle runs front-view generation, gates on approval (human, or
//! automatic once the product has a baseline revision), fans out to the four
//! dependent views, and assembles the result into a new active revision.
//! State is process-local per product; the durable record is the revision
//! and approval history.

use std::sync::Arc;

use dashmap::DashMap;
use db::models::{
    approval::{ApprovalStatus, FrontViewApproval},
    chat_message::{ChatMessage, CreateChatMessage, MessageType},
    product::Product,
    revision::{Revision, RevisionViews},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::design_gateway::{
    DesignGateway, FrontViewRequest, GatewayError, RemainingViewsRequest, TryOnRequest,
    TryOnResult,
};

/// Client-side admission floor. The gateway decides the real cost.
const MIN_CREDITS_PER_GENERATION: i64 = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationState {
    #[default]
    Idle,
    GeneratingFrontView,
    AwaitingFrontApproval,
    GeneratingAdditionalViews,
    CreatingRevision,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FrontViewDecision {
    Approve,
    Edit,
    Skip,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("not enough credits for this generation")]
    InsufficientCredits,
    #[error("a generation cycle is already running for this product")]
    GenerationInProgress,
    #[error("product not found")]
    ProductNotFound,
    #[error("approval not found")]
    ApprovalNotFound,
    #[error("this front view is no longer awaiting a decision")]
    ApprovalConsumed,
    #[error("edit feedback must not be empty")]
    EmptyEditFeedback,
    #[error("the generation service returned an incomplete view set")]
    IncompleteViews,
    #[error("no front view available for virtual try-on")]
    NoFrontView,
}

impl WorkflowError {
    /// Failures detected before any network call; they cause no state
    /// transition and no transcript entry.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::EmptyPrompt
                | Self::InsufficientCredits
                | Self::GenerationInProgress
                | Self::EmptyEditFeedback
        )
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct FrontViewOutcome {
    pub approval_id: Uuid,
    pub front_view_url: String,
    pub iteration_count: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DecisionOutcome {
    Approved {
        revision_number: i64,
        design_features: Option<String>,
    },
    EditQueued {
        approval_id: Uuid,
        front_view_url: String,
        iteration_count: i64,
    },
    Skipped,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CycleOutcome {
    AwaitingApproval {
        approval_id: Uuid,
        front_view_url: String,
        iteration_count: i64,
    },
    Completed {
        revision_number: i64,
    },
}

/// Point-in-time view of a product's session, for the state endpoint.
#[derive(Debug, Clone, Serialize, TS)]
pub struct SessionSnapshot {
    pub state: GenerationState,
    pub busy: bool,
    pub processing: bool,
    pub credits: Option<i64>,
    pub active_approval_id: Option<Uuid>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Session {
    state: GenerationState,
    busy: bool,
    processing: bool,
    credits: Option<i64>,
    active_approval_id: Option<Uuid>,
    last_error: Option<String>,
}

/// Releases the per-product generation slot when the in-flight call ends,
/// on every exit path.
struct BusyGuard<'a> {
    workflow: &'a GenerationWorkflow,
    product_id: Uuid,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.workflow
            .with_session(self.product_id, |session| session.busy = false);
    }
}

/// Clears the chat processing flag when a turn ends, on every exit path.
pub struct ProcessingGuard<'a> {
    workflow: &'a GenerationWorkflow,
    product_id: Uuid,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.workflow
            .with_session(self.product_id, |session| session.processing = false);
    }
}

pub struct GenerationWorkflow {
    pool: SqlitePool,
    gateway: Arc<dyn DesignGateway>,
    sessions: DashMap<Uuid, Session>,
}

impl GenerationWorkflow {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn DesignGateway>) -> Self {
        Self {
            pool,
            gateway,
            sessions: DashMap::new(),
        }
    }

    pub fn snapshot(&self, product_id: Uuid) -> SessionSnapshot {
        self.sessions
            .get(&product_id)
            .map(|session| SessionSnapshot {
                state: session.state,
                busy: session.busy,
                processing: session.processing,
                credits: session.credits,
                active_approval_id: session.active_approval_id,
                last_error: session.last_error.clone(),
            })
            .unwrap_or(SessionSnapshot {
                state: GenerationState::Idle,
                busy: false,
                processing: false,
                credits: None,
                active_approval_id: None,
                last_error: None,
            })
    }

    pub fn state(&self, product_id: Uuid) -> GenerationState {
        self.sessions
            .get(&product_id)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    /// Back to `idle`. Used for user resets out of `error` and on product
    /// switch. The cached credit balance survives.
    pub fn reset(&self, product_id: Uuid) {
        self.with_session(product_id, |session| {
            let credits = session.credits;
            *session = Session {
                credits,
                ..Session::default()
            };
        });
    }

    pub fn begin_processing(&self, product_id: Uuid) -> ProcessingGuard<'_> {
        self.with_session(product_id, |session| session.processing = true);
        ProcessingGuard {
            workflow: self,
            product_id,
        }
    }

    fn with_session<R>(&self, product_id: Uuid, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut entry = self.sessions.entry(product_id).or_default();
        f(entry.value_mut())
    }

    fn begin_generation(&self, product_id: Uuid) -> Result<BusyGuard<'_>, WorkflowError> {
        self.with_session(product_id, |session| {
            if session.busy {
                Err(WorkflowError::GenerationInProgress)
            } else {
                session.busy = true;
                Ok(())
            }
        })?;
        Ok(BusyGuard {
            workflow: self,
            product_id,
        })
    }

    fn set_state(&self, product_id: Uuid, state: GenerationState) {
        self.with_session(product_id, |session| {
            session.state = state;
            if state != GenerationState::Error {
                session.last_error = None;
            }
        });
    }

    fn set_error(&self, product_id: Uuid, reason: &str) {
        self.with_session(product_id, |session| {
            session.state = GenerationState::Error;
            session.last_error = Some(reason.to_string());
        });
    }

    /// Re-read the balance from the gateway. Deduction happens server-side,
    /// possibly even when the visible step failed later in the sequence.
    async fn refresh_credits(&self, product_id: Uuid, owner_id: Uuid) {
        match self.gateway.credit_balance(owner_id).await {
            Ok(balance) => self.with_session(product_id, |session| {
                session.credits = Some(balance);
            }),
            Err(e) => warn!(product_id = %product_id, error = %e, "credit re-sync failed"),
        }
    }

    /// Failures are legible in the transcript, never silent; a failed
    /// transcript write must not fail the workflow step itself.
    async fn post_transcript(
        &self,
        product_id: Uuid,
        message_type: MessageType,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let data = CreateChatMessage {
            product_id,
            message_type,
            content: content.to_string(),
            metadata: metadata.map(|v| v.to_string()),
        };
        if let Err(e) = ChatMessage::create(&self.pool, &data).await {
            warn!(product_id = %product_id, error = %e, "failed to append transcript message");
        }
    }

    /// Generate (or regenerate) the front view and park it for approval.
    ///
    /// One gateway call, no retry. A failed edit iteration falls back to
    /// `idle`; a failed first-time generation is terminal `error`.
    pub async fn generate_front_view_only(
        &self,
        product_id: Uuid,
        prompt: &str,
        is_edit: bool,
        previous_front_view_url: Option<String>,
    ) -> Result<FrontViewOutcome, WorkflowError> {
        if prompt.trim().is_empty() {
            return Err(WorkflowError::EmptyPrompt);
        }
        let product = Product::find_by_id(&self.pool, product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound)?;

        // Admission guard only; the gateway is the authority on credits.
        match self.gateway.credit_balance(product.owner_id).await {
            Ok(balance) => {
                self.with_session(product_id, |session| session.credits = Some(balance));
                if balance < MIN_CREDITS_PER_GENERATION {
                    return Err(WorkflowError::InsufficientCredits);
                }
            }
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "credit check unavailable, deferring to the gateway")
            }
        }

        let _busy = self.begin_generation(product_id)?;
        self.set_state(product_id, GenerationState::GeneratingFrontView);
        self.post_transcript(
            product_id,
            MessageType::Processing,
            "Generating front view…",
            None,
        )
        .await;

        let request = FrontViewRequest {
            product_id,
            owner_id: product.owner_id,
            prompt: prompt.to_string(),
            is_edit,
            previous_front_view_url,
        };
        let result = match self.gateway.generate_front_view(&request).await {
            Ok(result) => result,
            Err(e) => {
                let reason = e.user_reason();
                if is_edit {
                    self.set_state(product_id, GenerationState::Idle);
                } else {
                    self.set_error(product_id, &reason);
                }
                self.post_transcript(product_id, MessageType::Error, &reason, None)
                    .await;
                self.refresh_credits(product_id, product.owner_id).await;
                return Err(e.into());
            }
        };

        let design_features = result.design_features.as_ref().map(|v| v.to_string());
        let approval = FrontViewApproval::create_superseding(
            &self.pool,
            product_id,
            &result.front_view_url,
            prompt,
            design_features.as_deref(),
        )
        .await?;

        self.with_session(product_id, |session| {
            session.state = GenerationState::AwaitingFrontApproval;
            session.active_approval_id = Some(approval.id);
        });
        self.post_transcript(
            product_id,
            MessageType::ImageReady,
            "Front view ready for review.",
            Some(json!({
                "approval_id": approval.id,
                "front_view_url": &approval.image_url,
                "iteration_count": approval.iteration_count,
            })),
        )
        .await;
        self.refresh_credits(product_id, product.owner_id).await;

        info!(
            product_id = %product_id,
            approval_id = %approval.id,
            iteration = approval.iteration_count,
            "front view generated"
        );

        Ok(FrontViewOutcome {
            approval_id: approval.id,
            front_view_url: approval.image_url,
            iteration_count: approval.iteration_count,
        })
    }

    /// Resolve a pending front view: approve it (and finish the cycle),
    /// request another edit iteration, or skip out of the cycle.
    pub async fn handle_front_view_decision(
        &self,
        product_id: Uuid,
        approval_id: Uuid,
        decision: FrontViewDecision,
        edit_feedback: Option<String>,
        selected_revision_number: Option<i64>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let approval = FrontViewApproval::find_by_id(&self.pool, approval_id)
            .await?
            .filter(|a| a.product_id == product_id)
            .ok_or(WorkflowError::ApprovalNotFound)?;
        if !approval.awaiting || approval.status != ApprovalStatus::Pending {
            return Err(WorkflowError::ApprovalConsumed);
        }

        match decision {
            FrontViewDecision::Approve => {
                let approved =
                    FrontViewApproval::set_status(&self.pool, approval_id, ApprovalStatus::Approved)
                        .await?;
                let revision = self
                    .complete_after_approval(product_id, &approved, selected_revision_number)
                    .await?;
                Ok(DecisionOutcome::Approved {
                    revision_number: revision.revision_number,
                    design_features: approved.design_features,
                })
            }
            FrontViewDecision::Edit => {
                let feedback = edit_feedback
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .ok_or(WorkflowError::EmptyEditFeedback)?;
                let prompt = format!("{}\n\nRequested changes: {feedback}", approval.prompt);
                let outcome = self
                    .generate_front_view_only(
                        product_id,
                        &prompt,
                        true,
                        Some(approval.image_url.clone()),
                    )
                    .await?;
                Ok(DecisionOutcome::EditQueued {
                    approval_id: outcome.approval_id,
                    front_view_url: outcome.front_view_url,
                    iteration_count: outcome.iteration_count,
                })
            }
            FrontViewDecision::Skip => {
                FrontViewApproval::set_status(&self.pool, approval_id, ApprovalStatus::Rejected)
                    .await?;
                self.reset(product_id);
                self.post_transcript(
                    product_id,
                    MessageType::System,
                    "Front view kept as-is; generation cycle closed.",
                    None,
                )
                .await;
                Ok(DecisionOutcome::Skipped)
            }
        }
    }

    /// Fan out the four dependent views for an approved front view. The
    /// fan-out is all-or-nothing: a failure discards any views the gateway
    /// may have rendered, there is no partial-progress checkpoint.
    pub async fn generate_remaining_views(
        &self,
        product_id: Uuid,
        approval: &FrontViewApproval,
        selected_revision_number: Option<i64>,
    ) -> Result<RevisionViews, WorkflowError> {
        let product = Product::find_by_id(&self.pool, product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound)?;
        let _busy = self.begin_generation(product_id)?;

        self.set_state(product_id, GenerationState::GeneratingAdditionalViews);
        self.post_transcript(
            product_id,
            MessageType::Processing,
            "Generating back, side, top and bottom views…",
            None,
        )
        .await;

        // A prior revision anchors structure and camera, not design/color.
        let style_anchor_views = match selected_revision_number {
            Some(number) => Revision::find_by_number(&self.pool, product_id, number)
                .await?
                .map(|rev| {
                    vec![
                        rev.front_view_url,
                        rev.back_view_url,
                        rev.side_view_url,
                        rev.top_view_url,
                        rev.bottom_view_url,
                    ]
                }),
            None => None,
        };

        let request = RemainingViewsRequest {
            product_id,
            approval_id: approval.id,
            front_view_url: approval.image_url.clone(),
            style_anchor_views,
        };
        let remaining = match self.gateway.generate_remaining_views(&request).await {
            Ok(remaining) => remaining,
            Err(e) => {
                let reason = e.user_reason();
                self.set_error(product_id, &reason);
                self.post_transcript(product_id, MessageType::Error, &reason, None)
                    .await;
                self.refresh_credits(product_id, product.owner_id).await;
                return Err(e.into());
            }
        };

        let views = RevisionViews {
            front: approval.image_url.clone(),
            back: remaining.back,
            side: remaining.side,
            top: remaining.top,
            bottom: remaining.bottom,
        };
        if !views.is_complete() {
            let reason = WorkflowError::IncompleteViews.to_string();
            self.set_error(product_id, &reason);
            self.post_transcript(product_id, MessageType::Error, &reason, None)
                .await;
            self.refresh_credits(product_id, product.owner_id).await;
            return Err(WorkflowError::IncompleteViews);
        }

        Ok(views)
    }

    /// Persist a complete view set as the product's next active revision.
    /// All five URLs must be present; the swap with the previously active
    /// revision is a single transaction.
    pub async fn create_revision_after_approval(
        &self,
        product_id: Uuid,
        approval_id: Uuid,
        views: &RevisionViews,
        is_initial: bool,
    ) -> Result<Revision, WorkflowError> {
        if !views.is_complete() {
            return Err(WorkflowError::IncompleteViews);
        }
        let product = Product::find_by_id(&self.pool, product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound)?;
        let _busy = self.begin_generation(product_id)?;

        self.set_state(product_id, GenerationState::CreatingRevision);
        let revision = match Revision::create_and_activate(&self.pool, product_id, views).await {
            Ok(revision) => revision,
            Err(e) => {
                let reason = "Saving the new revision failed.";
                self.set_error(product_id, reason);
                self.post_transcript(product_id, MessageType::Error, reason, None)
                    .await;
                return Err(e.into());
            }
        };

        self.with_session(product_id, |session| {
            session.state = GenerationState::Completed;
            session.active_approval_id = None;
        });
        let announcement = if is_initial {
            format!("Initial revision {} is ready.", revision.revision_number)
        } else {
            format!("Revision {} is ready.", revision.revision_number)
        };
        self.post_transcript(
            product_id,
            MessageType::Success,
            &announcement,
            Some(json!({
                "revision_number": revision.revision_number,
                "approval_id": approval_id,
                "front_view_url": &revision.front_view_url,
            })),
        )
        .await;
        self.refresh_credits(product_id, product.owner_id).await;

        info!(
            product_id = %product_id,
            revision_number = revision.revision_number,
            "revision created"
        );

        Ok(revision)
    }

    /// The approve-path continuation: fan out the dependent views, then
    /// assemble and activate the revision.
    pub async fn complete_after_approval(
        &self,
        product_id: Uuid,
        approval: &FrontViewApproval,
        selected_revision_number: Option<i64>,
    ) -> Result<Revision, WorkflowError> {
        let is_initial = Revision::count_live(&self.pool, product_id).await? == 0;
        let views = self
            .generate_remaining_views(product_id, approval, selected_revision_number)
            .await?;
        self.create_revision_after_approval(product_id, approval.id, &views, is_initial)
            .await
    }

    /// Chat-driven design edit: front view first. Once the product has a
    /// baseline revision the approval gate is skipped programmatically and
    /// the cycle runs through to a new revision.
    pub async fn run_design_cycle(
        &self,
        product_id: Uuid,
        prompt: &str,
        reference_image_url: Option<String>,
        selected_revision_number: Option<i64>,
    ) -> Result<CycleOutcome, WorkflowError> {
        let auto_approve = Revision::count_live(&self.pool, product_id).await? > 0;

        let front = self
            .generate_front_view_only(product_id, prompt, auto_approve, reference_image_url)
            .await?;

        if !auto_approve {
            return Ok(CycleOutcome::AwaitingApproval {
                approval_id: front.approval_id,
                front_view_url: front.front_view_url,
                iteration_count: front.iteration_count,
            });
        }

        // The baseline was approved by the user continuing to iterate.
        let approved =
            FrontViewApproval::set_status(&self.pool, front.approval_id, ApprovalStatus::Approved)
                .await?;
        let revision = self
            .complete_after_approval(product_id, &approved, selected_revision_number)
            .await?;
        Ok(CycleOutcome::Completed {
            revision_number: revision.revision_number,
        })
    }

    /// One-off try-on render. Posts only to the transcript: no state
    /// transition, no approval, no revision, success or fail.
    pub async fn run_virtual_try_on(
        &self,
        product_id: Uuid,
        prompt: &str,
        model_image_url: &str,
    ) -> Result<TryOnResult, WorkflowError> {
        let product = Product::find_by_id(&self.pool, product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound)?;
        let product_image_url = self
            .current_front_view(product_id)
            .await?
            .ok_or(WorkflowError::NoFrontView)?;

        let _busy = self.begin_generation(product_id)?;
        self.post_transcript(
            product_id,
            MessageType::Processing,
            "Generating virtual try-on…",
            None,
        )
        .await;

        let request = TryOnRequest {
            product_id,
            owner_id: product.owner_id,
            prompt: prompt.to_string(),
            model_image_url: model_image_url.to_string(),
            product_image_url,
        };
        match self.gateway.generate_try_on(&request).await {
            Ok(result) => {
                self.post_transcript(
                    product_id,
                    MessageType::ImageReady,
                    "Virtual try-on ready.",
                    Some(json!({
                        "try_on_image_url": &result.try_on_image_url,
                        "credits_used": result.credits_used,
                    })),
                )
                .await;
                self.refresh_credits(product_id, product.owner_id).await;
                Ok(result)
            }
            Err(e) => {
                let reason = e.user_reason();
                self.post_transcript(product_id, MessageType::Error, &reason, None)
                    .await;
                self.refresh_credits(product_id, product.owner_id).await;
                Err(e.into())
            }
        }
    }

    /// The image that currently represents the product: the active
    /// revision's front view, else the live pending approval's image.
    pub async fn current_front_view(
        &self,
        product_id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        if let Some(revision) = Revision::find_active(&self.pool, product_id).await? {
            return Ok(Some(revision.front_view_url));
        }
        Ok(FrontViewApproval::find_live(&self.pool, product_id)
            .await?
            .map(|approval| approval.image_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels() {
        assert_eq!(GenerationState::Idle.to_string(), "idle");
        assert_eq!(
            GenerationState::GeneratingAdditionalViews.to_string(),
            "generating_additional_views"
        );
        assert_eq!(
            "awaiting_front_approval".parse::<GenerationState>().unwrap(),
            GenerationState::AwaitingFrontApproval
        );
    }

    #[test]
    fn admission_errors_are_classified() {
        assert!(WorkflowError::EmptyPrompt.is_admission());
        assert!(WorkflowError::InsufficientCredits.is_admission());
        assert!(WorkflowError::GenerationInProgress.is_admission());
        assert!(!WorkflowError::IncompleteViews.is_admission());
        assert!(!WorkflowError::ApprovalNotFound.is_admission());
    }
}
