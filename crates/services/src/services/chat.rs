//! Chat orchestration: every user message lands here, is persisted, and is
//! routed to a design edit, a tech pack action, a virtual try-on, or a
//! conversational reply.

use std::sync::Arc;

use db::models::{
    chat_message::{ChatMessage, CreateChatMessage, MessageType, SyncStatus},
    product::Product,
    revision::Revision,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    assistant_api::{AssistantApi, AssistantApiError, Message},
    image_intent::{self, ImageIntentParser, ToolType},
    intent::{Intent, IntentClassifier, IntentError, WorkflowMode},
    outbox::TranscriptMirror,
    tech_pack::{TechPackAction, TechPackError, TechPackService},
    workflow::{CycleOutcome, GenerationWorkflow, WorkflowError},
};

/// Hard transcript cap per product. At the cap, sends are refused before
/// anything is appended.
pub const MESSAGE_CAP: i64 = 250;

/// How many prior messages condition the classifier and the responder.
const TRANSCRIPT_TAIL: i64 = 12;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("assistant error: {0}")]
    Assistant(#[from] AssistantApiError),
    #[error(transparent)]
    TechPack(#[from] TechPackError),
    #[error("this product's conversation is full ({MESSAGE_CAP} messages)")]
    MessageCapReached,
    #[error("message must contain text or an attached image")]
    EmptyMessage,
    #[error("product not found")]
    ProductNotFound,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SendMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tab: WorkflowMode,
    pub selected_revision_number: Option<i64>,
    pub image_url: Option<String>,
    /// Screenshot of the on-screen comparison grid, the reference image of
    /// last resort for design edits.
    pub fallback_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SendOutcome {
    AwaitingApproval {
        approval_id: Uuid,
        front_view_url: String,
        iteration_count: i64,
    },
    RevisionCreated {
        revision_number: i64,
    },
    TryOnReady {
        try_on_image_url: String,
    },
    TechPackGenerated {
        kinds: Vec<String>,
    },
    Reply {
        content: String,
    },
    Notice {
        content: String,
    },
}

pub struct ChatService {
    pool: SqlitePool,
    workflow: Arc<GenerationWorkflow>,
    tech_pack: Arc<TechPackService>,
    assistant: Arc<dyn AssistantApi>,
    classifier: IntentClassifier,
    image_parser: ImageIntentParser,
    mirror: Arc<dyn TranscriptMirror>,
}

impl ChatService {
    pub fn new(
        pool: SqlitePool,
        workflow: Arc<GenerationWorkflow>,
        tech_pack: Arc<TechPackService>,
        assistant: Arc<dyn AssistantApi>,
        mirror: Arc<dyn TranscriptMirror>,
    ) -> Self {
        Self {
            pool,
            workflow,
            tech_pack,
            assistant: Arc::clone(&assistant),
            classifier: IntentClassifier::new(Arc::clone(&assistant)),
            image_parser: ImageIntentParser::new(assistant),
            mirror,
        }
    }

    /// Route one user message. Admission failures (cap, empty message)
    /// refuse before anything is appended to the transcript.
    pub async fn send_user_message(
        &self,
        product_id: Uuid,
        message: SendMessage,
    ) -> Result<SendOutcome, ChatError> {
        Product::find_by_id(&self.pool, product_id)
            .await?
            .ok_or(ChatError::ProductNotFound)?;

        if ChatMessage::count_for_product(&self.pool, product_id).await? >= MESSAGE_CAP {
            return Err(ChatError::MessageCapReached);
        }
        if message.content.trim().is_empty() && message.image_url.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        self.append_reconciled(CreateChatMessage {
            product_id,
            message_type: MessageType::User,
            content: message.content.clone(),
            metadata: message
                .image_url
                .as_ref()
                .map(|url| json!({ "image_url": url, "tab": message.tab }).to_string()),
        })
        .await?;

        let _processing = self.workflow.begin_processing(product_id);

        if let Some(image_url) = &message.image_url {
            return self.handle_image_message(product_id, &message, image_url).await;
        }

        let history = ChatMessage::recent_tail(&self.pool, product_id, TRANSCRIPT_TAIL).await?;
        let intent = match self
            .classifier
            .classify(&message.content, &history, message.tab)
            .await
        {
            Ok(intent) => intent,
            Err(IntentError::UnknownLabel(label)) => {
                warn!(product_id = %product_id, label = %label, "answering unclassified message conversationally");
                Intent::Question
            }
            Err(IntentError::Assistant(e)) => {
                self.append_reconciled(CreateChatMessage {
                    product_id,
                    message_type: MessageType::Error,
                    content: "The assistant is unavailable right now. Please try again.".to_string(),
                    metadata: None,
                })
                .await?;
                return Err(e.into());
            }
        };

        info!(product_id = %product_id, intent = %intent, tab = %message.tab, "message classified");

        match intent {
            Intent::DesignEdit => {
                self.handle_design_edit(product_id, &message, message.content.clone())
                    .await
            }
            Intent::TechPackAction => self.handle_tech_pack(product_id, &message.content).await,
            Intent::Question | Intent::ProductQuestion | Intent::Greeting => {
                self.respond_conversationally(product_id, &message.content, &history)
                    .await
            }
        }
    }

    /// An attached image forces a generation branch: try-on when the image
    /// is a person photo, otherwise a design edit with the structured tool
    /// intent folded into the prompt.
    async fn handle_image_message(
        &self,
        product_id: Uuid,
        message: &SendMessage,
        image_url: &str,
    ) -> Result<SendOutcome, ChatError> {
        let tool_intent = self.image_parser.parse(image_url, &message.content).await;

        if tool_intent.tool == ToolType::VirtualTryOn {
            let result = self
                .workflow
                .run_virtual_try_on(product_id, &message.content, image_url)
                .await?;
            return Ok(SendOutcome::TryOnReady {
                try_on_image_url: result.try_on_image_url,
            });
        }

        let prompt = image_intent::enhance_prompt(&message.content, &tool_intent, image_url);
        self.handle_design_edit(product_id, message, prompt).await
    }

    async fn handle_design_edit(
        &self,
        product_id: Uuid,
        message: &SendMessage,
        prompt: String,
    ) -> Result<SendOutcome, ChatError> {
        self.append_reconciled(CreateChatMessage {
            product_id,
            message_type: MessageType::System,
            content: "Design edit detected, updating the product design.".to_string(),
            metadata: Some(json!({ "intent": Intent::DesignEdit }).to_string()),
        })
        .await?;

        let reference = self
            .resolve_reference_image(
                product_id,
                message.selected_revision_number,
                message.fallback_image_url.clone(),
            )
            .await?;

        let outcome = self
            .workflow
            .run_design_cycle(
                product_id,
                &prompt,
                reference,
                message.selected_revision_number,
            )
            .await?;

        Ok(match outcome {
            CycleOutcome::AwaitingApproval {
                approval_id,
                front_view_url,
                iteration_count,
            } => SendOutcome::AwaitingApproval {
                approval_id,
                front_view_url,
                iteration_count,
            },
            CycleOutcome::Completed { revision_number } => {
                SendOutcome::RevisionCreated { revision_number }
            }
        })
    }

    /// Reference image priority: the explicitly selected revision's front
    /// view, then the active revision's front view, then the caller's
    /// screenshot fallback.
    async fn resolve_reference_image(
        &self,
        product_id: Uuid,
        selected_revision_number: Option<i64>,
        fallback: Option<String>,
    ) -> Result<Option<String>, ChatError> {
        if let Some(number) = selected_revision_number {
            if let Some(revision) =
                Revision::find_by_number(&self.pool, product_id, number).await?
            {
                return Ok(Some(revision.front_view_url));
            }
        }
        if let Some(revision) = Revision::find_active(&self.pool, product_id).await? {
            return Ok(Some(revision.front_view_url));
        }
        Ok(fallback)
    }

    async fn handle_tech_pack(
        &self,
        product_id: Uuid,
        content: &str,
    ) -> Result<SendOutcome, ChatError> {
        let Some(action) = TechPackAction::parse(content) else {
            let notice = "Tell me which tech pack section to generate: base views, \
                          close-ups, sketches, components, or everything.";
            self.append_reconciled(CreateChatMessage {
                product_id,
                message_type: MessageType::System,
                content: notice.to_string(),
                metadata: None,
            })
            .await?;
            return Ok(SendOutcome::Notice {
                content: notice.to_string(),
            });
        };

        match self.tech_pack.execute(product_id, action).await {
            Ok(assets) => {
                let kinds: Vec<String> = assets.iter().map(|a| a.kind.to_string()).collect();
                self.append_reconciled(CreateChatMessage {
                    product_id,
                    message_type: MessageType::Success,
                    content: format!("Tech pack ready: {}.", kinds.join(", ")),
                    metadata: Some(json!({ "kinds": &kinds }).to_string()),
                })
                .await?;
                Ok(SendOutcome::TechPackGenerated { kinds })
            }
            Err(e @ (TechPackError::MissingBaseViews(_) | TechPackError::NoActiveRevision)) => {
                let notice = match &e {
                    TechPackError::MissingBaseViews(kind) => format!(
                        "Base views have to be generated before {kind}. Ask for \"base views\" first."
                    ),
                    _ => "Generate the product's views before building a tech pack.".to_string(),
                };
                self.append_reconciled(CreateChatMessage {
                    product_id,
                    message_type: MessageType::System,
                    content: notice.clone(),
                    metadata: None,
                })
                .await?;
                Ok(SendOutcome::Notice { content: notice })
            }
            Err(TechPackError::Gateway(e)) => {
                self.append_reconciled(CreateChatMessage {
                    product_id,
                    message_type: MessageType::Error,
                    content: e.user_reason(),
                    metadata: None,
                })
                .await?;
                Err(TechPackError::Gateway(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn respond_conversationally(
        &self,
        product_id: Uuid,
        content: &str,
        history: &[ChatMessage],
    ) -> Result<SendOutcome, ChatError> {
        let context = self.build_context(product_id).await;
        let system = Some(format!(
            "You are the design assistant of a product design studio. Answer \
             briefly and concretely about the user's product and the platform.\n\n{context}"
        ));

        let turns: Vec<Message> = history
            .iter()
            .filter_map(|entry| match entry.message_type {
                MessageType::User => Some(Message::user(entry.content.clone())),
                MessageType::Ai => Some(Message::assistant(entry.content.clone())),
                _ => None,
            })
            .collect();

        let reply = match self.assistant.ask(content, turns, system).await {
            Ok(reply) => reply,
            Err(e) => {
                self.append_reconciled(CreateChatMessage {
                    product_id,
                    message_type: MessageType::Error,
                    content: "The assistant is unavailable right now. Please try again.".to_string(),
                    metadata: None,
                })
                .await?;
                return Err(e.into());
            }
        };

        self.append_reconciled(CreateChatMessage {
            product_id,
            message_type: MessageType::Ai,
            content: reply.clone(),
            metadata: None,
        })
        .await?;

        Ok(SendOutcome::Reply { content: reply })
    }

    async fn build_context(&self, product_id: Uuid) -> String {
        let mut context = String::new();

        if let Ok(Some(product)) = Product::find_by_id(&self.pool, product_id).await {
            context.push_str(&format!("Product: {}\n", product.to_prompt()));
        }
        if let Ok(Some(revision)) = Revision::find_active(&self.pool, product_id).await {
            context.push_str(&format!(
                "Active revision: {}\n",
                revision.revision_number
            ));
        }
        match self.tech_pack.summary(product_id).await {
            Ok(assets) if !assets.is_empty() => {
                let sections: Vec<String> = assets
                    .iter()
                    .map(|a| format!("{} ({} images)", a.kind, a.urls().len()))
                    .collect();
                context.push_str(&format!("Tech pack sections: {}\n", sections.join(", ")));
            }
            Ok(_) => {}
            Err(e) => warn!(product_id = %product_id, error = %e, "tech pack context unavailable"),
        }

        context
    }

    /// Transcript listing for the UI.
    pub async fn transcript(&self, product_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(ChatMessage::find_by_product_id(&self.pool, product_id).await?)
    }

    /// Insert locally, then reconcile with the remote mirror. The local row
    /// stays whatever the mirror says; a refusal only flags it `unsynced`.
    async fn append_reconciled(&self, data: CreateChatMessage) -> Result<ChatMessage, ChatError> {
        let message = ChatMessage::create(&self.pool, &data).await?;

        let status = match self.mirror.mirror(&message).await {
            Ok(()) => SyncStatus::Synced,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "transcript mirror write failed, keeping local copy as unsynced"
                );
                SyncStatus::Unsynced
            }
        };
        ChatMessage::set_sync_status(&self.pool, message.id, status).await?;

        Ok(message)
    }
}
