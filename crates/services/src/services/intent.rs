//! Chat intent classification.
//!
//! Every free-text message is routed through a closed intent set. The
//! assistant proposes a label; parsing it back through `EnumString` keeps
//! the set closed, so an unrecognized label is a loud, typed outcome rather
//! than a silent default branch.

use std::sync::Arc;

use db::models::chat_message::{ChatMessage, MessageType};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::warn;
use ts_rs::TS;

use super::assistant_api::{AssistantApi, AssistantApiError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    DesignEdit,
    Question,
    ProductQuestion,
    TechPackAction,
    Greeting,
}

/// The editor tab the message was sent from. The same phrase can mean
/// different things per tab, so the classifier is conditioned on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowMode {
    #[default]
    AllViews,
    FrontVersions,
    FactorySpecs,
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("assistant error: {0}")]
    Assistant(#[from] AssistantApiError),
    #[error("unrecognized intent label: {0}")]
    UnknownLabel(String),
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    intent: String,
}

pub struct IntentClassifier {
    assistant: Arc<dyn AssistantApi>,
}

impl IntentClassifier {
    pub fn new(assistant: Arc<dyn AssistantApi>) -> Self {
        Self { assistant }
    }

    pub async fn classify(
        &self,
        message: &str,
        history: &[ChatMessage],
        mode: WorkflowMode,
    ) -> Result<Intent, IntentError> {
        let prompt = Self::build_prompt(message, history, mode);
        let system = Some(
            "You classify chat messages for a product design studio. \
             Output valid JSON only."
                .to_string(),
        );

        let value = self.assistant.ask_json_value(&prompt, system, 256).await?;
        let response: IntentResponse = serde_json::from_value(value)
            .map_err(|e| IntentError::Assistant(AssistantApiError::Serde(e.to_string())))?;

        let label = response.intent.trim().to_lowercase();
        label.parse::<Intent>().map_err(|_| {
            warn!(label = %label, "classifier returned a label outside the intent set");
            IntentError::UnknownLabel(label)
        })
    }

    fn build_prompt(message: &str, history: &[ChatMessage], mode: WorkflowMode) -> String {
        let mut transcript = String::new();
        for entry in history {
            let speaker = match entry.message_type {
                MessageType::User => "user",
                MessageType::Ai => "assistant",
                _ => continue,
            };
            transcript.push_str(&format!("{speaker}: {}\n", entry.content));
        }
        if transcript.is_empty() {
            transcript.push_str("(no prior messages)\n");
        }

        format!(
            r#"Classify the user's latest message into exactly one intent.

## Intents
- "design_edit": the user wants the product's look changed or regenerated
  (colors, materials, shapes, "make it ...", "change the ...").
- "tech_pack_action": the user asks to generate factory documentation
  imagery (base views, close-ups, sketches, components).
- "product_question": a question about this specific product's design,
  materials, or views.
- "question": any other question about the platform or process.
- "greeting": small talk with no actionable request.

## Context
Active editor tab: {mode}
Inside the "factory_specs" tab, generation verbs usually mean
"tech_pack_action"; elsewhere they usually mean "design_edit".

## Recent conversation
{transcript}
## Latest message
{message}

## Output Format
Return ONLY valid JSON: {{"intent": "<label>"}}"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_labels_round_trip() {
        for intent in [
            Intent::DesignEdit,
            Intent::Question,
            Intent::ProductQuestion,
            Intent::TechPackAction,
            Intent::Greeting,
        ] {
            let label = intent.to_string();
            assert_eq!(label.parse::<Intent>().unwrap(), intent);
        }
    }

    #[test]
    fn unknown_label_is_an_error() {
        assert!("factory_reset".parse::<Intent>().is_err());
    }

    #[test]
    fn mode_labels() {
        assert_eq!(WorkflowMode::FactorySpecs.to_string(), "factory_specs");
        assert_eq!(
            "front_versions".parse::<WorkflowMode>().unwrap(),
            WorkflowMode::FrontVersions
        );
    }
}
