//! Tool-intent parsing for uploaded reference images.
//!
//! An attached image means the user wants something done with it: place a
//! logo, recreate a sketch, use it as a style reference, or try the product
//! on a person. A parse failure degrades to a plain style reference; the
//! image is still usable, so the turn must not abort.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::warn;
use ts_rs::TS;

use super::assistant_api::AssistantApi;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolType {
    LogoPlacement,
    SketchRecreation,
    StyleReference,
    VirtualTryOn,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ToolIntent {
    pub tool: ToolType,
    pub position: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
}

impl ToolIntent {
    pub fn style_reference() -> Self {
        Self {
            tool: ToolType::StyleReference,
            position: None,
            color: None,
            size: None,
        }
    }

    /// Render the structured intent as a prompt segment for the gateway.
    pub fn prompt_fragment(&self, image_url: &str) -> String {
        let mut fragment = match self.tool {
            ToolType::LogoPlacement => {
                format!("Place the logo from the reference image ({image_url}) on the product")
            }
            ToolType::SketchRecreation => {
                format!("Recreate the design shown in the reference sketch ({image_url})")
            }
            ToolType::StyleReference => {
                format!("Use the reference image ({image_url}) as a style reference")
            }
            ToolType::VirtualTryOn => {
                format!("Combine the product with the person photo ({image_url})")
            }
        };

        if let Some(position) = &self.position {
            fragment.push_str(&format!(", positioned at the {position}"));
        }
        if let Some(color) = &self.color {
            fragment.push_str(&format!(", in {color}"));
        }
        if let Some(size) = &self.size {
            fragment.push_str(&format!(", sized {size}"));
        }
        fragment.push('.');
        fragment
    }
}

#[derive(Debug, Deserialize)]
struct ToolIntentResponse {
    tool: String,
    position: Option<String>,
    color: Option<String>,
    size: Option<String>,
}

pub struct ImageIntentParser {
    assistant: Arc<dyn AssistantApi>,
}

impl ImageIntentParser {
    pub fn new(assistant: Arc<dyn AssistantApi>) -> Self {
        Self { assistant }
    }

    /// Parse the purpose of an uploaded image from the image URL and the
    /// user's accompanying text. Infallible: any failure falls back to a
    /// generic style reference.
    pub async fn parse(&self, image_url: &str, caption: &str) -> ToolIntent {
        let prompt = format!(
            r#"A user attached an image to a product design chat.

Image URL: {image_url}
User message: {caption}

Decide what the image is for:
- "logo_placement": a logo or graphic to place on the product
- "sketch_recreation": a hand-drawn or rough sketch to recreate
- "style_reference": inspiration for colors/materials/mood
- "virtual_try_on": a photo of a person who should wear/use the product

Also extract optional modifiers when the message states them:
position (e.g. "chest", "left sleeve"), color, size.

Return ONLY valid JSON:
{{"tool": "<label>", "position": null, "color": null, "size": null}}"#
        );
        let system = Some(
            "You parse the purpose of reference images for a product design \
             studio. Output valid JSON only."
                .to_string(),
        );

        let value = match self.assistant.ask_json_value(&prompt, system, 256).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "image intent parse failed, treating upload as style reference");
                return ToolIntent::style_reference();
            }
        };

        let response: ToolIntentResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "image intent response malformed, treating upload as style reference");
                return ToolIntent::style_reference();
            }
        };

        let tool = match response.tool.trim().to_lowercase().parse::<ToolType>() {
            Ok(tool) => tool,
            Err(_) => {
                warn!(label = %response.tool, "unknown tool label, treating upload as style reference");
                return ToolIntent::style_reference();
            }
        };

        ToolIntent {
            tool,
            position: response.position.filter(|s| !s.trim().is_empty()),
            color: response.color.filter(|s| !s.trim().is_empty()),
            size: response.size.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Fold a structured tool intent into the user's text to form the prompt
/// handed to the generation gateway.
pub fn enhance_prompt(user_text: &str, intent: &ToolIntent, image_url: &str) -> String {
    let fragment = intent.prompt_fragment(image_url);
    if user_text.trim().is_empty() {
        fragment
    } else {
        format!("{}\n\n{fragment}", user_text.trim())
    }
}
