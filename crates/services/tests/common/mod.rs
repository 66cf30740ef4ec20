#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use db::{
    DBService,
    models::{
        chat_message::ChatMessage,
        product::{CreateProduct, Product},
    },
};
use services::services::{
    assistant_api::{AssistantApi, AssistantApiError, Message},
    design_gateway::{
        DesignGateway, FrontViewRequest, FrontViewResult, GatewayError, RemainingViews,
        RemainingViewsRequest, TechPackRequest, TechPackResult, TryOnRequest, TryOnResult,
    },
    outbox::{MirrorError, TranscriptMirror},
};
use tokio::sync::oneshot;
use uuid::Uuid;

pub async fn setup_product() -> (DBService, Product) {
    let db = DBService::new_in_memory().await.expect("in-memory db");
    let product = Product::create(
        &db.pool,
        &CreateProduct {
            owner_id: Uuid::new_v4(),
            name: "Trail Runner".to_string(),
            description: Some("Lightweight trail running shoe".to_string()),
        },
        Uuid::new_v4(),
    )
    .await
    .expect("create product");
    (db, product)
}

/// Scripted design gateway. Counters observe which remote calls happened;
/// flags flip individual endpoints into failure.
pub struct MockGateway {
    pub credits: AtomicI64,
    pub fail_front: AtomicBool,
    pub fail_remaining: AtomicBool,
    pub fail_try_on: AtomicBool,
    pub blank_remaining: AtomicBool,
    pub front_calls: AtomicUsize,
    pub remaining_calls: AtomicUsize,
    pub try_on_calls: AtomicUsize,
    pub tech_pack_calls: AtomicUsize,
    pub credit_reads: AtomicUsize,
    /// When set, the next front-view call blocks until the sender fires.
    pub front_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockGateway {
    pub fn with_credits(credits: i64) -> Self {
        Self {
            credits: AtomicI64::new(credits),
            fail_front: AtomicBool::new(false),
            fail_remaining: AtomicBool::new(false),
            fail_try_on: AtomicBool::new(false),
            blank_remaining: AtomicBool::new(false),
            front_calls: AtomicUsize::new(0),
            remaining_calls: AtomicUsize::new(0),
            try_on_calls: AtomicUsize::new(0),
            tech_pack_calls: AtomicUsize::new(0),
            credit_reads: AtomicUsize::new(0),
            front_gate: Mutex::new(None),
        }
    }

    pub fn generation_calls(&self) -> usize {
        self.front_calls.load(Ordering::SeqCst)
            + self.remaining_calls.load(Ordering::SeqCst)
            + self.try_on_calls.load(Ordering::SeqCst)
            + self.tech_pack_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DesignGateway for MockGateway {
    async fn generate_front_view(
        &self,
        _req: &FrontViewRequest,
    ) -> Result<FrontViewResult, GatewayError> {
        let gate = self.front_gate.lock().expect("gate lock").take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }

        if self.fail_front.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 422,
                reason: "front view generation failed".to_string(),
            });
        }
        let n = self.front_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.credits.fetch_sub(1, Ordering::SeqCst);
        Ok(FrontViewResult {
            front_view_url: format!("https://cdn.test/front-{n}.png"),
            design_features: Some(serde_json::json!({ "style": "sporty" })),
            credits_used: 1,
        })
    }

    async fn generate_remaining_views(
        &self,
        _req: &RemainingViewsRequest,
    ) -> Result<RemainingViews, GatewayError> {
        if self.fail_remaining.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 502,
                reason: "view fan-out failed".to_string(),
            });
        }
        let n = self.remaining_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.credits.fetch_sub(1, Ordering::SeqCst);
        if self.blank_remaining.load(Ordering::SeqCst) {
            return Ok(RemainingViews {
                back: String::new(),
                side: format!("https://cdn.test/side-{n}.png"),
                top: format!("https://cdn.test/top-{n}.png"),
                bottom: format!("https://cdn.test/bottom-{n}.png"),
            });
        }
        Ok(RemainingViews {
            back: format!("https://cdn.test/back-{n}.png"),
            side: format!("https://cdn.test/side-{n}.png"),
            top: format!("https://cdn.test/top-{n}.png"),
            bottom: format!("https://cdn.test/bottom-{n}.png"),
        })
    }

    async fn generate_try_on(&self, _req: &TryOnRequest) -> Result<TryOnResult, GatewayError> {
        if self.fail_try_on.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 502,
                reason: "try-on generation failed".to_string(),
            });
        }
        let n = self.try_on_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.credits.fetch_sub(1, Ordering::SeqCst);
        Ok(TryOnResult {
            try_on_image_url: format!("https://cdn.test/try-on-{n}.png"),
            credits_used: 1,
        })
    }

    async fn generate_tech_pack(
        &self,
        req: &TechPackRequest,
    ) -> Result<TechPackResult, GatewayError> {
        let n = self.tech_pack_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.credits.fetch_sub(1, Ordering::SeqCst);
        Ok(TechPackResult {
            image_urls: vec![
                format!("https://cdn.test/{}-{n}-1.png", req.kind),
                format!("https://cdn.test/{}-{n}-2.png", req.kind),
            ],
            credits_used: 1,
        })
    }

    async fn credit_balance(&self, _owner_id: Uuid) -> Result<i64, GatewayError> {
        self.credit_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.credits.load(Ordering::SeqCst))
    }
}

/// Scripted assistant: JSON replies are consumed in order, text replies
/// repeat.
pub struct MockAssistant {
    pub json_replies: Mutex<VecDeque<serde_json::Value>>,
    pub text_reply: Mutex<String>,
    pub fail: AtomicBool,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self {
            json_replies: Mutex::new(VecDeque::new()),
            text_reply: Mutex::new("Happy to help.".to_string()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.json_replies.lock().expect("queue lock").push_back(value);
    }

    pub fn set_text_reply(&self, reply: &str) {
        *self.text_reply.lock().expect("reply lock") = reply.to_string();
    }
}

#[async_trait]
impl AssistantApi for MockAssistant {
    async fn ask(
        &self,
        _prompt: &str,
        _history: Vec<Message>,
        _system: Option<String>,
    ) -> Result<String, AssistantApiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AssistantApiError::Transport("scripted failure".to_string()));
        }
        Ok(self.text_reply.lock().expect("reply lock").clone())
    }

    async fn ask_json_value(
        &self,
        _prompt: &str,
        _system: Option<String>,
        _max_tokens: u32,
    ) -> Result<serde_json::Value, AssistantApiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AssistantApiError::Transport("scripted failure".to_string()));
        }
        self.json_replies
            .lock()
            .expect("queue lock")
            .pop_front()
            .ok_or_else(|| AssistantApiError::Serde("no scripted reply".to_string()))
    }
}

/// Mirror that can be flipped into refusal.
pub struct FlakyMirror {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FlakyMirror {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TranscriptMirror for FlakyMirror {
    async fn mirror(&self, _message: &ChatMessage) -> Result<(), MirrorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(MirrorError::Rejected { status: 503 })
        } else {
            Ok(())
        }
    }
}
