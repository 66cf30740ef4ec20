use std::sync::Arc;

use db::DBService;
use server::{AppState, router};
use services::services::{
    assistant_api::{AssistantApi, AssistantClient},
    chat::ChatService,
    config::Config,
    design_gateway::{DesignGateway, HttpDesignGateway},
    outbox::{HttpTranscriptMirror, NullTranscriptMirror, TranscriptMirror, TranscriptOutboxService},
    tech_pack::TechPackService,
    workflow::GenerationWorkflow,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = DBService::new(&config.database_url).await?;

    let gateway: Arc<dyn DesignGateway> = Arc::new(HttpDesignGateway::new(
        config.gateway_url.clone(),
        config.gateway_api_key.clone(),
    )?);
    let assistant: Arc<dyn AssistantApi> = Arc::new(AssistantClient::from_env()?);
    let mirror: Arc<dyn TranscriptMirror> = match &config.mirror_url {
        Some(url) => Arc::new(HttpTranscriptMirror::new(
            url.clone(),
            config.mirror_api_key.clone(),
        )?),
        None => Arc::new(NullTranscriptMirror),
    };

    let workflow = Arc::new(GenerationWorkflow::new(db.pool.clone(), Arc::clone(&gateway)));
    let tech_pack = Arc::new(TechPackService::new(db.pool.clone(), Arc::clone(&gateway)));
    let chat = Arc::new(ChatService::new(
        db.pool.clone(),
        Arc::clone(&workflow),
        Arc::clone(&tech_pack),
        assistant,
        Arc::clone(&mirror),
    ));

    let _outbox_task =
        TranscriptOutboxService::spawn(db.clone(), mirror, config.outbox_poll_interval).await;

    let state = AppState {
        db,
        workflow,
        chat,
        tech_pack,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
