//! Support Desk - retrieval-augmented customer support assistant
//!
//! Routes each message to an intent handler (knowledge base answer, contact
//! details, meeting booking, greeting or fallback) and drives a small booking
//! sub-flow per chat session.
//!
//! Usage: `support-desk [serve|chat|index|calendar-auth]` (default `serve`).

mod agent;
mod api;
mod calendar;
mod config;
mod llm;
mod retrieval;
mod session;

#[cfg(test)]
mod testing;

use agent::{Handlers, Orchestrator, Router};
use api::{create_router, AppState};
use calendar::{
    authorize, AvailabilityRules, CalendarProvider, CredentialStore, GoogleCalendar,
    UnavailableCalendar,
};
use config::AppConfig;
use llm::{LlmConfig, LlmService, ModelRegistry};
use retrieval::{
    load_corpus, GeminiEmbedder, KnowledgeIndex, KnowledgeRetriever, UnavailableRetriever,
    VectorRetriever,
};
use session::{ChatRole, SessionManager, SessionUpdate};
use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_desk=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env()?;
    let llm_config = LlmConfig::from_env();
    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    match mode.as_str() {
        "serve" => serve(&config, &llm_config).await,
        "chat" => chat(&config, &llm_config).await,
        "index" => build_index(&config, &llm_config).await,
        "calendar-auth" => calendar_auth(&config).await,
        other => Err(format!(
            "unknown command '{other}' (expected serve, chat, index or calendar-auth)"
        )
        .into()),
    }
}

/// Long-lived collaborators shared by every mode that answers messages
struct Services {
    orchestrator: Orchestrator,
    sessions: Arc<SessionManager>,
    google: Option<Arc<GoogleCalendar>>,
}

impl Services {
    async fn build(config: &AppConfig, llm_config: &LlmConfig) -> Result<Self, BoxError> {
        let registry = ModelRegistry::new(llm_config);
        let Some(llm) = registry.default() else {
            return Err(format!(
                "model '{}' unavailable. Set GOOGLE_API_KEY or LLM_GATEWAY.",
                registry.default_model_id()
            )
            .into());
        };
        tracing::info!(
            models = ?registry.available_models(),
            default = %registry.default_model_id(),
            "LLM registry initialized"
        );

        let retriever = open_retriever(config, llm_config);
        let google = open_calendar(config).await;
        let calendar: Arc<dyn CalendarProvider> = match &google {
            Some(google) => google.clone(),
            None => Arc::new(UnavailableCalendar::new("calendar credentials not configured")),
        };

        let orchestrator = build_orchestrator(llm, retriever, calendar.clone(), config);
        let sessions = Arc::new(SessionManager::new(
            orchestrator.clone(),
            calendar,
            config.contact.clone(),
        ));

        Ok(Self {
            orchestrator,
            sessions,
            google,
        })
    }

    /// Persist calendar credentials before exit
    async fn shutdown(&self) {
        if let Some(google) = &self.google {
            if let Err(e) = google.release().await {
                tracing::warn!(error = %e, "Failed to persist calendar credentials");
            }
        }
    }
}

fn build_orchestrator(
    llm: Arc<dyn LlmService>,
    retriever: Arc<dyn KnowledgeRetriever>,
    calendar: Arc<dyn CalendarProvider>,
    config: &AppConfig,
) -> Orchestrator {
    let rules = AvailabilityRules::default().with_timezone(config.timezone);
    let handlers = Handlers::new(
        llm.clone(),
        retriever,
        calendar,
        rules,
        config.contact.clone(),
    );
    Orchestrator::new(Router::new(llm), Arc::new(handlers))
}

fn open_retriever(config: &AppConfig, llm_config: &LlmConfig) -> Arc<dyn KnowledgeRetriever> {
    let index = match KnowledgeIndex::load(&config.index_path) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(
                path = %config.index_path.display(),
                error = %e,
                "Knowledge index unavailable. Run `support-desk index` to build it."
            );
            return Arc::new(UnavailableRetriever::new(e.to_string()));
        }
    };

    let Some(api_key) = llm_config.api_key() else {
        return Arc::new(UnavailableRetriever::new("no embedding credentials"));
    };
    match GeminiEmbedder::new(api_key, llm_config.gateway.as_deref()) {
        Ok(embedder) => {
            tracing::info!(passages = index.len(), model = %index.model, "Knowledge index loaded");
            Arc::new(VectorRetriever::new(index, Arc::new(embedder)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Embedding client unavailable");
            Arc::new(UnavailableRetriever::new(e.to_string()))
        }
    }
}

async fn open_calendar(config: &AppConfig) -> Option<Arc<GoogleCalendar>> {
    let acquired = async {
        let http = GoogleCalendar::http_client()?;
        let store = CredentialStore::acquire(&config.calendar_token_path, http.clone()).await?;
        Ok::<_, calendar::CalendarError>(GoogleCalendar::new(http, Arc::new(store)))
    }
    .await;

    match acquired {
        Ok(google) => {
            tracing::info!("Google Calendar connected");
            Some(Arc::new(google))
        }
        Err(e) => {
            tracing::warn!(
                path = %config.calendar_token_path.display(),
                error = %e,
                "Calendar unavailable, booking will fall back to contact details. \
                 Run `support-desk calendar-auth` to authorize."
            );
            None
        }
    }
}

// ============================================================
// Commands
// ============================================================

async fn serve(config: &AppConfig, llm_config: &LlmConfig) -> Result<(), BoxError> {
    let services = Services::build(config, llm_config).await?;
    let state = AppState::new(services.sessions.clone(), services.orchestrator.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Support desk listening on {}", addr);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    tokio::spawn(
        services
            .sessions
            .clone()
            .run_idle_sweeper(config.session_idle, shutdown.clone()),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    services.shutdown().await;
    Ok(())
}

async fn chat(config: &AppConfig, llm_config: &LlmConfig) -> Result<(), BoxError> {
    let services = Services::build(config, llm_config).await?;
    let handle = services.sessions.create().await;
    let mut updates = services.sessions.subscribe(&handle.info.session_id).await?;

    println!(
        "{} Support Assistant. Type a message, or 'quit' to exit.",
        config.contact.brand
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        services
            .sessions
            .send_message(&handle.info.session_id, line.to_string())
            .await?;

        let mut streamed = false;
        loop {
            match updates.recv().await {
                Ok(SessionUpdate::Status { label, .. }) => eprintln!("  [{label}]"),
                Ok(SessionUpdate::Fragment { text }) => {
                    if !streamed {
                        print!("Assistant: ");
                        streamed = true;
                    }
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
                Ok(SessionUpdate::Message { message }) if message.role == ChatRole::Assistant => {
                    if streamed {
                        println!();
                        streamed = false;
                    } else {
                        println!("Assistant: {}", message.text);
                    }
                }
                Ok(SessionUpdate::Error { message }) => eprintln!("  error: {message}"),
                Ok(SessionUpdate::TurnDone) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat output lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err("session closed".into());
                }
            }
        }
    }

    services.shutdown().await;
    Ok(())
}

async fn build_index(config: &AppConfig, llm_config: &LlmConfig) -> Result<(), BoxError> {
    let api_key = llm_config
        .api_key()
        .ok_or("GOOGLE_API_KEY or LLM_GATEWAY is required to embed the corpus")?;
    let embedder = GeminiEmbedder::new(api_key, llm_config.gateway.as_deref())?;

    let documents = load_corpus(&config.corpus_path)?;
    tracing::info!(
        path = %config.corpus_path.display(),
        documents = documents.len(),
        "Corpus loaded"
    );

    let previous = KnowledgeIndex::load(&config.index_path).ok();
    let (index, stats) = KnowledgeIndex::build(&documents, &embedder, previous.as_ref()).await?;
    index.save(&config.index_path)?;

    tracing::info!(
        path = %config.index_path.display(),
        passages = index.len(),
        embedded = stats.embedded,
        reused = stats.reused,
        "Knowledge index written"
    );
    Ok(())
}

async fn calendar_auth(config: &AppConfig) -> Result<(), BoxError> {
    let http = GoogleCalendar::http_client()?;
    authorize(
        &config.calendar_credentials_path,
        &config.calendar_token_path,
        &http,
    )
    .await?;
    println!(
        "Calendar authorized. Token saved to {}",
        config.calendar_token_path.display()
    );
    Ok(())
}
