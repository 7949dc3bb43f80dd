//! Shopgraph server
//!
//! Wires the dialogue graph to its collaborators and serves the SSE
//! streaming boundary.

use shopgraph::api::{create_router, AppState};
use shopgraph::config::Config;
use shopgraph::graph::DialogueGraph;
use shopgraph::reasoner::{LoggingReasoner, OpenAiCompatReasoner, Reasoner};
use shopgraph::tools::ToolRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopgraph=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    if config.api_key.is_none() {
        tracing::warn!(
            "No API key configured. Set SHOPGRAPH_API_KEY or OPENROUTER_API_KEY; \
             reasoning calls will fail until one is present."
        );
    }
    tracing::info!(
        model = %config.model,
        base_url = %config.base_url,
        results = %config.results_path.display(),
        "Configuration loaded"
    );

    let provider = OpenAiCompatReasoner::new(
        config.base_url.clone(),
        config.model.clone(),
        config.api_key.clone(),
    );
    let reasoner: Arc<dyn Reasoner> = Arc::new(LoggingReasoner::new(Arc::new(provider)));

    let tools = ToolRegistry::standard(&config);
    let graph = Arc::new(DialogueGraph::new(reasoner, tools));
    let state = AppState::new(graph);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Shopgraph listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
