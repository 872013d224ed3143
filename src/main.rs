//! Data analyst - a model-driven analysis agent for tabular datasets
//!
//! The model answers questions by writing Python snippets that run in a
//! sandboxed interpreter with the dataset preloaded.

mod api;
mod compare;
mod config;
mod console;
mod conversation;
mod dataset;
mod llm;
mod orchestrator;
mod prompts;
mod sandbox;
mod tools;

use api::{create_router, AppState};
use clap::Parser;
use config::{Cli, Command, Settings};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the console front-end
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_analyst=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Prompts = cli.command {
        let prompts = prompts::PromptRegistry::builtin();
        let latest = prompts.latest();
        for version in prompts.list() {
            let marker = if Some(version) == latest { " (default)" } else { "" };
            println!("{version}{marker}");
        }
        return Ok(());
    }

    let settings = Settings::load(&cli.options)?;

    match cli.command {
        Command::Ask { question } => {
            let session_id = uuid::Uuid::new_v4().to_string();
            let agent = settings.open_session(&session_id, None, None)?;
            let result = console::ask(agent, question).await;
            settings.close_session(&session_id, true).await;
            result?;
        }
        Command::Chat => {
            let session_id = uuid::Uuid::new_v4().to_string();
            let agent = settings.open_session(&session_id, None, None)?;
            let result = console::chat(agent).await;
            settings.close_session(&session_id, true).await;
            result?;
        }
        Command::Compare { prompts, questions } => {
            let versions = if prompts.is_empty() {
                settings.prompts.list().into_iter().map(str::to_string).collect()
            } else {
                prompts
            };
            let questions = if questions.is_empty() {
                compare::EVAL_QUESTIONS.iter().map(|q| (*q).to_string()).collect()
            } else {
                questions
            };
            let report = compare::compare_prompts(&settings, &versions, &questions, true).await?;
            let path = report.save(&settings.data_dir)?;
            println!("\nResults saved to {}", config::display_path(&path));
        }
        Command::Serve { port } => serve(settings, port).await?,
        Command::Prompts => {}
    }

    Ok(())
}

async fn serve(settings: Settings, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(settings))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Data analyst server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
