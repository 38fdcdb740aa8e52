use std::sync::Arc;

use ai_hospital::channels::CliChannel;
use ai_hospital::config::ServiceConfig;
use ai_hospital::consult::{
    ConsultRouteState, LlmAdviceGenerator, LlmQuestionGenerator, SessionStore, consult_routes,
    spawn_expiry_task,
};
use ai_hospital::llm::{LlmConfig, create_provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export GROQ_API_KEY=gsk_...");
        std::process::exit(1);
    });

    // Logs go to a daily file so they don't interleave with the REPL.
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "ai-hospital.log");
    let (log_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(log_writer)
        .with_ansi(false)
        .init();

    let port = config.http_port;
    eprintln!("🏥 AI Hospital v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Follow-up questions: {}", config.consult.max_questions);
    eprintln!("   REST API: http://0.0.0.0:{}/api/consult/sessions", port);
    eprintln!("   Reports: {}", config.export_dir.display());
    eprintln!("   Logs: {}", config.log_dir.display());
    eprintln!("   Idle sessions expire after {}s", config.session_ttl.as_secs());
    eprintln!("   Type /help for commands. /quit to exit.\n");

    let llm = create_provider(&LlmConfig::from(&config))?;
    let questions = Arc::new(LlmQuestionGenerator::new(
        Arc::clone(&llm),
        config.consult.clone(),
    ));
    let advice = Arc::new(LlmAdviceGenerator::new(llm, config.consult.clone()));
    let store = SessionStore::new(questions, advice, config.consult.max_questions);
    let _expiry_handle = spawn_expiry_task(Arc::clone(&store), config.session_ttl);

    let app = consult_routes(ConsultRouteState {
        store: Arc::clone(&store),
        export_dir: Some(config.export_dir.clone()),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "Consultation REST server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Consultation REST server stopped");
        }
    });

    let cli = CliChannel::new(store.new_controller(), config.export_dir.clone());
    cli.run().await?;

    tracing::info!("Shutting down");
    Ok(())
}
