use std::sync::Arc;

use anyhow::Context;

use tourly::api::{AppState, tour_routes};
use tourly::config::TourlyConfig;
use tourly::store::{LibSqlBackend, TourStore};
use tourly::translation::{OpenAiTranslator, TranslationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TourlyConfig::from_env().context("invalid configuration")?;

    eprintln!("🧭 Tourly v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/tours", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn TourStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Translation ──────────────────────────────────────────────────────
    let translator = match &config.translation {
        Some(translation) => {
            eprintln!(
                "   Translation: {} via {} ({:?} commit, locales: {})",
                translation.model,
                translation.base_url,
                config.commit_mode,
                config.locale_codes().join(", ")
            );
            Some(Arc::new(TranslationService::new(
                Arc::clone(&store),
                Arc::new(OpenAiTranslator::new(translation)),
                config.target_locales.clone(),
                config.commit_mode,
            )))
        }
        None => {
            eprintln!("   Translation: disabled (OPENAI_API_KEY not set)");
            None
        }
    };

    if config.admin_emails.is_empty() {
        tracing::warn!("TOURLY_ADMIN_EMAILS is empty; admin routes will reject every caller");
    }
    eprintln!(
        "   Admins: {} (identity header: {})\n",
        config.admin_emails.len(),
        config.identity_header
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let state = AppState::from_config(&config, store, translator)?;
    let app = tour_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Tourly server started");
    axum::serve(listener, app).await?;

    Ok(())
}
