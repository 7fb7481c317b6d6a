// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sheetfin server
//!
//! Runs the OAuth callback receiver and owns the shared services the chat
//! transport adapter drives: authorization manager, spreadsheet operations,
//! and the conversation engine.

use sheetfin::{
    config::Config,
    conversation::ConversationEngine,
    db::Database,
    models::CategoryCatalog,
    services::{OAuthManager, SheetsOperations, SheetsService, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration from environment (fatal if incomplete)
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Sheetfin");

    // Open SQLite database
    let db = Database::open(&config.database_path)
        .await
        .expect("Failed to open database");

    // Credential cipher from the process-wide key
    let cipher = TokenCipher::new(&config.encryption_key).expect("Failed to build token cipher");

    // Authorization manager
    let auth = OAuthManager::new(
        config.registration.clone(),
        config.redirect_uri.clone(),
        db.clone(),
        cipher,
    )
    .expect("Failed to initialize authorization manager");
    tracing::info!("Authorization manager initialized");

    // Spreadsheet service + operations layer
    let sheets_service =
        SheetsService::new(auth.clone()).expect("Failed to initialize sheets service");
    let sheets = SheetsOperations::new(sheets_service, db.clone());
    tracing::info!("Spreadsheet operations initialized");

    // Conversation engine with the default category catalogue
    let engine = ConversationEngine::new(
        auth.clone(),
        Arc::new(sheets.clone()),
        db.clone(),
        CategoryCatalog::default(),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        auth,
        sheets,
        engine,
    });

    // Build router
    let app = sheetfin::routes::create_router(state);

    // Start callback receiver
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Callback receiver listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sheetfin=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
