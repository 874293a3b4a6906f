use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod bot;
mod config;
mod gateway;
mod health;
mod models;
mod pricing;
mod services;
mod session;
mod sheets;
mod state;

use crate::config::Config;
use crate::gateway::{TelegramGateway, TelegramNotifier};
use crate::sheets::auth::{load_service_account, TokenProvider};
use crate::sheets::table::Store;
use crate::sheets::SheetsClient;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting subscription bot");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let key = match load_service_account(
        config.google_credentials.as_deref(),
        &config.google_credentials_file,
    ) {
        Ok(k) => k,
        Err(e) => {
            error!("google credentials error: {:#}", e);
            std::process::exit(1);
        }
    };
    let tokens = TokenProvider::new(key);
    let sheets = SheetsClient::new(config.spreadsheet_id.clone(), tokens);
    let store = Store::new(Arc::new(sheets));
    if let Err(e) = store.ensure_all(crate::models::ALL_TABLES).await {
        error!("failed to prepare worksheets: {}", e);
        std::process::exit(1);
    }

    let bot = Bot::new(config.bot_token.clone());
    let bot_username = match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or_else(|| "unknown".into());
            info!("bot connected as @{}", username);
            username
        }
        Err(e) => {
            error!("bot failed to connect to Telegram: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let state = AppState::new(config.clone(), store, notifier, gateway, bot_username);

    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            error!("health server failed: {:#}", e);
        }
    });

    if let Err(e) = state.subs.reconcile_on_startup().await {
        error!("startup reconcile failed: {:#}", e);
    }
    tokio::spawn(state.reconciler().run());

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    bot::run_bot(bot, shutdown_rx, state).await;
    info!("shutdown complete");
}
