use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateHandler;
use teloxide::error_handlers::IgnoringErrorHandlerSafe;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use teloxide::utils::command::BotCommands;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use url::Url;

use sciquizbot::commands::{self, Command};
use sciquizbot::config::QuizConfig;
use sciquizbot::database::connection::Connection;
use sciquizbot::{dispatch, resolve};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_max_level(log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_ansi(true)
        .with_line_number(true)
        .with_target(false)
        .init();

    let connection_string = std::env::var("DATABASE_URL").expect("DATABASE_URL should be set.");
    let connection =
        Arc::new(Connection::connect(std::borrow::Cow::Owned(connection_string)).await);

    connection.ensure_schema().await;

    let config = QuizConfig::from_env();

    let teloxide_token = std::env::var("TELOXIDE_TOKEN").expect("TELOXIDE_TOKEN should be set.");
    let bot = Bot::new(teloxide_token);
    log::info!("Starting science quiz bot...");

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Failed to register bot commands: {e}");
    }

    let ngrok_url = std::env::var("NGROK_URL")
        .map(|d| d.parse::<Url>().expect("NGROK_URL can't be parsed."))
        .ok();
    let ngrok_addr = std::env::var("NGROK_ADDR")
        .map(|d| d.parse::<SocketAddr>().expect("NGROK_ADDR can't be parsed."))
        .ok();

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![connection, config])
        .enable_ctrlc_handler()
        .build();

    if let (Some(ngrok_url), Some(ngrok_addr)) = (ngrok_url, ngrok_addr) {
        let listener = webhooks::axum(bot, Options::new(ngrok_addr, ngrok_url))
            .await
            .expect("Failed to build a listener.");
        dispatcher
            .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
            .await
    } else {
        dispatcher.dispatch().await
    }
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(commands::start::<Connection>))
        .branch(case![Command::Help].endpoint(commands::help))
        .branch(case![Command::Categories].endpoint(commands::categories::<Connection>))
        .branch(case![Command::Myscore].endpoint(commands::myscore::<Connection>))
        .branch(case![Command::Leaderboard].endpoint(commands::leaderboard::<Connection>))
        .branch(case![Command::Quiz(category)].endpoint(dispatch::issue::<Connection>));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.chat.is_private() && msg.text().is_some())
                .endpoint(resolve::short_answer::<Connection>),
        );

    dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_callback_query().endpoint(resolve::option_tap::<Connection>))
}
