use std::sync::Arc;

use teloxide::{prelude::*, utils::command::BotCommands};
use tracing::instrument;

use crate::database::connection::{ManageUsers, RetrieveQuestion};
use crate::HandlerResult;

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "register and show the welcome text.")]
    Start,
    #[command(description = "display help.")]
    Help,
    #[command(description = "list question categories.")]
    Categories,
    #[command(description = "show your score and plays.")]
    Myscore,
    #[command(description = "show the top players.")]
    Leaderboard,
    #[command(description = "start a quiz, optionally from a category.")]
    Quiz(String),
}

const WELCOME: &str = "👋 Welcome to the Science Quiz Bot!\n\n\
Commands:\n\
/quiz - start a random quiz\n\
/quiz <category> - quiz from category\n\
/categories - list categories\n\
/myscore - your score\n\
/leaderboard - top players\n";

#[instrument(level = "info", skip(bot, connection))]
pub async fn start<S: ManageUsers>(bot: Bot, msg: Message, connection: Arc<S>) -> HandlerResult {
    if let Some(from) = msg.from.as_ref() {
        connection
            .find_or_create(
                from.id.0 as i64,
                from.username.as_deref().unwrap_or(""),
                &from.first_name,
            )
            .await?;
    }
    bot.send_message(msg.chat.id, WELCOME).await?;
    Ok(())
}

pub async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, connection))]
pub async fn categories<S: RetrieveQuestion>(
    bot: Bot,
    msg: Message,
    connection: Arc<S>,
) -> HandlerResult {
    let categories = connection.list_categories().await?;
    let text = if categories.is_empty() {
        "No categories available.".to_string()
    } else {
        let lines: Vec<String> = categories.iter().map(|c| format!("- {c}")).collect();
        format!("Categories:\n{}", lines.join("\n"))
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, connection))]
pub async fn myscore<S: ManageUsers>(bot: Bot, msg: Message, connection: Arc<S>) -> HandlerResult {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user = connection
        .find_or_create(
            from.id.0 as i64,
            from.username.as_deref().unwrap_or(""),
            &from.first_name,
        )
        .await?;
    bot.send_message(
        msg.chat.id,
        format!("Your score: {} points\nPlays: {}", user.score, user.plays),
    )
    .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, connection))]
pub async fn leaderboard<S: ManageUsers>(
    bot: Bot,
    msg: Message,
    connection: Arc<S>,
) -> HandlerResult {
    let top = connection.top_by_score(10).await?;
    if top.is_empty() {
        bot.send_message(msg.chat.id, "No scores yet.").await?;
        return Ok(());
    }

    let mut text = String::from("🏆 Leaderboard\n\n");
    for (i, user) in top.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} — {} pts\n",
            i + 1,
            user.display_name(),
            user.score
        ));
    }
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
