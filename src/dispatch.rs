use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use tracing::instrument;
use uuid::Uuid;

use crate::config::QuizConfig;
use crate::database::connection::{ManageUsers, PendingLedger, RetrieveQuestion};
use crate::database::error::StoreError;
use crate::database::model::{PendingQuestion, Question};
use crate::keyboard::options_keyboard;
use crate::HandlerResult;

/// A question issued to a user, ready to be rendered.
#[derive(Debug)]
pub struct IssuedQuestion {
    pub pending_id: Uuid,
    pub question: Question,
    pub expire_at: DateTime<Utc>,
}

/// Picks a question and opens a ledger entry for it. Returns `None` when no
/// question matches the category filter; in that case nothing is written to
/// the ledger. The entry is queryable before the caller renders anything, so
/// a reply can never arrive ahead of it.
pub async fn prepare_question<S>(
    store: &S,
    chat_id: i64,
    tg_id: i64,
    username: &str,
    first_name: &str,
    category: Option<&str>,
    config: &QuizConfig,
    now: DateTime<Utc>,
) -> Result<Option<IssuedQuestion>, StoreError>
where
    S: ManageUsers + RetrieveQuestion + PendingLedger,
{
    store.find_or_create(tg_id, username, first_name).await?;

    let Some(question) = store.fetch_random(category).await? else {
        return Ok(None);
    };

    let expire_at = config.deadline(now);
    let entry = PendingQuestion::new(chat_id, tg_id, question.uuid, now, expire_at);
    let pending_id = entry.uuid;
    store.create_pending(&entry).await?;

    Ok(Some(IssuedQuestion {
        pending_id,
        question,
        expire_at,
    }))
}

/// Attaches the rendered message to the ledger entry and counts the play.
/// The attach is best-effort: the question is already live, so a failure
/// here must not abort the dispatch.
pub async fn finish_dispatch<S>(
    store: &S,
    pending_id: Uuid,
    message_id: i32,
    tg_id: i64,
) -> Result<(), StoreError>
where
    S: PendingLedger + ManageUsers,
{
    if let Err(e) = store.attach_message(pending_id, message_id).await {
        log::warn!("Failed to attach message {message_id} to entry {pending_id}: {e}");
    }

    store.record_play(tg_id).await
}

/// `/quiz [category]` handler.
#[instrument(level = "info", skip(bot, connection, config))]
pub async fn issue<S>(
    bot: Bot,
    msg: Message,
    category: String,
    connection: Arc<S>,
    config: QuizConfig,
) -> HandlerResult
where
    S: ManageUsers + RetrieveQuestion + PendingLedger,
{
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };

    let category = category.trim();
    let category = (!category.is_empty()).then_some(category);

    let issued = prepare_question(
        connection.as_ref(),
        msg.chat.id.0,
        from.id.0 as i64,
        from.username.as_deref().unwrap_or(""),
        &from.first_name,
        category,
        &config,
        Utc::now(),
    )
    .await?;

    let Some(issued) = issued else {
        log::info!("No questions available for {:?}", category);
        let text = if category.is_some() {
            "No questions available for that category."
        } else {
            "No questions available."
        };
        bot.send_message(msg.chat.id, text).await?;
        return Ok(());
    };

    log::info!(
        "Issued question {} to {} as entry {}",
        issued.question.uuid,
        from.id,
        issued.pending_id
    );

    let sent = match issued.question.options() {
        Some(options) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "❓ {}\nYou have {} seconds to answer.",
                    issued.question.text, config.time_limit_secs
                ),
            )
            .reply_markup(options_keyboard(options, issued.pending_id))
            .await?
        }
        None => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "❓ {}\nReply with your answer (short). You have {} seconds.",
                    issued.question.text, config.time_limit_secs
                ),
            )
            .await?
        }
    };

    finish_dispatch(
        connection.as_ref(),
        issued.pending_id,
        sent.id.0,
        from.id.0 as i64,
    )
    .await?;

    Ok(())
}
