use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::dispatching::dialogue::GetChatId;
use teloxide::prelude::*;
use tracing::instrument;
use uuid::Uuid;

use crate::database::connection::{ManageUsers, PendingLedger, RecordAttempt, RetrieveQuestion};
use crate::database::error::StoreError;
use crate::database::model::{Claim, GivenAnswer, NewAttempt, Question, AWARD};
use crate::keyboard::{CallbackPayload, PAYLOAD_PREFIX};
use crate::HandlerResult;

/// Outcome of matching an answer against its ledger entry.
#[derive(Debug, Clone)]
pub enum Resolution {
    NotFound,
    NotOwner,
    AlreadyAnswered,
    TimedOut,
    QuestionMissing,
    Answered {
        correct: bool,
        points: i64,
        question: Question,
    },
}

/// Resolves one answer against one ledger entry: claim it, grade it, log
/// the attempt, score it. Rejections (not found, not owner, already used,
/// expired) leave no attempt record and no score change.
pub async fn resolve_answer<S>(
    store: &S,
    entry_id: Uuid,
    requester: i64,
    given: GivenAnswer,
    now: DateTime<Utc>,
) -> Result<Resolution, StoreError>
where
    S: PendingLedger + RetrieveQuestion + ManageUsers + RecordAttempt,
{
    let pending = match store.claim(entry_id, requester, now).await? {
        Claim::NotFound => return Ok(Resolution::NotFound),
        Claim::NotOwner => return Ok(Resolution::NotOwner),
        Claim::AlreadyUsed => return Ok(Resolution::AlreadyAnswered),
        Claim::Expired => return Ok(Resolution::TimedOut),
        Claim::Resolved(pending) => pending,
    };

    // The claim already left the entry terminal, so a vanished question
    // costs nothing beyond this lookup.
    let Some(question) = store.fetch_by_id(pending.question_id).await? else {
        log::error!("Entry {entry_id} references missing question {}", pending.question_id);
        return Ok(Resolution::QuestionMissing);
    };

    let correct = question.grade(&given);
    let points = if correct { AWARD } else { 0 };

    store
        .record_attempt(&NewAttempt {
            tg_user_id: requester,
            question_id: question.uuid,
            given: given.to_string(),
            correct,
            points,
            created_at: now,
        })
        .await?;

    if points > 0 {
        store.add_score(requester, points).await?;
    }

    Ok(Resolution::Answered {
        correct,
        points,
        question,
    })
}

/// Token-addressed resolution path: a tap on an option button.
#[instrument(level = "info", skip(bot, connection))]
pub async fn option_tap<S>(bot: Bot, q: CallbackQuery, connection: Arc<S>) -> HandlerResult
where
    S: PendingLedger + RetrieveQuestion + ManageUsers + RecordAttempt,
{
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    if !data.starts_with(PAYLOAD_PREFIX) {
        // Some other keyboard; not an answer.
        return Ok(());
    }

    let Some(payload) = CallbackPayload::parse(data) else {
        log::error!("Malformed callback payload '{}' from {}", data, q.from.id);
        bot.answer_callback_query(&q.id)
            .text("Invalid callback data.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    let requester = q.from.id.0 as i64;
    connection
        .find_or_create(
            requester,
            q.from.username.as_deref().unwrap_or(""),
            &q.from.first_name,
        )
        .await?;

    let outcome = resolve_answer(
        connection.as_ref(),
        payload.pending_id,
        requester,
        GivenAnswer::Option(payload.option_index),
        Utc::now(),
    )
    .await?;

    let alert = match &outcome {
        Resolution::NotFound => "This question is no longer available.",
        Resolution::NotOwner => "This question was requested by another user.",
        Resolution::AlreadyAnswered => "This question was already answered.",
        Resolution::TimedOut => "Time's up!",
        Resolution::QuestionMissing => "Question missing.",
        Resolution::Answered { correct: true, .. } => "✅ Correct!",
        Resolution::Answered { correct: false, .. } => "❌ Incorrect.",
    };
    bot.answer_callback_query(&q.id)
        .text(alert)
        .show_alert(true)
        .await?;

    let Some(chat_id) = q.chat_id() else {
        return Ok(());
    };

    match outcome {
        Resolution::TimedOut => {
            bot.send_message(chat_id, "⏱️ Time's up — you didn't answer in time.")
                .await?;
        }
        Resolution::Answered {
            correct, question, ..
        } => {
            let verdict = if correct { "✅ Correct!" } else { "❌ Incorrect." };
            log::info!(
                "{} chose option {} on question {}: correct={}",
                requester,
                payload.option_index,
                question.uuid,
                correct
            );

            // Decorate the question message so the spent keyboard disappears.
            if let Some(message) = &q.message {
                if let Some(text) = message.regular_message().and_then(|m| m.text()) {
                    if let Err(e) = bot
                        .edit_message_text(chat_id, message.id(), format!("{text}\n{verdict}"))
                        .await
                    {
                        log::warn!("Failed to edit question message: {e}");
                    }
                }
            }

            let text = match &question.explanation {
                Some(explanation) => format!("{verdict}\n\n{explanation}"),
                None => verdict.to_string(),
            };
            bot.send_message(chat_id, text).await?;
        }
        _ => {}
    }

    Ok(())
}

/// Implicit resolution path: a free-text private message carries no token,
/// so it is matched against the newest open short-answer entry owned by the
/// sender. Anything else is not a quiz answer and stays unanswered.
#[instrument(level = "info", skip(bot, connection))]
pub async fn short_answer<S>(bot: Bot, msg: Message, connection: Arc<S>) -> HandlerResult
where
    S: PendingLedger + RetrieveQuestion + ManageUsers + RecordAttempt,
{
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        // An unknown command, not an answer.
        return Ok(());
    }

    let now = Utc::now();
    let tg_id = from.id.0 as i64;

    let Some(pending) = connection.find_open_short(tg_id, now).await? else {
        return Ok(());
    };

    connection
        .find_or_create(tg_id, from.username.as_deref().unwrap_or(""), &from.first_name)
        .await?;

    let outcome = resolve_answer(
        connection.as_ref(),
        pending.uuid,
        tg_id,
        GivenAnswer::Text(text.to_string()),
        now,
    )
    .await?;

    match outcome {
        Resolution::TimedOut => {
            bot.send_message(msg.chat.id, "⏱️ Time's up — you didn't answer in time.")
                .await?;
        }
        Resolution::Answered {
            correct, question, ..
        } => {
            log::info!(
                "{} replied to short question {}: correct={}",
                tg_id,
                question.uuid,
                correct
            );
            let verdict = if correct {
                "✅ Correct!".to_string()
            } else {
                format!(
                    "❌ Incorrect. Answer: {}",
                    question.short_answer().unwrap_or("(no answer)")
                )
            };
            let text = match &question.explanation {
                Some(explanation) => format!("{verdict}\n\n{explanation}"),
                None => verdict,
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        // Raced with another resolution of the same entry; nothing to say.
        _ => {}
    }

    Ok(())
}
