use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::StoreError;

/// Points granted for a correct resolution.
pub const AWARD: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        answer_index: usize,
    },
    TrueFalse {
        options: Vec<String>,
        answer_index: usize,
    },
    ShortAnswer {
        answer: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub uuid: Uuid,
    pub category: String,
    pub text: String,
    pub explanation: Option<String>,
    pub kind: QuestionKind,
}

/// An answer as the user gave it: a tapped option or a typed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum GivenAnswer {
    Option(usize),
    Text(String),
}

impl fmt::Display for GivenAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GivenAnswer::Option(index) => write!(f, "{index}"),
            GivenAnswer::Text(text) => write!(f, "{text}"),
        }
    }
}

impl Question {
    /// Selectable options, in render order. `None` for short-answer questions.
    pub fn options(&self) -> Option<&[String]> {
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. }
            | QuestionKind::TrueFalse { options, .. } => Some(options),
            QuestionKind::ShortAnswer { .. } => None,
        }
    }

    /// Canonical answer text for short-answer questions.
    pub fn short_answer(&self) -> Option<&str> {
        match &self.kind {
            QuestionKind::ShortAnswer { answer } => Some(answer),
            _ => None,
        }
    }

    /// Grades a given answer. Option taps only match option questions and
    /// free text only matches short-answer questions; text comparison is
    /// trimmed and case-insensitive.
    pub fn grade(&self, given: &GivenAnswer) -> bool {
        match (&self.kind, given) {
            (
                QuestionKind::MultipleChoice { answer_index, .. }
                | QuestionKind::TrueFalse { answer_index, .. },
                GivenAnswer::Option(chosen),
            ) => chosen == answer_index,
            (QuestionKind::ShortAnswer { answer }, GivenAnswer::Text(text)) => {
                text.trim().to_lowercase() == answer.trim().to_lowercase()
            }
            _ => false,
        }
    }
}

/// Raw `questions` row, validated into a [`Question`] at the store boundary.
#[derive(Debug, sqlx::FromRow)]
pub struct QuestionRow {
    pub uuid: Uuid,
    pub category: String,
    pub q_type: String,
    pub text: String,
    pub options: Vec<String>,
    pub answer_index: Option<i32>,
    pub answer_text: Option<String>,
    pub explanation: Option<String>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let kind = match row.q_type.as_str() {
            "mcq" | "tf" => {
                let answer_index = row
                    .answer_index
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|i| *i < row.options.len())
                    .ok_or_else(|| StoreError::Malformed {
                        id: row.uuid,
                        reason: "answer_index is not a valid index into options".into(),
                    })?;
                if row.q_type == "mcq" {
                    QuestionKind::MultipleChoice {
                        options: row.options,
                        answer_index,
                    }
                } else {
                    QuestionKind::TrueFalse {
                        options: row.options,
                        answer_index,
                    }
                }
            }
            "short" => {
                let answer = row.answer_text.ok_or_else(|| StoreError::Malformed {
                    id: row.uuid,
                    reason: "short question without answer_text".into(),
                })?;
                QuestionKind::ShortAnswer { answer }
            }
            other => {
                return Err(StoreError::Malformed {
                    id: row.uuid,
                    reason: format!("unknown question type '{other}'"),
                })
            }
        };

        Ok(Question {
            uuid: row.uuid,
            category: row.category,
            text: row.text,
            explanation: row.explanation.filter(|e| !e.is_empty()),
            kind,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub tg_id: i64,
    pub username: String,
    pub first_name: String,
    pub score: i64,
    pub plays: i64,
    pub last_play: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else if !self.first_name.is_empty() {
            &self.first_name
        } else {
            "User"
        }
    }
}

/// The ledger entry correlating an issued question to the one user allowed
/// to answer it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingQuestion {
    pub uuid: Uuid,
    pub chat_id: i64,
    pub tg_user_id: i64,
    pub question_id: Uuid,
    pub message_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub used: bool,
}

impl PendingQuestion {
    pub fn new(
        chat_id: i64,
        tg_user_id: i64,
        question_id: Uuid,
        created_at: DateTime<Utc>,
        expire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            chat_id,
            tg_user_id,
            question_id,
            message_id: None,
            created_at,
            expire_at,
            used: false,
        }
    }
}

/// Outcome of a claim on a pending question. At most one claim per entry
/// ever yields `Resolved`.
#[derive(Debug, Clone)]
pub enum Claim {
    Resolved(PendingQuestion),
    NotFound,
    NotOwner,
    AlreadyUsed,
    Expired,
}

/// Append-only attempt record, written once per resolved entry.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub tg_user_id: i64,
    pub question_id: Uuid,
    pub given: String,
    pub correct: bool,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}
