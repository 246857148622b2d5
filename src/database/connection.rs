use std::borrow::Cow;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::error::StoreError;
use super::model::{Claim, NewAttempt, PendingQuestion, Question, QuestionRow, User};

pub struct Connection {
    pool: PgPool,
}

impl Connection {
    pub async fn connect(connection_string: Cow<'_, str>) -> Self {
        let pool = PgPool::connect(&connection_string)
            .await
            .expect("Failed to connect to database");
        Self { pool }
    }

    /// Runs the embedded migrations. Idempotent; called once at startup.
    pub async fn ensure_schema(&self) {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .expect("Failed to run migrations");
    }
}

/// Read-only access to the question bank.
pub trait RetrieveQuestion {
    async fn fetch_random(&self, category: Option<&str>) -> Result<Option<Question>, StoreError>;

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Question>, StoreError>;

    async fn list_categories(&self) -> Result<Vec<String>, StoreError>;
}

/// Per-user profile and score operations. Counter updates are single
/// atomic statements, never read-then-write.
pub trait ManageUsers {
    async fn find_or_create(
        &self,
        tg_id: i64,
        username: &str,
        first_name: &str,
    ) -> Result<User, StoreError>;

    async fn record_play(&self, tg_id: i64) -> Result<(), StoreError>;

    async fn add_score(&self, tg_id: i64, delta: i64) -> Result<(), StoreError>;

    async fn top_by_score(&self, limit: i64) -> Result<Vec<User>, StoreError>;
}

/// The pending-question ledger. Entries are never deleted; stale ones age
/// out of the lookups below.
pub trait PendingLedger {
    async fn create_pending(&self, entry: &PendingQuestion) -> Result<(), StoreError>;

    /// Attaches the rendered message to an entry. Best-effort: attaching to
    /// an entry that no longer exists is not an error.
    async fn attach_message(&self, id: Uuid, message_id: i32) -> Result<(), StoreError>;

    /// Claims an entry for resolution. Ownership is checked before any
    /// mutation; the used flag is flipped with one conditional update so
    /// concurrent claims cannot both win.
    async fn claim(
        &self,
        id: Uuid,
        requester: i64,
        now: DateTime<Utc>,
    ) -> Result<Claim, StoreError>;

    /// The newest open short-answer entry owned by the user, if any.
    async fn find_open_short(
        &self,
        tg_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingQuestion>, StoreError>;
}

/// Append-only attempt log.
pub trait RecordAttempt {
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError>;
}

const QUESTION_COLUMNS: &str =
    "uuid, category, q_type, text, options, answer_index, answer_text, explanation";

const PENDING_COLUMNS: &str =
    "uuid, chat_id, tg_user_id, question_id, message_id, created_at, expire_at, used";

impl RetrieveQuestion for Connection {
    async fn fetch_random(&self, category: Option<&str>) -> Result<Option<Question>, StoreError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions \
             WHERE $1::text IS NULL OR category = $1 \
             ORDER BY random() LIMIT 1"
        ))
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Question::try_from).transpose()
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Question>, StoreError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE uuid = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Question::try_from).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM questions ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }
}

impl ManageUsers for Connection {
    async fn find_or_create(
        &self,
        tg_id: i64,
        username: &str,
        first_name: &str,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (tg_id, username, first_name) VALUES ($1, $2, $3) \
             ON CONFLICT (tg_id) DO UPDATE \
             SET username = EXCLUDED.username, first_name = EXCLUDED.first_name \
             RETURNING tg_id, username, first_name, score, plays, last_play, created_at",
        )
        .bind(tg_id)
        .bind(username)
        .bind(first_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn record_play(&self, tg_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET plays = plays + 1, last_play = now() WHERE tg_id = $1")
            .bind(tg_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn add_score(&self, tg_id: i64, delta: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET score = score + $2 WHERE tg_id = $1")
            .bind(tg_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn top_by_score(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT tg_id, username, first_name, score, plays, last_play, created_at \
             FROM users ORDER BY score DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

impl PendingLedger for Connection {
    async fn create_pending(&self, entry: &PendingQuestion) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pending_questions \
             (uuid, chat_id, tg_user_id, question_id, created_at, expire_at, used) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
        )
        .bind(entry.uuid)
        .bind(entry.chat_id)
        .bind(entry.tg_user_id)
        .bind(entry.question_id)
        .bind(entry.created_at)
        .bind(entry.expire_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn attach_message(&self, id: Uuid, message_id: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE pending_questions SET message_id = $2 WHERE uuid = $1")
            .bind(id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn claim(
        &self,
        id: Uuid,
        requester: i64,
        now: DateTime<Utc>,
    ) -> Result<Claim, StoreError> {
        let pending = sqlx::query_as::<_, PendingQuestion>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_questions WHERE uuid = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut pending) = pending else {
            return Ok(Claim::NotFound);
        };

        if pending.tg_user_id != requester {
            return Ok(Claim::NotOwner);
        }

        // The one contended transition: flip used exactly once.
        let marked = sqlx::query(
            "UPDATE pending_questions SET used = TRUE WHERE uuid = $1 AND used = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if marked.rows_affected() == 0 {
            return Ok(Claim::AlreadyUsed);
        }

        if now > pending.expire_at {
            return Ok(Claim::Expired);
        }

        pending.used = true;
        Ok(Claim::Resolved(pending))
    }

    async fn find_open_short(
        &self,
        tg_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingQuestion>, StoreError> {
        let pending = sqlx::query_as::<_, PendingQuestion>(
            "SELECT p.uuid, p.chat_id, p.tg_user_id, p.question_id, p.message_id, \
                    p.created_at, p.expire_at, p.used \
             FROM pending_questions p \
             JOIN questions q ON q.uuid = p.question_id \
             WHERE p.tg_user_id = $1 AND p.used = FALSE AND p.expire_at > $2 \
               AND q.q_type = 'short' \
             ORDER BY p.created_at DESC LIMIT 1",
        )
        .bind(tg_user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(pending)
    }
}

impl RecordAttempt for Connection {
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO attempts \
             (uuid, tg_user_id, question_id, given, correct, points, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(attempt.tg_user_id)
        .bind(attempt.question_id)
        .bind(&attempt.given)
        .bind(attempt.correct)
        .bind(attempt.points)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
