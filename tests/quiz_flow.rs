//! Lifecycle tests for the dispatch and resolve cores, driven against an
//! in-memory implementation of the store traits.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use sciquizbot::config::QuizConfig;
use sciquizbot::database::connection::{
    ManageUsers, PendingLedger, RecordAttempt, RetrieveQuestion,
};
use sciquizbot::database::error::StoreError;
use sciquizbot::database::model::{
    Claim, GivenAnswer, NewAttempt, PendingQuestion, Question, QuestionKind, User, AWARD,
};
use sciquizbot::dispatch::{finish_dispatch, prepare_question};
use sciquizbot::resolve::{resolve_answer, Resolution};

#[derive(Default)]
struct MemStore {
    users: Mutex<HashMap<i64, User>>,
    questions: Mutex<HashMap<Uuid, Question>>,
    pending: Mutex<Vec<PendingQuestion>>,
    attempts: Mutex<Vec<NewAttempt>>,
}

impl MemStore {
    fn with_question(question: Question) -> Self {
        let store = Self::default();
        store
            .questions
            .lock()
            .unwrap()
            .insert(question.uuid, question);
        store
    }

    fn user(&self, tg_id: i64) -> Option<User> {
        self.users.lock().unwrap().get(&tg_id).cloned()
    }

    fn entry(&self, id: Uuid) -> Option<PendingQuestion> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.uuid == id)
            .cloned()
    }

    fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl RetrieveQuestion for MemStore {
    async fn fetch_random(&self, category: Option<&str>) -> Result<Option<Question>, StoreError> {
        let questions = self.questions.lock().unwrap();
        Ok(questions
            .values()
            .find(|q| category.map_or(true, |c| q.category == c))
            .cloned())
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Question>, StoreError> {
        Ok(self.questions.lock().unwrap().get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        let mut categories: Vec<String> = self
            .questions
            .lock()
            .unwrap()
            .values()
            .map(|q| q.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

impl ManageUsers for MemStore {
    async fn find_or_create(
        &self,
        tg_id: i64,
        username: &str,
        first_name: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users.entry(tg_id).or_insert_with(|| User {
            tg_id,
            username: username.to_string(),
            first_name: first_name.to_string(),
            score: 0,
            plays: 0,
            last_play: None,
            created_at: Utc::now(),
        });
        Ok(user.clone())
    }

    async fn record_play(&self, tg_id: i64) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&tg_id) {
            user.plays += 1;
            user.last_play = Some(Utc::now());
        }
        Ok(())
    }

    async fn add_score(&self, tg_id: i64, delta: i64) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&tg_id) {
            user.score += delta;
        }
        Ok(())
    }

    async fn top_by_score(&self, limit: i64) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by(|a, b| b.score.cmp(&a.score));
        users.truncate(limit as usize);
        Ok(users)
    }
}

impl PendingLedger for MemStore {
    async fn create_pending(&self, entry: &PendingQuestion) -> Result<(), StoreError> {
        self.pending.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn attach_message(&self, id: Uuid, message_id: i32) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.iter_mut().find(|p| p.uuid == id) {
            entry.message_id = Some(message_id);
        }
        Ok(())
    }

    async fn claim(
        &self,
        id: Uuid,
        requester: i64,
        now: DateTime<Utc>,
    ) -> Result<Claim, StoreError> {
        let mut pending = self.pending.lock().unwrap();
        let Some(entry) = pending.iter_mut().find(|p| p.uuid == id) else {
            return Ok(Claim::NotFound);
        };
        if entry.tg_user_id != requester {
            return Ok(Claim::NotOwner);
        }
        if entry.used {
            return Ok(Claim::AlreadyUsed);
        }
        entry.used = true;
        if now > entry.expire_at {
            return Ok(Claim::Expired);
        }
        Ok(Claim::Resolved(entry.clone()))
    }

    async fn find_open_short(
        &self,
        tg_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingQuestion>, StoreError> {
        let questions = self.questions.lock().unwrap();
        let pending = self.pending.lock().unwrap();
        Ok(pending
            .iter()
            .filter(|p| p.tg_user_id == tg_user_id && !p.used && p.expire_at > now)
            .filter(|p| {
                questions
                    .get(&p.question_id)
                    .is_some_and(|q| matches!(q.kind, QuestionKind::ShortAnswer { .. }))
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }
}

impl RecordAttempt for MemStore {
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }
}

const CHAT: i64 = 100;
const OWNER: i64 = 7;

fn physics_mcq() -> Question {
    Question {
        uuid: Uuid::new_v4(),
        category: "Physics".into(),
        text: "What is the SI unit of force?".into(),
        explanation: Some("Named after Isaac Newton.".into()),
        kind: QuestionKind::MultipleChoice {
            options: vec!["A".into(), "B".into(), "C".into()],
            answer_index: 1,
        },
    }
}

fn short_question(answer: &str) -> Question {
    Question {
        uuid: Uuid::new_v4(),
        category: "Physics".into(),
        text: "Which scientist gives his name to the SI unit of force?".into(),
        explanation: None,
        kind: QuestionKind::ShortAnswer {
            answer: answer.into(),
        },
    }
}

async fn issue(store: &MemStore, category: Option<&str>, now: DateTime<Utc>) -> Option<Uuid> {
    let issued = prepare_question(
        store,
        CHAT,
        OWNER,
        "ada",
        "Ada",
        category,
        &QuizConfig::default(),
        now,
    )
    .await
    .unwrap()?;
    finish_dispatch(store, issued.pending_id, 555, OWNER)
        .await
        .unwrap();
    Some(issued.pending_id)
}

#[tokio::test]
async fn correct_tap_awards_points() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, Some("Physics"), now).await.unwrap();

    let user = store.user(OWNER).unwrap();
    assert_eq!(user.plays, 1);
    assert!(user.last_play.is_some());
    assert_eq!(store.entry(entry).unwrap().message_id, Some(555));

    let outcome = resolve_answer(
        &store,
        entry,
        OWNER,
        GivenAnswer::Option(1),
        now + Duration::seconds(5),
    )
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        Resolution::Answered {
            correct: true,
            points: AWARD,
            ..
        }
    ));
    assert_eq!(store.user(OWNER).unwrap().score, AWARD);

    let attempts = store.attempts.lock().unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].correct);
    assert_eq!(attempts[0].points, AWARD);
    assert_eq!(attempts[0].given, "1");
}

#[tokio::test]
async fn wrong_tap_records_attempt_without_points() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, Some("Physics"), now).await.unwrap();

    let outcome = resolve_answer(
        &store,
        entry,
        OWNER,
        GivenAnswer::Option(0),
        now + Duration::seconds(5),
    )
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        Resolution::Answered {
            correct: false,
            points: 0,
            ..
        }
    ));
    assert_eq!(store.user(OWNER).unwrap().score, 0);

    let attempts = store.attempts.lock().unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].correct);
}

#[tokio::test]
async fn short_reply_matches_case_and_whitespace_insensitively() {
    let store = MemStore::with_question(short_question("newton"));
    let now = Utc::now();
    issue(&store, None, now).await.unwrap();

    let pending = store
        .find_open_short(OWNER, now + Duration::seconds(5))
        .await
        .unwrap()
        .expect("open short entry");

    let outcome = resolve_answer(
        &store,
        pending.uuid,
        OWNER,
        GivenAnswer::Text("  Newton  ".into()),
        now + Duration::seconds(5),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, Resolution::Answered { correct: true, .. }));
    assert_eq!(store.user(OWNER).unwrap().score, AWARD);
}

#[tokio::test]
async fn late_answer_expires_without_attempt() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, None, now).await.unwrap();

    // Deadline is 20s; answer arrives at t=21s, correct option or not.
    let outcome = resolve_answer(
        &store,
        entry,
        OWNER,
        GivenAnswer::Option(1),
        now + Duration::seconds(21),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, Resolution::TimedOut));
    assert_eq!(store.attempt_count(), 0);
    assert_eq!(store.user(OWNER).unwrap().score, 0);
    // Expiry is a terminal transition: the entry is spent.
    assert!(store.entry(entry).unwrap().used);
}

#[tokio::test]
async fn double_tap_scores_exactly_once() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, None, now).await.unwrap();
    let at = now + Duration::seconds(3);

    let first = resolve_answer(&store, entry, OWNER, GivenAnswer::Option(1), at)
        .await
        .unwrap();
    let second = resolve_answer(&store, entry, OWNER, GivenAnswer::Option(1), at)
        .await
        .unwrap();

    assert!(matches!(first, Resolution::Answered { correct: true, .. }));
    assert!(matches!(second, Resolution::AlreadyAnswered));
    assert_eq!(store.attempt_count(), 1);
    assert_eq!(store.user(OWNER).unwrap().score, AWARD);
}

#[tokio::test]
async fn foreign_tap_never_mutates_the_entry() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, None, now).await.unwrap();

    let outcome = resolve_answer(
        &store,
        entry,
        OWNER + 1,
        GivenAnswer::Option(1),
        now + Duration::seconds(1),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, Resolution::NotOwner));
    assert_eq!(store.attempt_count(), 0);
    assert!(!store.entry(entry).unwrap().used);

    // The owner can still answer afterwards.
    let outcome = resolve_answer(
        &store,
        entry,
        OWNER,
        GivenAnswer::Option(1),
        now + Duration::seconds(2),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Resolution::Answered { correct: true, .. }));
}

#[tokio::test]
async fn unknown_entry_is_not_found() {
    let store = MemStore::with_question(physics_mcq());
    let outcome = resolve_answer(
        &store,
        Uuid::new_v4(),
        OWNER,
        GivenAnswer::Option(0),
        Utc::now(),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Resolution::NotFound));
    assert_eq!(store.attempt_count(), 0);
}

#[tokio::test]
async fn vanished_question_orphans_the_entry() {
    let store = MemStore::with_question(physics_mcq());
    let now = Utc::now();
    let entry = issue(&store, None, now).await.unwrap();
    store.questions.lock().unwrap().clear();

    let outcome = resolve_answer(
        &store,
        entry,
        OWNER,
        GivenAnswer::Option(1),
        now + Duration::seconds(1),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, Resolution::QuestionMissing));
    assert_eq!(store.attempt_count(), 0);
    assert_eq!(store.user(OWNER).unwrap().score, 0);
    assert!(store.entry(entry).unwrap().used);
}

#[tokio::test]
async fn empty_category_issues_nothing() {
    let store = MemStore::with_question(physics_mcq());
    let issued = issue(&store, Some("UnknownCategory"), Utc::now()).await;
    assert!(issued.is_none());
    assert!(store.pending.lock().unwrap().is_empty());
}

#[tokio::test]
async fn find_or_create_is_idempotent() {
    let store = MemStore::default();
    let first = store.find_or_create(OWNER, "ada", "Ada").await.unwrap();
    store.add_score(OWNER, AWARD).await.unwrap();
    let second = store.find_or_create(OWNER, "ada", "Ada").await.unwrap();

    assert_eq!(store.users.lock().unwrap().len(), 1);
    assert_eq!(first.tg_id, second.tg_id);
    assert_eq!(second.score, AWARD);
}

#[tokio::test]
async fn score_increments_are_monotonic() {
    let store = MemStore::default();
    store.find_or_create(OWNER, "ada", "Ada").await.unwrap();
    for _ in 0..3 {
        store.add_score(OWNER, AWARD).await.unwrap();
    }
    assert_eq!(store.user(OWNER).unwrap().score, 3 * AWARD);
}

#[tokio::test]
async fn short_lookup_skips_expired_and_option_entries() {
    let store = MemStore::with_question(physics_mcq());
    let short = short_question("newton");
    let short_id = short.uuid;
    store.questions.lock().unwrap().insert(short_id, short);
    let now = Utc::now();

    // An open mcq entry must never be matched by a free-text reply.
    let mcq_id = store
        .questions
        .lock()
        .unwrap()
        .values()
        .find(|q| q.options().is_some())
        .map(|q| q.uuid)
        .unwrap();
    store
        .create_pending(&PendingQuestion::new(
            CHAT,
            OWNER,
            mcq_id,
            now,
            now + Duration::seconds(20),
        ))
        .await
        .unwrap();
    assert!(store.find_open_short(OWNER, now).await.unwrap().is_none());

    // An expired short entry is also invisible.
    store
        .create_pending(&PendingQuestion::new(
            CHAT,
            OWNER,
            short_id,
            now - Duration::seconds(60),
            now - Duration::seconds(40),
        ))
        .await
        .unwrap();
    assert!(store.find_open_short(OWNER, now).await.unwrap().is_none());

    // A live short entry is found, and the newest one wins.
    let older = PendingQuestion::new(CHAT, OWNER, short_id, now - Duration::seconds(5), now + Duration::seconds(15));
    let newer = PendingQuestion::new(CHAT, OWNER, short_id, now, now + Duration::seconds(20));
    store.create_pending(&older).await.unwrap();
    store.create_pending(&newer).await.unwrap();

    let found = store.find_open_short(OWNER, now).await.unwrap().unwrap();
    assert_eq!(found.uuid, newer.uuid);

    // Other users see nothing.
    assert!(store
        .find_open_short(OWNER + 1, now)
        .await
        .unwrap()
        .is_none());
}
