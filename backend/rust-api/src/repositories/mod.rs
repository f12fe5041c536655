//! Storage seams of the quiz submission flow.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::models::quiz::{ModuleProgress, ProgressMap, Quiz, QuizResult};
use crate::services::quiz_scoring::Score;

pub mod mongo;
pub mod redis_lock;

pub use mongo::MongoQuizStore;
pub use redis_lock::RedisSubmissionLock;

#[derive(Debug, Clone)]
pub struct UpsertedResult {
    pub result: QuizResult,
    /// false when an existing result was overwritten
    pub created: bool,
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_quiz(&self, quiz_id: &str) -> anyhow::Result<Option<Quiz>>;

    async fn quiz_ids_for_module(&self, module_id: &str) -> anyhow::Result<BTreeSet<String>>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Creates the (user, quiz) result or overwrites score and pass flag of
    /// the existing one. `completed_at` is only written on creation.
    async fn upsert_result(
        &self,
        user_id: &str,
        quiz: &Quiz,
        score: Score,
    ) -> anyhow::Result<UpsertedResult>;

    /// Subset of `quiz_ids` the user has a result for.
    async fn attempted_quiz_ids(
        &self,
        user_id: &str,
        quiz_ids: &BTreeSet<String>,
    ) -> anyhow::Result<BTreeSet<String>>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn has_patient_profile(&self, user_id: &str) -> anyhow::Result<bool>;

    async fn load_progress(&self, user_id: &str) -> anyhow::Result<ProgressMap>;

    async fn save_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
        progress: &ModuleProgress,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SubmissionLock: Send + Sync {
    /// Returns the ownership token, or `None` while someone else holds `key`.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> anyhow::Result<Option<String>>;

    async fn release(&self, key: &str, token: &str) -> anyhow::Result<()>;
}

/// Submissions to any quiz of one module share this key, since they all
/// rewrite the same progress entry.
pub fn submission_lock_key(user_id: &str, module_id: &str) -> String {
    format!("lock:module_progress:{}:{}", user_id, module_id)
}
