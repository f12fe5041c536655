use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::QUIZ_SUBMISSIONS_TOTAL;
use crate::models::quiz::{ModuleProgress, Quiz, QuizResult};
use crate::repositories::{
    submission_lock_key, MongoQuizStore, ProgressRepository, QuizRepository,
    RedisSubmissionLock, ResultRepository, SubmissionLock, UpsertedResult,
};
use crate::services::quiz_scoring::{count_correct, merge_result, score_submission, QuizError, Score};
use crate::services::AppState;
use crate::utils::retry::{retry_while, RetryConfig};

/// Upper bound on how long one submission may hold its lock.
const SUBMISSION_LOCK_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub result: QuizResult,
    pub created: bool,
    /// Updated module entry, `None` when the user has no patient profile
    pub progress: Option<ModuleProgress>,
}

/// Grades a submission and records its result and the learner's module progress.
pub struct QuizSubmissionService {
    quizzes: Arc<dyn QuizRepository>,
    results: Arc<dyn ResultRepository>,
    progress: Arc<dyn ProgressRepository>,
    lock: Arc<dyn SubmissionLock>,
    lock_wait: RetryConfig,
}

impl QuizSubmissionService {
    pub fn new(state: &AppState) -> Self {
        let store = Arc::new(MongoQuizStore::new(state.mongo.clone()));
        Self::from_parts(
            store.clone(),
            store.clone(),
            store,
            Arc::new(RedisSubmissionLock::new(state.redis.clone())),
        )
    }

    pub fn from_parts(
        quizzes: Arc<dyn QuizRepository>,
        results: Arc<dyn ResultRepository>,
        progress: Arc<dyn ProgressRepository>,
        lock: Arc<dyn SubmissionLock>,
    ) -> Self {
        Self {
            quizzes,
            results,
            progress,
            lock,
            lock_wait: RetryConfig::lock_wait(),
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: RetryConfig) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub async fn submit(
        &self,
        user_id: &str,
        quiz_id: &str,
        answers: &BTreeMap<String, String>,
    ) -> Result<SubmissionOutcome, QuizError> {
        let quiz = self
            .quizzes
            .find_quiz(quiz_id)
            .await?
            .ok_or(QuizError::QuizNotFound)?;

        if answers.is_empty() {
            return Err(QuizError::NoAnswers);
        }

        let correct = count_correct(&quiz, answers);
        let score = score_submission(correct, quiz.questions.len(), quiz.passing_score)?;

        let key = submission_lock_key(user_id, &quiz.module_id);
        let token = self.acquire_lock(&key).await.inspect_err(|_| {
            QUIZ_SUBMISSIONS_TOTAL.with_label_values(&["conflict"]).inc();
        })?;

        let outcome = self.record(user_id, &quiz, score).await;

        if let Err(e) = self.lock.release(&key, &token).await {
            // The lock expires on its own; the submission itself succeeded or failed already.
            tracing::warn!("Failed to release submission lock {}: {:#}", key, e);
        }

        let outcome = outcome?;
        let label = if outcome.result.passed { "passed" } else { "failed" };
        QUIZ_SUBMISSIONS_TOTAL.with_label_values(&[label]).inc();

        tracing::info!(
            user_id = %user_id,
            quiz_id = %quiz_id,
            score = outcome.result.score,
            passed = outcome.result.passed,
            created = outcome.created,
            "Quiz submission recorded ({}/{} correct)",
            correct,
            quiz.questions.len()
        );

        Ok(outcome)
    }

    /// Waits briefly for a concurrent submission in the same module to finish.
    /// Only a busy lock is retried; Redis errors surface immediately.
    async fn acquire_lock(&self, key: &str) -> Result<String, QuizError> {
        retry_while(
            &self.lock_wait,
            |e| matches!(e, QuizError::SubmissionInProgress),
            || async {
                self.lock
                    .try_acquire(key, SUBMISSION_LOCK_TTL)
                    .await
                    .map_err(QuizError::Storage)?
                    .ok_or(QuizError::SubmissionInProgress)
            },
        )
        .await
    }

    async fn record(
        &self,
        user_id: &str,
        quiz: &Quiz,
        score: Score,
    ) -> Result<SubmissionOutcome, QuizError> {
        let UpsertedResult { result, created } =
            self.results.upsert_result(user_id, quiz, score).await?;

        let progress = if self.progress.has_patient_profile(user_id).await? {
            let module_quiz_ids = self.quizzes.quiz_ids_for_module(&quiz.module_id).await?;
            let attempted = self
                .results
                .attempted_quiz_ids(user_id, &module_quiz_ids)
                .await?;

            let mut progress = self.progress.load_progress(user_id).await?;
            let entry = merge_result(&mut progress, &result, &module_quiz_ids, &attempted);
            self.progress
                .save_module_progress(user_id, &result.module_id, &entry)
                .await?;
            Some(entry)
        } else {
            tracing::debug!("User {} has no patient profile, progress not tracked", user_id);
            None
        };

        Ok(SubmissionOutcome {
            result,
            created,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{ProgressMap, QuizOption, QuizQuestion};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemory {
        quizzes: Vec<Quiz>,
        patients: BTreeSet<String>,
        results: Mutex<Vec<QuizResult>>,
        progress: Mutex<BTreeMap<(String, String), ModuleProgress>>,
        locks: Mutex<BTreeMap<String, String>>,
        /// Stretches the gap between reading and writing progress.
        save_delay: Option<Duration>,
    }

    #[async_trait]
    impl QuizRepository for InMemory {
        async fn find_quiz(&self, quiz_id: &str) -> anyhow::Result<Option<Quiz>> {
            Ok(self.quizzes.iter().find(|q| q.id == quiz_id).cloned())
        }

        async fn quiz_ids_for_module(&self, module_id: &str) -> anyhow::Result<BTreeSet<String>> {
            Ok(self
                .quizzes
                .iter()
                .filter(|q| q.module_id == module_id)
                .map(|q| q.id.clone())
                .collect())
        }
    }

    #[async_trait]
    impl ResultRepository for InMemory {
        async fn upsert_result(
            &self,
            user_id: &str,
            quiz: &Quiz,
            score: Score,
        ) -> anyhow::Result<UpsertedResult> {
            let mut results = self.results.lock().unwrap();
            if let Some(existing) = results
                .iter_mut()
                .find(|r| r.user_id == user_id && r.quiz_id == quiz.id)
            {
                existing.score = score.score;
                existing.passed = score.passed;
                return Ok(UpsertedResult {
                    result: existing.clone(),
                    created: false,
                });
            }
            let result = QuizResult {
                id: format!("result-{}", results.len() + 1),
                user_id: user_id.to_string(),
                quiz_id: quiz.id.clone(),
                module_id: quiz.module_id.clone(),
                quiz_title: quiz.title.clone(),
                score: score.score,
                passed: score.passed,
                completed_at: Utc::now(),
            };
            results.push(result.clone());
            Ok(UpsertedResult {
                result,
                created: true,
            })
        }

        async fn attempted_quiz_ids(
            &self,
            user_id: &str,
            quiz_ids: &BTreeSet<String>,
        ) -> anyhow::Result<BTreeSet<String>> {
            Ok(self
                .results
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id && quiz_ids.contains(&r.quiz_id))
                .map(|r| r.quiz_id.clone())
                .collect())
        }
    }

    #[async_trait]
    impl ProgressRepository for InMemory {
        async fn has_patient_profile(&self, user_id: &str) -> anyhow::Result<bool> {
            Ok(self.patients.contains(user_id))
        }

        async fn load_progress(&self, user_id: &str) -> anyhow::Result<ProgressMap> {
            Ok(self
                .progress
                .lock()
                .unwrap()
                .iter()
                .filter(|((user, _), _)| user == user_id)
                .map(|((_, module), entry)| (module.clone(), entry.clone()))
                .collect())
        }

        async fn save_module_progress(
            &self,
            user_id: &str,
            module_id: &str,
            progress: &ModuleProgress,
        ) -> anyhow::Result<()> {
            if let Some(delay) = self.save_delay {
                tokio::time::sleep(delay).await;
            }
            let mut stored = self.progress.lock().unwrap();
            let entry = stored
                .entry((user_id.to_string(), module_id.to_string()))
                .or_default();
            let completed = entry.completed || progress.completed;
            *entry = ModuleProgress {
                completed,
                ..progress.clone()
            };
            Ok(())
        }
    }

    #[async_trait]
    impl SubmissionLock for InMemory {
        async fn try_acquire(&self, key: &str, _ttl: Duration) -> anyhow::Result<Option<String>> {
            let mut locks = self.locks.lock().unwrap();
            if locks.contains_key(key) {
                return Ok(None);
            }
            locks.insert(key.to_string(), "token".to_string());
            Ok(Some("token".to_string()))
        }

        async fn release(&self, key: &str, token: &str) -> anyhow::Result<()> {
            let mut locks = self.locks.lock().unwrap();
            if locks.get(key).map(String::as_str) == Some(token) {
                locks.remove(key);
            }
            Ok(())
        }
    }

    fn quiz(id: &str, module_id: &str, question_count: usize) -> Quiz {
        Quiz {
            id: id.to_string(),
            module_id: module_id.to_string(),
            title: format!("Quiz {}", id),
            description: String::new(),
            passing_score: 70,
            questions: (1..=question_count)
                .map(|n| QuizQuestion {
                    id: format!("{}-q{}", id, n),
                    question_text: format!("Question {}", n),
                    order: n as i32,
                    options: vec![
                        QuizOption {
                            id: format!("{}-q{}-ok", id, n),
                            option_text: "ok".to_string(),
                            is_correct: true,
                        },
                        QuizOption {
                            id: format!("{}-q{}-ko", id, n),
                            option_text: "ko".to_string(),
                            is_correct: false,
                        },
                    ],
                })
                .collect(),
        }
    }

    /// Answers `right` questions correctly and the rest wrong.
    fn answers(quiz: &Quiz, right: usize) -> BTreeMap<String, String> {
        quiz.questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let suffix = if i < right { "ok" } else { "ko" };
                (q.id.clone(), format!("{}-{}", q.id, suffix))
            })
            .collect()
    }

    fn fixture() -> InMemory {
        InMemory {
            quizzes: vec![quiz("A", "m1", 4), quiz("B", "m1", 2), quiz("empty", "m2", 0)],
            patients: ["patient".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    fn store() -> Arc<InMemory> {
        Arc::new(fixture())
    }

    fn service(store: &Arc<InMemory>) -> QuizSubmissionService {
        QuizSubmissionService::from_parts(store.clone(), store.clone(), store.clone(), store.clone())
            .with_lock_wait(RetryConfig {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                jitter_max: None,
            })
    }

    #[tokio::test]
    async fn resubmission_overwrites_score_and_keeps_timestamp() {
        let store = store();
        let service = service(&store);
        let quiz_a = quiz("A", "m1", 4);

        let first = service.submit("patient", "A", &answers(&quiz_a, 3)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.result.score, 75);
        assert!(first.result.passed);

        let second = service.submit("patient", "A", &answers(&quiz_a, 1)).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.result.score, 25);
        assert!(!second.result.passed);
        assert_eq!(second.result.id, first.result.id);
        assert_eq!(second.result.completed_at, first.result.completed_at);

        assert_eq!(store.results.lock().unwrap().len(), 1);
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn module_completes_after_every_quiz_attempted() {
        let store = store();
        let service = service(&store);

        let after_a = service
            .submit("patient", "A", &answers(&quiz("A", "m1", 4), 0))
            .await
            .unwrap();
        let entry = after_a.progress.unwrap();
        assert!(!entry.completed);
        assert_eq!(entry.score, 0);

        let after_b = service
            .submit("patient", "B", &answers(&quiz("B", "m1", 2), 2))
            .await
            .unwrap();
        let entry = after_b.progress.unwrap();
        assert!(entry.completed);
        assert_eq!(entry.score, 100);
        assert!(entry.passed);
    }

    #[tokio::test]
    async fn users_without_patient_profile_get_no_progress() {
        let store = store();
        let service = service(&store);

        let outcome = service
            .submit("physician", "A", &answers(&quiz("A", "m1", 4), 4))
            .await
            .unwrap();
        assert!(outcome.progress.is_none());
        assert!(store.progress.lock().unwrap().is_empty());
        assert_eq!(store.results.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_submissions_write_nothing() {
        let store = store();
        let service = service(&store);

        let err = service.submit("patient", "A", &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, QuizError::NoAnswers));

        let mut stray = BTreeMap::new();
        stray.insert("q".to_string(), "o".to_string());
        let err = service.submit("patient", "empty", &stray).await.unwrap_err();
        assert!(matches!(err, QuizError::NoQuestions));

        let err = service.submit("patient", "missing", &stray).await.unwrap_err();
        assert!(matches!(err, QuizError::QuizNotFound));

        assert!(store.results.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_submission_is_rejected() {
        let store = store();
        store.locks.lock().unwrap().insert(
            submission_lock_key("patient", "m1"),
            "someone-else".to_string(),
        );
        let service = service(&store);

        let err = service
            .submit("patient", "A", &answers(&quiz("A", "m1", 4), 4))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::SubmissionInProgress));
        assert!(store.results.lock().unwrap().is_empty());
        // Foreign lock left untouched
        assert_eq!(store.locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn quizzes_of_one_module_share_the_submission_lock() {
        let store = store();
        store.locks.lock().unwrap().insert(
            submission_lock_key("patient", "m1"),
            "someone-else".to_string(),
        );
        let service = service(&store);

        let err = service
            .submit("patient", "B", &answers(&quiz("B", "m1", 2), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::SubmissionInProgress));

        // Other modules are not blocked
        let mut stray = BTreeMap::new();
        stray.insert("q".to_string(), "o".to_string());
        let err = service.submit("patient", "empty", &stray).await.unwrap_err();
        assert!(matches!(err, QuizError::NoQuestions));
    }

    #[tokio::test]
    async fn overlapping_submissions_leave_module_completed() {
        let store = Arc::new(InMemory {
            save_delay: Some(Duration::from_millis(20)),
            ..fixture()
        });
        let service = service(&store).with_lock_wait(RetryConfig {
            max_attempts: 50,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(5),
            jitter_max: None,
        });

        let answers_a = answers(&quiz("A", "m1", 4), 4);
        let answers_b = answers(&quiz("B", "m1", 2), 2);
        let (a, b) = tokio::join!(
            service.submit("patient", "A", &answers_a),
            service.submit("patient", "B", &answers_b),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.progress.lock().unwrap();
        let entry = &stored[&("patient".to_string(), "m1".to_string())];
        assert!(entry.completed);
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_is_never_cleared_by_a_later_save() {
        let store = store();
        let done = ModuleProgress {
            score: 100,
            passed: true,
            date: Some("2024-05-01".to_string()),
            completed: true,
        };
        store.save_module_progress("patient", "m1", &done).await.unwrap();

        let stale = ModuleProgress {
            score: 40,
            passed: false,
            completed: false,
            ..done
        };
        store.save_module_progress("patient", "m1", &stale).await.unwrap();

        let progress = store.load_progress("patient").await.unwrap();
        assert!(progress["m1"].completed);
        assert_eq!(progress["m1"].score, 40);
    }
}
