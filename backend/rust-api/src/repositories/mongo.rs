use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{ProgressRepository, QuizRepository, ResultRepository, UpsertedResult};
use crate::metrics::track_db_operation;
use crate::models::quiz::{ModuleProgress, ProgressMap, ProgressRecord, Quiz, QuizResult};
use crate::models::user::PatientProfile;
use crate::services::quiz_scoring::Score;
use crate::utils::time::chrono_to_bson;

/// MongoDB side of the quiz flow: `quizzes`, `quiz_results`, `first_aid_progress`.
#[derive(Clone)]
pub struct MongoQuizStore {
    mongo: Database,
}

impl MongoQuizStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.mongo.collection("quizzes")
    }

    fn results(&self) -> Collection<QuizResult> {
        self.mongo.collection("quiz_results")
    }

    fn progress(&self) -> Collection<ProgressRecord> {
        self.mongo.collection("first_aid_progress")
    }
}

#[async_trait]
impl QuizRepository for MongoQuizStore {
    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>> {
        track_db_operation("find_one", "quizzes", async {
            self.quizzes()
                .find_one(doc! { "_id": quiz_id })
                .await
                .context("Failed to load quiz")
        })
        .await
    }

    async fn quiz_ids_for_module(&self, module_id: &str) -> Result<BTreeSet<String>> {
        let ids = self
            .quizzes()
            .distinct("_id", doc! { "module_id": module_id })
            .await
            .context("Failed to list module quizzes")?;

        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl ResultRepository for MongoQuizStore {
    async fn upsert_result(&self, user_id: &str, quiz: &Quiz, score: Score) -> Result<UpsertedResult> {
        let filter = doc! { "user_id": user_id, "quiz_id": &quiz.id };
        let update = doc! {
            "$set": {
                "score": score.score,
                "passed": score.passed,
                "quiz_title": &quiz.title,
                "module_id": &quiz.module_id,
            },
            "$setOnInsert": {
                "_id": Uuid::new_v4().to_string(),
                "completed_at": chrono_to_bson(Utc::now()),
            },
        };

        let outcome = track_db_operation("upsert", "quiz_results", async {
            self.results()
                .update_one(filter.clone(), update)
                .upsert(true)
                .await
                .context("Failed to upsert quiz result")
        })
        .await?;

        let result = self
            .results()
            .find_one(filter)
            .await
            .context("Failed to reload quiz result")?
            .ok_or_else(|| anyhow!("Quiz result vanished after upsert"))?;

        Ok(UpsertedResult {
            result,
            created: outcome.upserted_id.is_some(),
        })
    }

    async fn attempted_quiz_ids(
        &self,
        user_id: &str,
        quiz_ids: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let candidates: Vec<&str> = quiz_ids.iter().map(String::as_str).collect();
        let ids = self
            .results()
            .distinct(
                "quiz_id",
                doc! { "user_id": user_id, "quiz_id": { "$in": candidates } },
            )
            .await
            .context("Failed to list attempted quizzes")?;

        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for MongoQuizStore {
    async fn has_patient_profile(&self, user_id: &str) -> Result<bool> {
        let count = self
            .mongo
            .collection::<PatientProfile>("patient_profiles")
            .count_documents(doc! { "_id": user_id })
            .await
            .context("Failed to look up patient profile")?;
        Ok(count > 0)
    }

    async fn load_progress(&self, user_id: &str) -> Result<ProgressMap> {
        let records: Vec<ProgressRecord> = self
            .progress()
            .find(doc! { "user_id": user_id })
            .await
            .context("Failed to query progress")?
            .try_collect()
            .await
            .context("Failed to read progress")?;

        Ok(records
            .into_iter()
            .map(|record| (record.module_id.clone(), record.progress()))
            .collect())
    }

    async fn save_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
        progress: &ModuleProgress,
    ) -> Result<()> {
        // `$max` keeps completion sticky: false < true in BSON order.
        let update = doc! {
            "$set": {
                "user_id": user_id,
                "module_id": module_id,
                "score": progress.score,
                "passed": progress.passed,
                "date": progress.date.clone(),
                "updatedAt": chrono_to_bson(Utc::now()),
            },
            "$max": { "completed": progress.completed },
        };

        track_db_operation("upsert", "first_aid_progress", async {
            self.progress()
                .update_one(doc! { "_id": ProgressRecord::key(user_id, module_id) }, update)
                .upsert(true)
                .await
                .context("Failed to save module progress")
        })
        .await?;

        Ok(())
    }
}
