use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::{Collection, Database};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::quiz_scoring::validate_question_set;
use super::{search_regex, sort_from_ordering, ServiceError, ServiceResult};
use crate::metrics::track_db_operation;
use crate::models::first_aid::{
    ContentRequest, ContentResponse, ContentType, ContentTypeQuery, CreateModuleRequest,
    Difficulty, FirstAidContent, FirstAidModule, ListModulesQuery, ModuleResponse,
    UpdateContentRequest, UpdateModuleRequest,
};
use crate::models::quiz::{
    AdminQuiz, CreateQuizRequest, ModuleSummary, ProgressMap, PublicQuestion, PublicQuiz, Quiz,
    QuizOption, QuizQuestion, QuizResult, QuizResultResponse, ReplaceQuestionsRequest,
    UpdateQuizRequest,
};
use crate::repositories::{MongoQuizStore, ProgressRepository};
use crate::utils::time::chrono_to_bson;

const MODULE_ORDERING_FIELDS: [&str; 4] = ["order", "title", "difficulty_level", "created_at"];

/// First-aid catalogue, learner results and admin authoring.
pub struct FirstAidService {
    mongo: Database,
}

impl FirstAidService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn modules(&self) -> Collection<FirstAidModule> {
        self.mongo.collection("first_aid_modules")
    }

    fn contents(&self) -> Collection<FirstAidContent> {
        self.mongo.collection("first_aid_contents")
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.mongo.collection("quizzes")
    }

    fn quiz_results(&self) -> Collection<QuizResult> {
        self.mongo.collection("quiz_results")
    }

    // ---- catalogue -------------------------------------------------------

    pub async fn list_modules(&self, query: ListModulesQuery) -> ServiceResult<Vec<ModuleResponse>> {
        let mut filter = doc! { "is_published": true };
        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            let regex = search_regex(&search);
            filter.insert(
                "$or",
                vec![
                    doc! { "title": &regex },
                    doc! { "description": &regex },
                    doc! { "category": &regex },
                ],
            );
        }
        let sort = sort_from_ordering(
            query.ordering.as_deref(),
            &MODULE_ORDERING_FIELDS,
            doc! { "order": 1, "title": 1 },
        );

        let modules = self.find_modules(filter, sort).await?;
        self.hydrate(modules).await
    }

    pub async fn get_module(&self, module_id: &str) -> ServiceResult<ModuleResponse> {
        let module = self.published_module(module_id).await?;
        let mut hydrated = self.hydrate(vec![module]).await?;
        hydrated
            .pop()
            .ok_or_else(|| ServiceError::not_found("Module not found"))
    }

    pub async fn module_contents(&self, module_id: &str) -> ServiceResult<Vec<ContentResponse>> {
        self.published_module(module_id).await?;
        let contents = self
            .find_contents(doc! { "module_id": module_id }, doc! { "order": 1 })
            .await?;
        Ok(contents.into_iter().map(ContentResponse::from).collect())
    }

    pub async fn module_quizzes(&self, module_id: &str) -> ServiceResult<Vec<PublicQuiz>> {
        self.published_module(module_id).await?;
        let quizzes = self.find_quizzes(doc! { "module_id": module_id }).await?;
        Ok(quizzes.iter().map(PublicQuiz::from).collect())
    }

    /// Published modules grouped under their category.
    pub async fn modules_by_category(&self) -> ServiceResult<BTreeMap<String, Vec<ModuleResponse>>> {
        let modules = self
            .find_modules(doc! { "is_published": true }, doc! { "order": 1, "title": 1 })
            .await?;
        let mut grouped: BTreeMap<String, Vec<ModuleResponse>> = BTreeMap::new();
        for module in self.hydrate(modules).await? {
            grouped.entry(module.category.clone()).or_default().push(module);
        }
        Ok(grouped)
    }

    /// Published modules grouped under each difficulty label. Every label is present.
    pub async fn modules_by_difficulty(
        &self,
    ) -> ServiceResult<BTreeMap<&'static str, Vec<ModuleResponse>>> {
        let modules = self
            .find_modules(doc! { "is_published": true }, doc! { "order": 1, "title": 1 })
            .await?;
        let mut grouped: BTreeMap<&'static str, Vec<ModuleResponse>> = Difficulty::ALL
            .iter()
            .map(|d| (d.label(), Vec::new()))
            .collect();
        for module in self.hydrate(modules).await? {
            if let Some(difficulty) = Difficulty::from_level(module.difficulty_level) {
                grouped.entry(difficulty.label()).or_default().push(module);
            }
        }
        Ok(grouped)
    }

    pub async fn list_contents(&self) -> ServiceResult<Vec<ContentResponse>> {
        let module_ids = self.published_module_ids().await?;
        let contents = self
            .find_contents(
                doc! { "module_id": { "$in": module_ids } },
                doc! { "order": 1 },
            )
            .await?;
        Ok(contents.into_iter().map(ContentResponse::from).collect())
    }

    pub async fn get_content(&self, content_id: &str) -> ServiceResult<ContentResponse> {
        let content = self.content(content_id).await?;
        self.published_module(&content.module_id)
            .await
            .map_err(|_| ServiceError::not_found("Content not found"))?;
        Ok(content.into())
    }

    pub async fn contents_by_module(
        &self,
        module_id: Option<String>,
    ) -> ServiceResult<Vec<ContentResponse>> {
        let module_id = required_param(module_id, "module_id")?;
        self.module_contents(&module_id).await
    }

    pub async fn contents_by_type(&self, query: ContentTypeQuery) -> ServiceResult<Vec<ContentResponse>> {
        let raw_type = required_param(query.content_type, "type")?;
        let content_type: ContentType = raw_type.parse().map_err(ServiceError::BadRequest)?;

        let contents = match query.module_id.filter(|id| !id.is_empty()) {
            Some(module_id) => {
                self.published_module(&module_id).await?;
                self.find_contents(
                    doc! { "module_id": module_id, "content_type": content_type.as_str() },
                    doc! { "order": 1 },
                )
                .await?
            }
            None => {
                // Keep module order first, then the content's own order
                let modules = self
                    .find_modules(doc! { "is_published": true }, doc! { "order": 1, "title": 1 })
                    .await?;
                let rank: HashMap<String, usize> = modules
                    .iter()
                    .enumerate()
                    .map(|(index, m)| (m.id.clone(), index))
                    .collect();
                let ids: Vec<String> = rank.keys().cloned().collect();
                let mut contents = self
                    .find_contents(
                        doc! { "module_id": { "$in": ids }, "content_type": content_type.as_str() },
                        doc! { "order": 1 },
                    )
                    .await?;
                contents.sort_by_key(|c| (rank.get(&c.module_id).copied(), c.order));
                contents
            }
        };

        Ok(contents.into_iter().map(ContentResponse::from).collect())
    }

    pub async fn list_quizzes(&self) -> ServiceResult<Vec<PublicQuiz>> {
        let module_ids = self.published_module_ids().await?;
        let quizzes = self
            .find_quizzes(doc! { "module_id": { "$in": module_ids } })
            .await?;
        Ok(quizzes.iter().map(PublicQuiz::from).collect())
    }

    /// Quiz of a published module; anything else is reported as missing.
    pub async fn published_quiz(&self, quiz_id: &str) -> ServiceResult<Quiz> {
        let quiz = self.quiz(quiz_id).await?;
        self.published_module(&quiz.module_id)
            .await
            .map_err(|_| ServiceError::not_found("Quiz not found"))?;
        Ok(quiz)
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> ServiceResult<PublicQuiz> {
        Ok(PublicQuiz::from(&self.published_quiz(quiz_id).await?))
    }

    pub async fn quiz_questions(&self, quiz_id: &str) -> ServiceResult<Vec<PublicQuestion>> {
        let quiz = self.published_quiz(quiz_id).await?;
        Ok(quiz
            .ordered_questions()
            .into_iter()
            .map(PublicQuestion::from)
            .collect())
    }

    pub async fn quizzes_by_module(&self, module_id: Option<String>) -> ServiceResult<Vec<PublicQuiz>> {
        let module_id = required_param(module_id, "module_id")?;
        self.module_quizzes(&module_id).await
    }

    // ---- learner results -------------------------------------------------

    pub async fn results(&self, user_id: &str) -> ServiceResult<Vec<QuizResultResponse>> {
        self.find_results(doc! { "user_id": user_id }).await
    }

    pub async fn results_by_module(
        &self,
        user_id: &str,
        module_id: Option<String>,
    ) -> ServiceResult<Vec<QuizResultResponse>> {
        let module_id = required_param(module_id, "module_id")?;
        self.find_results(doc! { "user_id": user_id, "module_id": module_id })
            .await
    }

    /// One row per published module, merged with the learner's progress.
    /// Users without a patient profile get an empty list.
    pub async fn summary(&self, user_id: &str) -> ServiceResult<Vec<ModuleSummary>> {
        let store = MongoQuizStore::new(self.mongo.clone());
        if !store.has_patient_profile(user_id).await? {
            return Ok(Vec::new());
        }
        let progress = store.load_progress(user_id).await?;
        let modules = self
            .find_modules(doc! { "is_published": true }, doc! { "order": 1, "title": 1 })
            .await?;
        Ok(summarize(modules, &progress))
    }

    // ---- authoring -------------------------------------------------------

    pub async fn create_module(&self, req: CreateModuleRequest) -> ServiceResult<ModuleResponse> {
        let now = Utc::now();
        let module = FirstAidModule {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            description: req.description,
            category: req.category,
            difficulty_level: req.difficulty_level,
            order: req.order,
            is_published: req.is_published,
            created_at: now,
            updated_at: now,
        };

        track_db_operation("insert", "first_aid_modules", async {
            self.modules()
                .insert_one(&module)
                .await
                .context("Failed to insert module")
        })
        .await?;

        tracing::info!(module_id = %module.id, "First-aid module created");
        Ok(ModuleResponse::new(module, Vec::new(), Vec::new()))
    }

    pub async fn update_module(
        &self,
        module_id: &str,
        req: UpdateModuleRequest,
    ) -> ServiceResult<ModuleResponse> {
        let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };
        if let Some(title) = req.title {
            set.insert("title", title);
        }
        if let Some(description) = req.description {
            set.insert("description", description);
        }
        if let Some(category) = req.category {
            set.insert("category", category);
        }
        if let Some(level) = req.difficulty_level {
            set.insert("difficulty_level", level);
        }
        if let Some(order) = req.order {
            set.insert("order", order);
        }
        if let Some(is_published) = req.is_published {
            set.insert("is_published", is_published);
        }

        let result = self
            .modules()
            .update_one(doc! { "_id": module_id }, doc! { "$set": set })
            .await
            .context("Failed to update module")?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found("Module not found"));
        }

        let module = self.module(module_id).await?;
        let mut hydrated = self.hydrate(vec![module]).await?;
        hydrated
            .pop()
            .ok_or_else(|| ServiceError::not_found("Module not found"))
    }

    pub async fn add_content(
        &self,
        module_id: &str,
        req: ContentRequest,
    ) -> ServiceResult<ContentResponse> {
        self.module(module_id).await?;

        let content = FirstAidContent {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            title: req.title,
            content_type: req.content_type,
            content: req.content,
            file_url: req.file_url,
            file_size: req.file_size,
            order: req.order,
        };

        self.contents()
            .insert_one(&content)
            .await
            .context("Failed to insert content")?;

        Ok(content.into())
    }

    pub async fn update_content(
        &self,
        content_id: &str,
        req: UpdateContentRequest,
    ) -> ServiceResult<ContentResponse> {
        let mut set = Document::new();
        if let Some(title) = req.title {
            set.insert("title", title);
        }
        if let Some(content_type) = req.content_type {
            set.insert("content_type", content_type.as_str());
        }
        if let Some(content) = req.content {
            set.insert("content", content);
        }
        if let Some(file_url) = req.file_url {
            set.insert("file_url", file_url);
        }
        if let Some(file_size) = req.file_size {
            set.insert("file_size", file_size);
        }
        if let Some(order) = req.order {
            set.insert("order", order);
        }

        if !set.is_empty() {
            let result = self
                .contents()
                .update_one(doc! { "_id": content_id }, doc! { "$set": set })
                .await
                .context("Failed to update content")?;
            if result.matched_count == 0 {
                return Err(ServiceError::not_found("Content not found"));
            }
        }

        Ok(self.content(content_id).await?.into())
    }

    pub async fn delete_content(&self, content_id: &str) -> ServiceResult<()> {
        let result = self
            .contents()
            .delete_one(doc! { "_id": content_id })
            .await
            .context("Failed to delete content")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Content not found"));
        }
        Ok(())
    }

    pub async fn admin_quiz(&self, quiz_id: &str) -> ServiceResult<AdminQuiz> {
        Ok(self.quiz(quiz_id).await?.into())
    }

    pub async fn create_quiz(&self, module_id: &str, req: CreateQuizRequest) -> ServiceResult<AdminQuiz> {
        self.module(module_id).await?;

        let quiz = Quiz {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            title: req.title,
            description: req.description,
            passing_score: req.passing_score,
            questions: Vec::new(),
        };

        self.quizzes()
            .insert_one(&quiz)
            .await
            .context("Failed to insert quiz")?;

        tracing::info!(quiz_id = %quiz.id, module_id = %module_id, "Quiz created");
        Ok(quiz.into())
    }

    pub async fn update_quiz(&self, quiz_id: &str, req: UpdateQuizRequest) -> ServiceResult<AdminQuiz> {
        let mut set = Document::new();
        if let Some(title) = req.title {
            set.insert("title", title);
        }
        if let Some(description) = req.description {
            set.insert("description", description);
        }
        if let Some(passing_score) = req.passing_score {
            set.insert("passing_score", passing_score);
        }

        if !set.is_empty() {
            let result = self
                .quizzes()
                .update_one(doc! { "_id": quiz_id }, doc! { "$set": set })
                .await
                .context("Failed to update quiz")?;
            if result.matched_count == 0 {
                return Err(ServiceError::not_found("Quiz not found"));
            }
        }

        self.admin_quiz(quiz_id).await
    }

    /// Replaces the whole question set. Existing question/option ids are kept when supplied.
    pub async fn replace_questions(
        &self,
        quiz_id: &str,
        req: ReplaceQuestionsRequest,
    ) -> ServiceResult<AdminQuiz> {
        validate_question_set(&req.questions)
            .map_err(|e| ServiceError::bad_request(e.to_string()))?;

        let questions: Vec<QuizQuestion> = req
            .questions
            .into_iter()
            .map(|q| QuizQuestion {
                id: q.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                question_text: q.question_text,
                order: q.order,
                options: q
                    .options
                    .into_iter()
                    .map(|o| QuizOption {
                        id: o.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                        option_text: o.option_text,
                        is_correct: o.is_correct,
                    })
                    .collect(),
            })
            .collect();

        let encoded = to_bson(&questions).context("Failed to encode questions")?;
        let result = track_db_operation("update", "quizzes", async {
            self.quizzes()
                .update_one(doc! { "_id": quiz_id }, doc! { "$set": { "questions": encoded } })
                .await
                .context("Failed to replace questions")
        })
        .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found("Quiz not found"));
        }

        tracing::info!(quiz_id = %quiz_id, count = questions.len(), "Quiz questions replaced");
        self.admin_quiz(quiz_id).await
    }

    // ---- lookups ---------------------------------------------------------

    async fn module(&self, module_id: &str) -> ServiceResult<FirstAidModule> {
        self.modules()
            .find_one(doc! { "_id": module_id })
            .await
            .context("Failed to query module")?
            .ok_or_else(|| ServiceError::not_found("Module not found"))
    }

    async fn published_module(&self, module_id: &str) -> ServiceResult<FirstAidModule> {
        self.modules()
            .find_one(doc! { "_id": module_id, "is_published": true })
            .await
            .context("Failed to query module")?
            .ok_or_else(|| ServiceError::not_found("Module not found"))
    }

    async fn published_module_ids(&self) -> ServiceResult<Vec<String>> {
        let ids = self
            .modules()
            .distinct("_id", doc! { "is_published": true })
            .await
            .context("Failed to list published modules")?;
        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }

    async fn content(&self, content_id: &str) -> ServiceResult<FirstAidContent> {
        self.contents()
            .find_one(doc! { "_id": content_id })
            .await
            .context("Failed to query content")?
            .ok_or_else(|| ServiceError::not_found("Content not found"))
    }

    async fn quiz(&self, quiz_id: &str) -> ServiceResult<Quiz> {
        self.quizzes()
            .find_one(doc! { "_id": quiz_id })
            .await
            .context("Failed to query quiz")?
            .ok_or_else(|| ServiceError::not_found("Quiz not found"))
    }

    async fn find_modules(&self, filter: Document, sort: Document) -> ServiceResult<Vec<FirstAidModule>> {
        let modules = track_db_operation("find", "first_aid_modules", async {
            self.modules()
                .find(filter)
                .sort(sort)
                .await
                .context("Failed to query modules")?
                .try_collect()
                .await
                .context("Failed to read modules")
        })
        .await?;
        Ok(modules)
    }

    async fn find_contents(&self, filter: Document, sort: Document) -> ServiceResult<Vec<FirstAidContent>> {
        Ok(self
            .contents()
            .find(filter)
            .sort(sort)
            .await
            .context("Failed to query contents")?
            .try_collect()
            .await
            .context("Failed to read contents")?)
    }

    async fn find_quizzes(&self, filter: Document) -> ServiceResult<Vec<Quiz>> {
        Ok(self
            .quizzes()
            .find(filter)
            .sort(doc! { "title": 1 })
            .await
            .context("Failed to query quizzes")?
            .try_collect()
            .await
            .context("Failed to read quizzes")?)
    }

    async fn find_results(&self, filter: Document) -> ServiceResult<Vec<QuizResultResponse>> {
        let results: Vec<QuizResult> = self
            .quiz_results()
            .find(filter)
            .sort(doc! { "completed_at": -1 })
            .await
            .context("Failed to query quiz results")?
            .try_collect()
            .await
            .context("Failed to read quiz results")?;
        Ok(results.into_iter().map(QuizResultResponse::from).collect())
    }

    /// Attaches contents and learner-facing quizzes to each module, two queries in total.
    async fn hydrate(&self, modules: Vec<FirstAidModule>) -> ServiceResult<Vec<ModuleResponse>> {
        if modules.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = modules.iter().map(|m| m.id.clone()).collect();

        let mut contents = group_by_module(
            self.find_contents(doc! { "module_id": { "$in": ids.clone() } }, doc! { "order": 1 })
                .await?,
            |c| &c.module_id,
        );
        let mut quizzes = group_by_module(
            self.find_quizzes(doc! { "module_id": { "$in": ids } }).await?,
            |q| &q.module_id,
        );

        Ok(modules
            .into_iter()
            .map(|module| {
                let module_contents = contents.remove(&module.id).unwrap_or_default();
                let module_quizzes = quizzes
                    .remove(&module.id)
                    .unwrap_or_default()
                    .iter()
                    .map(PublicQuiz::from)
                    .collect();
                ModuleResponse::new(module, module_contents, module_quizzes)
            })
            .collect())
    }
}

fn required_param(value: Option<String>, name: &str) -> ServiceResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServiceError::bad_request(format!("The {} parameter is required", name)))
}

/// Buckets items by owning module, keeping their relative order.
fn group_by_module<T>(items: Vec<T>, module_of: impl Fn(&T) -> &String) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for item in items {
        grouped.entry(module_of(&item).clone()).or_default().push(item);
    }
    grouped
}

/// Summary rows for `modules`, defaulting modules the learner never touched.
fn summarize(modules: Vec<FirstAidModule>, progress: &ProgressMap) -> Vec<ModuleSummary> {
    modules
        .into_iter()
        .map(|module| {
            let entry = progress.get(&module.id).cloned().unwrap_or_default();
            ModuleSummary {
                module_difficulty: Difficulty::from_level(module.difficulty_level)
                    .map(|d| d.label())
                    .unwrap_or("Unknown"),
                module_id: module.id,
                module_title: module.title,
                module_category: module.category,
                completed: entry.completed,
                score: entry.score,
                passed: entry.passed,
                date: entry.date,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::ModuleProgress;

    fn module(id: &str, level: i32) -> FirstAidModule {
        let now = Utc::now();
        FirstAidModule {
            id: id.to_string(),
            title: format!("Module {}", id),
            description: String::new(),
            category: "trauma".to_string(),
            difficulty_level: level,
            order: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn summary_defaults_untouched_modules() {
        let mut progress = ProgressMap::new();
        progress.insert(
            "m1".to_string(),
            ModuleProgress {
                score: 80,
                passed: true,
                date: Some("2026-10-01".to_string()),
                completed: true,
            },
        );

        let rows = summarize(vec![module("m1", 2), module("m2", 1)], &progress);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].module_difficulty, "Intermediate");
        assert!(rows[0].completed);
        assert_eq!(rows[0].score, 80);
        assert_eq!(rows[1].module_id, "m2");
        assert!(!rows[1].completed);
        assert_eq!(rows[1].score, 0);
        assert!(!rows[1].passed);
        assert_eq!(rows[1].date, None);
    }

    #[test]
    fn grouping_keeps_order_within_a_module() {
        let items = vec![
            ("m1".to_string(), 1),
            ("m2".to_string(), 2),
            ("m1".to_string(), 3),
        ];
        let grouped = group_by_module(items, |(m, _)| m);
        assert_eq!(grouped["m1"], vec![("m1".to_string(), 1), ("m1".to_string(), 3)]);
        assert_eq!(grouped["m2"].len(), 1);
    }

    #[test]
    fn blank_parameters_are_missing() {
        assert!(matches!(
            required_param(Some("  ".to_string()), "module_id"),
            Err(ServiceError::BadRequest(_))
        ));
        assert_eq!(required_param(Some("m1".to_string()), "module_id").unwrap(), "m1");
    }
}
