use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::bson_datetime_as_chrono;

pub const DEFAULT_PASSING_SCORE: i32 = 70;

/// Quiz with its embedded questions and options ("quizzes")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_passing_score")]
    pub passing_score: i32,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

fn default_passing_score() -> i32 {
    DEFAULT_PASSING_SCORE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub question_text: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub options: Vec<QuizOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl Quiz {
    /// Questions in display order.
    pub fn ordered_questions(&self) -> Vec<&QuizQuestion> {
        let mut questions: Vec<&QuizQuestion> = self.questions.iter().collect();
        questions.sort_by_key(|q| q.order);
        questions
    }
}

/// Quiz as shown to learners: option correctness is withheld.
#[derive(Debug, Serialize)]
pub struct PublicQuiz {
    pub id: String,
    pub module: String,
    pub title: String,
    pub description: String,
    pub passing_score: i32,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub question_text: String,
    pub order: i32,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: String,
    pub option_text: String,
}

impl From<&QuizQuestion> for PublicQuestion {
    fn from(question: &QuizQuestion) -> Self {
        PublicQuestion {
            id: question.id.clone(),
            question_text: question.question_text.clone(),
            order: question.order,
            options: question
                .options
                .iter()
                .map(|o| PublicOption {
                    id: o.id.clone(),
                    option_text: o.option_text.clone(),
                })
                .collect(),
        }
    }
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        PublicQuiz {
            id: quiz.id.clone(),
            module: quiz.module_id.clone(),
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            passing_score: quiz.passing_score,
            questions: quiz
                .ordered_questions()
                .into_iter()
                .map(PublicQuestion::from)
                .collect(),
        }
    }
}

/// Authoring view of a quiz, correctness included.
#[derive(Debug, Serialize)]
pub struct AdminQuiz {
    pub id: String,
    pub module: String,
    pub title: String,
    pub description: String,
    pub passing_score: i32,
    pub questions: Vec<QuizQuestion>,
}

impl From<Quiz> for AdminQuiz {
    fn from(mut quiz: Quiz) -> Self {
        quiz.questions.sort_by_key(|q| q.order);
        AdminQuiz {
            id: quiz.id,
            module: quiz.module_id,
            title: quiz.title,
            description: quiz.description,
            passing_score: quiz.passing_score,
            questions: quiz.questions,
        }
    }
}

/// Outcome of one user's latest attempt at a quiz ("quiz_results").
/// Unique per (user_id, quiz_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub module_id: String,
    #[serde(default)]
    pub quiz_title: String,
    pub score: i32,
    pub passed: bool,
    /// Set on first submission only
    #[serde(with = "bson_datetime_as_chrono")]
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct QuizResultResponse {
    pub id: String,
    pub user: String,
    pub quiz: String,
    pub quiz_title: String,
    pub score: i32,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

impl From<QuizResult> for QuizResultResponse {
    fn from(result: QuizResult) -> Self {
        QuizResultResponse {
            id: result.id,
            user: result.user_id,
            quiz: result.quiz_id,
            quiz_title: result.quiz_title,
            score: result.score,
            passed: result.passed,
            completed_at: result.completed_at,
        }
    }
}

/// Body of a successful `POST /first-aid/quizzes/{id}/submit`.
#[derive(Debug, Serialize)]
pub struct SubmitQuizResponse {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub score: i32,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
    /// False when an earlier result was overwritten
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ModuleProgress>,
}

impl SubmitQuizResponse {
    pub fn new(result: QuizResult, created: bool, progress: Option<ModuleProgress>) -> Self {
        Self {
            id: result.id,
            user_id: result.user_id,
            quiz_id: result.quiz_id,
            quiz_title: result.quiz_title,
            score: result.score,
            passed: result.passed,
            completed_at: result.completed_at,
            created,
            progress,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

/// Per-module entry of a learner's progress mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModuleProgress {
    pub score: i32,
    pub passed: bool,
    /// Day of the latest result's completion timestamp, `YYYY-MM-DD`
    pub date: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// module_id -> progress entry
pub type ProgressMap = BTreeMap<String, ModuleProgress>;

/// Storage row of the progress table ("first_aid_progress"), `_id` = "{user_id}:{module_id}".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub score: i32,
    pub passed: bool,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn key(user_id: &str, module_id: &str) -> String {
        format!("{}:{}", user_id, module_id)
    }

    pub fn progress(&self) -> ModuleProgress {
        ModuleProgress {
            score: self.score,
            passed: self.passed,
            date: self.date.clone(),
            completed: self.completed,
        }
    }
}

/// Row of `GET /first-aid/results/summary`.
#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub module_id: String,
    pub module_title: String,
    pub module_category: String,
    pub module_difficulty: &'static str,
    pub completed: bool,
    pub score: i32,
    pub passed: bool,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, max = 100, message = "Passing score must be between 0 and 100"))]
    #[serde(default = "default_passing_score")]
    pub passing_score: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100, message = "Passing score must be between 0 and 100"))]
    pub passing_score: Option<i32>,
}

/// Full replacement of a quiz's question set.
#[derive(Debug, Deserialize, Validate)]
pub struct ReplaceQuestionsRequest {
    #[validate(nested)]
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionInput {
    /// Existing question id to keep; a new id is generated when absent
    pub id: Option<String>,
    #[validate(length(min = 1, message = "Question text is required"))]
    pub question_text: String,
    #[serde(default)]
    pub order: i32,
    #[validate(nested)]
    pub options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OptionInput {
    pub id: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Option text must be between 1 and 255 characters"))]
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, order: i32) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            question_text: format!("question {}", id),
            order,
            options: vec![QuizOption {
                id: format!("{}-a", id),
                option_text: "a".to_string(),
                is_correct: true,
            }],
        }
    }

    #[test]
    fn public_quiz_hides_correctness_and_orders_questions() {
        let quiz = Quiz {
            id: "quiz".to_string(),
            module_id: "module".to_string(),
            title: "CPR".to_string(),
            description: String::new(),
            passing_score: 70,
            questions: vec![question("q2", 2), question("q1", 1)],
        };

        let public = serde_json::to_value(PublicQuiz::from(&quiz)).unwrap();
        assert_eq!(public["questions"][0]["id"], "q1");
        assert!(public["questions"][0]["options"][0]
            .get("is_correct")
            .is_none());
    }

    #[test]
    fn missing_passing_score_defaults_to_seventy() {
        let quiz: Quiz = serde_json::from_value(serde_json::json!({
            "_id": "quiz",
            "module_id": "module",
            "title": "Bleeding"
        }))
        .unwrap();
        assert_eq!(quiz.passing_score, DEFAULT_PASSING_SCORE);
        assert!(quiz.questions.is_empty());
    }

    #[test]
    fn submit_request_tolerates_missing_answers() {
        let req: SubmitQuizRequest = serde_json::from_str("{}").unwrap();
        assert!(req.answers.is_empty());
    }
}
