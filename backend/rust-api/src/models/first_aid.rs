use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::quiz::PublicQuiz;

/// First-aid training unit ("first_aid_modules")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstAidModule {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_difficulty() -> i32 {
    1
}

fn default_published() -> bool {
    true
}

/// The three difficulty bands a module can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Beginner = 1,
    Intermediate = 2,
    Advanced = 3,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    pub fn level(&self) -> i32 {
        *self as i32
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }

    pub fn from_level(level: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.level() == level)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Image,
    Audio,
    Text,
    Checklist,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
            ContentType::Text => "text",
            ContentType::Checklist => "checklist",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "video" => Ok(ContentType::Video),
            "image" => Ok(ContentType::Image),
            "audio" => Ok(ContentType::Audio),
            "text" => Ok(ContentType::Text),
            "checklist" => Ok(ContentType::Checklist),
            _ => Err(format!("Invalid content type: {}", value)),
        }
    }
}

/// Learning material attached to a module ("first_aid_contents")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstAidContent {
    #[serde(rename = "_id")]
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub file_url: Option<String>,
    /// Size of the attached file in KiB
    #[serde(default)]
    pub file_size: i32,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub id: String,
    pub module: String,
    pub title: String,
    pub content_type: ContentType,
    pub content: String,
    pub file_url: Option<String>,
    pub file_size: i32,
    pub order: i32,
}

impl From<FirstAidContent> for ContentResponse {
    fn from(content: FirstAidContent) -> Self {
        ContentResponse {
            id: content.id,
            module: content.module_id,
            title: content.title,
            content_type: content.content_type,
            content: content.content,
            file_url: content.file_url,
            file_size: content.file_size,
            order: content.order,
        }
    }
}

/// Module with its contents and (learner-facing) quizzes.
#[derive(Debug, Serialize)]
pub struct ModuleResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty_level: i32,
    pub order: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub contents: Vec<ContentResponse>,
    pub quizzes: Vec<PublicQuiz>,
}

impl ModuleResponse {
    pub fn new(
        module: FirstAidModule,
        contents: Vec<FirstAidContent>,
        quizzes: Vec<PublicQuiz>,
    ) -> Self {
        ModuleResponse {
            id: module.id,
            title: module.title,
            description: module.description,
            category: module.category,
            difficulty_level: module.difficulty_level,
            order: module.order,
            is_published: module.is_published,
            created_at: module.created_at,
            updated_at: module.updated_at,
            contents: contents.into_iter().map(ContentResponse::from).collect(),
            quizzes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListModulesQuery {
    pub search: Option<String>,
    /// One of `order`, `title`, `difficulty_level`, `created_at`; prefix `-` for descending
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleIdQuery {
    pub module_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentTypeQuery {
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub module_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 100, message = "Category is too long"))]
    #[serde(default)]
    pub category: String,
    #[validate(range(min = 1, max = 3, message = "Difficulty level must be 1, 2 or 3"))]
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100, message = "Category is too long"))]
    pub category: Option<String>,
    #[validate(range(min = 1, max = 3, message = "Difficulty level must be 1, 2 or 3"))]
    pub difficulty_level: Option<i32>,
    pub order: Option<i32>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContentRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub content: String,
    pub file_url: Option<String>,
    #[validate(range(min = 0, message = "File size cannot be negative"))]
    #[serde(default)]
    pub file_size: i32,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateContentRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    pub content_type: Option<ContentType>,
    pub content: Option<String>,
    pub file_url: Option<String>,
    #[validate(range(min = 0, message = "File size cannot be negative"))]
    pub file_size: Option<i32>,
    pub order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_levels_round_trip_through_labels() {
        assert_eq!(Difficulty::from_level(2), Some(Difficulty::Intermediate));
        assert_eq!(Difficulty::from_level(4), None);
        assert_eq!(Difficulty::Advanced.label(), "Advanced");
    }

    #[test]
    fn content_type_parses_case_insensitively() {
        assert_eq!("Video".parse::<ContentType>(), Ok(ContentType::Video));
        assert!("podcast".parse::<ContentType>().is_err());
    }

    #[test]
    fn create_module_rejects_unknown_difficulty() {
        let req: CreateModuleRequest =
            serde_json::from_value(serde_json::json!({ "title": "Burns", "difficulty_level": 5 }))
                .unwrap();
        assert!(req.validate().is_err());
        assert!(req.is_published);
    }
}
