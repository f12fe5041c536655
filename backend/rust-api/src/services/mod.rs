use crate::access::AccessError;
use crate::config::Config;
use crate::models::user::Role;
use anyhow::Context;
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{bson::Document, Client as MongoClient, Database, IndexModel};
use redis::aio::ConnectionManager;
use thiserror::Error;

pub mod admin_seed;
pub mod appointment_service;
pub mod auth_service;
pub mod consultation_service;
pub mod dashboard_service;
pub mod first_aid_service;
pub mod message_service;
pub mod prescription_service;
pub mod profile_service;
pub mod quiz_scoring;
pub mod quiz_service;
pub mod user_service;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        ensure_indexes(&mongo).await?;

        Ok(Self {
            config,
            mongo,
            redis,
        })
    }
}

/// Indexes the storage layer relies on for uniqueness and for the scoped listings.
pub async fn ensure_indexes(mongo: &Database) -> anyhow::Result<()> {
    let unique = || IndexOptions::builder().unique(true).build();

    let specs: Vec<(&str, Document, Option<IndexOptions>)> = vec![
        ("users", doc! { "email": 1 }, Some(unique())),
        (
            "quiz_results",
            doc! { "user_id": 1, "quiz_id": 1 },
            Some(unique()),
        ),
        ("first_aid_progress", doc! { "user_id": 1 }, None),
        ("first_aid_contents", doc! { "module_id": 1, "order": 1 }, None),
        ("quizzes", doc! { "module_id": 1 }, None),
        ("appointments", doc! { "patient_id": 1, "scheduled_at": -1 }, None),
        ("appointments", doc! { "physician_id": 1, "scheduled_at": -1 }, None),
        ("consultations", doc! { "patient_id": 1 }, None),
        ("consultations", doc! { "physician_id": 1 }, None),
        (
            "consultations",
            doc! { "appointment_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! { "appointment_id": { "$type": "string" } })
                    .build(),
            ),
        ),
        ("prescriptions", doc! { "consultation_id": 1 }, None),
        ("messages", doc! { "consultation_id": 1, "timestamp": 1 }, None),
    ];

    for (collection, keys, options) in specs {
        let model = IndexModel::builder().keys(keys).options(options).build();
        mongo
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .with_context(|| format!("Failed to create index on {}", collection))?;
    }

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

/// Outcome of a care or account operation that the API maps onto an HTTP status.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Case-insensitive "contains" match for free-text search parameters.
pub(crate) fn search_regex(term: &str) -> mongodb::bson::Regex {
    mongodb::bson::Regex {
        pattern: regex::escape(term.trim()),
        options: "i".to_string(),
    }
}

/// Translates `field` / `-field` into a sort document, accepting only `allowed` fields.
pub(crate) fn sort_from_ordering(
    ordering: Option<&str>,
    allowed: &[&str],
    default: Document,
) -> Document {
    let Some(ordering) = ordering.map(str::trim).filter(|o| !o.is_empty()) else {
        return default;
    };
    let (field, direction) = match ordering.strip_prefix('-') {
        Some(field) => (field, -1),
        None => (ordering, 1),
    };
    if !allowed.contains(&field) {
        return default;
    }
    let field = match field {
        "created_at" => "createdAt",
        "updated_at" => "updatedAt",
        other => other,
    };
    doc! { field: direction }
}

/// Ids of users whose first or last name matches a free-text search.
pub(crate) async fn users_matching_name(mongo: &Database, term: &str) -> anyhow::Result<Vec<String>> {
    let regex = search_regex(term);
    let ids = mongo
        .collection::<Document>("users")
        .distinct(
            "_id",
            doc! { "$or": [ { "first_name": &regex }, { "last_name": &regex } ] },
        )
        .await
        .context("Failed to search users by name")?;
    Ok(ids
        .into_iter()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect())
}

/// Search filter for care records: free-text `fields` or either participant's name.
pub(crate) async fn care_search_filter(
    mongo: &Database,
    term: &str,
    fields: &[&str],
) -> anyhow::Result<Document> {
    let regex = search_regex(term);
    let user_ids = users_matching_name(mongo, term).await?;

    let mut clauses: Vec<Document> = fields.iter().map(|f| doc! { *f: &regex }).collect();
    clauses.push(doc! { "patient_id": { "$in": user_ids.clone() } });
    clauses.push(doc! { "physician_id": { "$in": user_ids } });
    Ok(doc! { "$or": clauses })
}

/// Both participants of a new care record must exist with the matching role.
pub(crate) async fn ensure_care_participants(
    mongo: &Database,
    patient_id: &str,
    physician_id: &str,
) -> ServiceResult<()> {
    let users = mongo.collection::<Document>("users");
    let checks = [
        (patient_id, Role::Patient, "Patient not found"),
        (physician_id, Role::Physician, "Physician not found"),
    ];
    for (user_id, role, message) in checks {
        let count = users
            .count_documents(doc! { "_id": user_id, "role": role.as_str() })
            .await
            .context("Failed to check care participant")?;
        if count == 0 {
            return Err(ServiceError::bad_request(message));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_accepts_known_fields_only() {
        let default = doc! { "order": 1, "title": 1 };
        assert_eq!(
            sort_from_ordering(Some("-difficulty_level"), &["difficulty_level"], default.clone()),
            doc! { "difficulty_level": -1 }
        );
        assert_eq!(
            sort_from_ordering(Some("password_hash"), &["title"], default.clone()),
            default
        );
        assert_eq!(
            sort_from_ordering(Some("created_at"), &["created_at"], default.clone()),
            doc! { "createdAt": 1 }
        );
        assert_eq!(sort_from_ordering(None, &["title"], default.clone()), default);
    }

    #[test]
    fn search_terms_are_escaped() {
        let regex = search_regex(" a+b ");
        assert_eq!(regex.pattern, "a\\+b");
        assert_eq!(regex.options, "i");
    }
}
