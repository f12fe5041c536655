use crate::config::Config;
use crate::models::user::Role;
use crate::utils::time::chrono_to_bson;
use anyhow::{Context, Result};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    Database,
};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Admin account described by the seed file.
#[derive(Debug, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    #[serde(default = "default_first_name")]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

fn default_first_name() -> String {
    "Admin".to_string()
}

impl AdminSeed {
    fn into_document(self) -> Result<Document> {
        let password_hash =
            hash(&self.password, DEFAULT_COST).context("Failed to hash admin password")?;
        let now = chrono_to_bson(Utc::now());

        Ok(doc! {
            "_id": Uuid::new_v4().to_string(),
            "email": self.email.trim().to_lowercase(),
            "password_hash": password_hash,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "role": Role::Admin.as_str(),
            "is_verified": true,
            "is_active": true,
            "createdAt": now,
            "updatedAt": now,
        })
    }
}

pub async fn bootstrap(config: &Config, mongo: &Database) -> Result<()> {
    let path = match &config.admin_seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No admin seed file configured, skipping bootstrap");
            return Ok(());
        }
    };

    if !path.exists() {
        tracing::warn!(
            "Admin seed file {} not found, skipping bootstrap",
            path.display()
        );
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read admin seed file")?;

    let seed: AdminSeed =
        serde_json::from_str(&contents).context("Failed to deserialize admin seed payload")?;

    let email = seed.email.trim().to_lowercase();
    let doc = seed.into_document()?;
    tracing::info!("Bootstrapping admin with email {}", email);

    let update = mongo
        .collection::<Document>("users")
        .update_one(doc! { "email": &email }, doc! { "$setOnInsert": doc })
        .upsert(true)
        .await
        .context("Failed to insert admin")?;

    if update.upserted_id.is_some() {
        tracing::info!("Admin inserted; remove seed file to prevent rerun");
    } else {
        tracing::info!("Admin already exists, seed skipped");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_document_is_a_hashed_admin() {
        let seed: AdminSeed = serde_json::from_str(
            r#"{ "email": " Root@Telesoins.local ", "password": "change-me-now" }"#,
        )
        .unwrap();
        let doc = seed.into_document().unwrap();

        assert_eq!(doc.get_str("email").unwrap(), "root@telesoins.local");
        assert_eq!(doc.get_str("role").unwrap(), "admin");
        assert_eq!(doc.get_str("first_name").unwrap(), "Admin");
        let hash = doc.get_str("password_hash").unwrap();
        assert!(bcrypt::verify("change-me-now", hash).unwrap());
    }
}
