use anyhow::Context;
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, to_document, Document};
use mongodb::{Collection, Database};
use uuid::Uuid;

use super::{search_regex, ServiceError, ServiceResult};
use crate::models::user::{
    CreateUserRequest, ListUsersQuery, PatientProfile, PhysicianProfile, Role, RoleProfile,
    UpdatePatientProfile, UpdatePhysicianProfile, UpdateUserRequest, User,
};
use crate::utils::time::chrono_to_bson;

/// Accounts and their role profiles.
pub struct UserService {
    mongo: Database,
}

impl UserService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection("users")
    }

    fn patient_profiles(&self) -> Collection<PatientProfile> {
        self.mongo.collection("patient_profiles")
    }

    fn physician_profiles(&self) -> Collection<PhysicianProfile> {
        self.mongo.collection("physician_profiles")
    }

    /// Creates the account and the empty profile matching its role.
    pub async fn create_user(&self, req: CreateUserRequest) -> ServiceResult<User> {
        let email = req.email.trim().to_lowercase();

        let existing = self
            .users()
            .find_one(doc! { "email": &email })
            .await
            .context("Failed to check existing user")?;
        if existing.is_some() {
            return Err(ServiceError::bad_request(
                "User with this email already exists",
            ));
        }

        let password_hash = hash(&req.password, DEFAULT_COST).context("Failed to hash password")?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
            phone_number: req.phone_number,
            profile_photo: None,
            is_verified: req.is_verified,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.users()
            .insert_one(&user)
            .await
            .context("Failed to insert user")?;

        self.ensure_profile(&user.id, user.role).await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User created");
        Ok(user)
    }

    /// Inserts an empty profile for `role` unless one already exists.
    pub async fn ensure_profile(&self, user_id: &str, role: Role) -> ServiceResult<()> {
        let (collection, profile) = match role {
            Role::Patient => (
                "patient_profiles",
                to_document(&PatientProfile::empty(user_id)).context("Failed to encode profile")?,
            ),
            Role::Physician => (
                "physician_profiles",
                to_document(&PhysicianProfile::empty(user_id))
                    .context("Failed to encode profile")?,
            ),
            Role::Admin => return Ok(()),
        };

        self.mongo
            .collection::<Document>(collection)
            .update_one(doc! { "_id": user_id }, doc! { "$setOnInsert": profile })
            .upsert(true)
            .await
            .context("Failed to create profile")?;
        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        Ok(self
            .users()
            .find_one(doc! { "email": email.trim().to_lowercase() })
            .await
            .context("Failed to query user")?)
    }

    pub async fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        self.users()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    pub async fn list_users(&self, query: ListUsersQuery) -> ServiceResult<Vec<User>> {
        let mut filter = doc! {};

        if let Some(role) = query.role {
            filter.insert("role", role.as_str());
        }

        if let Some(is_active) = query.is_active {
            filter.insert("is_active", is_active);
        }

        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            let regex = search_regex(&search);
            filter.insert(
                "$or",
                vec![
                    doc! { "email": &regex },
                    doc! { "first_name": &regex },
                    doc! { "last_name": &regex },
                ],
            );
        }

        let limit = query.limit.unwrap_or(50).min(200) as i64;
        let offset = query.offset.unwrap_or(0) as u64;

        let users = self
            .users()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .skip(offset)
            .limit(limit)
            .await
            .context("Failed to query users")?
            .try_collect()
            .await
            .context("Failed to read users")?;

        Ok(users)
    }

    /// Users by id, in no particular order. Unknown ids are skipped.
    pub async fn users_by_ids(&self, ids: &[String]) -> ServiceResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .users()
            .find(doc! { "_id": { "$in": ids } })
            .await
            .context("Failed to query users")?
            .try_collect()
            .await
            .context("Failed to read users")?)
    }

    pub async fn update_user(&self, user_id: &str, req: UpdateUserRequest) -> ServiceResult<User> {
        let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };

        if let Some(first_name) = req.first_name {
            set.insert("first_name", first_name);
        }
        if let Some(last_name) = req.last_name {
            set.insert("last_name", last_name);
        }
        if let Some(phone_number) = req.phone_number {
            set.insert("phone_number", phone_number);
        }
        if let Some(profile_photo) = req.profile_photo {
            set.insert("profile_photo", profile_photo);
        }
        if let Some(role) = req.role {
            set.insert("role", role.as_str());
        }
        if let Some(is_active) = req.is_active {
            set.insert("is_active", is_active);
        }
        if let Some(is_verified) = req.is_verified {
            set.insert("is_verified", is_verified);
        }

        let result = self
            .users()
            .update_one(doc! { "_id": user_id }, doc! { "$set": set })
            .await
            .context("Failed to update user")?;

        if result.matched_count == 0 {
            return Err(ServiceError::not_found("User not found"));
        }

        if let Some(role) = req.role {
            self.ensure_profile(user_id, role).await?;
        }

        self.get_user(user_id).await
    }

    /// Removes the account with its profiles, learning records and care records.
    pub async fn delete_user(&self, user_id: &str) -> ServiceResult<()> {
        let result = self
            .users()
            .delete_one(doc! { "_id": user_id })
            .await
            .context("Failed to delete user")?;

        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("User not found"));
        }

        let participant = doc! { "$or": [ { "patient_id": user_id }, { "physician_id": user_id } ] };
        let cleanup: [(&str, Document); 8] = [
            ("patient_profiles", doc! { "_id": user_id }),
            ("physician_profiles", doc! { "_id": user_id }),
            ("quiz_results", doc! { "user_id": user_id }),
            ("first_aid_progress", doc! { "user_id": user_id }),
            ("appointments", participant.clone()),
            ("consultations", participant.clone()),
            ("prescriptions", participant.clone()),
            ("messages", participant),
        ];

        for (collection, filter) in cleanup {
            self.mongo
                .collection::<Document>(collection)
                .delete_many(filter)
                .await
                .with_context(|| format!("Failed to clean up {}", collection))?;
        }

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    pub async fn patient_profile(&self, user_id: &str) -> ServiceResult<Option<PatientProfile>> {
        Ok(self
            .patient_profiles()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query patient profile")?)
    }

    pub async fn physician_profile(&self, user_id: &str) -> ServiceResult<Option<PhysicianProfile>> {
        Ok(self
            .physician_profiles()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query physician profile")?)
    }

    pub async fn role_profile(&self, user: &User) -> ServiceResult<Option<RoleProfile>> {
        Ok(match user.role {
            Role::Patient => self
                .patient_profile(&user.id)
                .await?
                .map(|p| RoleProfile::Patient(p.into())),
            Role::Physician => self
                .physician_profile(&user.id)
                .await?
                .map(|p| RoleProfile::Physician(p.into())),
            Role::Admin => None,
        })
    }

    pub async fn update_patient_profile(
        &self,
        user_id: &str,
        req: UpdatePatientProfile,
    ) -> ServiceResult<PatientProfile> {
        let mut set = doc! {};
        if let Some(date_of_birth) = req.date_of_birth {
            set.insert("date_of_birth", date_of_birth.to_string());
        }
        if let Some(contacts) = req.emergency_contacts {
            set.insert(
                "emergency_contacts",
                to_bson(&contacts).context("Failed to encode emergency contacts")?,
            );
        }
        if let Some(history) = req.medical_history {
            set.insert("medical_history", history);
        }
        if let Some(allergies) = req.allergies {
            set.insert("allergies", allergies);
        }
        if let Some(blood_type) = req.blood_type {
            set.insert("blood_type", blood_type);
        }

        self.apply_profile_update("patient_profiles", user_id, set).await?;
        self.patient_profile(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Patient profile not found"))
    }

    pub async fn update_physician_profile(
        &self,
        user_id: &str,
        req: UpdatePhysicianProfile,
    ) -> ServiceResult<PhysicianProfile> {
        let mut set = doc! {};
        if let Some(speciality) = req.speciality {
            set.insert("speciality", speciality);
        }
        if let Some(licence_number) = req.licence_number {
            set.insert("licence_number", licence_number);
        }
        if let Some(years) = req.years_of_experience {
            if years < 0 {
                return Err(ServiceError::bad_request(
                    "years_of_experience cannot be negative",
                ));
            }
            set.insert("years_of_experience", years);
        }
        if let Some(hours) = req.available_hours {
            set.insert(
                "available_hours",
                to_bson(&hours).context("Failed to encode available hours")?,
            );
        }
        if let Some(protocols) = req.triage_protocols {
            set.insert(
                "triage_protocols",
                to_bson(&protocols).context("Failed to encode triage protocols")?,
            );
        }

        self.apply_profile_update("physician_profiles", user_id, set)
            .await?;
        self.physician_profile(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Physician profile not found"))
    }

    async fn apply_profile_update(
        &self,
        collection: &str,
        user_id: &str,
        set: Document,
    ) -> ServiceResult<()> {
        if set.is_empty() {
            return Ok(());
        }
        let result = self
            .mongo
            .collection::<Document>(collection)
            .update_one(doc! { "_id": user_id }, doc! { "$set": set })
            .await
            .with_context(|| format!("Failed to update {}", collection))?;
        if result.matched_count == 0 {
            return Err(ServiceError::not_found("Profile not found"));
        }
        Ok(())
    }
}
