use anyhow::Context;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Database;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use super::user_service::UserService;
use super::{ServiceError, ServiceResult};
use crate::access::{Principal, Visibility};
use crate::models::user::{
    PatientProfile, PatientProfileResponse, PhysicianProfile, PhysicianProfileResponse, Role,
    User, UserResponse,
};

/// Directory of patient and physician profiles, filtered by who is asking.
pub struct ProfileService {
    mongo: Database,
    users: UserService,
}

impl ProfileService {
    pub fn new(mongo: Database) -> Self {
        Self {
            users: UserService::new(mongo.clone()),
            mongo,
        }
    }

    pub async fn list_patients(&self, principal: &Principal) -> ServiceResult<Vec<PatientProfileResponse>> {
        let rows: Vec<(User, PatientProfile)> =
            self.visible_profiles(principal, Role::Patient, None).await?;
        Ok(rows
            .into_iter()
            .map(|(user, profile)| PatientProfileResponse {
                user: UserResponse::from(user),
                profile: profile.into(),
            })
            .collect())
    }

    pub async fn get_patient(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> ServiceResult<PatientProfileResponse> {
        let (user, profile) = self
            .visible_profiles::<PatientProfile>(principal, Role::Patient, Some(user_id))
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Patient profile not found"))?;
        Ok(PatientProfileResponse {
            user: UserResponse::from(user),
            profile: profile.into(),
        })
    }

    pub async fn list_physicians(
        &self,
        principal: &Principal,
    ) -> ServiceResult<Vec<PhysicianProfileResponse>> {
        let rows: Vec<(User, PhysicianProfile)> =
            self.visible_profiles(principal, Role::Physician, None).await?;
        Ok(rows
            .into_iter()
            .map(|(user, profile)| PhysicianProfileResponse {
                user: UserResponse::from(user),
                profile: profile.into(),
            })
            .collect())
    }

    pub async fn get_physician(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> ServiceResult<PhysicianProfileResponse> {
        let (user, profile) = self
            .visible_profiles::<PhysicianProfile>(principal, Role::Physician, Some(user_id))
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Physician profile not found"))?;
        Ok(PhysicianProfileResponse {
            user: UserResponse::from(user),
            profile: profile.into(),
        })
    }

    /// Profiles of `target` role the caller may see, optionally narrowed to one user.
    /// Profiles whose user record is gone are skipped.
    async fn visible_profiles<P>(
        &self,
        principal: &Principal,
        target: Role,
        only: Option<&str>,
    ) -> ServiceResult<Vec<(User, P)>>
    where
        P: DeserializeOwned + Send + Sync + ProfileOwner,
    {
        let mut filter = match principal.visibility_of(target) {
            Visibility::All => doc! {},
            Visibility::Own => doc! { "_id": principal.user_id.as_str() },
            Visibility::Counterparts => {
                let ids = self.counterpart_ids(principal).await?;
                doc! { "_id": { "$in": ids } }
            }
        };
        if let Some(user_id) = only {
            filter = doc! { "$and": [filter, { "_id": user_id }] };
        }

        let profiles: Vec<P> = self
            .mongo
            .collection::<P>(collection_for(target))
            .find(filter)
            .await
            .context("Failed to query profiles")?
            .try_collect()
            .await
            .context("Failed to read profiles")?;

        let ids: Vec<String> = profiles.iter().map(|p| p.owner_id().to_string()).collect();
        let mut users: HashMap<String, User> = self
            .users
            .users_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let mut rows: Vec<(User, P)> = profiles
            .into_iter()
            .filter_map(|profile| {
                users
                    .remove(profile.owner_id())
                    .map(|user| (user, profile))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(rows)
    }

    /// Users on the other side of the caller's consultations.
    async fn counterpart_ids(&self, principal: &Principal) -> ServiceResult<Vec<String>> {
        let Some((own_field, other_field)) = principal.counterpart_fields() else {
            return Ok(Vec::new());
        };
        let ids = self
            .mongo
            .collection::<Document>("consultations")
            .distinct(other_field, doc! { own_field: principal.user_id.as_str() })
            .await
            .context("Failed to list consultation counterparts")?;
        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }
}

fn collection_for(role: Role) -> &'static str {
    match role {
        Role::Physician => "physician_profiles",
        _ => "patient_profiles",
    }
}

/// Profile documents are keyed by their owner's user id.
trait ProfileOwner {
    fn owner_id(&self) -> &str;
}

impl ProfileOwner for PatientProfile {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl ProfileOwner for PhysicianProfile {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_collections_follow_role() {
        assert_eq!(collection_for(Role::Patient), "patient_profiles");
        assert_eq!(collection_for(Role::Physician), "physician_profiles");
    }

    #[test]
    fn profiles_are_owned_by_their_key() {
        let profile = PhysicianProfile::empty("d1");
        assert_eq!(profile.owner_id(), "d1");
    }
}
