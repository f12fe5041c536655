use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use super::bson_datetime_as_chrono;

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Platform roles. `medecin` is accepted on input for physicians.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Patient,
    #[serde(alias = "medecin")]
    Physician,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Physician => "physician",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "physician" | "medecin" => Ok(Role::Physician),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// Patient profile, keyed by the owning user's id ("patient_profiles").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatientProfile {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub emergency_contacts: Map<String, Value>,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub blood_type: Option<String>,
}

impl PatientProfile {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

/// Physician profile, keyed by the owning user's id ("physician_profiles").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhysicianProfile {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub speciality: String,
    #[serde(default)]
    pub licence_number: Option<String>,
    #[serde(default)]
    pub years_of_experience: i32,
    #[serde(default)]
    pub available_hours: Map<String, Value>,
    #[serde(default)]
    pub triage_protocols: Map<String, Value>,
}

impl PhysicianProfile {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

/// Patient profile as returned to clients.
#[derive(Debug, Serialize)]
pub struct PatientProfileView {
    pub date_of_birth: Option<NaiveDate>,
    pub emergency_contacts: Map<String, Value>,
    pub medical_history: String,
    pub allergies: String,
    pub blood_type: Option<String>,
}

impl From<PatientProfile> for PatientProfileView {
    fn from(p: PatientProfile) -> Self {
        PatientProfileView {
            date_of_birth: p.date_of_birth,
            emergency_contacts: p.emergency_contacts,
            medical_history: p.medical_history,
            allergies: p.allergies,
            blood_type: p.blood_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PhysicianProfileView {
    pub speciality: String,
    pub licence_number: Option<String>,
    pub years_of_experience: i32,
    pub available_hours: Map<String, Value>,
    pub triage_protocols: Map<String, Value>,
}

impl From<PhysicianProfile> for PhysicianProfileView {
    fn from(p: PhysicianProfile) -> Self {
        PhysicianProfileView {
            speciality: p.speciality,
            licence_number: p.licence_number,
            years_of_experience: p.years_of_experience,
            available_hours: p.available_hours,
            triage_protocols: p.triage_protocols,
        }
    }
}

/// Role-specific profile attached to `/auth/me`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RoleProfile {
    Patient(PatientProfileView),
    Physician(PhysicianProfileView),
}

/// User returned to clients (without sensitive data)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub profile_photo: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            phone_number: user.phone_number,
            profile_photo: user.profile_photo,
            is_verified: user.is_verified,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<RoleProfile>,
}

#[derive(Debug, Serialize)]
pub struct PatientProfileResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub profile: PatientProfileView,
}

#[derive(Debug, Serialize)]
pub struct PhysicianProfileResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub profile: PhysicianProfileView,
}

/// Request to register a new account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub password_confirmation: String,

    #[validate(length(max = 150, message = "First name is too long"))]
    #[serde(default)]
    pub first_name: String,

    #[validate(length(max = 150, message = "Last name is too long"))]
    #[serde(default)]
    pub last_name: String,

    /// Defaults to patient. Self-registration as admin is rejected.
    pub role: Option<Role>,

    #[validate(length(max = 15, message = "Phone number is too long"))]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Admin-side user creation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub role: Role,

    pub phone_number: Option<String>,

    #[serde(default)]
    pub is_verified: bool,
}

/// Partial update of a user. Admins may also change role and activation.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(max = 150, message = "First name is too long"))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Last name is too long"))]
    pub last_name: Option<String>,
    #[validate(length(max = 15, message = "Phone number is too long"))]
    pub phone_number: Option<String>,
    pub profile_photo: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePatientProfile {
    pub date_of_birth: Option<NaiveDate>,
    pub emergency_contacts: Option<Map<String, Value>>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub blood_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePhysicianProfile {
    pub speciality: Option<String>,
    pub licence_number: Option<String>,
    pub years_of_experience: Option<i32>,
    pub available_hours: Option<Map<String, Value>>,
    pub triage_protocols: Option<Map<String, Value>>,
}

/// `PUT /auth/me` body: user fields plus an optional role-specific profile patch.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(max = 150, message = "First name is too long"))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Last name is too long"))]
    pub last_name: Option<String>,
    #[validate(length(max = 15, message = "Phone number is too long"))]
    pub phone_number: Option<String>,
    pub profile_photo: Option<String>,
    pub profile: Option<Value>,
}

/// Query params for listing users
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub search: Option<String>, // email, first or last name
    pub is_active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
