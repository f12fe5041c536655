use anyhow::{anyhow, Context};
use bcrypt::verify;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::user_service::UserService;
use super::{ServiceError, ServiceResult};
use crate::access::Principal;
use crate::metrics::LOGIN_ATTEMPTS_TOTAL;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    AuthResponse, CreateUserRequest, CurrentUserResponse, LoginRequest, RegisterRequest, Role,
    UpdateMeRequest, UpdatePatientProfile, UpdatePhysicianProfile, UpdateUserRequest, User,
    UserResponse,
};
use crate::services::AppState;

const MAX_FAILED_ATTEMPTS: u32 = 5;
const FAILED_ATTEMPTS_WINDOW_SECONDS: u64 = 900;

pub struct AuthService {
    users: UserService,
    redis: ConnectionManager,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: UserService::new(state.mongo.clone()),
            redis: state.redis.clone(),
            jwt_service: JwtService::new(&state.config.jwt_secret),
            access_token_ttl_seconds: state.config.jwt_ttl_seconds,
        }
    }

    /// Public sign-up. Only patient and physician accounts can be self-created.
    pub async fn register(&self, req: RegisterRequest) -> ServiceResult<AuthResponse> {
        if req.password != req.password_confirmation {
            return Err(ServiceError::bad_request("Passwords do not match"));
        }

        let role = req.role.unwrap_or_default();
        if role == Role::Admin {
            return Err(ServiceError::forbidden(
                "Admin accounts cannot be self-registered",
            ));
        }

        let user = self
            .users
            .create_user(CreateUserRequest {
                email: req.email,
                password: req.password,
                first_name: req.first_name,
                last_name: req.last_name,
                role,
                phone_number: req.phone_number,
                is_verified: false,
            })
            .await?;

        self.issue_token(user)
    }

    pub async fn login(&self, req: LoginRequest) -> ServiceResult<AuthResponse> {
        let email = req.email.trim().to_lowercase();

        if self.check_failed_attempts(&email).await? {
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["locked"]).inc();
            return Err(ServiceError::TooManyRequests(
                "Too many failed login attempts, try again later".to_string(),
            ));
        }

        let user = match self.users.find_by_email(&email).await? {
            Some(user) if verify(&req.password, &user.password_hash).unwrap_or(false) => user,
            _ => {
                let attempts = self.increment_failed_attempts(&email).await?;
                tracing::warn!(email = %email, attempts, "Failed login attempt");
                LOGIN_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                return Err(ServiceError::Unauthorized(
                    "Invalid email or password".to_string(),
                ));
            }
        };

        if !user.is_active {
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["inactive"]).inc();
            return Err(ServiceError::forbidden("User account is disabled"));
        }

        self.clear_failed_attempts(&email).await?;
        LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(user_id = %user.id, "Successful login");

        self.issue_token(user)
    }

    pub async fn current_user(&self, principal: &Principal) -> ServiceResult<CurrentUserResponse> {
        let user = self.users.get_user(&principal.user_id).await?;
        let profile = self.users.role_profile(&user).await?;
        Ok(CurrentUserResponse {
            user: UserResponse::from(user),
            profile,
        })
    }

    /// Own account update. Role and activation flags are not writable here.
    pub async fn update_current_user(
        &self,
        principal: &Principal,
        req: UpdateMeRequest,
    ) -> ServiceResult<CurrentUserResponse> {
        let user = self
            .users
            .update_user(
                &principal.user_id,
                UpdateUserRequest {
                    first_name: req.first_name,
                    last_name: req.last_name,
                    phone_number: req.phone_number,
                    profile_photo: req.profile_photo,
                    ..Default::default()
                },
            )
            .await?;

        if let Some(profile) = req.profile {
            match user.role {
                Role::Patient => {
                    let patch: UpdatePatientProfile = parse_profile_patch(profile)?;
                    self.users.update_patient_profile(&user.id, patch).await?;
                }
                Role::Physician => {
                    let patch: UpdatePhysicianProfile = parse_profile_patch(profile)?;
                    self.users.update_physician_profile(&user.id, patch).await?;
                }
                Role::Admin => {
                    return Err(ServiceError::bad_request("Admins have no profile"));
                }
            }
        }

        self.current_user(principal).await
    }

    fn issue_token(&self, user: User) -> ServiceResult<AuthResponse> {
        let claims = JwtClaims::new(&user.id, user.role, self.access_token_ttl_seconds);
        let access_token = self
            .jwt_service
            .generate_token(&claims)
            .map_err(|e| anyhow!("Failed to generate token: {}", e))?;

        Ok(AuthResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_token_ttl_seconds,
            user: UserResponse::from(user),
        })
    }

    /// True once the account reached the failed-attempt limit within the window.
    async fn check_failed_attempts(&self, email: &str) -> ServiceResult<bool> {
        let mut conn = self.redis.clone();
        let count: Option<u32> = redis::cmd("GET")
            .arg(failed_login_key(email))
            .query_async(&mut conn)
            .await
            .context("Failed to query failed login attempts")?;
        Ok(count.unwrap_or(0) >= MAX_FAILED_ATTEMPTS)
    }

    async fn increment_failed_attempts(&self, email: &str) -> ServiceResult<u32> {
        let key = failed_login_key(email);
        let mut conn = self.redis.clone();

        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login attempts")?;

        // Window starts at the first failure
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_ATTEMPTS_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set TTL for failed login attempts")?;
        }

        Ok(count)
    }

    async fn clear_failed_attempts(&self, email: &str) -> ServiceResult<()> {
        let mut conn = self.redis.clone();
        redis::cmd("DEL")
            .arg(failed_login_key(email))
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login attempts")?;
        Ok(())
    }
}

fn failed_login_key(email: &str) -> String {
    format!("failed_login:{}", email)
}

fn parse_profile_patch<T: DeserializeOwned>(value: Value) -> ServiceResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ServiceError::bad_request(format!("Invalid profile: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_patch_rejects_wrong_types() {
        let ok: UpdatePhysicianProfile =
            parse_profile_patch(json!({ "speciality": "Cardiology", "years_of_experience": 7 }))
                .unwrap();
        assert_eq!(ok.years_of_experience, Some(7));

        let err = parse_profile_patch::<UpdatePatientProfile>(json!({ "date_of_birth": "yesterday" }));
        assert!(matches!(err, Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn failed_login_key_is_per_email() {
        assert_eq!(failed_login_key("a@b.c"), "failed_login:a@b.c");
    }
}
