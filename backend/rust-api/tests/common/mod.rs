#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use mongodb::Database;
use serde_json::{json, Value};
use std::sync::Arc;
use telesoins_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::user::Role,
    services::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub config: Config,
}

/// Router wired to the MongoDB/Redis described by `.env.test` (or the dev defaults).
pub async fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    dotenvy::from_filename(".env.test").ok();
    let config = Config::load().expect("Failed to load test configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");
    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");

    let state = Arc::new(
        AppState::new(config.clone(), mongo_client, redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    TestApp {
        router: create_router(state.clone()),
        db: state.mongo.clone(),
        config,
    }
}

/// Registered account used by a test.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

impl TestApp {
    /// Distinct client per request keeps the per-IP limiters out of the way.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_from(&random_ip(), method, uri, token, body)
            .await
    }

    pub async fn request_from(
        &self,
        client_ip: &str,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client_ip);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn register(&self, role: &str) -> TestUser {
        let email = format!("{}-{}@example.test", role, Uuid::new_v4());
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "password_confirmation": PASSWORD,
                    "first_name": "Test",
                    "last_name": role,
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "registration failed: {}", body);

        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            email,
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Admin token signed with the configured secret. The admin guard only looks at claims.
    pub fn admin_token(&self) -> String {
        let claims = JwtClaims::new(&Uuid::new_v4().to_string(), Role::Admin, 600);
        JwtService::new(&self.config.jwt_secret)
            .generate_token(&claims)
            .unwrap()
    }

    /// Published module with one four-question quiz (passing score 70) authored through the admin API.
    pub async fn seed_quiz(&self) -> SeededQuiz {
        let admin = self.admin_token();

        let (status, module) = self
            .request(
                "POST",
                "/api/v1/admin/first-aid/modules",
                Some(&admin),
                Some(json!({
                    "title": format!("Burns {}", Uuid::new_v4()),
                    "category": "burns",
                    "difficulty_level": 1,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "module creation failed: {}", module);
        let module_id = module["id"].as_str().unwrap().to_string();

        let (status, quiz) = self
            .request(
                "POST",
                &format!("/api/v1/admin/first-aid/modules/{}/quizzes", module_id),
                Some(&admin),
                Some(json!({ "title": "Burns basics", "passing_score": 70 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "quiz creation failed: {}", quiz);
        let quiz_id = quiz["id"].as_str().unwrap().to_string();

        let questions: Vec<Value> = (1..=4)
            .map(|n| {
                json!({
                    "question_text": format!("Question {}", n),
                    "order": n,
                    "options": [
                        { "option_text": "right", "is_correct": true },
                        { "option_text": "wrong", "is_correct": false },
                    ],
                })
            })
            .collect();
        let (status, quiz) = self
            .request(
                "PUT",
                &format!("/api/v1/admin/first-aid/quizzes/{}/questions", quiz_id),
                Some(&admin),
                Some(json!({ "questions": questions })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "question upload failed: {}", quiz);

        let questions = quiz["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| {
                let option = |correct: bool| {
                    q["options"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .find(|o| o["is_correct"] == correct)
                        .unwrap()["id"]
                        .as_str()
                        .unwrap()
                        .to_string()
                };
                SeededQuestion {
                    id: q["id"].as_str().unwrap().to_string(),
                    correct_option: option(true),
                    wrong_option: option(false),
                }
            })
            .collect();

        SeededQuiz {
            module_id,
            quiz_id,
            questions,
        }
    }
}

pub struct SeededQuestion {
    pub id: String,
    pub correct_option: String,
    pub wrong_option: String,
}

pub struct SeededQuiz {
    pub module_id: String,
    pub quiz_id: String,
    pub questions: Vec<SeededQuestion>,
}

impl SeededQuiz {
    /// Answers with the questions at `wrong` (0-based) answered incorrectly.
    pub fn answers(&self, wrong: &[usize]) -> Value {
        let map: serde_json::Map<String, Value> = self
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let option = if wrong.contains(&i) {
                    &q.wrong_option
                } else {
                    &q.correct_option
                };
                (q.id.clone(), Value::String(option.clone()))
            })
            .collect();
        json!({ "answers": map })
    }
}

pub fn random_ip() -> String {
    let bytes = *Uuid::new_v4().as_bytes();
    format!("10.{}.{}.{}", bytes[0], bytes[1], bytes[2])
}
