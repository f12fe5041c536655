use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn three_of_four_scores_seventy_five_and_completes_the_module() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let patient = app.register("patient").await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/first-aid/quizzes/{}/submit", quiz.quiz_id),
            Some(&patient.token),
            Some(quiz.answers(&[2])),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["score"], 75);
    assert_eq!(body["passed"], true);
    assert_eq!(body["created"], true);
    assert_eq!(body["user_id"], patient.id.as_str());
    assert_eq!(body["quiz_id"], quiz.quiz_id.as_str());
    assert_eq!(body["quiz_title"], "Burns basics");
    // Single-quiz module: one result completes it
    assert_eq!(body["progress"]["completed"], true);
    assert_eq!(body["progress"]["score"], 75);
}

#[tokio::test]
async fn resubmission_overwrites_the_single_result() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let patient = app.register("patient").await;
    let submit_uri = format!("/api/v1/first-aid/quizzes/{}/submit", quiz.quiz_id);

    let (_, first) = app
        .request("POST", &submit_uri, Some(&patient.token), Some(quiz.answers(&[])))
        .await;
    assert_eq!(first["score"], 100);

    let (status, second) = app
        .request(
            "POST",
            &submit_uri,
            Some(&patient.token),
            Some(quiz.answers(&[0, 1, 2])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["created"], false);
    assert_eq!(second["score"], 25);
    assert_eq!(second["passed"], false);
    assert_eq!(second["completed_at"], first["completed_at"]);
    // Completion stays once reached
    assert_eq!(second["progress"]["completed"], true);

    let (status, results) = app
        .request(
            "GET",
            &format!("/api/v1/first-aid/results/by-module?module_id={}", quiz.module_id),
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["score"], 25);

    let (status, summary) = app
        .request("GET", "/api/v1/first-aid/results/summary", Some(&patient.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let row = summary
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["module_id"] == quiz.module_id.as_str())
        .expect("summary row for the seeded module");
    assert_eq!(row["completed"], true);
    assert_eq!(row["score"], 25);
    assert_eq!(row["passed"], false);
    assert_eq!(row["module_difficulty"], "Beginner");
}

#[tokio::test]
async fn empty_answers_are_a_validation_error() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let patient = app.register("patient").await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/first-aid/quizzes/{}/submit", quiz.quiz_id),
            Some(&patient.token),
            Some(json!({ "answers": {} })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "no answers supplied");

    let (_, results) = app
        .request("GET", "/api/v1/first-aid/results", Some(&patient.token), None)
        .await;
    assert_eq!(results.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_and_unpublished_quizzes_are_not_found() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let patient = app.register("patient").await;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/first-aid/quizzes/no-such-quiz/submit",
            Some(&patient.token),
            Some(json!({ "answers": { "q": "o" } })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            "PATCH",
            &format!("/api/v1/admin/first-aid/modules/{}", quiz.module_id),
            Some(&app.admin_token()),
            Some(json!({ "is_published": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/first-aid/quizzes/{}/submit", quiz.quiz_id),
            Some(&patient.token),
            Some(quiz.answers(&[])),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn learner_quiz_view_hides_correct_options() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let patient = app.register("patient").await;

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/first-aid/quizzes/{}", quiz.quiz_id),
            Some(&patient.token),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 4);
    for question in questions {
        for option in question["options"].as_array().unwrap() {
            assert!(option.get("is_correct").is_none());
        }
    }
}

#[tokio::test]
async fn physicians_get_results_without_progress() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;
    let physician = app.register("physician").await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/first-aid/quizzes/{}/submit", quiz.quiz_id),
            Some(&physician.token),
            Some(quiz.answers(&[])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 100);
    assert!(body.get("progress").is_none());

    let (_, summary) = app
        .request("GET", "/api/v1/first-aid/results/summary", Some(&physician.token), None)
        .await;
    assert_eq!(summary, json!([]));
}

#[tokio::test]
async fn authoring_rejects_questions_without_a_single_correct_option() {
    let app = common::create_test_app().await;
    let quiz = app.seed_quiz().await;

    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/v1/admin/first-aid/quizzes/{}/questions", quiz.quiz_id),
            Some(&app.admin_token()),
            Some(json!({ "questions": [{
                "question_text": "Pick both",
                "options": [
                    { "option_text": "a", "is_correct": true },
                    { "option_text": "b", "is_correct": true },
                ],
            }] })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
