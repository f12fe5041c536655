use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

mod common;
use common::{TestApp, TestUser};

async fn book(app: &TestApp, patient: &TestUser, physician: &TestUser) -> Value {
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/appointments",
            Some(&patient.token),
            Some(json!({
                "physician_id": physician.id,
                "scheduled_at": Utc::now() + Duration::days(2),
                "reason": "Persistent cough",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn appointments_are_visible_to_participants_only() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    let stranger = app.register("patient").await;

    let appointment = book(&app, &patient, &physician).await;
    assert_eq!(appointment["patient"], patient.id.as_str());
    assert_eq!(appointment["status"], "pending");
    let uri = format!("/api/v1/appointments/{}", appointment["id"].as_str().unwrap());

    let (status, _) = app.request("GET", &uri, Some(&physician.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request("GET", &uri, Some(&stranger.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, upcoming) = app
        .request("GET", "/api/v1/appointments/upcoming", Some(&patient.token), None)
        .await;
    assert_eq!(upcoming.as_array().unwrap().len(), 1);

    let (_, upcoming) = app
        .request("GET", "/api/v1/appointments/upcoming", Some(&stranger.token), None)
        .await;
    assert_eq!(upcoming, json!([]));
}

#[tokio::test]
async fn patients_cannot_book_for_someone_else() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let other = app.register("patient").await;
    let physician = app.register("physician").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/appointments",
            Some(&patient.token),
            Some(json!({
                "patient_id": other.id,
                "physician_id": physician.id,
                "scheduled_at": Utc::now() + Duration::days(1),
                "reason": "Check-up",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["patient"], patient.id.as_str());
}

#[tokio::test]
async fn status_and_date_filters_validate_their_input() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    let appointment = book(&app, &patient, &physician).await;
    let id = appointment["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/appointments/{}/status", id),
            Some(&physician.token),
            Some(json!({ "status": "postponed" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/appointments/{}/status", id),
            Some(&physician.token),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (status, _) = app
        .request("GET", "/api/v1/appointments/by-date", Some(&patient.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            "GET",
            "/api/v1/appointments/by-date?date=17/10/2026",
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ending_a_consultation_completes_its_appointment() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    let appointment = book(&app, &patient, &physician).await;
    let appointment_id = appointment["id"].as_str().unwrap();

    let (status, consultation) = app
        .request(
            "POST",
            "/api/v1/consultations",
            Some(&physician.token),
            Some(json!({ "appointment_id": appointment_id, "type": "video" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", consultation);
    assert_eq!(consultation["physician"], physician.id.as_str());
    assert_eq!(consultation["patient"], patient.id.as_str());
    let consultation_id = consultation["id"].as_str().unwrap();

    // One consultation per appointment
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/consultations",
            Some(&physician.token),
            Some(json!({ "appointment_id": appointment_id, "type": "video" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listed) = app
        .request("GET", "/api/v1/consultations", Some(&patient.token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", listed);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, active) = app
        .request("GET", "/api/v1/consultations/active", Some(&physician.token), None)
        .await;
    assert_eq!(active[0]["id"], consultation_id);

    let end_uri = format!("/api/v1/consultations/{}/end", consultation_id);
    let (status, ended) = app
        .request(
            "POST",
            &end_uri,
            Some(&physician.token),
            Some(json!({ "diagnosis": "Viral bronchitis" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", ended);
    assert_eq!(ended["diagnosis"], "Viral bronchitis");
    assert!(!ended["end_time"].is_null());

    let (status, _) = app.request("POST", &end_uri, Some(&physician.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, appointment) = app
        .request(
            "GET",
            &format!("/api/v1/appointments/{}", appointment_id),
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(appointment["status"], "completed");

    let (_, active) = app
        .request("GET", "/api/v1/consultations/active", Some(&patient.token), None)
        .await;
    assert_eq!(active, json!([]));
}

#[tokio::test]
async fn only_the_consulting_physician_prescribes() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    let other_physician = app.register("physician").await;

    let (_, consultation) = app
        .request(
            "POST",
            "/api/v1/consultations",
            Some(&physician.token),
            Some(json!({ "patient_id": patient.id, "type": "message" })),
        )
        .await;
    let consultation_id = consultation["id"].as_str().unwrap();
    let prescription = json!({
        "consultation_id": consultation_id,
        "details": "Paracetamol 500mg, 3x daily",
    });

    let (status, _) = app
        .request("POST", "/api/v1/prescriptions", Some(&patient.token), Some(prescription.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/prescriptions",
            Some(&other_physician.token),
            Some(prescription.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .request("POST", "/api/v1/prescriptions", Some(&physician.token), Some(prescription))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);

    // No end date means still active
    let (_, active) = app
        .request("GET", "/api/v1/prescriptions/active", Some(&patient.token), None)
        .await;
    assert_eq!(active.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/prescriptions/by-patient?patient_id={}", patient.id),
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = app
        .request(
            "GET",
            &format!("/api/v1/prescriptions/by-patient?patient_id={}", patient.id),
            Some(&physician.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn read_all_marks_only_the_counterparts_messages() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    let outsider = app.register("patient").await;

    let (_, consultation) = app
        .request(
            "POST",
            "/api/v1/consultations",
            Some(&physician.token),
            Some(json!({ "patient_id": patient.id, "type": "message" })),
        )
        .await;
    let consultation_id = consultation["id"].as_str().unwrap();

    for (sender, content) in [(&physician, "How are you feeling?"), (&patient, "Better, thanks")] {
        let (status, _) = app
            .request(
                "POST",
                "/api/v1/messages",
                Some(&sender.token),
                Some(json!({ "consultation_id": consultation_id, "content": content })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/messages",
            Some(&outsider.token),
            Some(json!({ "consultation_id": consultation_id, "content": "hello?" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, unread) = app
        .request("GET", "/api/v1/messages/unread", Some(&patient.token), None)
        .await;
    let unread = unread.as_array().unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0]["sender"], physician.id.as_str());

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/messages/read-all",
            Some(&patient.token),
            Some(json!({ "consultation_id": consultation_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, unread) = app
        .request("GET", "/api/v1/messages/unread", Some(&patient.token), None)
        .await;
    assert_eq!(unread, json!([]));

    // The patient's own message is still unread for the physician
    let (_, unread) = app
        .request("GET", "/api/v1/messages/unread", Some(&physician.token), None)
        .await;
    assert_eq!(unread.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn profiles_follow_consultation_relationships() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;

    let patient_uri = format!("/api/v1/profiles/patients/{}", patient.id);
    let (status, _) = app
        .request("GET", &patient_uri, Some(&physician.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.request(
        "POST",
        "/api/v1/consultations",
        Some(&physician.token),
        Some(json!({ "patient_id": patient.id, "type": "sms" })),
    )
    .await;

    let (status, profile) = app
        .request("GET", &patient_uri, Some(&physician.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["id"], patient.id.as_str());

    let (_, physicians) = app
        .request("GET", "/api/v1/profiles/physicians", Some(&patient.token), None)
        .await;
    let physicians = physicians.as_array().unwrap();
    assert_eq!(physicians.len(), 1);
    assert_eq!(physicians[0]["user"]["id"], physician.id.as_str());
}

#[tokio::test]
async fn dashboards_are_role_specific() {
    let app = common::create_test_app().await;
    let patient = app.register("patient").await;
    let physician = app.register("physician").await;
    book(&app, &patient, &physician).await;

    let (status, dashboard) = app
        .request("GET", "/api/v1/dashboard/patient", Some(&patient.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["upcoming_appointments"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .request("GET", "/api/v1/dashboard/physician", Some(&patient.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, dashboard) = app
        .request("GET", "/api/v1/dashboard/physician", Some(&physician.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["stats"]["total_appointments"], 1);
    assert_eq!(dashboard["stats"]["total_patients"], 0);
}
