use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Canceled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Canceled => "canceled",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Statuses of appointments that are still going to take place.
    pub fn open() -> [&'static str; 2] {
        [
            AppointmentStatus::Pending.as_str(),
            AppointmentStatus::Confirmed.as_str(),
        ]
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "canceled" => Ok(AppointmentStatus::Canceled),
            "completed" => Ok(AppointmentStatus::Completed),
            _ => Err(format!("Invalid status: {}", value)),
        }
    }
}

/// Scheduled meeting between a patient and a physician ("appointments")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub patient_id: String,
    pub physician_id: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub id: String,
    pub patient: String,
    pub physician: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: String,
    pub is_urgent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Appointment> for AppointmentResponse {
    fn from(a: Appointment) -> Self {
        AppointmentResponse {
            id: a.id,
            patient: a.patient_id,
            physician: a.physician_id,
            scheduled_at: a.scheduled_at,
            status: a.status,
            reason: a.reason,
            notes: a.notes,
            is_urgent: a.is_urgent,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    /// Ignored when a patient books for themselves
    pub patient_id: Option<String>,
    pub physician_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[validate(length(min = 1, message = "Reason is required"))]
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_urgent: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAppointmentRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "Reason is required"))]
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub is_urgent: Option<bool>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAppointmentsQuery {
    pub search: Option<String>,
    pub status: Option<AppointmentStatus>,
    /// `scheduled_at`, `created_at`, `status`, `is_urgent`; prefix `-` for descending
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ByDateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsultationKind {
    Video,
    Message,
    Sms,
}

impl ConsultationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationKind::Video => "video",
            ConsultationKind::Message => "message",
            ConsultationKind::Sms => "sms",
        }
    }
}

impl FromStr for ConsultationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "video" => Ok(ConsultationKind::Video),
            "message" => Ok(ConsultationKind::Message),
            "sms" => Ok(ConsultationKind::Sms),
            _ => Err(format!("Invalid consultation type: {}", value)),
        }
    }
}

/// Remote consultation, optionally tied to one appointment ("consultations")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub patient_id: String,
    pub physician_id: String,
    #[serde(rename = "type")]
    pub kind: ConsultationKind,
    #[serde(with = "bson_datetime_as_chrono")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub diagnosis: String,
}

impl Consultation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.patient_id == user_id || self.physician_id == user_id
    }

    /// The other participant of the consultation, if `user_id` is one of them.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.patient_id == user_id {
            Some(&self.physician_id)
        } else if self.physician_id == user_id {
            Some(&self.patient_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConsultationResponse {
    pub id: String,
    pub appointment: Option<String>,
    pub patient: String,
    pub physician: String,
    #[serde(rename = "type")]
    pub kind: ConsultationKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub summary: String,
    pub diagnosis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescriptions: Option<Vec<PrescriptionResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

impl From<Consultation> for ConsultationResponse {
    fn from(c: Consultation) -> Self {
        ConsultationResponse {
            id: c.id,
            appointment: c.appointment_id,
            patient: c.patient_id,
            physician: c.physician_id,
            kind: c.kind,
            start_time: c.start_time,
            end_time: c.end_time,
            summary: c.summary,
            diagnosis: c.diagnosis,
            prescriptions: None,
            messages: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConsultationRequest {
    pub appointment_id: Option<String>,
    pub patient_id: Option<String>,
    /// Ignored when a physician opens the consultation
    pub physician_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ConsultationKind,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub diagnosis: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConsultationRequest {
    pub summary: Option<String>,
    pub diagnosis: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ConsultationKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndConsultationRequest {
    pub summary: Option<String>,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListConsultationsQuery {
    pub search: Option<String>,
    /// `start_time`, `end_time`, `type`; prefix `-` for descending
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ByTypeQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Prescription issued during a consultation ("prescriptions").
/// Participants are copied from the consultation so listings can be scoped without a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(rename = "_id")]
    pub id: String,
    pub consultation_id: String,
    pub patient_id: String,
    pub physician_id: String,
    pub details: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PrescriptionResponse {
    pub id: String,
    pub consultation: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub valid_until: Option<NaiveDate>,
}

impl From<Prescription> for PrescriptionResponse {
    fn from(p: Prescription) -> Self {
        PrescriptionResponse {
            id: p.id,
            consultation: p.consultation_id,
            details: p.details,
            created_at: p.created_at,
            valid_until: p.valid_until,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePrescriptionRequest {
    pub consultation_id: Option<String>,
    #[validate(length(min = 1, message = "Details are required"))]
    pub details: String,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePrescriptionRequest {
    #[validate(length(min = 1, message = "Details are required"))]
    pub details: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ByPatientQuery {
    pub patient_id: Option<String>,
}

/// Message exchanged inside a consultation ("messages")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub consultation_id: String,
    pub patient_id: String,
    pub physician_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub consultation: String,
    pub sender: String,
    pub content: String,
    pub attachment_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        MessageResponse {
            id: m.id,
            consultation: m.consultation_id,
            sender: m.sender_id,
            content: m.content,
            attachment_url: m.attachment_url,
            timestamp: m.timestamp,
            is_read: m.is_read,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMessageRequest {
    pub consultation_id: Option<String>,
    #[validate(length(min = 1, message = "Message content is required"))]
    pub content: String,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsultationRefRequest {
    pub consultation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsultationIdQuery {
    pub consultation_id: Option<String>,
}
