use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Collection, Database};
use uuid::Uuid;

use super::{care_search_filter, ensure_care_participants, sort_from_ordering};
use super::{ServiceError, ServiceResult};
use crate::access::Principal;
use crate::metrics::{track_db_operation, APPOINTMENT_STATUS_CHANGES_TOTAL};
use crate::models::care::{
    Appointment, AppointmentStatus, Consultation, ConsultationKind, ConsultationResponse,
    CreateConsultationRequest, EndConsultationRequest, ListConsultationsQuery, Message,
    MessageResponse, Prescription, PrescriptionResponse, UpdateConsultationRequest,
};
use crate::utils::time::chrono_to_bson;

const ORDERING_FIELDS: [&str; 3] = ["start_time", "end_time", "type"];

pub struct ConsultationService {
    mongo: Database,
}

impl ConsultationService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn consultations(&self) -> Collection<Consultation> {
        self.mongo.collection("consultations")
    }

    pub async fn list(
        &self,
        principal: &Principal,
        query: ListConsultationsQuery,
    ) -> ServiceResult<Vec<ConsultationResponse>> {
        let filter = match query.search.filter(|s| !s.trim().is_empty()) {
            Some(term) => care_search_filter(&self.mongo, &term, &["summary", "diagnosis"]).await?,
            None => Document::new(),
        };
        let sort = sort_from_ordering(
            query.ordering.as_deref(),
            &ORDERING_FIELDS,
            doc! { "start_time": -1 },
        );
        self.find(principal.scoped(filter), sort, None).await
    }

    /// Consultation with its prescriptions and messages.
    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<ConsultationResponse> {
        let consultation = self.scoped_consultation(principal, id).await?;
        let prescriptions = self.prescriptions_of(&consultation.id).await?;
        let messages = self.messages_of(&consultation.id).await?;

        let mut response = ConsultationResponse::from(consultation);
        response.prescriptions = Some(prescriptions);
        response.messages = Some(messages);
        Ok(response)
    }

    /// Opens a consultation. A physician always conducts the ones they open.
    pub async fn create(
        &self,
        principal: &Principal,
        req: CreateConsultationRequest,
    ) -> ServiceResult<ConsultationResponse> {
        let appointment_id = req.appointment_id.filter(|id| !id.is_empty());
        let (mut patient_id, mut physician_id) = (req.patient_id, req.physician_id);

        if let Some(appointment_id) = &appointment_id {
            let appointment = self.linked_appointment(principal, appointment_id).await?;
            patient_id.get_or_insert(appointment.patient_id);
            physician_id.get_or_insert(appointment.physician_id);

            let existing = self
                .consultations()
                .count_documents(doc! { "appointment_id": appointment_id })
                .await
                .context("Failed to check appointment consultation")?;
            if existing > 0 {
                return Err(ServiceError::bad_request(
                    "This appointment already has a consultation",
                ));
            }
        }

        let (patient_id, physician_id) = principal.resolve_participants(patient_id, physician_id)?;
        ensure_care_participants(&self.mongo, &patient_id, &physician_id).await?;

        let consultation = Consultation {
            id: Uuid::new_v4().to_string(),
            appointment_id,
            patient_id,
            physician_id,
            kind: req.kind,
            start_time: Utc::now(),
            end_time: None,
            summary: req.summary,
            diagnosis: req.diagnosis,
        };

        track_db_operation("insert", "consultations", async {
            self.consultations()
                .insert_one(&consultation)
                .await
                .context("Failed to insert consultation")
        })
        .await?;

        tracing::info!(
            consultation_id = %consultation.id,
            kind = consultation.kind.as_str(),
            "Consultation started"
        );
        Ok(consultation.into())
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        req: UpdateConsultationRequest,
    ) -> ServiceResult<ConsultationResponse> {
        self.scoped_consultation(principal, id).await?;

        let mut set = Document::new();
        if let Some(summary) = req.summary {
            set.insert("summary", summary);
        }
        if let Some(diagnosis) = req.diagnosis {
            set.insert("diagnosis", diagnosis);
        }
        if let Some(kind) = req.kind {
            set.insert("type", kind.as_str());
        }
        if !set.is_empty() {
            self.consultations()
                .update_one(doc! { "_id": id }, doc! { "$set": set })
                .await
                .context("Failed to update consultation")?;
        }

        self.get(principal, id).await
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        let result = self
            .consultations()
            .delete_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to delete consultation")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Consultation not found"));
        }

        for collection in ["prescriptions", "messages"] {
            self.mongo
                .collection::<Document>(collection)
                .delete_many(doc! { "consultation_id": id })
                .await
                .with_context(|| format!("Failed to clean up {}", collection))?;
        }
        Ok(())
    }

    /// Closes the consultation and completes its appointment, if any.
    pub async fn end(
        &self,
        principal: &Principal,
        id: &str,
        req: EndConsultationRequest,
    ) -> ServiceResult<ConsultationResponse> {
        let consultation = self.scoped_consultation(principal, id).await?;
        if consultation.end_time.is_some() {
            return Err(ServiceError::bad_request("This consultation has already ended"));
        }

        let mut set = doc! { "end_time": chrono_to_bson(Utc::now()) };
        if let Some(summary) = req.summary {
            set.insert("summary", summary);
        }
        if let Some(diagnosis) = req.diagnosis {
            set.insert("diagnosis", diagnosis);
        }

        // Guarded on end_time so two concurrent calls cannot both end it
        let result = self
            .consultations()
            .update_one(
                doc! { "_id": id, "end_time": { "$exists": false } },
                doc! { "$set": set },
            )
            .await
            .context("Failed to end consultation")?;
        if result.modified_count == 0 {
            return Err(ServiceError::bad_request("This consultation has already ended"));
        }

        if let Some(appointment_id) = &consultation.appointment_id {
            let completed = AppointmentStatus::Completed;
            self.mongo
                .collection::<Appointment>("appointments")
                .update_one(
                    doc! { "_id": appointment_id },
                    doc! { "$set": {
                        "status": completed.as_str(),
                        "updatedAt": chrono_to_bson(Utc::now()),
                    } },
                )
                .await
                .context("Failed to complete appointment")?;
            APPOINTMENT_STATUS_CHANGES_TOTAL
                .with_label_values(&[completed.as_str()])
                .inc();
        }

        tracing::info!(consultation_id = %id, "Consultation ended");
        self.get(principal, id).await
    }

    /// Consultations without an end time, latest first.
    pub async fn active(&self, principal: &Principal) -> ServiceResult<Vec<ConsultationResponse>> {
        self.find(
            principal.scoped(doc! { "end_time": { "$exists": false } }),
            doc! { "start_time": -1 },
            None,
        )
        .await
    }

    pub async fn by_type(
        &self,
        principal: &Principal,
        kind: Option<String>,
    ) -> ServiceResult<Vec<ConsultationResponse>> {
        let kind: ConsultationKind = kind
            .as_deref()
            .ok_or_else(|| ServiceError::bad_request("Invalid type"))?
            .parse()
            .map_err(ServiceError::BadRequest)?;
        self.find(
            principal.scoped(doc! { "type": kind.as_str() }),
            doc! { "start_time": -1 },
            None,
        )
        .await
    }

    pub async fn messages(&self, principal: &Principal, id: &str) -> ServiceResult<Vec<MessageResponse>> {
        let consultation = self.scoped_consultation(principal, id).await?;
        self.messages_of(&consultation.id).await
    }

    pub async fn prescriptions(
        &self,
        principal: &Principal,
        id: &str,
    ) -> ServiceResult<Vec<PrescriptionResponse>> {
        let consultation = self.scoped_consultation(principal, id).await?;
        self.prescriptions_of(&consultation.id).await
    }

    pub(crate) async fn find(
        &self,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<ConsultationResponse>> {
        let consultations: Vec<Consultation> = track_db_operation("find", "consultations", async {
            let collection = self.consultations();
            let mut find = collection.find(filter).sort(sort);
            if let Some(limit) = limit {
                find = find.limit(limit);
            }
            find.await
                .context("Failed to query consultations")?
                .try_collect()
                .await
                .context("Failed to read consultations")
        })
        .await?;
        Ok(consultations
            .into_iter()
            .map(ConsultationResponse::from)
            .collect())
    }

    async fn scoped_consultation(&self, principal: &Principal, id: &str) -> ServiceResult<Consultation> {
        self.consultations()
            .find_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to query consultation")?
            .ok_or_else(|| ServiceError::not_found("Consultation not found"))
    }

    async fn linked_appointment(&self, principal: &Principal, id: &str) -> ServiceResult<Appointment> {
        self.mongo
            .collection::<Appointment>("appointments")
            .find_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to query appointment")?
            .ok_or_else(|| ServiceError::bad_request("Appointment not found"))
    }

    async fn prescriptions_of(&self, consultation_id: &str) -> ServiceResult<Vec<PrescriptionResponse>> {
        let prescriptions: Vec<Prescription> = self
            .mongo
            .collection::<Prescription>("prescriptions")
            .find(doc! { "consultation_id": consultation_id })
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query prescriptions")?
            .try_collect()
            .await
            .context("Failed to read prescriptions")?;
        Ok(prescriptions.into_iter().map(PrescriptionResponse::from).collect())
    }

    async fn messages_of(&self, consultation_id: &str) -> ServiceResult<Vec<MessageResponse>> {
        let messages: Vec<Message> = self
            .mongo
            .collection::<Message>("messages")
            .find(doc! { "consultation_id": consultation_id })
            .sort(doc! { "timestamp": 1 })
            .await
            .context("Failed to query messages")?
            .try_collect()
            .await
            .context("Failed to read messages")?;
        Ok(messages.into_iter().map(MessageResponse::from).collect())
    }
}
