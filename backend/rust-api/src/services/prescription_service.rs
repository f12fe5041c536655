use anyhow::Context;
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Collection, Database};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::access::{AccessError, Principal};
use crate::models::care::{
    Consultation, CreatePrescriptionRequest, Prescription, PrescriptionResponse,
    UpdatePrescriptionRequest,
};

pub struct PrescriptionService {
    mongo: Database,
}

impl PrescriptionService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn prescriptions(&self) -> Collection<Prescription> {
        self.mongo.collection("prescriptions")
    }

    pub async fn list(&self, principal: &Principal) -> ServiceResult<Vec<PrescriptionResponse>> {
        self.find(principal.care_scope()).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<PrescriptionResponse> {
        Ok(self.scoped_prescription(principal, id).await?.into())
    }

    /// Only the physician who led the consultation may prescribe in it.
    pub async fn create(
        &self,
        principal: &Principal,
        req: CreatePrescriptionRequest,
    ) -> ServiceResult<PrescriptionResponse> {
        let consultation_id = req
            .consultation_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::bad_request("consultation_id is required"))?;

        let consultation = self
            .mongo
            .collection::<Consultation>("consultations")
            .find_one(doc! { "_id": &consultation_id })
            .await
            .context("Failed to query consultation")?
            .ok_or_else(|| ServiceError::not_found("Consultation not found"))?;

        if !principal.can_prescribe_for(&consultation) {
            return Err(AccessError::Forbidden(
                "You are not allowed to prescribe for this consultation",
            )
            .into());
        }

        let prescription = Prescription {
            id: Uuid::new_v4().to_string(),
            consultation_id,
            patient_id: consultation.patient_id,
            physician_id: consultation.physician_id,
            details: req.details,
            created_at: Utc::now(),
            valid_until: req.valid_until,
        };

        self.prescriptions()
            .insert_one(&prescription)
            .await
            .context("Failed to insert prescription")?;

        tracing::info!(
            prescription_id = %prescription.id,
            consultation_id = %prescription.consultation_id,
            "Prescription issued"
        );
        Ok(prescription.into())
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        req: UpdatePrescriptionRequest,
    ) -> ServiceResult<PrescriptionResponse> {
        let prescription = self.scoped_prescription(principal, id).await?;
        if principal.is_patient() {
            return Err(AccessError::Forbidden("Patients cannot edit prescriptions").into());
        }

        let mut set = Document::new();
        if let Some(details) = req.details {
            set.insert("details", details);
        }
        if let Some(valid_until) = req.valid_until {
            set.insert("valid_until", valid_until.to_string());
        }
        if !set.is_empty() {
            self.prescriptions()
                .update_one(doc! { "_id": &prescription.id }, doc! { "$set": set })
                .await
                .context("Failed to update prescription")?;
        }

        self.get(principal, id).await
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        if principal.is_patient() {
            return Err(AccessError::Forbidden("Patients cannot delete prescriptions").into());
        }
        let result = self
            .prescriptions()
            .delete_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to delete prescription")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Prescription not found"));
        }
        Ok(())
    }

    /// Prescriptions still valid today, or without an end date.
    pub async fn active(&self, principal: &Principal) -> ServiceResult<Vec<PrescriptionResponse>> {
        self.find(principal.scoped(active_on(Utc::now().date_naive())))
            .await
    }

    pub async fn by_patient(
        &self,
        principal: &Principal,
        patient_id: Option<String>,
    ) -> ServiceResult<Vec<PrescriptionResponse>> {
        if !principal.can_list_by_patient() {
            return Err(AccessError::Forbidden("Access denied").into());
        }
        let patient_id = patient_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::bad_request("The patient_id parameter is required"))?;

        self.find(principal.scoped(doc! { "patient_id": patient_id }))
            .await
    }

    pub(crate) async fn find(&self, filter: Document) -> ServiceResult<Vec<PrescriptionResponse>> {
        let prescriptions: Vec<Prescription> = self
            .prescriptions()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query prescriptions")?
            .try_collect()
            .await
            .context("Failed to read prescriptions")?;
        Ok(prescriptions.into_iter().map(PrescriptionResponse::from).collect())
    }

    async fn scoped_prescription(&self, principal: &Principal, id: &str) -> ServiceResult<Prescription> {
        self.prescriptions()
            .find_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to query prescription")?
            .ok_or_else(|| ServiceError::not_found("Prescription not found"))
    }
}

/// Filter matching prescriptions valid on `day`. Dates are stored as `YYYY-MM-DD`
/// strings, which compare in calendar order.
pub(crate) fn active_on(day: NaiveDate) -> Document {
    doc! {
        "$or": [
            { "valid_until": { "$gte": day.to_string() } },
            { "valid_until": null },
        ]
    }
}
