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
    Appointment, AppointmentResponse, AppointmentStatus, CreateAppointmentRequest,
    ListAppointmentsQuery, UpdateAppointmentRequest,
};
use crate::utils::time::{chrono_to_bson, day_bounds, parse_day};

const ORDERING_FIELDS: [&str; 4] = ["scheduled_at", "created_at", "status", "is_urgent"];

pub struct AppointmentService {
    mongo: Database,
}

impl AppointmentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn appointments(&self) -> Collection<Appointment> {
        self.mongo.collection("appointments")
    }

    pub async fn list(
        &self,
        principal: &Principal,
        query: ListAppointmentsQuery,
    ) -> ServiceResult<Vec<AppointmentResponse>> {
        let mut filter = match query.search.filter(|s| !s.trim().is_empty()) {
            Some(term) => care_search_filter(&self.mongo, &term, &["reason", "notes"]).await?,
            None => Document::new(),
        };
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        let sort = sort_from_ordering(
            query.ordering.as_deref(),
            &ORDERING_FIELDS,
            doc! { "scheduled_at": -1 },
        );
        self.find(principal.scoped(filter), sort, None).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<AppointmentResponse> {
        Ok(self.scoped_appointment(principal, id).await?.into())
    }

    /// Books an appointment. A patient is always booked as themselves.
    pub async fn create(
        &self,
        principal: &Principal,
        req: CreateAppointmentRequest,
    ) -> ServiceResult<AppointmentResponse> {
        let (patient_id, physician_id) =
            principal.resolve_participants(req.patient_id, req.physician_id)?;
        ensure_care_participants(&self.mongo, &patient_id, &physician_id).await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            patient_id,
            physician_id,
            scheduled_at: req.scheduled_at,
            status: AppointmentStatus::Pending,
            reason: req.reason,
            notes: req.notes,
            is_urgent: req.is_urgent,
            created_at: now,
            updated_at: now,
        };

        track_db_operation("insert", "appointments", async {
            self.appointments()
                .insert_one(&appointment)
                .await
                .context("Failed to insert appointment")
        })
        .await?;

        tracing::info!(
            appointment_id = %appointment.id,
            urgent = appointment.is_urgent,
            "Appointment booked"
        );
        Ok(appointment.into())
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        req: UpdateAppointmentRequest,
    ) -> ServiceResult<AppointmentResponse> {
        let current = self.scoped_appointment(principal, id).await?;

        let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };
        if let Some(scheduled_at) = req.scheduled_at {
            set.insert("scheduled_at", chrono_to_bson(scheduled_at));
        }
        if let Some(reason) = req.reason {
            set.insert("reason", reason);
        }
        if let Some(notes) = req.notes {
            set.insert("notes", notes);
        }
        if let Some(is_urgent) = req.is_urgent {
            set.insert("is_urgent", is_urgent);
        }
        if let Some(status) = req.status {
            set.insert("status", status.as_str());
        }

        self.appointments()
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await
            .context("Failed to update appointment")?;

        if let Some(status) = req.status.filter(|s| *s != current.status) {
            record_status_change(id, status);
        }

        self.get(principal, id).await
    }

    /// `POST /appointments/{id}/status`: the status must be one of the four known values.
    pub async fn set_status(
        &self,
        principal: &Principal,
        id: &str,
        status: Option<String>,
    ) -> ServiceResult<AppointmentResponse> {
        let status: AppointmentStatus = status
            .as_deref()
            .ok_or_else(|| ServiceError::bad_request("Invalid status"))?
            .parse()
            .map_err(ServiceError::BadRequest)?;

        self.scoped_appointment(principal, id).await?;
        self.appointments()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": status.as_str(),
                    "updatedAt": chrono_to_bson(Utc::now()),
                } },
            )
            .await
            .context("Failed to update appointment status")?;

        record_status_change(id, status);
        self.get(principal, id).await
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        let result = self
            .appointments()
            .delete_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to delete appointment")?;
        if result.deleted_count == 0 {
            return Err(ServiceError::not_found("Appointment not found"));
        }
        tracing::info!(appointment_id = %id, "Appointment deleted");
        Ok(())
    }

    /// Future appointments still pending or confirmed, soonest first.
    pub async fn upcoming(
        &self,
        principal: &Principal,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<AppointmentResponse>> {
        let filter = principal.scoped(doc! {
            "scheduled_at": { "$gt": chrono_to_bson(Utc::now()) },
            "status": { "$in": AppointmentStatus::open().to_vec() },
        });
        self.find(filter, doc! { "scheduled_at": 1 }, limit).await
    }

    pub async fn by_date(
        &self,
        principal: &Principal,
        date: Option<String>,
    ) -> ServiceResult<Vec<AppointmentResponse>> {
        let date = date
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ServiceError::bad_request("The date parameter is required"))?;
        let (start, end) = parse_day(date.trim())
            .and_then(day_bounds)
            .ok_or_else(|| ServiceError::bad_request("Invalid date format, use YYYY-MM-DD"))?;

        self.on_day(principal.care_scope(), start, end, None).await
    }

    /// Appointments scheduled within `[start, end)`, optionally restricted to some statuses.
    pub(crate) async fn on_day(
        &self,
        mut filter: Document,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        statuses: Option<[&str; 2]>,
    ) -> ServiceResult<Vec<AppointmentResponse>> {
        filter.insert(
            "scheduled_at",
            doc! { "$gte": chrono_to_bson(start), "$lt": chrono_to_bson(end) },
        );
        if let Some(statuses) = statuses {
            filter.insert("status", doc! { "$in": statuses.to_vec() });
        }
        self.find(filter, doc! { "scheduled_at": 1 }, None).await
    }

    pub async fn urgent(&self, principal: &Principal) -> ServiceResult<Vec<AppointmentResponse>> {
        self.find(
            principal.scoped(doc! { "is_urgent": true }),
            doc! { "scheduled_at": 1 },
            None,
        )
        .await
    }

    async fn scoped_appointment(&self, principal: &Principal, id: &str) -> ServiceResult<Appointment> {
        self.appointments()
            .find_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to query appointment")?
            .ok_or_else(|| ServiceError::not_found("Appointment not found"))
    }

    async fn find(
        &self,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<AppointmentResponse>> {
        let appointments: Vec<Appointment> = track_db_operation("find", "appointments", async {
            let collection = self.appointments();
            let mut find = collection.find(filter).sort(sort);
            if let Some(limit) = limit {
                find = find.limit(limit);
            }
            find.await
                .context("Failed to query appointments")?
                .try_collect()
                .await
                .context("Failed to read appointments")
        })
        .await?;
        Ok(appointments.into_iter().map(AppointmentResponse::from).collect())
    }
}

fn record_status_change(id: &str, status: AppointmentStatus) {
    APPOINTMENT_STATUS_CHANGES_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
    tracing::info!(appointment_id = %id, status = status.as_str(), "Appointment status changed");
}
