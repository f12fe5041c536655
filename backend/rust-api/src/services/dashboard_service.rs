use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Database;
use serde::Serialize;
use std::collections::BTreeMap;

use super::appointment_service::AppointmentService;
use super::consultation_service::ConsultationService;
use super::first_aid_service::FirstAidService;
use super::prescription_service::{active_on, PrescriptionService};
use super::ServiceResult;
use crate::access::Principal;
use crate::models::care::{AppointmentResponse, AppointmentStatus, ConsultationResponse, PrescriptionResponse};
use crate::models::quiz::QuizResultResponse;
use crate::models::user::Role;
use crate::utils::time::{chrono_to_bson, day_bounds, month_start};

const DASHBOARD_LIST_SIZE: i64 = 5;

#[derive(Debug, Serialize)]
pub struct PatientDashboard {
    pub upcoming_appointments: Vec<AppointmentResponse>,
    pub recent_consultations: Vec<ConsultationResponse>,
    pub active_prescriptions: Vec<PrescriptionResponse>,
    pub quiz_results: Vec<QuizResultResponse>,
}

#[derive(Debug, Serialize)]
pub struct PhysicianDashboard {
    pub today_appointments: Vec<AppointmentResponse>,
    pub pending_consultations: Vec<ConsultationResponse>,
    pub stats: PhysicianStats,
}

#[derive(Debug, Serialize)]
pub struct PhysicianStats {
    pub total_appointments: u64,
    pub total_consultations: u64,
    pub total_patients: u64,
}

#[derive(Debug, Serialize)]
pub struct AdminStatistics {
    pub users: UserCounts,
    pub appointments: AppointmentCounts,
    pub consultations: ConsultationCounts,
    pub this_month: MonthCounts,
    pub quizzes: Vec<ModuleQuizStats>,
}

#[derive(Debug, Default, Serialize)]
pub struct UserCounts {
    pub total: u64,
    pub patients: u64,
    pub physicians: u64,
    pub admins: u64,
}

#[derive(Debug, Serialize)]
pub struct AppointmentCounts {
    pub total: u64,
    pub completed: u64,
}

#[derive(Debug, Serialize)]
pub struct ConsultationCounts {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct MonthCounts {
    pub registrations: u64,
    pub appointments: u64,
    pub consultations: u64,
}

#[derive(Debug, Serialize)]
pub struct ModuleQuizStats {
    pub module_id: String,
    pub module_title: String,
    pub attempts: u64,
    pub average_score: f64,
}

pub struct DashboardService {
    mongo: Database,
}

impl DashboardService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn patient(&self, principal: &Principal) -> ServiceResult<PatientDashboard> {
        principal.require_role(Role::Patient, "Patient dashboard is for patients only")?;

        let upcoming_appointments = AppointmentService::new(self.mongo.clone())
            .upcoming(principal, Some(DASHBOARD_LIST_SIZE))
            .await?;
        let recent_consultations = ConsultationService::new(self.mongo.clone())
            .find(principal.care_scope(), doc! { "start_time": -1 }, Some(DASHBOARD_LIST_SIZE))
            .await?;
        let active_prescriptions = PrescriptionService::new(self.mongo.clone())
            .find(principal.scoped(active_on(Utc::now().date_naive())))
            .await?;
        let quiz_results = FirstAidService::new(self.mongo.clone())
            .results(&principal.user_id)
            .await?;

        Ok(PatientDashboard {
            upcoming_appointments,
            recent_consultations,
            active_prescriptions,
            quiz_results,
        })
    }

    pub async fn physician(&self, principal: &Principal) -> ServiceResult<PhysicianDashboard> {
        principal.require_role(Role::Physician, "Physician dashboard is for physicians only")?;

        let (start, end) = day_bounds(Utc::now().date_naive())
            .ok_or_else(|| anyhow!("Failed to compute today's bounds"))?;
        let today_appointments = AppointmentService::new(self.mongo.clone())
            .on_day(principal.care_scope(), start, end, Some(AppointmentStatus::open()))
            .await?;
        let pending_consultations = ConsultationService::new(self.mongo.clone())
            .find(
                principal.scoped(doc! { "end_time": { "$exists": false } }),
                doc! { "start_time": -1 },
                None,
            )
            .await?;

        let scope = principal.care_scope();
        let total_appointments = self.count("appointments", scope.clone()).await?;
        let total_consultations = self.count("consultations", scope.clone()).await?;
        let total_patients = self
            .mongo
            .collection::<Document>("consultations")
            .distinct("patient_id", scope)
            .await
            .context("Failed to count distinct patients")?
            .len() as u64;

        Ok(PhysicianDashboard {
            today_appointments,
            pending_consultations,
            stats: PhysicianStats {
                total_appointments,
                total_consultations,
                total_patients,
            },
        })
    }

    pub async fn admin_statistics(&self) -> ServiceResult<AdminStatistics> {
        let mut users = UserCounts {
            total: self.count("users", doc! {}).await?,
            ..Default::default()
        };
        for role in [Role::Patient, Role::Physician, Role::Admin] {
            let count = self.count("users", doc! { "role": role.as_str() }).await?;
            match role {
                Role::Patient => users.patients = count,
                Role::Physician => users.physicians = count,
                Role::Admin => users.admins = count,
            }
        }

        let appointments = AppointmentCounts {
            total: self.count("appointments", doc! {}).await?,
            completed: self
                .count(
                    "appointments",
                    doc! { "status": AppointmentStatus::Completed.as_str() },
                )
                .await?,
        };

        let consultations = ConsultationCounts {
            total: self.count("consultations", doc! {}).await?,
            by_type: self.consultations_by_type().await?,
        };

        let since = month_start(Utc::now())
            .map(chrono_to_bson)
            .ok_or_else(|| anyhow!("Failed to compute month start"))?;
        let this_month = MonthCounts {
            registrations: self
                .count("users", doc! { "createdAt": { "$gte": since } })
                .await?,
            appointments: self
                .count("appointments", doc! { "createdAt": { "$gte": since } })
                .await?,
            consultations: self
                .count("consultations", doc! { "start_time": { "$gte": since } })
                .await?,
        };

        Ok(AdminStatistics {
            users,
            appointments,
            consultations,
            this_month,
            quizzes: self.quiz_stats().await?,
        })
    }

    async fn count(&self, collection: &str, filter: Document) -> ServiceResult<u64> {
        Ok(self
            .mongo
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .with_context(|| format!("Failed to count {}", collection))?)
    }

    async fn consultations_by_type(&self) -> ServiceResult<BTreeMap<String, u64>> {
        let pipeline = vec![doc! { "$group": { "_id": "$type", "count": { "$sum": 1 } } }];
        let rows: Vec<Document> = self
            .mongo
            .collection::<Document>("consultations")
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate consultations")?
            .try_collect()
            .await
            .context("Failed to read consultation aggregation")?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let kind = row.get_str("_id").ok()?;
                Some((kind.to_string(), as_count(row.get("count"))))
            })
            .collect())
    }

    /// Attempts and average score per module, modules without attempts included.
    async fn quiz_stats(&self) -> ServiceResult<Vec<ModuleQuizStats>> {
        let pipeline = vec![doc! {
            "$group": {
                "_id": "$module_id",
                "attempts": { "$sum": 1 },
                "average_score": { "$avg": "$score" },
            }
        }];
        let rows: Vec<Document> = self
            .mongo
            .collection::<Document>("quiz_results")
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate quiz results")?
            .try_collect()
            .await
            .context("Failed to read quiz aggregation")?;

        let mut by_module: BTreeMap<String, (u64, f64)> = rows
            .iter()
            .filter_map(|row| {
                let module_id = row.get_str("_id").ok()?;
                let average = row.get_f64("average_score").unwrap_or(0.0);
                Some((module_id.to_string(), (as_count(row.get("attempts")), average)))
            })
            .collect();

        let modules: Vec<Document> = self
            .mongo
            .collection::<Document>("first_aid_modules")
            .find(doc! {})
            .sort(doc! { "order": 1, "title": 1 })
            .await
            .context("Failed to query modules")?
            .try_collect()
            .await
            .context("Failed to read modules")?;

        Ok(modules
            .iter()
            .filter_map(|module| {
                let module_id = module.get_str("_id").ok()?;
                let (attempts, average) = by_module.remove(module_id).unwrap_or((0, 0.0));
                Some(ModuleQuizStats {
                    module_id: module_id.to_string(),
                    module_title: module.get_str("title").unwrap_or_default().to_string(),
                    attempts,
                    average_score: (average * 100.0).round() / 100.0,
                })
            })
            .collect())
    }
}

/// `$sum: 1` yields Int32 or Int64 depending on magnitude.
fn as_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accept_both_integer_widths() {
        assert_eq!(as_count(Some(&Bson::Int32(3))), 3);
        assert_eq!(as_count(Some(&Bson::Int64(7))), 7);
        assert_eq!(as_count(Some(&Bson::Double(1.0))), 0);
        assert_eq!(as_count(None), 0);
    }
}
