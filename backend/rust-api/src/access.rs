//! Role capabilities: who may see or change which care records.
//!
//! Handlers never branch on role strings. They build a [`Principal`] from the
//! verified token and ask it for query scopes and permission decisions.

use mongodb::bson::{doc, Document};
use thiserror::Error;

use crate::middlewares::auth::JwtClaims;
use crate::models::care::Consultation;
use crate::models::user::Role;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} is required")]
    MissingParticipant(&'static str),
}

/// Which profiles of a given role a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    Own,
    /// Users on the other side of a consultation with the caller
    Counterparts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl From<&JwtClaims> for Principal {
    fn from(claims: &JwtClaims) -> Self {
        Principal {
            user_id: claims.sub.clone(),
            role: claims.role,
        }
    }
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    pub fn is_physician(&self) -> bool {
        self.role == Role::Physician
    }

    /// Field of a care record that names the caller, if the role owns one side.
    fn own_field(&self) -> Option<&'static str> {
        match self.role {
            Role::Patient => Some("patient_id"),
            Role::Physician => Some("physician_id"),
            Role::Admin => None,
        }
    }

    /// Filter restricting appointments, consultations, prescriptions and
    /// messages to the ones the caller takes part in. Empty for admins.
    pub fn care_scope(&self) -> Document {
        match self.own_field() {
            Some(field) => doc! { field: self.user_id.as_str() },
            None => doc! {},
        }
    }

    /// `care_scope` combined with an extra filter.
    pub fn scoped(&self, mut filter: Document) -> Document {
        for (key, value) in self.care_scope() {
            filter.insert(key, value);
        }
        filter
    }

    /// For counterpart lookups over consultations: (caller's field, other side's field).
    pub fn counterpart_fields(&self) -> Option<(&'static str, &'static str)> {
        match self.role {
            Role::Patient => Some(("patient_id", "physician_id")),
            Role::Physician => Some(("physician_id", "patient_id")),
            Role::Admin => None,
        }
    }

    pub fn visibility_of(&self, target: Role) -> Visibility {
        if self.is_admin() {
            Visibility::All
        } else if self.role == target {
            Visibility::Own
        } else {
            Visibility::Counterparts
        }
    }

    pub fn participates_in(&self, consultation: &Consultation) -> bool {
        consultation.involves(&self.user_id)
    }

    pub fn can_read_consultation(&self, consultation: &Consultation) -> bool {
        self.is_admin() || self.participates_in(consultation)
    }

    pub fn can_prescribe_for(&self, consultation: &Consultation) -> bool {
        self.is_physician() && consultation.physician_id == self.user_id
    }

    pub fn can_list_by_patient(&self) -> bool {
        matches!(self.role, Role::Physician | Role::Admin)
    }

    /// Resolves (patient_id, physician_id) for a new care record. The caller's
    /// own side always wins over whatever the request body says.
    pub fn resolve_participants(
        &self,
        patient_id: Option<String>,
        physician_id: Option<String>,
    ) -> Result<(String, String), AccessError> {
        let (patient, physician) = match self.role {
            Role::Patient => (Some(self.user_id.clone()), physician_id),
            Role::Physician => (patient_id, Some(self.user_id.clone())),
            Role::Admin => (patient_id, physician_id),
        };
        let patient = patient
            .filter(|id| !id.is_empty())
            .ok_or(AccessError::MissingParticipant("patient_id"))?;
        let physician = physician
            .filter(|id| !id.is_empty())
            .ok_or(AccessError::MissingParticipant("physician_id"))?;
        Ok((patient, physician))
    }

    pub fn require_role(&self, role: Role, message: &'static str) -> Result<(), AccessError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AccessError::Forbidden(message))
        }
    }
}
