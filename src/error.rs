//! Service-level error taxonomy.
//!
//! Two caller-facing families: validation/not-found (bad input, missing
//! referenced entity, illegal state transition) and authorization (role or
//! ownership does not permit the action). Both reject the operation with no
//! persisted side effect. Underlying storage failures pass through as
//! `Database` and are not a caller problem.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::PrescriptionStatus;

/// Coarse family of a rejection, for mapping to a transport status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    // ── Authorization ────────────────────────────────────
    #[error("Only doctor accounts can use this operation")]
    NotDoctor,

    #[error("Only pharmacist accounts can use this operation")]
    NotPharmacist,

    #[error("No pharmacy is linked to this pharmacist account")]
    PharmacistWithoutPharmacy,

    #[error("Prescription was not authored by the calling doctor")]
    NotPrescriptionAuthor,

    #[error("Prescription was not sent to the caller's pharmacy")]
    NotAssignedToPharmacy,

    // ── Not found ────────────────────────────────────────
    #[error("{entity} not found: id {id}")]
    EntityNotFound { entity: &'static str, id: i64 },

    #[error("No patient with national ID {ssn}")]
    PatientSsnNotFound { ssn: String },

    // ── Validation / state ───────────────────────────────
    #[error("New patients require a name and a national ID")]
    NewPatientMissingFields,

    #[error("New medicines require a name")]
    NewMedicineMissingName,

    #[error("A prescription requires at least one medicine")]
    EmptyPrescription,

    #[error("Medicine {medicine_id} appears more than once in the prescription")]
    DuplicateMedicineLine { medicine_id: i64 },

    #[error("Diagnosis must not be empty")]
    EmptyDiagnosis,

    #[error("Search keyword must not be empty")]
    EmptyKeyword,

    #[error("Prescription was already sent to a pharmacy")]
    AlreadyDispatched,

    #[error("Prescription has not been dispatched; pharmacists cannot change it")]
    NotYetDispatched,

    #[error("Dispensing is already completed; the prescription is terminal")]
    AlreadyCompleted,

    #[error("Cannot move a prescription from {from} to {to}")]
    InvalidTransition {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    #[error("Only pharmacies linked to the doctor's hospital can be selected")]
    PharmacyNotLinkedToHospital,

    #[error("No hospital is registered for this doctor account")]
    DoctorWithoutHospital,

    #[error("An account with this username already exists")]
    DuplicateUsername,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(_) => ErrorKind::Internal,
            Self::NotDoctor
            | Self::NotPharmacist
            | Self::PharmacistWithoutPharmacy
            | Self::NotPrescriptionAuthor
            | Self::NotAssignedToPharmacy => ErrorKind::Authorization,
            Self::EntityNotFound { .. } | Self::PatientSsnNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::EntityNotFound { entity, id }
    }
}
