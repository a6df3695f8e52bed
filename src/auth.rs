//! Identity Resolver: maps an authenticated caller to exactly one role-scoped
//! profile. The external authentication layer is trusted to hand us an account
//! id and declared role; this module only binds that identity to a domain
//! profile, once, before any operation proceeds.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::repository::account;
use crate::error::ServiceError;
use crate::models::enums::MemberRole;

/// What the authentication boundary supplies for every request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Identity {
    pub member_id: i64,
    pub role: MemberRole,
}

/// A doctor caller with its organizational anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoctorProfile {
    pub doctor_id: i64,
    pub hospital_id: Option<i64>,
    pub department_id: Option<i64>,
}

/// A pharmacist caller. The pharmacy link is required: a pharmacist account
/// without one cannot use any pharmacist operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PharmacistProfile {
    pub pharmacist_id: i64,
    pub pharmacy_id: i64,
}

/// Exactly one role-scoped profile per caller, matched exhaustively by the
/// lifecycle engine instead of repeated nullable-lookup probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Doctor(DoctorProfile),
    Pharmacist(PharmacistProfile),
}

/// Resolve an identity to its profile. Pure lookup, no side effects.
pub fn resolve_caller(conn: &Connection, identity: &Identity) -> Result<Caller, ServiceError> {
    match identity.role {
        MemberRole::Doctor => {
            let doctor = account::find_doctor_by_member(conn, identity.member_id)?
                .ok_or(ServiceError::NotDoctor)?;
            Ok(Caller::Doctor(DoctorProfile {
                doctor_id: doctor.id,
                hospital_id: doctor.hospital_id,
                department_id: doctor.department_id,
            }))
        }
        MemberRole::Pharmacist => {
            let pharmacist = account::find_pharmacist_by_member(conn, identity.member_id)?
                .ok_or(ServiceError::NotPharmacist)?;
            let pharmacy_id = pharmacist
                .pharmacy_id
                .ok_or(ServiceError::PharmacistWithoutPharmacy)?;
            Ok(Caller::Pharmacist(PharmacistProfile {
                pharmacist_id: pharmacist.id,
                pharmacy_id,
            }))
        }
    }
}

/// Guard for doctor-only operations.
pub fn require_doctor(conn: &Connection, identity: &Identity) -> Result<DoctorProfile, ServiceError> {
    match resolve_caller(conn, identity)? {
        Caller::Doctor(profile) => Ok(profile),
        Caller::Pharmacist(_) => Err(ServiceError::NotDoctor),
    }
}

/// Guard for pharmacist-only operations.
pub fn require_pharmacist(
    conn: &Connection,
    identity: &Identity,
) -> Result<PharmacistProfile, ServiceError> {
    match resolve_caller(conn, identity)? {
        Caller::Pharmacist(profile) => Ok(profile),
        Caller::Doctor(_) => Err(ServiceError::NotPharmacist),
    }
}
