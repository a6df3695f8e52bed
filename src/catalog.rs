//! Doctor-facing catalogue search: medicines by name, and pharmacies linked
//! to the doctor's own hospital.

use rusqlite::Connection;

use crate::auth::{require_doctor, Identity};
use crate::db::repository::{medicine, org};
use crate::error::ServiceError;
use crate::views::{MedicineSummary, PharmacySearchResult};

const MEDICINE_SEARCH_LIMIT: u32 = 20;
const PHARMACY_SEARCH_DEFAULT: u32 = 10;
const PHARMACY_SEARCH_MAX: u32 = 50;

/// Blank keyword returns an empty list; results are bounded, name-ascending.
pub fn search_medicines(
    conn: &Connection,
    identity: &Identity,
    keyword: &str,
) -> Result<Vec<MedicineSummary>, ServiceError> {
    require_doctor(conn, identity)?;
    let trimmed = keyword.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(
        medicine::search_medicines_by_name(conn, trimmed, MEDICINE_SEARCH_LIMIT)?
            .into_iter()
            .map(|m| MedicineSummary {
                id: m.id,
                name: m.name,
                manufacturer: m.manufacturer,
                efficacy: m.efficacy,
            })
            .collect(),
    )
}

/// Pharmacies eligible as dispatch targets for the caller: linked to the
/// doctor's hospital and matching the keyword. A blank keyword is an error
/// here, unlike medicine search, since the result set is a dispatch picker.
pub fn search_pharmacies(
    conn: &Connection,
    identity: &Identity,
    keyword: &str,
    size: Option<u32>,
) -> Result<Vec<PharmacySearchResult>, ServiceError> {
    let doctor = require_doctor(conn, identity)?;
    let trimmed = keyword.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::EmptyKeyword);
    }
    let hospital_id = doctor.hospital_id.ok_or(ServiceError::DoctorWithoutHospital)?;
    let limit = match size {
        Some(n) if n > 0 => n.min(PHARMACY_SEARCH_MAX),
        _ => PHARMACY_SEARCH_DEFAULT,
    };

    let hospital_name = org::get_hospital(conn, hospital_id)?.map(|h| h.name);
    Ok(
        org::search_pharmacies_by_hospital(conn, hospital_id, trimmed, limit)?
            .into_iter()
            .map(|p| PharmacySearchResult {
                id: p.id,
                name: p.name,
                address: p.address,
                phone: p.phone,
                hospital_id: p.hospital_id,
                hospital_name: hospital_name.clone(),
            })
            .collect(),
    )
}
