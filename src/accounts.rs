//! Profile provisioning: hospitals, departments, pharmacies, and the
//! member→profile binding the Identity Resolver relies on. Token issuing and
//! password handling live in the outer authentication layer, not here.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::repository::{account, org};
use crate::error::ServiceError;
use crate::models::enums::MemberRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDoctor {
    pub username: String,
    pub name: String,
    pub hospital_id: i64,
    pub department_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPharmacist {
    pub username: String,
    pub name: String,
    pub pharmacy_id: i64,
}

pub fn create_hospital(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
    phone: Option<&str>,
) -> Result<i64, ServiceError> {
    Ok(org::insert_hospital(conn, name, address, phone)?)
}

pub fn create_department(
    conn: &Connection,
    hospital_id: i64,
    name: &str,
) -> Result<i64, ServiceError> {
    org::get_hospital(conn, hospital_id)?
        .ok_or_else(|| ServiceError::not_found("Hospital", hospital_id))?;
    Ok(org::insert_department(conn, Some(hospital_id), name)?)
}

pub fn create_pharmacy(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
    phone: Option<&str>,
    hospital_id: Option<i64>,
) -> Result<i64, ServiceError> {
    if let Some(hid) = hospital_id {
        org::get_hospital(conn, hid)?.ok_or_else(|| ServiceError::not_found("Hospital", hid))?;
    }
    Ok(org::insert_pharmacy(conn, name, address, phone, hospital_id)?)
}

/// Create a doctor member plus its profile in one transaction.
/// Returns (member_id, doctor_id).
pub fn register_doctor(conn: &Connection, req: &NewDoctor) -> Result<(i64, i64), ServiceError> {
    if account::member_username_exists(conn, &req.username)? {
        return Err(ServiceError::DuplicateUsername);
    }
    org::get_hospital(conn, req.hospital_id)?
        .ok_or_else(|| ServiceError::not_found("Hospital", req.hospital_id))?;
    org::get_department(conn, req.department_id)?
        .ok_or_else(|| ServiceError::not_found("Department", req.department_id))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(crate::db::DatabaseError::Sqlite)?;
    let member_id = account::insert_member(&tx, &req.username, &req.name, MemberRole::Doctor)?;
    let doctor_id =
        account::insert_doctor(&tx, member_id, Some(req.hospital_id), Some(req.department_id))?;
    tx.commit().map_err(crate::db::DatabaseError::Sqlite)?;

    tracing::info!(member_id, doctor_id, "Doctor account registered");
    Ok((member_id, doctor_id))
}

/// Create a pharmacist member plus its profile. Returns (member_id, pharmacist_id).
pub fn register_pharmacist(
    conn: &Connection,
    req: &NewPharmacist,
) -> Result<(i64, i64), ServiceError> {
    if account::member_username_exists(conn, &req.username)? {
        return Err(ServiceError::DuplicateUsername);
    }
    org::get_pharmacy(conn, req.pharmacy_id)?
        .ok_or_else(|| ServiceError::not_found("Pharmacy", req.pharmacy_id))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(crate::db::DatabaseError::Sqlite)?;
    let member_id = account::insert_member(&tx, &req.username, &req.name, MemberRole::Pharmacist)?;
    let pharmacist_id = account::insert_pharmacist(&tx, member_id, Some(req.pharmacy_id))?;
    tx.commit().map_err(crate::db::DatabaseError::Sqlite)?;

    tracing::info!(member_id, pharmacist_id, "Pharmacist account registered");
    Ok((member_id, pharmacist_id))
}
