//! Domain entities as stored. View types live in `views`.

pub mod enums;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use enums::{MemberRole, PrescriptionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub hospital_id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// Organizational link used to scope doctor→pharmacy dispatch eligibility.
    pub hospital_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub member_id: i64,
    pub hospital_id: Option<i64>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacist {
    pub id: i64,
    pub member_id: i64,
    pub pharmacy_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    /// National ID. Globally unique; record creation looks this up before
    /// ever creating a new patient row.
    pub ssn: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub history: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: i64,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub patient_id: i64,
    pub doctor_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symptom {
    pub id: i64,
    pub name: String,
    pub body_part: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    pub manufacturer: Option<String>,
    pub efficacy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub issue_date: NaiveDate,
    pub status: PrescriptionStatus,
    pub medical_record_id: i64,
    /// NULL until the dispatch transition assigns a pharmacy.
    pub pharmacy_id: Option<i64>,
}

/// Join entity between Prescription and Medicine with per-prescription
/// attributes. (prescription_id, medicine_id) is the composite key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionMedicine {
    pub prescription_id: i64,
    pub medicine_id: i64,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub days: Option<i32>,
}
