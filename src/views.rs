//! Query/Response Projection: read-only assembly of caller-facing views from
//! persisted rows. No authorization and no mutation happen here; the services
//! decide who may see what before asking for a view.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::repository::{master, medicine, org, prescription, record};
use crate::db::DatabaseError;
use crate::error::ServiceError;
use crate::models::enums::PrescriptionStatus;
use crate::models::{MedicalRecord, Patient, Prescription};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientView {
    pub id: i64,
    pub name: String,
    pub ssn: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub history: Option<String>,
}

/// Short patient slice used in list rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonSummary {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: i64,
    pub name: String,
    pub hospital_name: Option<String>,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: i64,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub patient: PersonSummary,
    pub doctor: DoctorSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomView {
    pub id: i64,
    pub name: String,
    pub body_part: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientView {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescribedMedicineView {
    pub medicine_id: i64,
    pub name: String,
    pub manufacturer: Option<String>,
    pub efficacy: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub days: Option<i32>,
    pub ingredients: Vec<IngredientView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionView {
    pub id: i64,
    pub issue_date: NaiveDate,
    pub status: PrescriptionStatus,
    pub pharmacy_id: Option<i64>,
    pub pharmacy_name: Option<String>,
    pub medicines: Vec<PrescribedMedicineView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDetail {
    pub record_id: i64,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub patient: PatientView,
    pub doctor: DoctorSummary,
    pub symptoms: Vec<SymptomView>,
    pub treatments: Vec<TreatmentView>,
    pub prescription: Option<PrescriptionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub prescription_id: i64,
    pub medical_record_id: i64,
    pub issue_date: NaiveDate,
    pub status: PrescriptionStatus,
    pub diagnosis: String,
    pub patient: PersonSummary,
    pub doctor: DoctorSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionDetail {
    pub prescription_id: i64,
    pub medical_record_id: i64,
    pub issue_date: NaiveDate,
    pub status: PrescriptionStatus,
    pub diagnosis: String,
    pub pharmacy_id: Option<i64>,
    pub pharmacy_name: Option<String>,
    pub patient: PatientView,
    pub doctor: DoctorSummary,
    pub medicines: Vec<PrescribedMedicineView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineSummary {
    pub id: i64,
    pub name: String,
    pub manufacturer: Option<String>,
    pub efficacy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacySearchResult {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub hospital_id: Option<i64>,
    pub hospital_name: Option<String>,
}

pub fn patient_view(patient: &Patient) -> PatientView {
    PatientView {
        id: patient.id,
        name: patient.name.clone(),
        ssn: patient.ssn.clone(),
        address: patient.address.clone(),
        phone: patient.phone.clone(),
        history: patient.history.clone(),
    }
}

/// Doctor with member, hospital, and department names in one round trip.
pub fn doctor_summary(conn: &Connection, doctor_id: i64) -> Result<DoctorSummary, ServiceError> {
    let result = conn.query_row(
        "SELECT d.did, m.name, h.hname, dp.dname
         FROM doctor d
         JOIN member m ON m.member_id = d.member_id
         LEFT JOIN hospital h ON h.hid = d.hid
         LEFT JOIN department dp ON dp.dept_id = d.dept_id
         WHERE d.did = ?1",
        params![doctor_id],
        |row| {
            Ok(DoctorSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                hospital_name: row.get(2)?,
                department_name: row.get(3)?,
            })
        },
    );

    match result {
        Ok(summary) => Ok(summary),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ServiceError::not_found("Doctor", doctor_id))
        }
        Err(e) => Err(ServiceError::Database(DatabaseError::Sqlite(e))),
    }
}

pub fn record_summary(
    conn: &Connection,
    rec: &MedicalRecord,
) -> Result<RecordSummary, ServiceError> {
    let patient = crate::db::repository::patient::get_patient(conn, rec.patient_id)?
        .ok_or_else(|| ServiceError::not_found("Patient", rec.patient_id))?;
    Ok(RecordSummary {
        record_id: rec.id,
        visit_date: rec.visit_date,
        diagnosis: rec.diagnosis.clone(),
        patient: PersonSummary {
            id: patient.id,
            name: patient.name,
        },
        doctor: doctor_summary(conn, rec.doctor_id)?,
    })
}

pub fn record_detail(conn: &Connection, rec: &MedicalRecord) -> Result<RecordDetail, ServiceError> {
    let patient = crate::db::repository::patient::get_patient(conn, rec.patient_id)?
        .ok_or_else(|| ServiceError::not_found("Patient", rec.patient_id))?;

    let symptoms = master::get_symptoms_for_record(conn, rec.id)?
        .into_iter()
        .map(|s| SymptomView {
            id: s.id,
            name: s.name,
            body_part: s.body_part,
        })
        .collect();
    let treatments = master::get_treatments_for_record(conn, rec.id)?
        .into_iter()
        .map(|t| TreatmentView {
            id: t.id,
            name: t.name,
            description: t.description,
        })
        .collect();

    let prescription = match prescription::get_prescription_for_record(conn, rec.id)? {
        Some(pres) => Some(prescription_view(conn, &pres)?),
        None => None,
    };

    Ok(RecordDetail {
        record_id: rec.id,
        visit_date: rec.visit_date,
        diagnosis: rec.diagnosis.clone(),
        patient: patient_view(&patient),
        doctor: doctor_summary(conn, rec.doctor_id)?,
        symptoms,
        treatments,
        prescription,
    })
}

pub fn prescription_summary(
    conn: &Connection,
    pres: &Prescription,
) -> Result<PrescriptionSummary, ServiceError> {
    let rec = record::get_record(conn, pres.medical_record_id)?
        .ok_or_else(|| ServiceError::not_found("MedicalRecord", pres.medical_record_id))?;
    let patient = crate::db::repository::patient::get_patient(conn, rec.patient_id)?
        .ok_or_else(|| ServiceError::not_found("Patient", rec.patient_id))?;

    Ok(PrescriptionSummary {
        prescription_id: pres.id,
        medical_record_id: rec.id,
        issue_date: pres.issue_date,
        status: pres.status,
        diagnosis: rec.diagnosis,
        patient: PersonSummary {
            id: patient.id,
            name: patient.name,
        },
        doctor: doctor_summary(conn, rec.doctor_id)?,
    })
}

pub fn prescription_detail(
    conn: &Connection,
    pres: &Prescription,
) -> Result<PrescriptionDetail, ServiceError> {
    let rec = record::get_record(conn, pres.medical_record_id)?
        .ok_or_else(|| ServiceError::not_found("MedicalRecord", pres.medical_record_id))?;
    let patient = crate::db::repository::patient::get_patient(conn, rec.patient_id)?
        .ok_or_else(|| ServiceError::not_found("Patient", rec.patient_id))?;
    let pharmacy = match pres.pharmacy_id {
        Some(id) => org::get_pharmacy(conn, id)?,
        None => None,
    };

    Ok(PrescriptionDetail {
        prescription_id: pres.id,
        medical_record_id: rec.id,
        issue_date: pres.issue_date,
        status: pres.status,
        diagnosis: rec.diagnosis,
        pharmacy_id: pharmacy.as_ref().map(|p| p.id),
        pharmacy_name: pharmacy.map(|p| p.name),
        patient: patient_view(&patient),
        doctor: doctor_summary(conn, rec.doctor_id)?,
        medicines: prescribed_medicines(conn, pres)?,
    })
}

fn prescription_view(
    conn: &Connection,
    pres: &Prescription,
) -> Result<PrescriptionView, ServiceError> {
    let pharmacy = match pres.pharmacy_id {
        Some(id) => org::get_pharmacy(conn, id)?,
        None => None,
    };
    Ok(PrescriptionView {
        id: pres.id,
        issue_date: pres.issue_date,
        status: pres.status,
        pharmacy_id: pharmacy.as_ref().map(|p| p.id),
        pharmacy_name: pharmacy.map(|p| p.name),
        medicines: prescribed_medicines(conn, pres)?,
    })
}

/// Line items joined with the medicine catalogue, medicine-id ascending;
/// ingredients ingredient-id ascending. Deterministic for equal inputs.
fn prescribed_medicines(
    conn: &Connection,
    pres: &Prescription,
) -> Result<Vec<PrescribedMedicineView>, ServiceError> {
    let items = prescription::get_line_items(conn, pres.id)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let med = medicine::get_medicine(conn, item.medicine_id)?
            .ok_or_else(|| ServiceError::not_found("Medicine", item.medicine_id))?;
        let ingredients = medicine::get_ingredients_for_medicine(conn, med.id)?
            .into_iter()
            .map(|i| IngredientView {
                id: i.id,
                name: i.name,
            })
            .collect();
        out.push(PrescribedMedicineView {
            medicine_id: med.id,
            name: med.name,
            manufacturer: med.manufacturer,
            efficacy: med.efficacy,
            dosage: item.dosage,
            frequency: item.frequency,
            days: item.days,
            ingredients,
        });
    }
    Ok(out)
}
