//! Medical Record Builder: resolves or creates patient and master rows, then
//! assembles a medical record plus its optional prescription as one atomic
//! unit. All operations here are doctor-only.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::{require_doctor, DoctorProfile, Identity};
use crate::db::repository::{master, medicine, org, patient, prescription, record};
use crate::db::DatabaseError;
use crate::error::ServiceError;
use crate::models::enums::PrescriptionStatus;
use crate::models::{Patient, PrescriptionMedicine};
use crate::views::{self, PatientView, RecordDetail, RecordSummary};

/// Bounded name-search result set size.
const NAME_SEARCH_LIMIT: u32 = 20;

/// Patient slice of a record payload: an existing id, an existing national
/// ID, or full new-patient fields. Contact fields patch an existing row only
/// when supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPayload {
    pub id: Option<i64>,
    pub ssn: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub history: Option<String>,
}

/// Master-data reference: an existing row by id, or a new row by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SymptomRef {
    Existing(i64),
    New {
        name: String,
        body_part: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreatmentRef {
    Existing(i64),
    New {
        name: String,
        description: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MedicineRef {
    Existing(i64),
    New {
        name: String,
        manufacturer: Option<String>,
        efficacy: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescribedMedicinePayload {
    pub medicine: MedicineRef,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionPayload {
    /// Defaults to the record's visit date.
    pub issue_date: Option<NaiveDate>,
    /// When present the prescription enters the workflow already RECEIVED at
    /// this pharmacy; when absent it stays CREATED until dispatched.
    pub pharmacy_id: Option<i64>,
    pub medicines: Vec<PrescribedMedicinePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub patient: PatientPayload,
    #[serde(default)]
    pub symptoms: Vec<SymptomRef>,
    #[serde(default)]
    pub treatments: Vec<TreatmentRef>,
    pub prescription: Option<PrescriptionPayload>,
}

/// Create a record (and optional prescription) in one transaction. Either the
/// whole graph commits or none of it does.
pub fn create_record(
    conn: &Connection,
    identity: &Identity,
    request: &CreateRecordRequest,
) -> Result<RecordDetail, ServiceError> {
    let doctor = require_doctor(conn, identity)?;
    if request.diagnosis.trim().is_empty() {
        return Err(ServiceError::EmptyDiagnosis);
    }

    let tx = conn.unchecked_transaction().map_err(DatabaseError::Sqlite)?;

    let patient_id = resolve_patient(&tx, &request.patient)?;
    let record_id = record::insert_record(
        &tx,
        request.visit_date,
        &request.diagnosis,
        patient_id,
        doctor.doctor_id,
    )?;

    for symptom in &request.symptoms {
        let sid = resolve_symptom(&tx, symptom)?;
        record::link_record_symptom(&tx, record_id, sid)?;
    }
    for treatment in &request.treatments {
        let tid = resolve_treatment(&tx, treatment)?;
        record::link_record_treatment(&tx, record_id, tid)?;
    }

    if let Some(payload) = &request.prescription {
        build_prescription(&tx, &doctor, record_id, request.visit_date, payload)?;
    }

    let created = record::get_record(&tx, record_id)?
        .ok_or_else(|| ServiceError::not_found("MedicalRecord", record_id))?;
    let detail = views::record_detail(&tx, &created)?;
    tx.commit().map_err(DatabaseError::Sqlite)?;

    tracing::info!(
        record_id,
        patient_id,
        doctor_id = doctor.doctor_id,
        has_prescription = request.prescription.is_some(),
        "Medical record created"
    );
    Ok(detail)
}

pub fn get_all_records(
    conn: &Connection,
    identity: &Identity,
) -> Result<Vec<RecordSummary>, ServiceError> {
    require_doctor(conn, identity)?;
    record::get_all_records(conn)?
        .iter()
        .map(|rec| views::record_summary(conn, rec))
        .collect()
}

pub fn get_record(
    conn: &Connection,
    identity: &Identity,
    record_id: i64,
) -> Result<RecordDetail, ServiceError> {
    require_doctor(conn, identity)?;
    let rec = record::get_record(conn, record_id)?
        .ok_or_else(|| ServiceError::not_found("MedicalRecord", record_id))?;
    views::record_detail(conn, &rec)
}

pub fn get_records_by_patient(
    conn: &Connection,
    identity: &Identity,
    patient_id: i64,
) -> Result<Vec<RecordSummary>, ServiceError> {
    require_doctor(conn, identity)?;
    if !patient::patient_exists(conn, patient_id)? {
        return Err(ServiceError::not_found("Patient", patient_id));
    }
    record::get_records_by_patient(conn, patient_id)?
        .iter()
        .map(|rec| views::record_summary(conn, rec))
        .collect()
}

pub fn get_patient_by_ssn(
    conn: &Connection,
    identity: &Identity,
    ssn: &str,
) -> Result<PatientView, ServiceError> {
    require_doctor(conn, identity)?;
    let found = patient::find_patient_by_ssn(conn, ssn)?.ok_or_else(|| {
        ServiceError::PatientSsnNotFound {
            ssn: ssn.to_string(),
        }
    })?;
    Ok(views::patient_view(&found))
}

/// Blank input returns an empty set instead of an error; results are bounded.
pub fn search_patients(
    conn: &Connection,
    identity: &Identity,
    name: &str,
) -> Result<Vec<PatientView>, ServiceError> {
    require_doctor(conn, identity)?;
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(patient::search_patients_by_name(conn, trimmed, NAME_SEARCH_LIMIT)?
        .iter()
        .map(views::patient_view)
        .collect())
}

/// Id lookup first, then national-ID match, then new-row creation. Existing
/// rows get only the supplied contact fields patched, never a null overwrite.
fn resolve_patient(conn: &Connection, payload: &PatientPayload) -> Result<i64, ServiceError> {
    let patch = patient::PatientPatch {
        address: payload.address.clone(),
        phone: payload.phone.clone(),
        history: payload.history.clone(),
    };

    if let Some(id) = payload.id {
        let existing =
            patient::get_patient(conn, id)?.ok_or_else(|| ServiceError::not_found("Patient", id))?;
        patient::patch_patient(conn, existing.id, &patch)?;
        return Ok(existing.id);
    }

    if let Some(ssn) = &payload.ssn {
        if let Some(existing) = patient::find_patient_by_ssn(conn, ssn)? {
            patient::patch_patient(conn, existing.id, &patch)?;
            return Ok(existing.id);
        }
    }

    let (name, ssn) = match (&payload.name, &payload.ssn) {
        (Some(name), Some(ssn)) if !name.trim().is_empty() && !ssn.trim().is_empty() => (name, ssn),
        _ => return Err(ServiceError::NewPatientMissingFields),
    };

    Ok(patient::insert_patient(
        conn,
        &Patient {
            id: 0,
            name: name.clone(),
            ssn: ssn.clone(),
            address: payload.address.clone(),
            phone: payload.phone.clone(),
            history: payload.history.clone(),
        },
    )?)
}

fn resolve_symptom(conn: &Connection, payload: &SymptomRef) -> Result<i64, ServiceError> {
    match payload {
        SymptomRef::Existing(id) => master::get_symptom(conn, *id)?
            .map(|s| s.id)
            .ok_or_else(|| ServiceError::not_found("Symptom", *id)),
        SymptomRef::New { name, body_part } => {
            Ok(master::insert_symptom(conn, name, body_part.as_deref())?)
        }
    }
}

fn resolve_treatment(conn: &Connection, payload: &TreatmentRef) -> Result<i64, ServiceError> {
    match payload {
        TreatmentRef::Existing(id) => master::get_treatment(conn, *id)?
            .map(|t| t.id)
            .ok_or_else(|| ServiceError::not_found("Treatment", *id)),
        TreatmentRef::New { name, description } => {
            Ok(master::insert_treatment(conn, name, description.as_deref())?)
        }
    }
}

fn resolve_medicine(conn: &Connection, payload: &MedicineRef) -> Result<i64, ServiceError> {
    match payload {
        MedicineRef::Existing(id) => medicine::get_medicine(conn, *id)?
            .map(|m| m.id)
            .ok_or_else(|| ServiceError::not_found("Medicine", *id)),
        MedicineRef::New {
            name,
            manufacturer,
            efficacy,
        } => {
            if name.trim().is_empty() {
                return Err(ServiceError::NewMedicineMissingName);
            }
            Ok(medicine::insert_medicine(
                conn,
                name,
                manufacturer.as_deref(),
                efficacy.as_deref(),
            )?)
        }
    }
}

fn build_prescription(
    conn: &Connection,
    doctor: &DoctorProfile,
    record_id: i64,
    visit_date: NaiveDate,
    payload: &PrescriptionPayload,
) -> Result<i64, ServiceError> {
    if payload.medicines.is_empty() {
        return Err(ServiceError::EmptyPrescription);
    }

    // Binding a pharmacy at creation is an inline dispatch and obeys the same
    // hospital-linkage rule as the explicit dispatch transition.
    let status = match payload.pharmacy_id {
        Some(pharmacy_id) => {
            let pharmacy = org::get_pharmacy(conn, pharmacy_id)?
                .ok_or_else(|| ServiceError::not_found("Pharmacy", pharmacy_id))?;
            check_hospital_link(doctor, pharmacy.hospital_id)?;
            PrescriptionStatus::Received
        }
        None => PrescriptionStatus::Created,
    };
    let issue_date = payload.issue_date.unwrap_or(visit_date);

    let prescription_id = prescription::insert_prescription(
        conn,
        issue_date,
        status,
        record_id,
        payload.pharmacy_id,
    )?;

    let mut seen = std::collections::HashSet::new();
    for item in &payload.medicines {
        let medicine_id = resolve_medicine(conn, &item.medicine)?;
        if !seen.insert(medicine_id) {
            return Err(ServiceError::DuplicateMedicineLine { medicine_id });
        }
        prescription::insert_line_item(
            conn,
            &PrescriptionMedicine {
                prescription_id,
                medicine_id,
                dosage: item.dosage.clone(),
                frequency: item.frequency.clone(),
                days: item.days,
            },
        )?;
    }

    Ok(prescription_id)
}

/// A dispatch target must share the doctor's hospital anchor.
pub(crate) fn check_hospital_link(
    doctor: &DoctorProfile,
    pharmacy_hospital_id: Option<i64>,
) -> Result<(), ServiceError> {
    let doctor_hospital = doctor.hospital_id.ok_or(ServiceError::DoctorWithoutHospital)?;
    match pharmacy_hospital_id {
        Some(hid) if hid == doctor_hospital => Ok(()),
        _ => Err(ServiceError::PharmacyNotLinkedToHospital),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, NewDoctor, NewPharmacist};
    use crate::db::open_memory_database;
    use crate::models::enums::MemberRole;

    struct Fixture {
        conn: Connection,
        doctor: Identity,
        pharmacist: Identity,
        pharmacy_id: i64,
    }

    fn fixture() -> Fixture {
        let conn = open_memory_database().unwrap();
        let hospital_id = accounts::create_hospital(&conn, "한빛병원", None, None).unwrap();
        let dept = accounts::create_department(&conn, hospital_id, "내과").unwrap();
        let pharmacy_id =
            accounts::create_pharmacy(&conn, "온누리약국", None, None, Some(hospital_id)).unwrap();

        let (doc_member, _) = accounts::register_doctor(
            &conn,
            &NewDoctor {
                username: "doc@example.com".into(),
                name: "김의사".into(),
                hospital_id,
                department_id: dept,
            },
        )
        .unwrap();
        let (ph_member, _) = accounts::register_pharmacist(
            &conn,
            &NewPharmacist {
                username: "ph@example.com".into(),
                name: "박약사".into(),
                pharmacy_id,
            },
        )
        .unwrap();

        Fixture {
            conn,
            doctor: Identity {
                member_id: doc_member,
                role: MemberRole::Doctor,
            },
            pharmacist: Identity {
                member_id: ph_member,
                role: MemberRole::Pharmacist,
            },
            pharmacy_id,
        }
    }

    fn visit() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn new_patient_payload() -> PatientPayload {
        PatientPayload {
            name: Some("김하늘".into()),
            ssn: Some("980101-2345678".into()),
            address: Some("서울시 중구".into()),
            ..Default::default()
        }
    }

    fn basic_request() -> CreateRecordRequest {
        CreateRecordRequest {
            visit_date: visit(),
            diagnosis: "급성 인두염".into(),
            patient: new_patient_payload(),
            symptoms: vec![SymptomRef::New {
                name: "인후통".into(),
                body_part: Some("목".into()),
            }],
            treatments: vec![TreatmentRef::New {
                name: "약물 치료".into(),
                description: None,
            }],
            prescription: None,
        }
    }

    // ── Creation ─────────────────────────────────────────

    #[test]
    fn create_record_with_pharmacy_enters_received() {
        let fx = fixture();
        let mut request = basic_request();
        request.prescription = Some(PrescriptionPayload {
            issue_date: None,
            pharmacy_id: Some(fx.pharmacy_id),
            medicines: vec![PrescribedMedicinePayload {
                medicine: MedicineRef::New {
                    name: "바이러스퀸정".into(),
                    manufacturer: None,
                    efficacy: None,
                },
                dosage: Some("1정".into()),
                frequency: Some("하루 2회".into()),
                days: Some(7),
            }],
        });

        let detail = create_record(&fx.conn, &fx.doctor, &request).unwrap();
        let pres = detail.prescription.unwrap();
        assert_eq!(pres.status, PrescriptionStatus::Received);
        assert_eq!(pres.pharmacy_id, Some(fx.pharmacy_id));
        assert_eq!(pres.medicines.len(), 1);
        // issue date defaults to the visit date
        assert_eq!(pres.issue_date, visit());
    }

    #[test]
    fn create_record_without_pharmacy_stays_created() {
        let fx = fixture();
        let mut request = basic_request();
        request.prescription = Some(PrescriptionPayload {
            issue_date: None,
            pharmacy_id: None,
            medicines: vec![PrescribedMedicinePayload {
                medicine: MedicineRef::New {
                    name: "타이레놀".into(),
                    manufacturer: None,
                    efficacy: None,
                },
                dosage: None,
                frequency: None,
                days: None,
            }],
        });

        let detail = create_record(&fx.conn, &fx.doctor, &request).unwrap();
        let pres = detail.prescription.unwrap();
        assert_eq!(pres.status, PrescriptionStatus::Created);
        assert_eq!(pres.pharmacy_id, None);
    }

    #[test]
    fn prescription_without_medicines_is_rejected_and_nothing_persists() {
        let fx = fixture();
        let mut request = basic_request();
        request.prescription = Some(PrescriptionPayload {
            issue_date: None,
            pharmacy_id: None,
            medicines: vec![],
        });

        let err = create_record(&fx.conn, &fx.doctor, &request).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyPrescription));
        // The transaction rolled back the record and the patient with it
        assert!(record::get_all_records(&fx.conn).unwrap().is_empty());
        assert!(patient::find_patient_by_ssn(&fx.conn, "980101-2345678")
            .unwrap()
            .is_none());
    }

    #[test]
    fn pharmacist_cannot_create_records() {
        let fx = fixture();
        let err = create_record(&fx.conn, &fx.pharmacist, &basic_request()).unwrap_err();
        assert!(matches!(err, ServiceError::NotDoctor));
    }

    #[test]
    fn existing_ssn_reuses_patient_and_patches_supplied_fields() {
        let fx = fixture();
        create_record(&fx.conn, &fx.doctor, &basic_request()).unwrap();

        let mut request = basic_request();
        request.patient = PatientPayload {
            ssn: Some("980101-2345678".into()),
            name: None,
            phone: Some("010-9999-0000".into()),
            ..Default::default()
        };
        create_record(&fx.conn, &fx.doctor, &request).unwrap();

        let patients = patient::search_patients_by_name(&fx.conn, "하늘", 20).unwrap();
        assert_eq!(patients.len(), 1, "no duplicate patient row");
        let p = &patients[0];
        assert_eq!(p.phone.as_deref(), Some("010-9999-0000"));
        // Address was not supplied the second time and survives
        assert_eq!(p.address.as_deref(), Some("서울시 중구"));
    }

    #[test]
    fn new_patient_without_ssn_is_rejected() {
        let fx = fixture();
        let mut request = basic_request();
        request.patient = PatientPayload {
            name: Some("이름만".into()),
            ..Default::default()
        };
        let err = create_record(&fx.conn, &fx.doctor, &request).unwrap_err();
        assert!(matches!(err, ServiceError::NewPatientMissingFields));
    }

    #[test]
    fn unknown_symptom_id_is_rejected() {
        let fx = fixture();
        let mut request = basic_request();
        request.symptoms = vec![SymptomRef::Existing(404)];
        let err = create_record(&fx.conn, &fx.doctor, &request).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::EntityNotFound { entity: "Symptom", .. }
        ));
    }

    #[test]
    fn creation_pharmacy_must_share_the_doctors_hospital() {
        let fx = fixture();
        let other = accounts::create_pharmacy(&fx.conn, "먼곳약국", None, None, None).unwrap();
        let mut request = basic_request();
        request.prescription = Some(PrescriptionPayload {
            issue_date: None,
            pharmacy_id: Some(other),
            medicines: vec![PrescribedMedicinePayload {
                medicine: MedicineRef::New {
                    name: "타이레놀".into(),
                    manufacturer: None,
                    efficacy: None,
                },
                dosage: None,
                frequency: None,
                days: None,
            }],
        });
        let err = create_record(&fx.conn, &fx.doctor, &request).unwrap_err();
        assert!(matches!(err, ServiceError::PharmacyNotLinkedToHospital));
    }

    // ── Reads ────────────────────────────────────────────

    #[test]
    fn records_list_newest_visit_first() {
        let fx = fixture();
        let mut older = basic_request();
        older.visit_date = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        older.patient.ssn = Some("900101-1234567".into());
        older.patient.name = Some("박바다".into());
        create_record(&fx.conn, &fx.doctor, &older).unwrap();
        create_record(&fx.conn, &fx.doctor, &basic_request()).unwrap();

        let all = get_all_records(&fx.conn, &fx.doctor).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].visit_date > all[1].visit_date);
    }

    #[test]
    fn records_by_patient_requires_existing_patient() {
        let fx = fixture();
        let err = get_records_by_patient(&fx.conn, &fx.doctor, 404).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::EntityNotFound { entity: "Patient", .. }
        ));
    }

    #[test]
    fn blank_name_search_returns_empty() {
        let fx = fixture();
        assert!(search_patients(&fx.conn, &fx.doctor, "   ").unwrap().is_empty());
    }

    #[test]
    fn patient_reads_are_doctor_only() {
        let fx = fixture();
        assert!(matches!(
            get_patient_by_ssn(&fx.conn, &fx.pharmacist, "980101-2345678").unwrap_err(),
            ServiceError::NotDoctor
        ));
    }
}
