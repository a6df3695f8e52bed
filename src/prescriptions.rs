//! Prescription Lifecycle Engine.
//!
//! Owns the dispensing state machine and every visibility and ownership rule
//! around it. The lifecycle is strictly linear with no skip-ahead and no
//! reversal:
//!
//!   CREATED (no pharmacy) → RECEIVED → DISPENSING → COMPLETED
//!
//! A doctor moves CREATED to RECEIVED by dispatching to a pharmacy linked to
//! their hospital; the pharmacist owning that pharmacy advances the rest.
//! Every transition is a conditional read-modify-write inside one
//! transaction, so concurrent calls on the same prescription have at most one
//! winner.

use rusqlite::Connection;

use crate::auth::{resolve_caller, require_doctor, require_pharmacist, Caller, Identity};
use crate::db::repository::{org, prescription, record};
use crate::db::DatabaseError;
use crate::error::ServiceError;
use crate::models::enums::PrescriptionStatus;
use crate::models::Prescription;
use crate::records::check_hospital_link;
use crate::views::{self, PrescriptionDetail, PrescriptionSummary};

/// Outcome of checking a requested status change against the current state.
enum Step {
    /// same→same: accepted without a write.
    NoOp,
    Advance,
}

/// All prescriptions the caller may see, newest issue date first: a doctor's
/// authored prescriptions, or the ones assigned to a pharmacist's pharmacy.
pub fn get_prescriptions(
    conn: &Connection,
    identity: &Identity,
) -> Result<Vec<PrescriptionSummary>, ServiceError> {
    let rows = match resolve_caller(conn, identity)? {
        Caller::Doctor(doctor) => {
            prescription::get_prescriptions_by_doctor(conn, doctor.doctor_id)?
        }
        Caller::Pharmacist(pharmacist) => {
            prescription::get_prescriptions_by_pharmacy(conn, pharmacist.pharmacy_id)?
        }
    };
    rows.iter()
        .map(|pres| views::prescription_summary(conn, pres))
        .collect()
}

/// Full detail for one prescription, gated by ownership: the authoring doctor
/// or the pharmacist of the assigned pharmacy. A prescription with no
/// pharmacy is never visible to any pharmacist.
pub fn get_prescription(
    conn: &Connection,
    identity: &Identity,
    prescription_id: i64,
) -> Result<PrescriptionDetail, ServiceError> {
    let pres = load(conn, prescription_id)?;

    match resolve_caller(conn, identity)? {
        Caller::Doctor(doctor) => {
            ensure_author(conn, &pres, doctor.doctor_id)?;
        }
        Caller::Pharmacist(pharmacist) => {
            ensure_assigned_pharmacy(&pres, pharmacist.pharmacy_id)?;
        }
    }
    views::prescription_detail(conn, &pres)
}

/// Dispatch: attach a pharmacy and move CREATED → RECEIVED. Doctor-only, and
/// only for prescriptions on records the caller authored. Succeeds at most
/// once per prescription.
pub fn dispatch_prescription(
    conn: &Connection,
    identity: &Identity,
    prescription_id: i64,
    pharmacy_id: i64,
) -> Result<PrescriptionDetail, ServiceError> {
    let doctor = require_doctor(conn, identity)?;

    let tx = conn.unchecked_transaction().map_err(DatabaseError::Sqlite)?;
    let pres = load(&tx, prescription_id)?;
    ensure_author(&tx, &pres, doctor.doctor_id)?;

    let pharmacy = org::get_pharmacy(&tx, pharmacy_id)?
        .ok_or_else(|| ServiceError::not_found("Pharmacy", pharmacy_id))?;
    if pres.pharmacy_id.is_some() || pres.status != PrescriptionStatus::Created {
        return Err(ServiceError::AlreadyDispatched);
    }
    check_hospital_link(&doctor, pharmacy.hospital_id)?;

    // Conditional write: a racing dispatch that slipped past the read above
    // loses here instead of double-assigning.
    if !prescription::try_assign_pharmacy(&tx, prescription_id, pharmacy_id)? {
        return Err(ServiceError::AlreadyDispatched);
    }

    let updated = load(&tx, prescription_id)?;
    let detail = views::prescription_detail(&tx, &updated)?;
    tx.commit().map_err(DatabaseError::Sqlite)?;

    tracing::info!(
        prescription_id,
        pharmacy_id,
        doctor_id = doctor.doctor_id,
        "Prescription dispatched"
    );
    Ok(detail)
}

/// Pharmacist-only forward step: RECEIVED → DISPENSING → COMPLETED, one step
/// at a time. Requesting the current status is an accepted no-op.
pub fn update_status(
    conn: &Connection,
    identity: &Identity,
    prescription_id: i64,
    target: PrescriptionStatus,
) -> Result<PrescriptionDetail, ServiceError> {
    let pharmacist = require_pharmacist(conn, identity)?;

    let tx = conn.unchecked_transaction().map_err(DatabaseError::Sqlite)?;
    let pres = load(&tx, prescription_id)?;
    ensure_assigned_pharmacy(&pres, pharmacist.pharmacy_id)?;

    if let Step::Advance = validate_transition(pres.status, target)? {
        if !prescription::try_advance_status(&tx, prescription_id, pres.status, target)? {
            // Lost a race: re-check against what actually won.
            let fresh = load(&tx, prescription_id)?;
            validate_transition(fresh.status, target)?;
        } else {
            tracing::info!(
                prescription_id,
                from = %pres.status,
                to = %target,
                pharmacy_id = pharmacist.pharmacy_id,
                "Prescription status advanced"
            );
        }
    }

    let updated = load(&tx, prescription_id)?;
    let detail = views::prescription_detail(&tx, &updated)?;
    tx.commit().map_err(DatabaseError::Sqlite)?;
    Ok(detail)
}

fn load(conn: &Connection, prescription_id: i64) -> Result<Prescription, ServiceError> {
    prescription::get_prescription(conn, prescription_id)?
        .ok_or_else(|| ServiceError::not_found("Prescription", prescription_id))
}

fn ensure_author(
    conn: &Connection,
    pres: &Prescription,
    doctor_id: i64,
) -> Result<(), ServiceError> {
    let rec = record::get_record(conn, pres.medical_record_id)?
        .ok_or_else(|| ServiceError::not_found("MedicalRecord", pres.medical_record_id))?;
    if rec.doctor_id != doctor_id {
        return Err(ServiceError::NotPrescriptionAuthor);
    }
    Ok(())
}

fn ensure_assigned_pharmacy(pres: &Prescription, pharmacy_id: i64) -> Result<(), ServiceError> {
    match pres.pharmacy_id {
        Some(assigned) if assigned == pharmacy_id => Ok(()),
        _ => Err(ServiceError::NotAssignedToPharmacy),
    }
}

fn validate_transition(
    current: PrescriptionStatus,
    target: PrescriptionStatus,
) -> Result<Step, ServiceError> {
    use PrescriptionStatus::*;

    if current == target {
        return Ok(Step::NoOp);
    }
    match current {
        Created => Err(ServiceError::NotYetDispatched),
        Received if target == Dispensing => Ok(Step::Advance),
        Dispensing if target == Completed => Ok(Step::Advance),
        Completed => Err(ServiceError::AlreadyCompleted),
        _ => Err(ServiceError::InvalidTransition {
            from: current,
            to: target,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::accounts::{self, NewDoctor, NewPharmacist};
    use crate::db::open_memory_database;
    use crate::models::enums::MemberRole;
    use crate::records::{
        self, CreateRecordRequest, MedicineRef, PatientPayload, PrescribedMedicinePayload,
        PrescriptionPayload,
    };

    struct Fixture {
        conn: Connection,
        doctor: Identity,
        other_doctor: Identity,
        pharmacist: Identity,
        other_pharmacist: Identity,
        pharmacy_id: i64,
        other_pharmacy_id: i64,
    }

    fn fixture() -> Fixture {
        let conn = open_memory_database().unwrap();
        let hospital = accounts::create_hospital(&conn, "한빛병원", None, None).unwrap();
        let dept = accounts::create_department(&conn, hospital, "내과").unwrap();
        let pharmacy_id =
            accounts::create_pharmacy(&conn, "온누리약국", None, None, Some(hospital)).unwrap();
        let other_pharmacy_id =
            accounts::create_pharmacy(&conn, "미래약국", None, None, Some(hospital)).unwrap();

        let (doc, _) = accounts::register_doctor(
            &conn,
            &NewDoctor {
                username: "doc@example.com".into(),
                name: "김의사".into(),
                hospital_id: hospital,
                department_id: dept,
            },
        )
        .unwrap();
        let (other_doc, _) = accounts::register_doctor(
            &conn,
            &NewDoctor {
                username: "doc2@example.com".into(),
                name: "이의사".into(),
                hospital_id: hospital,
                department_id: dept,
            },
        )
        .unwrap();
        let (ph, _) = accounts::register_pharmacist(
            &conn,
            &NewPharmacist {
                username: "ph@example.com".into(),
                name: "박약사".into(),
                pharmacy_id,
            },
        )
        .unwrap();
        let (other_ph, _) = accounts::register_pharmacist(
            &conn,
            &NewPharmacist {
                username: "ph2@example.com".into(),
                name: "최약사".into(),
                pharmacy_id: other_pharmacy_id,
            },
        )
        .unwrap();

        Fixture {
            conn,
            doctor: Identity {
                member_id: doc,
                role: MemberRole::Doctor,
            },
            other_doctor: Identity {
                member_id: other_doc,
                role: MemberRole::Doctor,
            },
            pharmacist: Identity {
                member_id: ph,
                role: MemberRole::Pharmacist,
            },
            other_pharmacist: Identity {
                member_id: other_ph,
                role: MemberRole::Pharmacist,
            },
            pharmacy_id,
            other_pharmacy_id,
        }
    }

    /// Create a record with an attached prescription; returns the
    /// prescription id. `pharmacy` = None keeps the prescription CREATED.
    fn seed(fx: &Fixture, ssn: &str, issue: NaiveDate, pharmacy: Option<i64>) -> i64 {
        let request = CreateRecordRequest {
            visit_date: issue,
            diagnosis: "감기".into(),
            patient: PatientPayload {
                name: Some("김하늘".into()),
                ssn: Some(ssn.into()),
                ..Default::default()
            },
            symptoms: vec![],
            treatments: vec![],
            prescription: Some(PrescriptionPayload {
                issue_date: Some(issue),
                pharmacy_id: pharmacy,
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
            }),
        };
        let detail = records::create_record(&fx.conn, &fx.doctor, &request).unwrap();
        detail.prescription.unwrap().id
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    // ── Dispatch ─────────────────────────────────────────

    #[test]
    fn dispatch_moves_created_to_received() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        let detail = dispatch_prescription(&fx.conn, &fx.doctor, pres, fx.pharmacy_id).unwrap();
        assert_eq!(detail.status, PrescriptionStatus::Received);
        assert_eq!(detail.pharmacy_id, Some(fx.pharmacy_id));
        assert_eq!(detail.pharmacy_name.as_deref(), Some("온누리약국"));
    }

    #[test]
    fn dispatch_succeeds_exactly_once() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        dispatch_prescription(&fx.conn, &fx.doctor, pres, fx.pharmacy_id).unwrap();
        let err = dispatch_prescription(&fx.conn, &fx.doctor, pres, fx.other_pharmacy_id)
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyDispatched));

        // First assignment untouched
        let detail = get_prescription(&fx.conn, &fx.doctor, pres).unwrap();
        assert_eq!(detail.pharmacy_id, Some(fx.pharmacy_id));
    }

    #[test]
    fn dispatch_requires_authorship() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        let err = dispatch_prescription(&fx.conn, &fx.other_doctor, pres, fx.pharmacy_id)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotPrescriptionAuthor));
    }

    #[test]
    fn dispatch_rejects_unknown_pharmacy() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        let err = dispatch_prescription(&fx.conn, &fx.doctor, pres, 404).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::EntityNotFound { entity: "Pharmacy", .. }
        ));
    }

    #[test]
    fn dispatch_rejects_unlinked_pharmacy() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);
        let elsewhere =
            accounts::create_pharmacy(&fx.conn, "먼곳약국", None, None, None).unwrap();

        let err = dispatch_prescription(&fx.conn, &fx.doctor, pres, elsewhere).unwrap_err();
        assert!(matches!(err, ServiceError::PharmacyNotLinkedToHospital));
    }

    #[test]
    fn pharmacist_cannot_dispatch() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);
        let err = dispatch_prescription(&fx.conn, &fx.pharmacist, pres, fx.pharmacy_id)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotDoctor));
    }

    // ── Status updates ───────────────────────────────────

    #[test]
    fn full_dispensing_sequence_succeeds() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));

        let d1 = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Dispensing)
            .unwrap();
        assert_eq!(d1.status, PrescriptionStatus::Dispensing);
        let d2 = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Completed)
            .unwrap();
        assert_eq!(d2.status, PrescriptionStatus::Completed);
    }

    #[test]
    fn received_cannot_skip_to_completed() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));

        let err = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Completed)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition {
                from: PrescriptionStatus::Received,
                to: PrescriptionStatus::Completed,
            }
        ));
    }

    #[test]
    fn no_reversal_from_dispensing() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));
        update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Dispensing).unwrap();

        let err = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Received)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));

        let detail = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Received)
            .unwrap();
        assert_eq!(detail.status, PrescriptionStatus::Received);
    }

    #[test]
    fn completed_is_terminal() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));
        update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Dispensing).unwrap();
        update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Completed).unwrap();

        for target in [
            PrescriptionStatus::Created,
            PrescriptionStatus::Received,
            PrescriptionStatus::Dispensing,
        ] {
            let err = update_status(&fx.conn, &fx.pharmacist, pres, target).unwrap_err();
            assert!(matches!(err, ServiceError::AlreadyCompleted));
        }
    }

    #[test]
    fn unassigned_prescription_is_invisible_and_immutable_to_pharmacists() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        let err = update_status(&fx.conn, &fx.pharmacist, pres, PrescriptionStatus::Dispensing)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotAssignedToPharmacy));

        let err = get_prescription(&fx.conn, &fx.pharmacist, pres).unwrap_err();
        assert!(matches!(err, ServiceError::NotAssignedToPharmacy));
    }

    #[test]
    fn other_pharmacy_cannot_view_or_update() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), Some(fx.pharmacy_id));

        let err = get_prescription(&fx.conn, &fx.other_pharmacist, pres).unwrap_err();
        assert!(matches!(err, ServiceError::NotAssignedToPharmacy));
        let err =
            update_status(&fx.conn, &fx.other_pharmacist, pres, PrescriptionStatus::Dispensing)
                .unwrap_err();
        assert!(matches!(err, ServiceError::NotAssignedToPharmacy));
    }

    // ── Queries ──────────────────────────────────────────

    #[test]
    fn doctor_sees_only_authored_prescriptions_newest_first() {
        let fx = fixture();
        let older = seed(&fx, "900101-1234567", date(1), None);
        let newer = seed(&fx, "910101-1234567", date(9), None);

        let list = get_prescriptions(&fx.conn, &fx.doctor).unwrap();
        assert_eq!(
            list.iter().map(|p| p.prescription_id).collect::<Vec<_>>(),
            vec![newer, older]
        );
        assert!(get_prescriptions(&fx.conn, &fx.other_doctor).unwrap().is_empty());
    }

    #[test]
    fn pharmacist_sees_only_own_pharmacy_queue() {
        let fx = fixture();
        let mine = seed(&fx, "900101-1234567", date(3), Some(fx.pharmacy_id));
        seed(&fx, "910101-1234567", date(4), Some(fx.other_pharmacy_id));

        let list = get_prescriptions(&fx.conn, &fx.pharmacist).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].prescription_id, mine);
    }

    #[test]
    fn doctor_detail_requires_authorship() {
        let fx = fixture();
        let pres = seed(&fx, "980101-2345678", date(2), None);

        assert!(get_prescription(&fx.conn, &fx.doctor, pres).is_ok());
        let err = get_prescription(&fx.conn, &fx.other_doctor, pres).unwrap_err();
        assert!(matches!(err, ServiceError::NotPrescriptionAuthor));
    }

    #[test]
    fn detail_orders_medicines_and_ingredients_by_id() {
        let fx = fixture();
        let m2 = crate::db::repository::medicine::insert_medicine(&fx.conn, "B정", None, None)
            .unwrap();
        let m1 = crate::db::repository::medicine::insert_medicine(&fx.conn, "A정", None, None)
            .unwrap();
        let i2 = crate::db::repository::medicine::insert_ingredient(&fx.conn, "성분B").unwrap();
        let i1 = crate::db::repository::medicine::insert_ingredient(&fx.conn, "성분A").unwrap();
        crate::db::repository::medicine::link_medicine_ingredient(&fx.conn, m2, i2).unwrap();
        crate::db::repository::medicine::link_medicine_ingredient(&fx.conn, m2, i1).unwrap();

        let request = CreateRecordRequest {
            visit_date: date(2),
            diagnosis: "감기".into(),
            patient: PatientPayload {
                name: Some("김하늘".into()),
                ssn: Some("980101-2345678".into()),
                ..Default::default()
            },
            symptoms: vec![],
            treatments: vec![],
            prescription: Some(PrescriptionPayload {
                issue_date: None,
                pharmacy_id: None,
                medicines: vec![
                    PrescribedMedicinePayload {
                        medicine: MedicineRef::Existing(m2),
                        dosage: None,
                        frequency: None,
                        days: None,
                    },
                    PrescribedMedicinePayload {
                        medicine: MedicineRef::Existing(m1),
                        dosage: None,
                        frequency: None,
                        days: None,
                    },
                ],
            }),
        };
        let pres = records::create_record(&fx.conn, &fx.doctor, &request)
            .unwrap()
            .prescription
            .unwrap()
            .id;

        let detail = get_prescription(&fx.conn, &fx.doctor, pres).unwrap();
        let mids: Vec<i64> = detail.medicines.iter().map(|m| m.medicine_id).collect();
        assert_eq!(mids, vec![m1, m2]);
        let iids: Vec<i64> = detail.medicines[1].ingredients.iter().map(|i| i.id).collect();
        assert_eq!(iids, vec![i1, i2]);
    }

    #[test]
    fn missing_prescription_is_not_found() {
        let fx = fixture();
        let err = get_prescription(&fx.conn, &fx.doctor, 404).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::EntityNotFound { entity: "Prescription", .. }
        ));
    }
}
