//! Prescription rows and their line items, plus the conditional writes that
//! back the lifecycle transitions.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::PrescriptionStatus;
use crate::models::{Prescription, PrescriptionMedicine};

pub fn insert_prescription(
    conn: &Connection,
    issue_date: NaiveDate,
    status: PrescriptionStatus,
    record_id: i64,
    pharmacy_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO prescription (issue_date, status, rid, pharm_id) VALUES (?1, ?2, ?3, ?4)",
        params![issue_date, status.as_str(), record_id, pharmacy_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_line_item(
    conn: &Connection,
    item: &PrescriptionMedicine,
) -> Result<(), DatabaseError> {
    // (pres_id, mid) is the composite primary key: a duplicate medicine
    // within one prescription is a constraint violation, not a second row.
    conn.execute(
        "INSERT INTO prescription_medicine (pres_id, mid, dosage, frequency, days)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            item.prescription_id,
            item.medicine_id,
            item.dosage,
            item.frequency,
            item.days,
        ],
    )?;
    Ok(())
}

pub fn get_prescription(
    conn: &Connection,
    id: i64,
) -> Result<Option<Prescription>, DatabaseError> {
    let result = conn.query_row(
        "SELECT pres_id, issue_date, status, rid, pharm_id FROM prescription WHERE pres_id = ?1",
        params![id],
        prescription_row,
    );

    match result {
        Ok(row) => Ok(Some(prescription_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_prescription_for_record(
    conn: &Connection,
    record_id: i64,
) -> Result<Option<Prescription>, DatabaseError> {
    let result = conn.query_row(
        "SELECT pres_id, issue_date, status, rid, pharm_id FROM prescription WHERE rid = ?1",
        params![record_id],
        prescription_row,
    );

    match result {
        Ok(row) => Ok(Some(prescription_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All prescriptions authored by the given doctor, newest issue date first.
pub fn get_prescriptions_by_doctor(
    conn: &Connection,
    doctor_id: i64,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.pres_id, p.issue_date, p.status, p.rid, p.pharm_id
         FROM prescription p JOIN medical_record r ON r.rid = p.rid
         WHERE r.did = ?1
         ORDER BY p.issue_date DESC, p.pres_id ASC",
    )?;

    let rows = stmt.query_map(params![doctor_id], prescription_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(prescription_from_row(row?)?);
    }
    Ok(out)
}

/// All prescriptions assigned to the given pharmacy, newest issue date first.
pub fn get_prescriptions_by_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT pres_id, issue_date, status, rid, pharm_id
         FROM prescription
         WHERE pharm_id = ?1
         ORDER BY issue_date DESC, pres_id ASC",
    )?;

    let rows = stmt.query_map(params![pharmacy_id], prescription_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(prescription_from_row(row?)?);
    }
    Ok(out)
}

/// Line items for a prescription, medicine-id ascending for deterministic views.
pub fn get_line_items(
    conn: &Connection,
    prescription_id: i64,
) -> Result<Vec<PrescriptionMedicine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT pres_id, mid, dosage, frequency, days
         FROM prescription_medicine
         WHERE pres_id = ?1
         ORDER BY mid",
    )?;

    let rows = stmt.query_map(params![prescription_id], |row| {
        Ok(PrescriptionMedicine {
            prescription_id: row.get(0)?,
            medicine_id: row.get(1)?,
            dosage: row.get(2)?,
            frequency: row.get(3)?,
            days: row.get(4)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Attach a pharmacy and move CREATED → RECEIVED in one conditional write.
///
/// The WHERE clause re-checks the precondition inside the same statement, so
/// of two racing dispatch calls only one sees a row to update; the loser gets
/// `false` and surfaces "already sent" instead of double-assigning.
pub fn try_assign_pharmacy(
    conn: &Connection,
    prescription_id: i64,
    pharmacy_id: i64,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescription SET pharm_id = ?2, status = ?3
         WHERE pres_id = ?1 AND pharm_id IS NULL AND status = ?4",
        params![
            prescription_id,
            pharmacy_id,
            PrescriptionStatus::Received.as_str(),
            PrescriptionStatus::Created.as_str(),
        ],
    )?;
    Ok(changed == 1)
}

/// Advance the status only if the row is still in the expected prior state.
pub fn try_advance_status(
    conn: &Connection,
    prescription_id: i64,
    from: PrescriptionStatus,
    to: PrescriptionStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescription SET status = ?2 WHERE pres_id = ?1 AND status = ?3",
        params![prescription_id, to.as_str(), from.as_str()],
    )?;
    Ok(changed == 1)
}

type PrescriptionRow = (i64, NaiveDate, String, i64, Option<i64>);

fn prescription_row(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    let (id, issue_date, status, medical_record_id, pharmacy_id) = row;
    Ok(Prescription {
        id,
        issue_date,
        status: PrescriptionStatus::from_str(&status)?,
        medical_record_id,
        pharmacy_id,
    })
}
