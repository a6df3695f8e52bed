use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::MedicalRecord;

pub fn insert_record(
    conn: &Connection,
    visit_date: NaiveDate,
    diagnosis: &str,
    patient_id: i64,
    doctor_id: i64,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO medical_record (visit_date, diagnosis, pid, did) VALUES (?1, ?2, ?3, ?4)",
        params![visit_date, diagnosis, patient_id, doctor_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_record(conn: &Connection, id: i64) -> Result<Option<MedicalRecord>, DatabaseError> {
    let result = conn.query_row(
        "SELECT rid, visit_date, diagnosis, pid, did FROM medical_record WHERE rid = ?1",
        params![id],
        record_from_row,
    );

    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All records, newest visit first. Ties keep insertion order via rowid.
pub fn get_all_records(conn: &Connection) -> Result<Vec<MedicalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT rid, visit_date, diagnosis, pid, did FROM medical_record
         ORDER BY visit_date DESC, rid ASC",
    )?;

    let rows = stmt.query_map([], record_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn get_records_by_patient(
    conn: &Connection,
    patient_id: i64,
) -> Result<Vec<MedicalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT rid, visit_date, diagnosis, pid, did FROM medical_record
         WHERE pid = ?1
         ORDER BY visit_date DESC, rid ASC",
    )?;

    let rows = stmt.query_map(params![patient_id], record_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn link_record_symptom(
    conn: &Connection,
    record_id: i64,
    symptom_id: i64,
) -> Result<(), DatabaseError> {
    // OR IGNORE: the same master row may be referenced twice in one payload
    conn.execute(
        "INSERT OR IGNORE INTO record_symptom (rid, sid) VALUES (?1, ?2)",
        params![record_id, symptom_id],
    )?;
    Ok(())
}

pub fn link_record_treatment(
    conn: &Connection,
    record_id: i64,
    treatment_id: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO record_treatment (rid, tid) VALUES (?1, ?2)",
        params![record_id, treatment_id],
    )?;
    Ok(())
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<MedicalRecord, rusqlite::Error> {
    Ok(MedicalRecord {
        id: row.get(0)?,
        visit_date: row.get(1)?,
        diagnosis: row.get(2)?,
        patient_id: row.get(3)?,
        doctor_id: row.get(4)?,
    })
}
