use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::Patient;

/// Fields a record payload may change on an existing patient. Name and ssn
/// are identity and never patched; a None here means "leave as is".
#[derive(Debug, Clone, Default)]
pub struct PatientPatch {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub history: Option<String>,
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO patient (name, ssn, address, phone, history) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient.name,
            patient.ssn,
            patient.address,
            patient.phone,
            patient.history,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_patient(conn: &Connection, id: i64) -> Result<Option<Patient>, DatabaseError> {
    let result = conn.query_row(
        "SELECT pid, name, ssn, address, phone, history FROM patient WHERE pid = ?1",
        params![id],
        patient_from_row,
    );

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn find_patient_by_ssn(conn: &Connection, ssn: &str) -> Result<Option<Patient>, DatabaseError> {
    let result = conn.query_row(
        "SELECT pid, name, ssn, address, phone, history FROM patient WHERE ssn = ?1",
        params![ssn],
        patient_from_row,
    );

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn patient_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patient WHERE pid = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Apply only the supplied fields. COALESCE keeps the stored value when the
/// patch field is NULL, so a partial payload never wipes contact data.
pub fn patch_patient(conn: &Connection, id: i64, patch: &PatientPatch) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE patient SET
             address = COALESCE(?2, address),
             phone = COALESCE(?3, phone),
             history = COALESCE(?4, history)
         WHERE pid = ?1",
        params![id, patch.address, patch.phone, patch.history],
    )?;
    Ok(())
}

/// Bounded case-insensitive substring search, name-ascending.
pub fn search_patients_by_name(
    conn: &Connection,
    name: &str,
    limit: u32,
) -> Result<Vec<Patient>, DatabaseError> {
    let pattern = format!("%{name}%");
    let mut stmt = conn.prepare(
        "SELECT pid, name, ssn, address, phone, history FROM patient
         WHERE LOWER(name) LIKE LOWER(?1)
         ORDER BY name ASC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![pattern, limit], patient_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

fn patient_from_row(row: &rusqlite::Row<'_>) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        ssn: row.get(2)?,
        address: row.get(3)?,
        phone: row.get(4)?,
        history: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn sample(name: &str, ssn: &str) -> Patient {
        Patient {
            id: 0,
            name: name.to_string(),
            ssn: ssn.to_string(),
            address: Some("서울시 중구".to_string()),
            phone: Some("010-1111-2222".to_string()),
            history: None,
        }
    }

    #[test]
    fn ssn_is_unique() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, &sample("김하늘", "980101-2345678")).unwrap();
        let dup = insert_patient(&conn, &sample("다른사람", "980101-2345678"));
        assert!(dup.is_err());
    }

    #[test]
    fn patch_only_overwrites_supplied_fields() {
        let conn = open_memory_database().unwrap();
        let id = insert_patient(&conn, &sample("김하늘", "980101-2345678")).unwrap();

        patch_patient(
            &conn,
            id,
            &PatientPatch {
                phone: Some("010-9999-0000".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let patient = get_patient(&conn, id).unwrap().unwrap();
        assert_eq!(patient.phone.as_deref(), Some("010-9999-0000"));
        // Address untouched by a patch that did not name it
        assert_eq!(patient.address.as_deref(), Some("서울시 중구"));
    }

    #[test]
    fn name_search_is_bounded_and_sorted() {
        let conn = open_memory_database().unwrap();
        for i in 0..25 {
            insert_patient(&conn, &sample("김하늘", &format!("90010{i:02}-1234567"))).unwrap();
        }
        insert_patient(&conn, &sample("박바다", "800101-1234567")).unwrap();

        let hits = search_patients_by_name(&conn, "하늘", 20).unwrap();
        assert_eq!(hits.len(), 20);
        assert!(hits.iter().all(|p| p.name == "김하늘"));
    }
}
