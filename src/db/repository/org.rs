//! Organizational anchors: hospitals, departments, pharmacies.

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Department, Hospital, Pharmacy};

pub fn insert_hospital(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
    phone: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO hospital (hname, address, phone) VALUES (?1, ?2, ?3)",
        params![name, address, phone],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_hospital(conn: &Connection, id: i64) -> Result<Option<Hospital>, DatabaseError> {
    let result = conn.query_row(
        "SELECT hid, hname, address, phone FROM hospital WHERE hid = ?1",
        params![id],
        |row| {
            Ok(Hospital {
                id: row.get(0)?,
                name: row.get(1)?,
                address: row.get(2)?,
                phone: row.get(3)?,
            })
        },
    );

    match result {
        Ok(h) => Ok(Some(h)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_department(
    conn: &Connection,
    hospital_id: Option<i64>,
    name: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO department (hid, dname) VALUES (?1, ?2)",
        params![hospital_id, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_department(conn: &Connection, id: i64) -> Result<Option<Department>, DatabaseError> {
    let result = conn.query_row(
        "SELECT dept_id, hid, dname FROM department WHERE dept_id = ?1",
        params![id],
        |row| {
            Ok(Department {
                id: row.get(0)?,
                hospital_id: row.get(1)?,
                name: row.get(2)?,
            })
        },
    );

    match result {
        Ok(d) => Ok(Some(d)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_pharmacy(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
    phone: Option<&str>,
    hospital_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacy (name, address, phone, hid) VALUES (?1, ?2, ?3, ?4)",
        params![name, address, phone, hospital_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_pharmacy(conn: &Connection, id: i64) -> Result<Option<Pharmacy>, DatabaseError> {
    let result = conn.query_row(
        "SELECT pharm_id, name, address, phone, hid FROM pharmacy WHERE pharm_id = ?1",
        params![id],
        pharmacy_from_row,
    );

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pharmacies linked to the given hospital whose name or address contains the
/// keyword, case-insensitive, name-ascending, bounded by `limit`.
pub fn search_pharmacies_by_hospital(
    conn: &Connection,
    hospital_id: i64,
    keyword: &str,
    limit: u32,
) -> Result<Vec<Pharmacy>, DatabaseError> {
    let pattern = format!("%{keyword}%");
    let mut stmt = conn.prepare(
        "SELECT pharm_id, name, address, phone, hid FROM pharmacy
         WHERE hid = ?1
           AND (LOWER(name) LIKE LOWER(?2) OR LOWER(IFNULL(address, '')) LIKE LOWER(?2))
         ORDER BY name ASC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(params![hospital_id, pattern, limit], pharmacy_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

fn pharmacy_from_row(row: &rusqlite::Row<'_>) -> Result<Pharmacy, rusqlite::Error> {
    Ok(Pharmacy {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        hospital_id: row.get(4)?,
    })
}
