//! Shared master rows: symptoms and treatments. Created on demand, never
//! deleted by record deletion.

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Symptom, Treatment};

pub fn insert_symptom(
    conn: &Connection,
    name: &str,
    body_part: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO symptom (sname, body_part) VALUES (?1, ?2)",
        params![name, body_part],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_symptom(conn: &Connection, id: i64) -> Result<Option<Symptom>, DatabaseError> {
    let result = conn.query_row(
        "SELECT sid, sname, body_part FROM symptom WHERE sid = ?1",
        params![id],
        |row| {
            Ok(Symptom {
                id: row.get(0)?,
                name: row.get(1)?,
                body_part: row.get(2)?,
            })
        },
    );

    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_treatment(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO treatment (tname, description) VALUES (?1, ?2)",
        params![name, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_treatment(conn: &Connection, id: i64) -> Result<Option<Treatment>, DatabaseError> {
    let result = conn.query_row(
        "SELECT tid, tname, description FROM treatment WHERE tid = ?1",
        params![id],
        |row| {
            Ok(Treatment {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        },
    );

    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_symptoms_for_record(
    conn: &Connection,
    record_id: i64,
) -> Result<Vec<Symptom>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.sid, s.sname, s.body_part
         FROM symptom s JOIN record_symptom rs ON rs.sid = s.sid
         WHERE rs.rid = ?1
         ORDER BY s.sid",
    )?;

    let rows = stmt.query_map(params![record_id], |row| {
        Ok(Symptom {
            id: row.get(0)?,
            name: row.get(1)?,
            body_part: row.get(2)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn get_treatments_for_record(
    conn: &Connection,
    record_id: i64,
) -> Result<Vec<Treatment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT t.tid, t.tname, t.description
         FROM treatment t JOIN record_treatment rt ON rt.tid = t.tid
         WHERE rt.rid = ?1
         ORDER BY t.tid",
    )?;

    let rows = stmt.query_map(params![record_id], |row| {
        Ok(Treatment {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
