//! Member accounts and their role-scoped profiles (doctor, pharmacist).

use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::MemberRole;
use crate::models::{Doctor, Member, Pharmacist};

pub fn insert_member(
    conn: &Connection,
    username: &str,
    name: &str,
    role: MemberRole,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO member (username, name, role) VALUES (?1, ?2, ?3)",
        params![username, name, role.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_member(conn: &Connection, id: i64) -> Result<Option<Member>, DatabaseError> {
    let result = conn.query_row(
        "SELECT member_id, username, name, role FROM member WHERE member_id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    );

    match result {
        Ok((id, username, name, role)) => Ok(Some(Member {
            id,
            username,
            name,
            role: MemberRole::from_str(&role)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn member_username_exists(conn: &Connection, username: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM member WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_doctor(
    conn: &Connection,
    member_id: i64,
    hospital_id: Option<i64>,
    department_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO doctor (member_id, hid, dept_id) VALUES (?1, ?2, ?3)",
        params![member_id, hospital_id, department_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_doctor_by_member(
    conn: &Connection,
    member_id: i64,
) -> Result<Option<Doctor>, DatabaseError> {
    let result = conn.query_row(
        "SELECT did, member_id, hid, dept_id FROM doctor WHERE member_id = ?1",
        params![member_id],
        doctor_from_row,
    );

    match result {
        Ok(d) => Ok(Some(d)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_doctor(conn: &Connection, id: i64) -> Result<Option<Doctor>, DatabaseError> {
    let result = conn.query_row(
        "SELECT did, member_id, hid, dept_id FROM doctor WHERE did = ?1",
        params![id],
        doctor_from_row,
    );

    match result {
        Ok(d) => Ok(Some(d)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_pharmacist(
    conn: &Connection,
    member_id: i64,
    pharmacy_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacist (member_id, pharm_id) VALUES (?1, ?2)",
        params![member_id, pharmacy_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_pharmacist_by_member(
    conn: &Connection,
    member_id: i64,
) -> Result<Option<Pharmacist>, DatabaseError> {
    let result = conn.query_row(
        "SELECT phid, member_id, pharm_id FROM pharmacist WHERE member_id = ?1",
        params![member_id],
        |row| {
            Ok(Pharmacist {
                id: row.get(0)?,
                member_id: row.get(1)?,
                pharmacy_id: row.get(2)?,
            })
        },
    );

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn doctor_from_row(row: &rusqlite::Row<'_>) -> Result<Doctor, rusqlite::Error> {
    Ok(Doctor {
        id: row.get(0)?,
        member_id: row.get(1)?,
        hospital_id: row.get(2)?,
        department_id: row.get(3)?,
    })
}
