//! Medicine catalogue and its ingredient master data.

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Ingredient, Medicine};

pub fn insert_medicine(
    conn: &Connection,
    name: &str,
    manufacturer: Option<&str>,
    efficacy: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO medicine (mname, manufacturer, efficacy) VALUES (?1, ?2, ?3)",
        params![name, manufacturer, efficacy],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_medicine(conn: &Connection, id: i64) -> Result<Option<Medicine>, DatabaseError> {
    let result = conn.query_row(
        "SELECT mid, mname, manufacturer, efficacy FROM medicine WHERE mid = ?1",
        params![id],
        medicine_from_row,
    );

    match result {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bounded case-insensitive substring search on name, name-ascending.
pub fn search_medicines_by_name(
    conn: &Connection,
    keyword: &str,
    limit: u32,
) -> Result<Vec<Medicine>, DatabaseError> {
    let pattern = format!("%{keyword}%");
    let mut stmt = conn.prepare(
        "SELECT mid, mname, manufacturer, efficacy FROM medicine
         WHERE LOWER(mname) LIKE LOWER(?1)
         ORDER BY mname ASC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![pattern, limit], medicine_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn insert_ingredient(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    conn.execute("INSERT INTO ingredient (iname) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn link_medicine_ingredient(
    conn: &Connection,
    medicine_id: i64,
    ingredient_id: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medicine_ingredient (mid, iid) VALUES (?1, ?2)",
        params![medicine_id, ingredient_id],
    )?;
    Ok(())
}

/// Ingredients of a medicine, ingredient-id ascending for deterministic views.
pub fn get_ingredients_for_medicine(
    conn: &Connection,
    medicine_id: i64,
) -> Result<Vec<Ingredient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT i.iid, i.iname
         FROM ingredient i JOIN medicine_ingredient mi ON mi.iid = i.iid
         WHERE mi.mid = ?1
         ORDER BY i.iid",
    )?;

    let rows = stmt.query_map(params![medicine_id], |row| {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

fn medicine_from_row(row: &rusqlite::Row<'_>) -> Result<Medicine, rusqlite::Error> {
    Ok(Medicine {
        id: row.get(0)?,
        name: row.get(1)?,
        manufacturer: row.get(2)?,
        efficacy: row.get(3)?,
    })
}
