use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::helpers::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn student_exists(conn: &Connection, id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db)
}

fn occurrences_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_name = get_required_str(params, "className")?;
    let category = get_required_str(params, "category")?;
    let description = get_required_str(params, "description")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let date =
        get_optional_str(params, "date").unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO occurrences(id, student_id, class_name, category, description, date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &student_id, &class_name, &category, &description, &date),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": id }))
}

fn occurrences_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_optional_str(params, "className");
    let student_id = get_optional_str(params, "studentId");
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, class_name, category, description, date
             FROM occurrences
             WHERE (?1 IS NULL OR class_name = ?1) AND (?2 IS NULL OR student_id = ?2)
             ORDER BY date, rowid",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map((&class_name, &student_id), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "className": r.get::<_, String>(2)?,
                "category": r.get::<_, String>(3)?,
                "description": r.get::<_, String>(4)?,
                "date": r.get::<_, String>(5)?,
            }))
        })
        .map_err(HandlerErr::db)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(HandlerErr::db)?);
    }
    Ok(json!({ "occurrences": out }))
}

/// Opens a hallway exit for a student. A student can have at most one
/// exit without a return time.
fn exits_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let reason = get_required_str(params, "reason")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let already_open: Option<String> = conn
        .query_row(
            "SELECT id FROM exits WHERE student_id = ? AND returned_at IS NULL",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    if let Some(open_id) = already_open {
        return Err(HandlerErr::new(
            "exit_already_open",
            format!("student already has an open exit: {}", open_id),
        ));
    }
    let left_at = get_optional_str(params, "leftAt").unwrap_or_else(|| Utc::now().to_rfc3339());
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exits(id, student_id, reason, left_at, returned_at)
         VALUES(?, ?, ?, ?, NULL)",
        (&id, &student_id, &reason, &left_at),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": id, "leftAt": left_at }))
}

fn exits_close(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exit_id = get_required_str(params, "exitId")?;
    let returned_at =
        get_optional_str(params, "returnedAt").unwrap_or_else(|| Utc::now().to_rfc3339());
    let changed = conn
        .execute(
            "UPDATE exits SET returned_at = ? WHERE id = ? AND returned_at IS NULL",
            (&returned_at, &exit_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("open exit not found"));
    }
    Ok(json!({ "id": exit_id, "returnedAt": returned_at }))
}

fn exits_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_optional_str(params, "studentId");
    let open_only = params
        .get("openOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, reason, left_at, returned_at
             FROM exits
             WHERE (?1 IS NULL OR student_id = ?1)
               AND (?2 = 0 OR returned_at IS NULL)
             ORDER BY left_at, rowid",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map((&student_id, open_only as i64), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "reason": r.get::<_, String>(2)?,
                "leftAt": r.get::<_, String>(3)?,
                "returnedAt": r.get::<_, Option<String>>(4)?,
            }))
        })
        .map_err(HandlerErr::db)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(HandlerErr::db)?);
    }
    Ok(json!({ "exits": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "occurrences.add" => Some(with_db(state, req, occurrences_add)),
        "occurrences.list" => Some(with_db(state, req, occurrences_list)),
        "exits.open" => Some(with_db(state, req, exits_open)),
        "exits.close" => Some(with_db(state, req, exits_close)),
        "exits.list" => Some(with_db(state, req, exits_list)),
        _ => None,
    }
}
