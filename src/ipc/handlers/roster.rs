use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::helpers::{
    get_optional_str, get_required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn class_exists(conn: &Connection, name: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE name = ?", [name], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db)
}

fn classes_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let period = get_optional_str(params, "period");
    conn.execute(
        "INSERT INTO classes(name, period) VALUES(?, ?)
         ON CONFLICT(name) DO UPDATE SET period = excluded.period",
        (&name, &period),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "name": name }))
}

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classes = store::load_classes(conn).map_err(HandlerErr::db)?;
    let out: Vec<serde_json::Value> = classes
        .iter()
        .map(|c| json!({ "name": c.name, "period": c.period }))
        .collect();
    Ok(json!({ "classes": out }))
}

fn students_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let name = get_required_str(params, "name")?;
    if !class_exists(conn, &class_name)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let id = get_optional_str(params, "id").unwrap_or_else(|| Uuid::new_v4().to_string());
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let sort_order = params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    conn.execute(
        "INSERT INTO students(id, class_name, name, active, sort_order)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           class_name = excluded.class_name,
           name = excluded.name,
           active = excluded.active,
           sort_order = excluded.sort_order",
        (&id, &class_name, &name, active as i64, sort_order),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": id }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    if !class_exists(conn, &class_name)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let roster = store::load_roster(conn, &class_name).map_err(HandlerErr::db)?;
    let out: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| json!({ "id": s.id, "name": s.name, "className": s.class_name }))
        .collect();
    Ok(json!({ "students": out }))
}

fn teachers_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let id = get_optional_str(params, "id").unwrap_or_else(|| Uuid::new_v4().to_string());
    let subject = get_optional_str(params, "subject");
    conn.execute(
        "INSERT INTO teachers(id, name, subject) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           subject = excluded.subject",
        (&id, &name, &subject),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": id }))
}

/// Replaces a teacher's whole assignment list in one transaction; the
/// cascade options derive from whatever is stored here.
fn assignments_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let teacher = store::load_teacher(conn, &teacher_id).map_err(HandlerErr::db)?;
    if teacher.is_none() {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    let Some(items) = params.get("assignments").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing assignments"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "DELETE FROM teacher_assignments WHERE teacher_id = ?",
        [&teacher_id],
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let mut stored = 0usize;
    for item in items {
        let Some(class_id) = item.get("classId").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params("assignment missing classId"));
        };
        let Some(subject) = item.get("subject").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params("assignment missing subject"));
        };
        let front = item.get("front").and_then(|v| v.as_str());
        let inserted = tx
            .execute(
                "INSERT INTO teacher_assignments(teacher_id, class_name, subject, front)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(teacher_id, class_name, subject) DO UPDATE SET
                   front = excluded.front",
                (&teacher_id, class_id, subject, front),
            )
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        stored += inserted;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "stored": stored }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.upsert" => Some(with_db(state, req, classes_upsert)),
        "classes.list" => Some(with_db(state, req, classes_list)),
        "students.upsert" => Some(with_db(state, req, students_upsert)),
        "students.list" => Some(with_db(state, req, students_list)),
        "teachers.upsert" => Some(with_db(state, req, teachers_upsert)),
        "assignments.set" => Some(with_db(state, req, assignments_set)),
        _ => None,
    }
}
