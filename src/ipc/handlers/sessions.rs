use rusqlite::Connection;
use serde_json::json;

use crate::grade::{calculate_grade, round_off_1_decimal};
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_bool, get_required_i64, get_required_str,
    get_str_array, to_json, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{
    derive_available_options, find_existing_session, initialize_session, merged_block_label,
    time_blocks_for_period, toggle_block, CounterField, SessionContext,
};
use crate::store;

fn load_teacher_or_404(
    conn: &Connection,
    teacher_id: &str,
) -> Result<crate::session::Teacher, HandlerErr> {
    store::load_teacher(conn, teacher_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("teacher not found"))
}

fn sessions_options(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let teacher = load_teacher_or_404(conn, &teacher_id)?;
    let all_classes = store::load_classes(conn).map_err(HandlerErr::db)?;

    let selected = match get_optional_str(params, "className") {
        None => None,
        Some(name) => Some(
            store::load_class(conn, &name)
                .map_err(HandlerErr::db)?
                .ok_or_else(|| HandlerErr::not_found("class not found"))?,
        ),
    };

    let options = derive_available_options(&teacher, &all_classes, selected.as_ref());
    to_json(&options)
}

fn sessions_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let class_name = get_required_str(params, "className")?;
    let subject = get_required_str(params, "subject")?;
    let date_text = get_required_str(params, "date")?;
    let selected_blocks = get_str_array(params, "selectedBlocks")?;
    if selected_blocks.is_empty() {
        return Err(HandlerErr::bad_params("selectedBlocks must not be empty"));
    }
    let date = store::parse_day(&date_text).map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    load_teacher_or_404(conn, &teacher_id)?;
    if store::load_class(conn, &class_name)
        .map_err(HandlerErr::db)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class not found"));
    }

    let prior = store::load_class_sessions(conn, &class_name, Some(&teacher_id), Some(&subject))
        .map_err(HandlerErr::db)?;
    if let Some(existing) = find_existing_session(&prior, date, &class_name, &teacher_id, &subject)
    {
        // Duplicate keys mean upstream de-duplication failed; load the
        // first and surface the surplus count.
        let duplicates = prior
            .iter()
            .filter(|s| s.date == date && s.id != existing.id)
            .count();
        return Ok(json!({
            "created": false,
            "duplicates": duplicates,
            "session": to_json(existing)?,
        }));
    }

    let roster = store::load_roster(conn, &class_name).map_err(HandlerErr::db)?;
    let session = initialize_session(
        &roster,
        &SessionContext {
            teacher_id,
            subject,
            class_name,
            date,
            selected_blocks,
        },
    );
    store::save_session(conn, &session)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({
        "created": true,
        "duplicates": 0,
        "session": to_json(&session)?,
    }))
}

fn sessions_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let session = store::load_session(conn, &session_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("session not found"))?;
    Ok(json!({ "session": to_json(&session)? }))
}

/// Pure block toggling for the selection UI. The last selected block can
/// never be removed and the result keeps schedule order.
fn sessions_blocks_toggle(
    _conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut selected = get_str_array(params, "selected")?;
    let block = get_required_str(params, "block")?;
    let period = get_optional_str(params, "period");
    let available: Vec<String> = time_blocks_for_period(period.as_deref())
        .iter()
        .map(|b| b.to_string())
        .collect();

    toggle_block(&mut selected, &block, &available);
    let label = merged_block_label(&selected);
    Ok(json!({
        "selected": selected,
        "block": label,
        "blocksCount": selected.len().max(1),
    }))
}

fn sessions_counter_apply(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let student_id = get_required_str(params, "studentId")?;
    let field_name = get_required_str(params, "field")?;
    let delta = get_required_i64(params, "delta")?;
    let field = CounterField::parse(&field_name)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown counter field: {}", field_name)))?;

    let mut record = store::load_record(conn, &session_id, &student_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("session record not found"))?;
    let value = record.counters.apply_delta(field, delta);
    store::update_record(conn, &session_id, &record)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({
        "value": value,
        "counters": to_json(&record.counters)?,
        "grade": round_off_1_decimal(calculate_grade(&record)),
    }))
}

fn sessions_attendance_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let student_id = get_required_str(params, "studentId")?;
    let present = get_required_bool(params, "present")?;
    let justified = get_optional_bool(params, "justifiedAbsence").unwrap_or(false);

    let mut record = store::load_record(conn, &session_id, &student_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("session record not found"))?;
    record.set_present(present);
    record.set_justified_absence(justified);
    store::update_record(conn, &session_id, &record)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({
        "present": record.present,
        "justifiedAbsence": record.justified_absence,
        "grade": round_off_1_decimal(calculate_grade(&record)),
    }))
}

fn sessions_record_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let student_id = get_required_str(params, "studentId")?;

    let mut record = store::load_record(conn, &session_id, &student_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("session record not found"))?;
    if let Some(notes) = params.get("notes") {
        record.notes = notes.as_str().map(|s| s.to_string());
    }
    if let Some(phone) = params.get("phoneConfiscated").and_then(|v| v.as_bool()) {
        record.phone_confiscated = phone;
    }
    store::update_record(conn, &session_id, &record)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({ "grade": round_off_1_decimal(calculate_grade(&record)) }))
}

fn sessions_content_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let mut session = store::load_session(conn, &session_id)
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("session not found"))?;
    if let Some(notes) = params.get("generalNotes") {
        session.general_notes = notes.as_str().map(|s| s.to_string());
    }
    if let Some(homework) = params.get("homework") {
        session.homework = homework.as_str().map(|s| s.to_string());
    }
    store::save_session(conn, &session)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": session.id }))
}

/// Explicit user-triggered save of a whole edited session object.
fn sessions_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = params.get("session") else {
        return Err(HandlerErr::bad_params("missing session"));
    };
    let session: crate::session::ClassSession = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid session: {}", e)))?;
    store::save_session(conn, &session)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "id": session.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.options" => Some(with_db(state, req, sessions_options)),
        "sessions.open" => Some(with_db(state, req, sessions_open)),
        "sessions.get" => Some(with_db(state, req, sessions_get)),
        "sessions.blocksToggle" => Some(with_db(state, req, sessions_blocks_toggle)),
        "sessions.counterApply" => Some(with_db(state, req, sessions_counter_apply)),
        "sessions.attendanceSet" => Some(with_db(state, req, sessions_attendance_set)),
        "sessions.recordUpdate" => Some(with_db(state, req, sessions_record_update)),
        "sessions.contentSet" => Some(with_db(state, req, sessions_content_set)),
        "sessions.save" => Some(with_db(state, req, sessions_save)),
        _ => None,
    }
}
