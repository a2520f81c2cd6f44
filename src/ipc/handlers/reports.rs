use rusqlite::Connection;
use serde_json::json;

use crate::ipc::helpers::{get_optional_str, get_required_str, to_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{foa_sheet, rank_students_in_focus, summarize_class, summarize_student};
use crate::store;

fn class_sessions(
    conn: &Connection,
    class_name: &str,
) -> Result<Vec<crate::session::ClassSession>, HandlerErr> {
    store::load_class_sessions(conn, class_name, None, None).map_err(HandlerErr::db)
}

fn reports_class_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    if store::load_class(conn, &class_name)
        .map_err(HandlerErr::db)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class not found"));
    }
    let roster = store::load_roster(conn, &class_name).map_err(HandlerErr::db)?;
    let ids: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();
    let sessions = class_sessions(conn, &class_name)?;
    let weights = store::risk_weights(conn).map_err(HandlerErr::db)?;
    let summary = summarize_class(&class_name, &ids, &sessions, &weights);
    Ok(json!({ "summary": to_json(&summary)? }))
}

fn reports_students_in_focus(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize);
    let roster = store::load_roster(conn, &class_name).map_err(HandlerErr::db)?;
    let sessions = class_sessions(conn, &class_name)?;
    let weights = store::risk_weights(conn).map_err(HandlerErr::db)?;

    let summaries = roster
        .iter()
        .map(|s| summarize_student(&s.id, &sessions, &weights))
        .collect();
    let mut ranked = rank_students_in_focus(summaries);
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    Ok(json!({ "students": to_json(&ranked)? }))
}

fn reports_foa_sheet(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_required_str(params, "className")?;
    let sessions = class_sessions(conn, &class_name)?;
    match get_optional_str(params, "studentId") {
        Some(student_id) => {
            let sheet = foa_sheet(&student_id, &sessions);
            Ok(json!({ "sheets": [to_json(&sheet)?] }))
        }
        None => {
            let roster = store::load_roster(conn, &class_name).map_err(HandlerErr::db)?;
            let mut sheets = Vec::with_capacity(roster.len());
            for s in &roster {
                sheets.push(to_json(&foa_sheet(&s.id, &sessions))?);
            }
            Ok(json!({ "sheets": sheets }))
        }
    }
}

fn reports_risk_weights_get(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let weights = store::risk_weights(conn).map_err(HandlerErr::db)?;
    Ok(json!({ "weights": to_json(&weights)? }))
}

fn reports_risk_weights_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = params.get("weights") else {
        return Err(HandlerErr::bad_params("missing weights"));
    };
    let weights: crate::report::RiskWeights = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid weights: {}", e)))?;
    store::set_risk_weights(conn, &weights)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "weights": to_json(&weights)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classSummary" => Some(with_db(state, req, reports_class_summary)),
        "reports.studentsInFocus" => Some(with_db(state, req, reports_students_in_focus)),
        "reports.foaSheet" => Some(with_db(state, req, reports_foa_sheet)),
        "reports.riskWeightsGet" => Some(with_db(state, req, reports_risk_weights_get)),
        "reports.riskWeightsSet" => Some(with_db(state, req, reports_risk_weights_set)),
        _ => None,
    }
}
