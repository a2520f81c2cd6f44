//! Row mapping between the workspace database and the in-memory session
//! model. Handlers load a fully-materialized snapshot here, run the pure
//! derivations on it, and write whole sessions back.

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::report::RiskWeights;
use crate::session::{
    ClassRoom, ClassSession, Counters, SessionRecord, Student, Teacher, TeacherAssignment,
};

pub const RISK_WEIGHTS_KEY: &str = "risk.weights";

pub fn parse_day(text: &str) -> anyhow::Result<NaiveDate> {
    // Accept a bare day or a full timestamp; identity is the calendar day.
    let day_part = text.split('T').next().unwrap_or(text);
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|e| anyhow!("invalid date {:?}: {}", text, e))
}

pub fn load_classes(conn: &Connection) -> anyhow::Result<Vec<ClassRoom>> {
    let mut stmt = conn.prepare("SELECT name, period FROM classes ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRoom {
                name: r.get(0)?,
                period: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_class(conn: &Connection, name: &str) -> anyhow::Result<Option<ClassRoom>> {
    let row = conn
        .query_row(
            "SELECT name, period FROM classes WHERE name = ?",
            [name],
            |r| {
                Ok(ClassRoom {
                    name: r.get(0)?,
                    period: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Active students of a class in roster order.
pub fn load_roster(conn: &Connection, class_name: &str) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_name FROM students
         WHERE class_name = ? AND active != 0
         ORDER BY sort_order, name",
    )?;
    let rows = stmt
        .query_map([class_name], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                class_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_teacher(conn: &Connection, teacher_id: &str) -> anyhow::Result<Option<Teacher>> {
    let base = conn
        .query_row(
            "SELECT id, name, subject FROM teachers WHERE id = ?",
            [teacher_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, subject)) = base else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT class_name, subject, front FROM teacher_assignments
         WHERE teacher_id = ?
         ORDER BY rowid",
    )?;
    let assignments = stmt
        .query_map([teacher_id], |r| {
            Ok(TeacherAssignment {
                class_id: r.get(0)?,
                subject: r.get(1)?,
                front: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Teacher {
        id,
        name,
        subject,
        assignments,
    }))
}

fn photos_from_json(raw: Option<String>) -> Vec<String> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

fn photos_to_json(photos: &[String]) -> anyhow::Result<Option<String>> {
    if photos.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(photos)?))
    }
}

fn load_records(conn: &Connection, session_id: &str) -> anyhow::Result<Vec<SessionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, present, justified_absence, phone_confiscated,
                talk, bathroom, sleep, material, activity, homework, participation,
                notes, photos
         FROM session_records
         WHERE session_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([session_id], |r| {
            let photos_raw: Option<String> = r.get(12)?;
            Ok(SessionRecord {
                student_id: r.get(0)?,
                present: r.get::<_, i64>(1)? != 0,
                justified_absence: r.get::<_, i64>(2)? != 0,
                phone_confiscated: r.get::<_, i64>(3)? != 0,
                counters: Counters {
                    talk: r.get(4)?,
                    bathroom: r.get(5)?,
                    sleep: r.get(6)?,
                    material: r.get(7)?,
                    activity: r.get(8)?,
                    homework: r.get(9)?,
                    participation: r.get(10)?,
                },
                notes: r.get(11)?,
                photos: photos_from_json(photos_raw),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ClassSession, String)> {
    let date_text: String = row.get(1)?;
    let photos_raw: Option<String> = row.get(9)?;
    Ok((
        ClassSession {
            id: row.get(0)?,
            // Filled in by the caller after parsing date_text.
            date: NaiveDate::MIN,
            teacher_id: row.get(2)?,
            subject: row.get(3)?,
            class_name: row.get(4)?,
            block: row.get(5)?,
            blocks_count: row.get(6)?,
            records: Vec::new(),
            general_notes: row.get(7)?,
            homework: row.get(8)?,
            photos: photos_from_json(photos_raw),
        },
        date_text,
    ))
}

const SESSION_COLUMNS: &str = "id, date, teacher_id, subject, class_name, block, blocks_count,
     general_notes, homework, photos";

pub fn load_session(conn: &Connection, session_id: &str) -> anyhow::Result<Option<ClassSession>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
    let found = conn
        .query_row(&sql, [session_id], session_from_row)
        .optional()?;
    let Some((mut session, date_text)) = found else {
        return Ok(None);
    };
    session.date = parse_day(&date_text)?;
    session.records = load_records(conn, session_id)?;
    Ok(Some(session))
}

/// Every session of one class, oldest first, records attached. The
/// optional filters narrow to one teacher/subject pair.
pub fn load_class_sessions(
    conn: &Connection,
    class_name: &str,
    teacher_id: Option<&str>,
    subject: Option<&str>,
) -> anyhow::Result<Vec<ClassSession>> {
    let sql = format!(
        "SELECT {} FROM sessions
         WHERE class_name = ?
           AND (?2 IS NULL OR teacher_id = ?2)
           AND (?3 IS NULL OR subject = ?3)
         ORDER BY date, rowid",
        SESSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map((class_name, teacher_id, subject), session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sessions = Vec::with_capacity(raw.len());
    for (mut session, date_text) in raw {
        session.date = parse_day(&date_text)
            .with_context(|| format!("session {} has a bad date", session.id))?;
        session.records = load_records(conn, &session.id)?;
        sessions.push(session);
    }
    Ok(sessions)
}

/// Writes a whole session, records included, replacing any prior rows.
pub fn save_session(conn: &Connection, session: &ClassSession) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO sessions(id, date, teacher_id, subject, class_name, block, blocks_count,
                              general_notes, homework, photos)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           date = excluded.date,
           teacher_id = excluded.teacher_id,
           subject = excluded.subject,
           class_name = excluded.class_name,
           block = excluded.block,
           blocks_count = excluded.blocks_count,
           general_notes = excluded.general_notes,
           homework = excluded.homework,
           photos = excluded.photos",
        (
            &session.id,
            session.date.format("%Y-%m-%d").to_string(),
            &session.teacher_id,
            &session.subject,
            &session.class_name,
            &session.block,
            session.blocks_count,
            &session.general_notes,
            &session.homework,
            photos_to_json(&session.photos)?,
        ),
    )?;

    tx.execute(
        "DELETE FROM session_records WHERE session_id = ?",
        [&session.id],
    )?;
    for r in &session.records {
        tx.execute(
            "INSERT INTO session_records(session_id, student_id, present, justified_absence,
                 phone_confiscated, talk, bathroom, sleep, material, activity, homework,
                 participation, notes, photos)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &session.id,
                &r.student_id,
                r.present as i64,
                r.justified_absence as i64,
                r.phone_confiscated as i64,
                r.counters.talk,
                r.counters.bathroom,
                r.counters.sleep,
                r.counters.material,
                r.counters.activity,
                r.counters.homework,
                r.counters.participation,
                &r.notes,
                photos_to_json(&r.photos)?,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn update_record(
    conn: &Connection,
    session_id: &str,
    record: &SessionRecord,
) -> anyhow::Result<()> {
    let changed = conn.execute(
        "UPDATE session_records SET
           present = ?, justified_absence = ?, phone_confiscated = ?,
           talk = ?, bathroom = ?, sleep = ?, material = ?, activity = ?,
           homework = ?, participation = ?, notes = ?, photos = ?
         WHERE session_id = ? AND student_id = ?",
        (
            record.present as i64,
            record.justified_absence as i64,
            record.phone_confiscated as i64,
            record.counters.talk,
            record.counters.bathroom,
            record.counters.sleep,
            record.counters.material,
            record.counters.activity,
            record.counters.homework,
            record.counters.participation,
            &record.notes,
            photos_to_json(&record.photos)?,
            session_id,
            &record.student_id,
        ),
    )?;
    if changed == 0 {
        return Err(anyhow!(
            "no record for student {} in session {}",
            record.student_id,
            session_id
        ));
    }
    Ok(())
}

pub fn load_record(
    conn: &Connection,
    session_id: &str,
    student_id: &str,
) -> anyhow::Result<Option<SessionRecord>> {
    let records = load_records(conn, session_id)?;
    Ok(records.into_iter().find(|r| r.student_id == student_id))
}

/// Risk weights from settings, built-in defaults when unset or unreadable.
pub fn risk_weights(conn: &Connection) -> anyhow::Result<RiskWeights> {
    match db::settings_get_json(conn, RISK_WEIGHTS_KEY)? {
        Some(value) => Ok(serde_json::from_value(value).unwrap_or_default()),
        None => Ok(RiskWeights::default()),
    }
}

pub fn set_risk_weights(conn: &Connection, weights: &RiskWeights) -> anyhow::Result<()> {
    db::settings_set_json(conn, RISK_WEIGHTS_KEY, &serde_json::to_value(weights)?)
}
