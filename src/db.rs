use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "diario.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            name TEXT PRIMARY KEY,
            period TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_assignments(
            teacher_id TEXT NOT NULL,
            class_name TEXT NOT NULL,
            subject TEXT NOT NULL,
            front TEXT,
            PRIMARY KEY(teacher_id, class_name, subject),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON teacher_assignments(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            class_name TEXT NOT NULL,
            block TEXT NOT NULL,
            blocks_count INTEGER NOT NULL DEFAULT 1,
            general_notes TEXT,
            homework TEXT,
            photos TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_lookup
         ON sessions(class_name, teacher_id, subject, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_records(
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            present INTEGER NOT NULL DEFAULT 1,
            justified_absence INTEGER NOT NULL DEFAULT 0,
            phone_confiscated INTEGER NOT NULL DEFAULT 0,
            talk INTEGER NOT NULL DEFAULT 0,
            bathroom INTEGER NOT NULL DEFAULT 0,
            sleep INTEGER NOT NULL DEFAULT 0,
            material INTEGER NOT NULL DEFAULT 1,
            activity INTEGER NOT NULL DEFAULT 3,
            homework INTEGER NOT NULL DEFAULT 1,
            participation INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            photos TEXT,
            PRIMARY KEY(session_id, student_id),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_records_student ON session_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS occurrences(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_name TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT,
            date TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occurrences_student ON occurrences(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occurrences_class ON occurrences(class_name, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exits(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            reason TEXT,
            left_at TEXT NOT NULL,
            returned_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exits_student ON exits(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before content registration shipped lack the
    // session text columns. Add them in place.
    ensure_sessions_content_columns(&conn)?;

    Ok(conn)
}

fn ensure_sessions_content_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "sessions", "general_notes")? {
        conn.execute("ALTER TABLE sessions ADD COLUMN general_notes TEXT", [])?;
    }
    if !table_has_column(conn, "sessions", "homework")? {
        conn.execute("ALTER TABLE sessions ADD COLUMN homework TEXT", [])?;
    }
    if !table_has_column(conn, "sessions", "photos")? {
        conn.execute("ALTER TABLE sessions ADD COLUMN photos TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        None => Ok(None),
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
