use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_diariod");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn diariod");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn concept_of(sheet: &serde_json::Value, category: &str) -> String {
    sheet
        .get("lines")
        .and_then(|v| v.as_array())
        .expect("lines")
        .iter()
        .find(|l| l.get("category").and_then(|v| v.as_str()) == Some(category))
        .unwrap_or_else(|| panic!("missing category {}", category))
        .get("concept")
        .and_then(|v| v.as_str())
        .expect("concept")
        .to_string()
}

#[test]
fn foa_sheet_classifies_counter_averages_per_category() {
    let workspace = temp_dir("diario-foa-sheet");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "classes.upsert",
        json!({ "name": "9A", "period": "manha" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s2",
        "students.upsert",
        json!({ "className": "9A", "name": "Ana", "id": "stu-a" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s3",
        "teachers.upsert",
        json!({ "id": "t1", "name": "Prof. Silva", "subject": "Matematica" }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "sessions.open",
        json!({
            "teacherId": "t1",
            "className": "9A",
            "subject": "Matematica",
            "date": "2026-03-02",
            "selectedBlocks": ["07h00-07h45"]
        }),
    );
    let session_id = opened
        .pointer("/session/id")
        .and_then(|v| v.as_str())
        .expect("session id")
        .to_string();

    // Ana talks twice and participates once; everything else stays at
    // the fresh-record defaults.
    for (id, field, delta) in [("2", "talk", 2), ("3", "participation", 1)] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "sessions.counterApply",
            json!({
                "sessionId": session_id,
                "studentId": "stu-a",
                "field": field,
                "delta": delta
            }),
        );
    }

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.foaSheet",
        json!({ "className": "9A", "studentId": "stu-a" }),
    );
    let sheets = result
        .get("sheets")
        .and_then(|v| v.as_array())
        .expect("sheets");
    assert_eq!(sheets.len(), 1);
    let sheet = &sheets[0];
    assert_eq!(sheet.get("sessionsCount").and_then(|v| v.as_i64()), Some(1));

    // (talk 2 + sleep 0) / 2 = 1.0.
    assert_eq!(concept_of(sheet, "comportamento"), "B");
    assert_eq!(concept_of(sheet, "atencao"), "O");
    assert_eq!(concept_of(sheet, "material"), "O");
    assert_eq!(concept_of(sheet, "tarefas"), "O");
    assert_eq!(concept_of(sheet, "atividade"), "O");
    assert_eq!(concept_of(sheet, "participacao"), "O");
    assert_eq!(concept_of(sheet, "autogestao"), "O");
    // (activity 3 + participation 1 * 3) / 2 = 3.0.
    assert_eq!(concept_of(sheet, "engajamento"), "O");
    // Average talk 2.0 keeps the sheet on the reserved side.
    assert_eq!(concept_of(sheet, "abertura"), "B");

    // A student with no recorded sessions gets sentinel lines, not an
    // error.
    let ghost = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.foaSheet",
        json!({ "className": "9A", "studentId": "stu-ghost" }),
    );
    let ghost_sheet = &ghost.get("sheets").and_then(|v| v.as_array()).expect("sheets")[0];
    assert_eq!(
        ghost_sheet.get("sessionsCount").and_then(|v| v.as_i64()),
        Some(0)
    );
    for line in ghost_sheet.get("lines").and_then(|v| v.as_array()).expect("lines") {
        assert_eq!(line.get("concept").and_then(|v| v.as_str()), Some("-"));
        assert!(line.get("average").map(|v| v.is_null()).unwrap_or(false));
    }

    // Class-wide request returns one sheet per roster student.
    let class_wide = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.foaSheet",
        json!({ "className": "9A" }),
    );
    assert_eq!(
        class_wide.get("sheets").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
