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

fn request(
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "classes.upsert",
        json!({ "name": "9A", "period": "manha" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s2",
        "students.upsert",
        json!({ "className": "9A", "name": "Ana", "id": "stu-a" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s3",
        "students.upsert",
        json!({ "className": "9A", "name": "Bruno", "id": "stu-b" }),
    );
}

#[test]
fn occurrences_are_stored_and_filterable() {
    let workspace = temp_dir("diario-occurrences");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "occurrences.add",
        json!({
            "studentId": "stu-a",
            "className": "9A",
            "category": "indisciplina",
            "description": "conversa durante a prova",
            "date": "2026-03-02"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "occurrences.add",
        json!({
            "studentId": "stu-b",
            "className": "9A",
            "category": "atraso",
            "description": "chegou 15 minutos atrasado",
            "date": "2026-03-03"
        }),
    );

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "occurrences.list",
        json!({ "className": "9A" }),
    );
    assert_eq!(
        all.get("occurrences").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let only_a = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "occurrences.list",
        json!({ "studentId": "stu-a" }),
    );
    let listed = only_a
        .get("occurrences")
        .and_then(|v| v.as_array())
        .expect("occurrences");
    assert_eq!(listed.len(), 1);
    assert_eq!(
        listed[0].get("category").and_then(|v| v.as_str()),
        Some("indisciplina")
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "occurrences.add",
        json!({
            "studentId": "stu-ghost",
            "className": "9A",
            "category": "atraso",
            "description": "unknown student"
        }),
    );
    assert_eq!(missing.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        missing.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn one_open_exit_per_student() {
    let workspace = temp_dir("diario-exits");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "exits.open",
        json!({
            "studentId": "stu-a",
            "reason": "banheiro",
            "leftAt": "2026-03-02T09:10:00Z"
        }),
    );
    let exit_id = opened
        .get("id")
        .and_then(|v| v.as_str())
        .expect("exit id")
        .to_string();

    // A second exit for the same student is refused while the first is
    // still open.
    let refused = request(
        &mut stdin,
        &mut reader,
        "2",
        "exits.open",
        json!({ "studentId": "stu-a", "reason": "bebedouro" }),
    );
    assert_eq!(refused.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        refused.pointer("/error/code").and_then(|v| v.as_str()),
        Some("exit_already_open")
    );

    // Another student is unaffected.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exits.open",
        json!({
            "studentId": "stu-b",
            "reason": "coordenacao",
            "leftAt": "2026-03-02T09:12:00Z"
        }),
    );

    let open_list = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "exits.list",
        json!({ "openOnly": true }),
    );
    assert_eq!(
        open_list.get("exits").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let closed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "exits.close",
        json!({ "exitId": exit_id, "returnedAt": "2026-03-02T09:18:00Z" }),
    );
    assert_eq!(
        closed.get("returnedAt").and_then(|v| v.as_str()),
        Some("2026-03-02T09:18:00Z")
    );

    // Closing twice is a not_found on the open row.
    let reclosed = request(
        &mut stdin,
        &mut reader,
        "6",
        "exits.close",
        json!({ "exitId": exit_id }),
    );
    assert_eq!(reclosed.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        reclosed.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    // After the return the student can leave again.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "exits.open",
        json!({ "studentId": "stu-a", "reason": "banheiro" }),
    );

    let for_a = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "exits.list",
        json!({ "studentId": "stu-a" }),
    );
    assert_eq!(
        for_a.get("exits").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
