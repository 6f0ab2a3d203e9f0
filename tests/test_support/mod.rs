#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_branchd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn branchd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}

pub fn create_room(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
) -> i64 {
    let result = request_ok(stdin, reader, id, "rooms.create", json!({ "name": name }));
    result
        .get("room")
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_i64())
        .expect("room id")
}

pub fn create_teacher(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    full_name: &str,
) -> i64 {
    let result = request_ok(
        stdin,
        reader,
        id,
        "teachers.create",
        json!({ "fullName": full_name, "subjects": ["English"] }),
    );
    result
        .get("teacher")
        .and_then(|t| t.get("id"))
        .and_then(|v| v.as_i64())
        .expect("teacher id")
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    full_name: &str,
) -> i64 {
    let email = format!(
        "{}@example.com",
        full_name.to_lowercase().replace(' ', ".")
    );
    let result = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "fullName": full_name, "phoneNumber": "081234567", "email": email }),
    );
    result
        .get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id")
}

pub fn create_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    teacher_id: i64,
    room_id: i64,
    max_capacity: i64,
) -> i64 {
    let result = request_ok(
        stdin,
        reader,
        id,
        "classes.create",
        json!({
            "name": name,
            "level": "Beginner",
            "teacherId": teacher_id,
            "roomId": room_id,
            "startTime": "09:00",
            "endTime": "10:30",
            "days": ["Senin", "Rabu"],
            "maxCapacity": max_capacity
        }),
    );
    result
        .get("class")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_i64())
        .expect("class id")
}
