use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_query_failed, get_optional_str, get_required_i64, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::{types::Value, Connection, OptionalExtension};
use serde_json::json;

pub(super) fn student_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let full_name: String = row.get(1)?;
    let phone_number: String = row.get(2)?;
    let email: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(json!({
        "id": id,
        "fullName": full_name,
        "phoneNumber": phone_number,
        "email": email,
        "createdAt": created_at
    }))
}

fn fetch_student(conn: &Connection, student_id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        "SELECT id, full_name, phone_number, email, created_at FROM students WHERE id = ?",
        [student_id],
        student_row_json,
    )
    .optional()
    .map_err(db_query_failed)
}

fn is_plausible_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
}

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, full_name, phone_number, email, created_at
             FROM students
             ORDER BY full_name",
        )
        .map_err(db_query_failed)?;
    let students = stmt
        .query_map([], student_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?.trim().to_string();
    if full_name.is_empty() {
        return Err(HandlerErr::bad_params("fullName must not be empty"));
    }
    let phone_number = get_required_str(params, "phoneNumber")?.trim().to_string();
    if phone_number.is_empty() {
        return Err(HandlerErr::bad_params("phoneNumber must not be empty"));
    }
    let email = get_required_str(params, "email")?.trim().to_string();
    if !is_plausible_email(&email) {
        return Err(HandlerErr::bad_params("email must be a valid address"));
    }

    conn.execute(
        "INSERT INTO students(full_name, phone_number, email, created_at)
         VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&full_name, &phone_number, &email),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "students" }))
    })?;

    let student_id = conn.last_insert_rowid();
    let student = fetch_student(conn, student_id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "student row missing"))?;
    Ok(json!({ "student": student }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let existing = fetch_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "student not found",
            json!({ "studentId": student_id }),
        )
    })?;

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(full_name) = get_optional_str(params, "fullName")? {
        let full_name = full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(HandlerErr::bad_params("fullName must not be empty"));
        }
        set_parts.push("full_name = ?".into());
        bind_values.push(Value::Text(full_name));
    }
    if let Some(phone_number) = get_optional_str(params, "phoneNumber")? {
        let phone_number = phone_number.trim().to_string();
        if phone_number.is_empty() {
            return Err(HandlerErr::bad_params("phoneNumber must not be empty"));
        }
        set_parts.push("phone_number = ?".into());
        bind_values.push(Value::Text(phone_number));
    }
    if let Some(email) = get_optional_str(params, "email")? {
        let email = email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(HandlerErr::bad_params("email must be a valid address"));
        }
        set_parts.push("email = ?".into());
        bind_values.push(Value::Text(email));
    }

    if set_parts.is_empty() {
        return Ok(json!({ "student": existing }));
    }

    let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(student_id));
    conn.execute(&sql, rusqlite::params_from_iter(bind_values))
        .map_err(|e| {
            HandlerErr::with_details(
                "db_update_failed",
                e.to_string(),
                json!({ "table": "students" }),
            )
        })?;

    let student = fetch_student(conn, student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "student": student }))
}

/// Deleting a student removes the student's enrollments in the same
/// transaction, so a crash cannot orphan enrollment rows.
fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    if fetch_student(conn, student_id)?.is_none() {
        return Err(HandlerErr::with_details(
            "not_found",
            "student not found",
            json!({ "studentId": student_id }),
        ));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    ledger::remove_for_student(&tx, student_id)?;
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(|e| {
            HandlerErr::with_details(
                "db_delete_failed",
                e.to_string(),
                json!({ "table": "students" }),
            )
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "success": true }))
}

/// The classes a student is enrolled in, details resolved per class. An
/// unknown student yields an empty list, not an error.
fn students_classes(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let mut classes = Vec::new();
    for enrollment in ledger::enrollments_for_student(conn, student_id)? {
        if let Some(class) = super::classes::fetch_class_details(conn, enrollment.class_id)? {
            classes.push(class);
        }
    }
    Ok(json!({ "classes": classes }))
}

fn students_with_classes(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let mut student = fetch_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "student not found",
            json!({ "studentId": student_id }),
        )
    })?;

    let mut enrolled = Vec::new();
    for enrollment in ledger::enrollments_for_student(conn, student_id)? {
        let Some(mut class) = super::classes::fetch_class_details(conn, enrollment.class_id)?
        else {
            continue;
        };
        class["enrollmentId"] = json!(enrollment.id);
        class["enrolledAt"] = json!(enrollment.enrolled_at);
        enrolled.push(class);
    }

    student["enrolledClasses"] = json!(enrolled);
    Ok(json!({ "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(ok(&req.id, json!({ "students": [] })));
            };
            Some(match students_list(conn) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            })
        }
        "students.create" => Some(run(state, req, students_create)),
        "students.update" => Some(run(state, req, students_update)),
        "students.delete" => Some(run(state, req, students_delete)),
        "students.classes" => Some(run(state, req, students_classes)),
        "students.withClasses" => Some(run(state, req, students_with_classes)),
        _ => None,
    }
}

fn run(
    state: &AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}
