use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_query_failed, get_optional_str, get_optional_string_array, get_required_i64,
    get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{types::Value, Connection, OptionalExtension};
use serde_json::json;

fn subjects_to_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn fetch_teacher(conn: &Connection, teacher_id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        "SELECT id, full_name, subjects, created_at FROM teachers WHERE id = ?",
        [teacher_id],
        |row| {
            let id: i64 = row.get(0)?;
            let full_name: String = row.get(1)?;
            let subjects: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "subjects": subjects_to_json(&subjects),
                "createdAt": created_at
            }))
        },
    )
    .optional()
    .map_err(db_query_failed)
}

fn teachers_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, full_name, subjects, created_at FROM teachers ORDER BY full_name")
        .map_err(db_query_failed)?;
    let teachers = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let full_name: String = row.get(1)?;
            let subjects: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "subjects": subjects_to_json(&subjects),
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;
    Ok(json!({ "teachers": teachers }))
}

fn teachers_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?.trim().to_string();
    if full_name.is_empty() {
        return Err(HandlerErr::bad_params("fullName must not be empty"));
    }
    let subjects = get_optional_string_array(params, "subjects")?
        .ok_or_else(|| HandlerErr::bad_params("missing subjects"))?;
    if subjects.is_empty() {
        return Err(HandlerErr::bad_params("at least one subject is required"));
    }

    let subjects_raw =
        serde_json::to_string(&subjects).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    conn.execute(
        "INSERT INTO teachers(full_name, subjects, created_at)
         VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&full_name, &subjects_raw),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "teachers" }))
    })?;

    let teacher_id = conn.last_insert_rowid();
    let teacher = fetch_teacher(conn, teacher_id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "teacher row missing"))?;
    Ok(json!({ "teacher": teacher }))
}

fn teachers_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_i64(params, "teacherId")?;
    let existing = fetch_teacher(conn, teacher_id)?.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "teacher not found",
            json!({ "teacherId": teacher_id }),
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
    if let Some(subjects) = get_optional_string_array(params, "subjects")? {
        if subjects.is_empty() {
            return Err(HandlerErr::bad_params("at least one subject is required"));
        }
        let subjects_raw =
            serde_json::to_string(&subjects).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
        set_parts.push("subjects = ?".into());
        bind_values.push(Value::Text(subjects_raw));
    }

    if set_parts.is_empty() {
        return Ok(json!({ "teacher": existing }));
    }

    let sql = format!("UPDATE teachers SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(teacher_id));
    conn.execute(&sql, rusqlite::params_from_iter(bind_values))
        .map_err(|e| {
            HandlerErr::with_details(
                "db_update_failed",
                e.to_string(),
                json!({ "table": "teachers" }),
            )
        })?;

    let teacher = fetch_teacher(conn, teacher_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "teacher not found"))?;
    Ok(json!({ "teacher": teacher }))
}

fn teachers_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_i64(params, "teacherId")?;
    if fetch_teacher(conn, teacher_id)?.is_none() {
        return Err(HandlerErr::with_details(
            "not_found",
            "teacher not found",
            json!({ "teacherId": teacher_id }),
        ));
    }

    let class_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM classes WHERE teacher_id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .map_err(db_query_failed)?;
    if class_count > 0 {
        return Err(HandlerErr::with_details(
            "teacher_has_classes",
            format!("teacher has {} active classes", class_count),
            json!({ "teacherId": teacher_id, "classCount": class_count }),
        ));
    }

    conn.execute("DELETE FROM teachers WHERE id = ?", [teacher_id])
        .map_err(|e| {
            HandlerErr::with_details(
                "db_delete_failed",
                e.to_string(),
                json!({ "table": "teachers" }),
            )
        })?;
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(ok(&req.id, json!({ "teachers": [] })));
            };
            Some(match teachers_list(conn) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            })
        }
        "teachers.create" => Some(run(state, req, teachers_create)),
        "teachers.update" => Some(run(state, req, teachers_update)),
        "teachers.delete" => Some(run(state, req, teachers_delete)),
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
