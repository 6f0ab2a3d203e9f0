use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_query_failed, get_optional_i64, get_optional_str, get_optional_string_array,
    get_required_i64, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::{types::Value, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

const DAY_NAMES: [&str; 7] = [
    "Senin", "Selasa", "Rabu", "Kamis", "Jumat", "Sabtu", "Minggu",
];
const LEVELS: [&str; 3] = ["Beginner", "Intermediate", "Advanced"];

/// Column list shared by every class-with-details query. Keep in sync with
/// `class_detail_row_json`.
const CLASS_DETAIL_COLUMNS: &str = "c.id, c.name, c.level, c.teacher_id, c.room_id,
 c.start_time, c.end_time, c.days, c.max_capacity, c.created_at,
 t.full_name, t.subjects, t.created_at,
 r.name, r.branch, r.created_at,
 (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id)";

fn class_detail_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(1)?;
    let level: String = row.get(2)?;
    let teacher_id: i64 = row.get(3)?;
    let room_id: i64 = row.get(4)?;
    let start_time: String = row.get(5)?;
    let end_time: String = row.get(6)?;
    let days: String = row.get(7)?;
    let max_capacity: i64 = row.get(8)?;
    let created_at: String = row.get(9)?;
    let teacher_full_name: String = row.get(10)?;
    let teacher_subjects: String = row.get(11)?;
    let teacher_created_at: String = row.get(12)?;
    let room_name: String = row.get(13)?;
    let room_branch: String = row.get(14)?;
    let room_created_at: String = row.get(15)?;
    let enrolled_count: i64 = row.get(16)?;

    let days: Vec<String> = serde_json::from_str(&days).unwrap_or_default();
    let subjects: Vec<String> = serde_json::from_str(&teacher_subjects).unwrap_or_default();

    Ok(json!({
        "id": id,
        "name": name,
        "level": level,
        "teacherId": teacher_id,
        "roomId": room_id,
        "startTime": start_time,
        "endTime": end_time,
        "days": days,
        "maxCapacity": max_capacity,
        "createdAt": created_at,
        "teacher": {
            "id": teacher_id,
            "fullName": teacher_full_name,
            "subjects": subjects,
            "createdAt": teacher_created_at
        },
        "room": {
            "id": room_id,
            "name": room_name,
            "branch": room_branch,
            "createdAt": room_created_at
        },
        "enrolledCount": enrolled_count
    }))
}

pub(super) fn fetch_class_details(
    conn: &Connection,
    class_id: i64,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    let sql = format!(
        "SELECT {CLASS_DETAIL_COLUMNS}
         FROM classes c
         JOIN teachers t ON t.id = c.teacher_id
         JOIN rooms r ON r.id = c.room_id
         WHERE c.id = ?"
    );
    conn.query_row(&sql, [class_id], class_detail_row_json)
        .optional()
        .map_err(db_query_failed)
}

fn valid_level(s: &str) -> bool {
    LEVELS.contains(&s)
}

fn valid_day(s: &str) -> bool {
    DAY_NAMES.contains(&s)
}

// Accepts H:MM or HH:MM, 00:00 through 23:59.
fn valid_time_hhmm(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return false;
    }
    if !h.chars().all(|c| c.is_ascii_digit()) || !m.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let (Ok(hours), Ok(minutes)) = (h.parse::<u32>(), m.parse::<u32>()) else {
        return false;
    };
    hours <= 23 && minutes <= 59
}

fn validate_days(days: &[String]) -> Result<(), HandlerErr> {
    if days.is_empty() {
        return Err(HandlerErr::bad_params("at least one day is required"));
    }
    for day in days {
        if !valid_day(day) {
            return Err(HandlerErr::bad_params(format!("unknown day: {}", day)));
        }
    }
    Ok(())
}

fn teacher_exists(conn: &Connection, teacher_id: i64) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(db_query_failed)
}

fn room_exists(conn: &Connection, room_id: i64) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM rooms WHERE id = ?", [room_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(db_query_failed)
}

fn student_roster(conn: &Connection, class_id: i64) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.full_name, s.phone_number, s.email, s.created_at
             FROM enrollments en
             JOIN students s ON s.id = en.student_id
             WHERE en.class_id = ?
             ORDER BY en.id",
        )
        .map_err(db_query_failed)?;
    stmt.query_map([class_id], super::students::student_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)
}

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {CLASS_DETAIL_COLUMNS}
         FROM classes c
         JOIN teachers t ON t.id = c.teacher_id
         JOIN rooms r ON r.id = c.room_id
         ORDER BY c.name"
    );
    let mut stmt = conn.prepare(&sql).map_err(db_query_failed)?;
    let mut classes = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            Ok((id, class_detail_row_json(row)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;

    // One pass over all enrollments instead of a roster query per class.
    let mut stmt = conn
        .prepare(
            "SELECT en.class_id, s.id, s.full_name, s.phone_number, s.email, s.created_at
             FROM enrollments en
             JOIN students s ON s.id = en.student_id
             ORDER BY en.id",
        )
        .map_err(db_query_failed)?;
    let mut by_class: HashMap<i64, Vec<serde_json::Value>> = HashMap::new();
    let rows = stmt
        .query_map([], |row| {
            let class_id: i64 = row.get(0)?;
            let id: i64 = row.get(1)?;
            let full_name: String = row.get(2)?;
            let phone_number: String = row.get(3)?;
            let email: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok((
                class_id,
                json!({
                    "id": id,
                    "fullName": full_name,
                    "phoneNumber": phone_number,
                    "email": email,
                    "createdAt": created_at
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;
    for (class_id, student) in rows {
        by_class.entry(class_id).or_default().push(student);
    }

    let classes: Vec<serde_json::Value> = classes
        .iter_mut()
        .map(|(id, class)| {
            class["enrolledStudents"] = json!(by_class.remove(id).unwrap_or_default());
            class.clone()
        })
        .collect();

    Ok(json!({ "classes": classes }))
}

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let level = get_required_str(params, "level")?;
    if !valid_level(&level) {
        return Err(HandlerErr::bad_params(format!("unknown level: {}", level)));
    }
    let teacher_id = get_required_i64(params, "teacherId")?;
    if !teacher_exists(conn, teacher_id)? {
        return Err(HandlerErr::with_details(
            "not_found",
            "teacher not found",
            json!({ "teacherId": teacher_id }),
        ));
    }
    let room_id = get_required_i64(params, "roomId")?;
    if !room_exists(conn, room_id)? {
        return Err(HandlerErr::with_details(
            "not_found",
            "room not found",
            json!({ "roomId": room_id }),
        ));
    }
    let start_time = get_required_str(params, "startTime")?;
    if !valid_time_hhmm(&start_time) {
        return Err(HandlerErr::bad_params("startTime must be in HH:MM format"));
    }
    let end_time = get_required_str(params, "endTime")?;
    if !valid_time_hhmm(&end_time) {
        return Err(HandlerErr::bad_params("endTime must be in HH:MM format"));
    }
    let days = get_optional_string_array(params, "days")?
        .ok_or_else(|| HandlerErr::bad_params("missing days"))?;
    validate_days(&days)?;
    let max_capacity = get_required_i64(params, "maxCapacity")?;
    if max_capacity <= 0 {
        return Err(HandlerErr::bad_params("maxCapacity must be positive"));
    }

    let days_raw =
        serde_json::to_string(&days).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    conn.execute(
        "INSERT INTO classes(name, level, teacher_id, room_id, start_time, end_time, days, max_capacity, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        rusqlite::params![
            name,
            level,
            teacher_id,
            room_id,
            start_time,
            end_time,
            days_raw,
            max_capacity
        ],
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "classes" }))
    })?;

    let class_id = conn.last_insert_rowid();
    let class = fetch_class_details(conn, class_id)?
        .ok_or_else(|| HandlerErr::new("db_query_failed", "class row missing"))?;
    Ok(json!({ "class": class }))
}

fn classes_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let existing = fetch_class_details(conn, class_id)?.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "class not found",
            json!({ "classId": class_id }),
        )
    })?;

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = get_optional_str(params, "name")? {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        set_parts.push("name = ?".into());
        bind_values.push(Value::Text(name));
    }
    if let Some(level) = get_optional_str(params, "level")? {
        if !valid_level(&level) {
            return Err(HandlerErr::bad_params(format!("unknown level: {}", level)));
        }
        set_parts.push("level = ?".into());
        bind_values.push(Value::Text(level));
    }
    if let Some(teacher_id) = get_optional_i64(params, "teacherId")? {
        if !teacher_exists(conn, teacher_id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "teacher not found",
                json!({ "teacherId": teacher_id }),
            ));
        }
        set_parts.push("teacher_id = ?".into());
        bind_values.push(Value::Integer(teacher_id));
    }
    if let Some(room_id) = get_optional_i64(params, "roomId")? {
        if !room_exists(conn, room_id)? {
            return Err(HandlerErr::with_details(
                "not_found",
                "room not found",
                json!({ "roomId": room_id }),
            ));
        }
        set_parts.push("room_id = ?".into());
        bind_values.push(Value::Integer(room_id));
    }
    if let Some(start_time) = get_optional_str(params, "startTime")? {
        if !valid_time_hhmm(&start_time) {
            return Err(HandlerErr::bad_params("startTime must be in HH:MM format"));
        }
        set_parts.push("start_time = ?".into());
        bind_values.push(Value::Text(start_time));
    }
    if let Some(end_time) = get_optional_str(params, "endTime")? {
        if !valid_time_hhmm(&end_time) {
            return Err(HandlerErr::bad_params("endTime must be in HH:MM format"));
        }
        set_parts.push("end_time = ?".into());
        bind_values.push(Value::Text(end_time));
    }
    if let Some(days) = get_optional_string_array(params, "days")? {
        validate_days(&days)?;
        let days_raw =
            serde_json::to_string(&days).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
        set_parts.push("days = ?".into());
        bind_values.push(Value::Text(days_raw));
    }
    if let Some(max_capacity) = get_optional_i64(params, "maxCapacity")? {
        if max_capacity <= 0 {
            return Err(HandlerErr::bad_params("maxCapacity must be positive"));
        }
        set_parts.push("max_capacity = ?".into());
        bind_values.push(Value::Integer(max_capacity));
    }

    if set_parts.is_empty() {
        return Ok(json!({ "class": existing }));
    }

    let sql = format!("UPDATE classes SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(class_id));
    conn.execute(&sql, rusqlite::params_from_iter(bind_values))
        .map_err(|e| {
            HandlerErr::with_details(
                "db_update_failed",
                e.to_string(),
                json!({ "table": "classes" }),
            )
        })?;

    let class = fetch_class_details(conn, class_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))?;
    Ok(json!({ "class": class }))
}

/// Deleting a class removes its enrollments in the same transaction, so a
/// crash cannot orphan enrollment rows.
fn classes_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    ledger::remove_for_class(&tx, class_id)?;
    let changed = tx
        .execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(|e| {
            HandlerErr::with_details(
                "db_delete_failed",
                e.to_string(),
                json!({ "table": "classes" }),
            )
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "success": changed > 0 }))
}

fn classes_by_teacher(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_i64(params, "teacherId")?;
    if !teacher_exists(conn, teacher_id)? {
        return Err(HandlerErr::with_details(
            "not_found",
            "teacher not found",
            json!({ "teacherId": teacher_id }),
        ));
    }

    let sql = format!(
        "SELECT {CLASS_DETAIL_COLUMNS}
         FROM classes c
         JOIN teachers t ON t.id = c.teacher_id
         JOIN rooms r ON r.id = c.room_id
         WHERE c.teacher_id = ?
         ORDER BY c.name"
    );
    let mut stmt = conn.prepare(&sql).map_err(db_query_failed)?;
    let mut classes = stmt
        .query_map([teacher_id], |row| {
            let id: i64 = row.get(0)?;
            Ok((id, class_detail_row_json(row)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;

    let classes: Vec<serde_json::Value> = classes
        .iter_mut()
        .map(|(id, class)| {
            student_roster(conn, *id).map(|roster| {
                class["enrolledStudents"] = json!(roster);
                class.clone()
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({ "classes": classes }))
}

/// Schedule view: classes with open seats, optionally narrowed by level
/// and/or day.
fn classes_available(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let level = get_optional_str(params, "level")?;
    if let Some(level) = level.as_deref() {
        if !valid_level(level) {
            return Err(HandlerErr::bad_params(format!("unknown level: {}", level)));
        }
    }
    let day = get_optional_str(params, "day")?;
    if let Some(day) = day.as_deref() {
        if !valid_day(day) {
            return Err(HandlerErr::bad_params(format!("unknown day: {}", day)));
        }
    }

    let sql = format!(
        "SELECT {CLASS_DETAIL_COLUMNS}
         FROM classes c
         JOIN teachers t ON t.id = c.teacher_id
         JOIN rooms r ON r.id = c.room_id
         ORDER BY c.name"
    );
    let mut stmt = conn.prepare(&sql).map_err(db_query_failed)?;
    let classes = stmt
        .query_map([], class_detail_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;

    let classes: Vec<serde_json::Value> = classes
        .into_iter()
        .filter(|class| {
            let enrolled = class["enrolledCount"].as_i64().unwrap_or(0);
            let capacity = class["maxCapacity"].as_i64().unwrap_or(0);
            if enrolled >= capacity {
                return false;
            }
            if let Some(level) = level.as_deref() {
                if class["level"].as_str() != Some(level) {
                    return false;
                }
            }
            if let Some(day) = day.as_deref() {
                let on_day = class["days"]
                    .as_array()
                    .map(|days| days.iter().any(|d| d.as_str() == Some(day)))
                    .unwrap_or(false);
                if !on_day {
                    return false;
                }
            }
            true
        })
        .collect();

    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(ok(&req.id, json!({ "classes": [] })));
            };
            Some(match classes_list(conn) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            })
        }
        "classes.create" => Some(run(state, req, classes_create)),
        "classes.update" => Some(run(state, req, classes_update)),
        "classes.delete" => Some(run(state, req, classes_delete)),
        "classes.byTeacher" => Some(run(state, req, classes_by_teacher)),
        "classes.available" => Some(run(state, req, classes_available)),
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
