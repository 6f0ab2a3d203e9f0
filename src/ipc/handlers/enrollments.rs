use crate::ipc::error::ok;
use crate::ipc::helpers::{db_query_failed, get_required_i64, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::Connection;
use serde_json::json;

fn enrollments_enroll(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let class_id = get_required_i64(params, "classId")?;

    let enrollment = ledger::enroll(conn, student_id, class_id)?;
    Ok(json!({
        "enrollment": {
            "id": enrollment.id,
            "studentId": enrollment.student_id,
            "classId": enrollment.class_id,
            "enrolledAt": enrollment.enrolled_at
        }
    }))
}

fn enrollments_unenroll(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_i64(params, "studentId")?;
    let class_id = get_required_i64(params, "classId")?;

    ledger::unenroll(conn, student_id, class_id)?;
    Ok(json!({ "success": true }))
}

/// Class roster: the enrolled students plus the current count. The class
/// existence check lives here, not in the listing itself.
fn enrollments_for_class(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    if !ledger::class_exists(conn, class_id)? {
        return Err(HandlerErr::with_details(
            "not_found",
            "class not found",
            json!({ "classId": class_id }),
        ));
    }

    let mut students = Vec::new();
    for enrollment in ledger::enrollments_for_class(conn, class_id)? {
        let mut student = conn
            .query_row(
                "SELECT id, full_name, phone_number, email, created_at
                 FROM students WHERE id = ?",
                [enrollment.student_id],
                super::students::student_row_json,
            )
            .map_err(db_query_failed)?;
        student["enrolledAt"] = json!(enrollment.enrolled_at);
        students.push(student);
    }

    let enrolled_count = ledger::count_for_class(conn, class_id)?;
    Ok(json!({ "students": students, "enrolledCount": enrolled_count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.enroll" => Some(run(state, req, enrollments_enroll)),
        "enrollments.unenroll" => Some(run(state, req, enrollments_unenroll)),
        "enrollments.forClass" => Some(run(state, req, enrollments_for_class)),
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
