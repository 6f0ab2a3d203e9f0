use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::ledger::LedgerError;
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        match e {
            LedgerError::StudentNotFound(id) => {
                HandlerErr::with_details("not_found", message, json!({ "studentId": id }))
            }
            LedgerError::ClassNotFound(id) => {
                HandlerErr::with_details("not_found", message, json!({ "classId": id }))
            }
            LedgerError::EnrollmentNotFound {
                student_id,
                class_id,
            } => HandlerErr::with_details(
                "not_found",
                message,
                json!({ "studentId": student_id, "classId": class_id }),
            ),
            LedgerError::AlreadyEnrolled {
                student_id,
                class_id,
            } => HandlerErr::with_details(
                "already_enrolled",
                message,
                json!({ "studentId": student_id, "classId": class_id }),
            ),
            LedgerError::ClassFull {
                class_id,
                max_capacity,
            } => HandlerErr::with_details(
                "class_full",
                message,
                json!({ "classId": class_id, "maxCapacity": max_capacity }),
            ),
            LedgerError::Db(_) => HandlerErr::new("db_query_failed", message),
        }
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// A key that may be absent, but must be a string when present.
pub fn get_optional_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

/// A key that must be an array of non-empty strings when present.
pub fn get_optional_string_array(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(None);
    };
    let Some(items) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "{} entries must be strings",
                key
            )));
        };
        let t = s.trim();
        if t.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "{} entries must not be empty",
                key
            )));
        }
        out.push(t.to_string());
    }
    Ok(Some(out))
}

pub fn db_query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}
