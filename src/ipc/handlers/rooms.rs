use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{types::Value, Connection, OptionalExtension};
use serde_json::json;

const DEFAULT_BRANCH: &str = "Sidoarjo";

fn fetch_room(conn: &Connection, room_id: i64) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, name, branch, created_at FROM rooms WHERE id = ?",
        [room_id],
        |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let branch: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "branch": branch,
                "createdAt": created_at
            }))
        },
    )
    .optional()
}

fn handle_rooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "rooms": [] }));
    };

    let mut stmt = match conn
        .prepare("SELECT id, name, branch, created_at FROM rooms ORDER BY name")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let branch: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "branch": branch,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(rooms) => ok(&req.id, json!({ "rooms": rooms })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let branch = req
        .params
        .get("branch")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    if let Err(e) = conn.execute(
        "INSERT INTO rooms(name, branch, created_at)
         VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&name, &branch),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "rooms" })),
        );
    }
    let room_id = conn.last_insert_rowid();

    match fetch_room(conn, room_id) {
        Ok(Some(room)) => ok(&req.id, json!({ "room": room })),
        Ok(None) => err(&req.id, "db_query_failed", "room row missing", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rooms_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let room_id = match req.params.get("roomId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing roomId", None),
    };

    let existing = match fetch_room(conn, room_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(existing) = existing else {
        return err(
            &req.id,
            "not_found",
            "room not found",
            Some(json!({ "roomId": room_id })),
        );
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(v) = req.params.get("name") {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "name must be a string", None);
        };
        let s = s.trim().to_string();
        if s.is_empty() {
            return err(&req.id, "bad_params", "name must not be empty", None);
        }
        set_parts.push("name = ?".into());
        bind_values.push(Value::Text(s));
    }
    if let Some(v) = req.params.get("branch") {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "branch must be a string", None);
        };
        let s = s.trim().to_string();
        if s.is_empty() {
            return err(&req.id, "bad_params", "branch must not be empty", None);
        }
        set_parts.push("branch = ?".into());
        bind_values.push(Value::Text(s));
    }

    // Nothing to change: hand back the current row.
    if set_parts.is_empty() {
        return ok(&req.id, json!({ "room": existing }));
    }

    let sql = format!("UPDATE rooms SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Value::Integer(room_id));
    if let Err(e) = conn.execute(&sql, rusqlite::params_from_iter(bind_values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "rooms" })),
        );
    }

    match fetch_room(conn, room_id) {
        Ok(Some(room)) => ok(&req.id, json!({ "room": room })),
        Ok(None) => err(&req.id, "not_found", "room not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rooms_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let room_id = match req.params.get("roomId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing roomId", None),
    };

    let class_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM classes WHERE room_id = ?",
        [room_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_count > 0 {
        return err(
            &req.id,
            "room_in_use",
            format!("room is assigned to {} classes", class_count),
            Some(json!({ "roomId": room_id, "classCount": class_count })),
        );
    }

    let changed = match conn.execute("DELETE FROM rooms WHERE id = ?", [room_id]) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "rooms" })),
            )
        }
    };

    ok(&req.id, json!({ "success": changed > 0 }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rooms.list" => Some(handle_rooms_list(state, req)),
        "rooms.create" => Some(handle_rooms_create(state, req)),
        "rooms.update" => Some(handle_rooms_update(state, req)),
        "rooms.delete" => Some(handle_rooms_delete(state, req)),
        _ => None,
    }
}
