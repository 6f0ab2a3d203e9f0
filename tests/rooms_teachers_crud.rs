mod test_support;

use serde_json::json;
use test_support::{
    create_class, create_room, create_teacher, error_code, request, request_ok, select_workspace,
    spawn_sidecar,
};

#[test]
fn room_create_list_update_delete_round_trip() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-rooms");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "rooms.create",
        json!({ "name": "Aula Besar" }),
    );
    let room = created.get("room").expect("room");
    let room_id = room.get("id").and_then(|v| v.as_i64()).expect("room id");
    // Branch falls back to the default when not given.
    assert_eq!(room.get("branch").and_then(|v| v.as_str()), Some("Sidoarjo"));

    let listed = request_ok(&mut stdin, &mut reader, "2", "rooms.list", json!({}));
    let rooms = listed.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(
        rooms[0].get("name").and_then(|v| v.as_str()),
        Some("Aula Besar")
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "rooms.update",
        json!({ "roomId": room_id, "name": "Aula Kecil", "branch": "Surabaya" }),
    );
    let room = updated.get("room").expect("room");
    assert_eq!(room.get("name").and_then(|v| v.as_str()), Some("Aula Kecil"));
    assert_eq!(room.get("branch").and_then(|v| v.as_str()), Some("Surabaya"));

    // An update without fields hands back the current row unchanged.
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "rooms.update",
        json!({ "roomId": room_id }),
    );
    assert_eq!(
        noop.get("room")
            .and_then(|r| r.get("name"))
            .and_then(|v| v.as_str()),
        Some("Aula Kecil")
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "rooms.delete",
        json!({ "roomId": room_id }),
    );
    assert_eq!(deleted.get("success").and_then(|v| v.as_bool()), Some(true));

    // Gone means a second delete reports success: false.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "rooms.delete",
        json!({ "roomId": room_id }),
    );
    assert_eq!(again.get("success").and_then(|v| v.as_bool()), Some(false));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn room_delete_refuses_while_classes_reference_it() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-room-in-use");

    let room_id = create_room(&mut stdin, &mut reader, "1", "Aula");
    let teacher_id = create_teacher(&mut stdin, &mut reader, "2", "Bu Rina");
    create_class(&mut stdin, &mut reader, "3", "Basic A", teacher_id, room_id, 5);

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "rooms.delete",
        json!({ "roomId": room_id }),
    );
    assert_eq!(error_code(&resp).as_deref(), Some("room_in_use"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn teacher_crud_and_validation() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-teachers");

    let missing_subjects = request(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.create",
        json!({ "fullName": "Pak Joko", "subjects": [] }),
    );
    assert_eq!(error_code(&missing_subjects).as_deref(), Some("bad_params"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "fullName": "Pak Joko", "subjects": ["English", "TOEFL"] }),
    );
    let teacher = created.get("teacher").expect("teacher");
    let teacher_id = teacher.get("id").and_then(|v| v.as_i64()).expect("id");
    assert_eq!(
        teacher.get("subjects").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.update",
        json!({ "teacherId": teacher_id, "subjects": ["IELTS"] }),
    );
    assert_eq!(
        updated
            .get("teacher")
            .and_then(|t| t.get("subjects"))
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(deleted.get("success").and_then(|v| v.as_bool()), Some(true));

    let listed = request_ok(&mut stdin, &mut reader, "5", "teachers.list", json!({}));
    assert_eq!(
        listed.get("teachers").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn teacher_with_classes_cannot_be_deleted() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = select_workspace(&mut stdin, &mut reader, "branchd-teacher-classes");

    let room_id = create_room(&mut stdin, &mut reader, "1", "Aula");
    let teacher_id = create_teacher(&mut stdin, &mut reader, "2", "Bu Rina");
    let class_id = create_class(&mut stdin, &mut reader, "3", "Basic A", teacher_id, room_id, 5);

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(error_code(&resp).as_deref(), Some("teacher_has_classes"));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("details"))
            .and_then(|d| d.get("classCount"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    // Removing the class frees the teacher for deletion.
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(deleted.get("success").and_then(|v| v.as_bool()), Some(true));

    let _ = std::fs::remove_dir_all(workspace);
}
