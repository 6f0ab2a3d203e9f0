//! Enrollment ledger: the one place student/class membership is created,
//! destroyed, and counted.
//!
//! Invariants enforced here:
//! - at most one enrollment per (student_id, class_id) pair;
//! - enrollments per class never exceed the class's max_capacity;
//! - an enrollment is only created while both referenced rows exist.
//!
//! Every function takes a plain `&Connection` so the cascade helpers can run
//! inside a caller-owned transaction alongside the parent-row delete.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub class_id: i64,
    pub enrolled_at: String,
}

#[derive(Debug)]
pub enum LedgerError {
    StudentNotFound(i64),
    ClassNotFound(i64),
    EnrollmentNotFound { student_id: i64, class_id: i64 },
    AlreadyEnrolled { student_id: i64, class_id: i64 },
    ClassFull { class_id: i64, max_capacity: i64 },
    Db(rusqlite::Error),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::StudentNotFound(id) => write!(f, "student {} not found", id),
            LedgerError::ClassNotFound(id) => write!(f, "class {} not found", id),
            LedgerError::EnrollmentNotFound {
                student_id,
                class_id,
            } => write!(
                f,
                "student {} is not enrolled in class {}",
                student_id, class_id
            ),
            LedgerError::AlreadyEnrolled {
                student_id,
                class_id,
            } => write!(
                f,
                "student {} is already enrolled in class {}",
                student_id, class_id
            ),
            LedgerError::ClassFull {
                class_id,
                max_capacity,
            } => write!(
                f,
                "class {} is at full capacity ({} students)",
                class_id, max_capacity
            ),
            LedgerError::Db(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Db(e)
    }
}

pub fn student_exists(conn: &Connection, student_id: i64) -> Result<bool, LedgerError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn class_exists(conn: &Connection, class_id: i64) -> Result<bool, LedgerError> {
    Ok(class_capacity(conn, class_id)?.is_some())
}

fn class_capacity(conn: &Connection, class_id: i64) -> Result<Option<i64>, LedgerError> {
    let cap: Option<i64> = conn
        .query_row(
            "SELECT max_capacity FROM classes WHERE id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(cap)
}

fn find_pair(conn: &Connection, student_id: i64, class_id: i64) -> Result<Option<i64>, LedgerError> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND class_id = ?",
            [student_id, class_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Always a fresh aggregate query; the count is never cached in memory.
pub fn count_for_class(conn: &Connection, class_id: i64) -> Result<i64, LedgerError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

/// Enroll a student in a class. The precondition chain runs in order (first
/// failure wins): student exists, class exists, pair not already present,
/// class not at capacity. The chain and the insert share one transaction;
/// the capacity count is re-checked after the insert and the transaction is
/// abandoned if another writer pushed the class over its limit. The unique
/// index on (student_id, class_id) backstops the duplicate check.
pub fn enroll(conn: &Connection, student_id: i64, class_id: i64) -> Result<Enrollment, LedgerError> {
    let tx = conn.unchecked_transaction()?;

    if !student_exists(&tx, student_id)? {
        return Err(LedgerError::StudentNotFound(student_id));
    }
    let Some(max_capacity) = class_capacity(&tx, class_id)? else {
        return Err(LedgerError::ClassNotFound(class_id));
    };
    if find_pair(&tx, student_id, class_id)?.is_some() {
        return Err(LedgerError::AlreadyEnrolled {
            student_id,
            class_id,
        });
    }
    if count_for_class(&tx, class_id)? >= max_capacity {
        return Err(LedgerError::ClassFull {
            class_id,
            max_capacity,
        });
    }

    let enrolled_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO enrollments(student_id, class_id, enrolled_at) VALUES(?, ?, ?)",
        (student_id, class_id, &enrolled_at),
    ) {
        if is_unique_violation(&e) {
            return Err(LedgerError::AlreadyEnrolled {
                student_id,
                class_id,
            });
        }
        return Err(LedgerError::Db(e));
    }
    let id = tx.last_insert_rowid();

    // Re-validate before commit: a concurrent writer that slipped in between
    // the count and the insert shows up here.
    if count_for_class(&tx, class_id)? > max_capacity {
        return Err(LedgerError::ClassFull {
            class_id,
            max_capacity,
        });
    }

    tx.commit()?;
    Ok(Enrollment {
        id,
        student_id,
        class_id,
        enrolled_at,
    })
}

/// Remove a student's enrollment in a class. Not silently idempotent: a
/// second call for the same pair fails with EnrollmentNotFound so callers
/// see double-unenroll attempts.
pub fn unenroll(conn: &Connection, student_id: i64, class_id: i64) -> Result<(), LedgerError> {
    let tx = conn.unchecked_transaction()?;

    if !student_exists(&tx, student_id)? {
        return Err(LedgerError::StudentNotFound(student_id));
    }
    if !class_exists(&tx, class_id)? {
        return Err(LedgerError::ClassNotFound(class_id));
    }
    let Some(enrollment_id) = find_pair(&tx, student_id, class_id)? else {
        return Err(LedgerError::EnrollmentNotFound {
            student_id,
            class_id,
        });
    };

    tx.execute("DELETE FROM enrollments WHERE id = ?", [enrollment_id])?;
    tx.commit()?;
    Ok(())
}

pub fn enrollments_for_student(
    conn: &Connection,
    student_id: i64,
) -> Result<Vec<Enrollment>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, class_id, enrolled_at
         FROM enrollments
         WHERE student_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([student_id], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrollments_for_class(
    conn: &Connection,
    class_id: i64,
) -> Result<Vec<Enrollment>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, class_id, enrolled_at
         FROM enrollments
         WHERE class_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([class_id], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Cascade step for class deletion. Must run inside the same transaction
/// that deletes the class row.
pub fn remove_for_class(conn: &Connection, class_id: i64) -> Result<usize, LedgerError> {
    let n = conn.execute("DELETE FROM enrollments WHERE class_id = ?", [class_id])?;
    Ok(n)
}

/// Cascade step for student deletion. Must run inside the same transaction
/// that deletes the student row.
pub fn remove_for_student(conn: &Connection, student_id: i64) -> Result<usize, LedgerError> {
    let n = conn.execute("DELETE FROM enrollments WHERE student_id = ?", [student_id])?;
    Ok(n)
}

fn row_to_enrollment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        class_id: row.get(2)?,
        enrolled_at: row.get(3)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
