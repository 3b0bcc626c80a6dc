//! crates/classroom_core/src/classroom.rs
//!
//! Classroom membership and join-code generation.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::domain::{Classroom, Membership};
use crate::ports::{PortError, PortResult};

pub const CODE_LENGTH: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_NAME_LEN: usize = 100;

/// A random 8-character uppercase alphanumeric join code. Uniqueness is
/// the store's job; see `workflow::create_classroom`.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl Classroom {
    pub fn new(
        teacher_id: Uuid,
        name: &str,
        description: String,
        code: String,
        now: DateTime<Utc>,
    ) -> PortResult<Self> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(PortError::Validation(format!(
                "Classroom name must be 1-{} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            code,
            teacher_id,
            students: Vec::new(),
            created_at: now,
            revision: 0,
        })
    }

    pub fn has_student(&self, student_id: Uuid) -> bool {
        self.students.iter().any(|m| m.student_id == student_id)
    }

    /// Idempotent; returns `false` if the student was already enrolled.
    pub fn add_student(&mut self, student_id: Uuid, now: DateTime<Utc>) -> bool {
        if self.has_student(student_id) {
            return false;
        }
        self.students.push(Membership {
            student_id,
            joined_at: now,
        });
        true
    }

    /// Idempotent; returns `false` if the student was not enrolled.
    pub fn remove_student(&mut self, student_id: Uuid) -> bool {
        let before = self.students.len();
        self.students.retain(|m| m.student_id != student_id);
        self.students.len() != before
    }
}
