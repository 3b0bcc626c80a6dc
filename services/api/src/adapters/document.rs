//! services/api/src/adapters/document.rs
//!
//! What the stores need to know about a revisioned aggregate.

use classroom_core::domain::{Activity, Assignment, Classroom, MiniProjectRecord};
use uuid::Uuid;

pub trait Revisioned: Clone + Send + Sync + 'static {
    /// Used in error messages.
    const KIND: &'static str;

    fn key(&self) -> Uuid;
    fn revision(&self) -> i64;
    fn set_revision(&mut self, revision: i64);
}

macro_rules! impl_revisioned {
    ($ty:ty, $kind:literal, $key:ident) => {
        impl Revisioned for $ty {
            const KIND: &'static str = $kind;

            fn key(&self) -> Uuid {
                self.$key
            }

            fn revision(&self) -> i64 {
                self.revision
            }

            fn set_revision(&mut self, revision: i64) {
                self.revision = revision;
            }
        }
    };
}

impl_revisioned!(MiniProjectRecord, "Mini-project record", user_id);
impl_revisioned!(Classroom, "Classroom", id);
impl_revisioned!(Activity, "Activity", id);
impl_revisioned!(Assignment, "Assignment", id);
