//! Repository layer — entity-scoped database operations.
//!
//! `cohort` reads (and, for fixtures and demo data, writes) the subject,
//! health-profile and device tables; `reading` is append-only apart from
//! the explicit clear operation.

mod cohort;
mod reading;

pub use cohort::*;
pub use reading::*;
