//! Bulk catalog import: rows in, faculties/departments/courses and their
//! navigation entries out.
//!
//! Phases run strictly in order (parse, validate, faculties, departments,
//! courses, navigation). Each resolution stage takes the identifier map
//! produced by the stage before it, so the ordering is carried by the
//! function signatures rather than by call-site convention.

mod candidates;
mod courses;
mod error;
mod navigation;
mod pipeline;
mod resolve;
mod rows;
mod run;
mod schema;

pub use run::run;
pub use schema::{OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
