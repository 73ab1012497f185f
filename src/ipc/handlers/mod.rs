pub mod auth;
pub mod bulk_edit;
pub mod core;
pub mod courses;
pub mod grades;
pub mod setup;
