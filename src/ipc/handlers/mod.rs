pub mod backup;
pub mod classes;
pub mod core;
pub mod enrollments;
pub mod rooms;
pub mod students;
pub mod teachers;
