pub mod accounts;
pub mod admin;
pub mod core;
pub mod department;
pub mod instructor;
pub mod student;
