pub mod accounts;
pub mod calc;
pub mod config;
pub mod courses;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod grades;
pub mod outcomes;
pub mod policy;
pub mod web;

pub use web::{create_app, AppState, Settings};
