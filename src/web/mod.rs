mod error;
mod extract;
mod handlers;
mod router;
mod types;

pub use error::{err_body, ok};
pub use extract::CurrentUser;
pub use router::create_app;
pub use types::{AppState, Settings};
