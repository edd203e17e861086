pub mod admin;
pub mod announcements;
pub mod auth;
pub mod blog;
pub mod characters;
pub mod chat;
pub mod error;
pub mod favorites;
pub mod media;
pub mod middleware;
pub mod payments;
pub mod providers;
pub mod push;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{ApiConfig, AppState, AppStateInner};
