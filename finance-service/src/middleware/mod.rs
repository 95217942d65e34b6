pub mod auth;

pub use auth::{CurrentUser, RequestMeta};
