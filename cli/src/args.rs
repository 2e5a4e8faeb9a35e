mod auth;
mod connection;
mod global;

pub use auth::AuthArgs;
pub use connection::ConnectionArgs;
pub use global::GlobalArgs;
