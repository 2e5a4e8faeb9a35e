pub mod dirs;
pub mod id;
pub mod secret;
pub mod tokio;
