pub mod db;
pub mod history;
pub mod pipeline;
pub mod platform;
pub mod provider;
pub mod session;
pub mod settings;
pub mod surface;
