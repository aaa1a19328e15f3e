pub mod api;
pub mod error;
pub mod gateway;
pub mod models;
pub mod publisher;
pub mod schema;
pub mod store;
pub mod workflow;
