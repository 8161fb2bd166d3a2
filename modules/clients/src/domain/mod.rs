pub mod error;
pub mod events;
pub mod model;
pub mod service;
