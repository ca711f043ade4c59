//! Domain Layer
//!
//! Entities, value objects, errors, ports and pure services. Nothing here
//! knows about HTTP, environment variables or background tasks.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
