//! Utility functions for the application

pub mod json;
pub mod otlp;
pub mod time;
