//! Shared wire format definitions for the Solace chat service.

pub mod frame;
pub mod message;
