//! Shared type definitions

pub mod ids;
