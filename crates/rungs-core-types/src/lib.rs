//! Core types shared across rungs facilities
//!
//! This crate provides the canonical field keys and event names used by the
//! logging facility and by tests asserting on captured events.

pub mod schema;
