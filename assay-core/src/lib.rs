//! Assay Core
//!
//! Core types shared by the Assay analysis worker and the tooling around it.
//!
//! This crate contains:
//! - Domain types: the persisted job record and its state machine
//! - The timestamp wire format used inside job records

pub mod domain;
