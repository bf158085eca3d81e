//! # ETD Depositor Core
//!
//! Pure, filesystem-free logic for ETD Depositor: the metadata models,
//! the mapping table, ETDMS parsing and normalization, and the derivation
//! of MARC 21 cataloguing records and Crossref dissertation records.
//!
//! Nothing in this crate touches the disk or the clock. Callers pass in
//! document text, a loaded [`mapping::MappingTable`], and an explicit
//! processing date through [`transform::TransformContext`].

pub mod crossref;
pub mod error;
pub mod etdms;
pub mod extract;
pub mod mapping;
pub mod marc;
pub mod models;
pub mod transform;
