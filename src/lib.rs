//! # ETD Depositor
//!
//! Batch processing for electronic theses and dissertations (ETDs).
//!
//! Each deposit arrives as a BagIt package holding the thesis, its ETDMS
//! metadata, and license documents. A batch run validates every package,
//! normalizes its metadata against a controlled-vocabulary mapping table,
//! and derives a MARC 21 cataloguing record and a Crossref dissertation
//! record for each accepted one. Every package ends with exactly one ledger
//! entry saying whether it was accepted, accepted with warnings, or
//! rejected, and why.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │ Discovery │──▶│ Validate │──▶│ Extract  │──▶│ Transform │
//! │ batch dir │   │  BagIt   │   │  ETDMS   │   │ MARC+XML  │
//! └───────────┘   └──────────┘   └──────────┘   └─────┬─────┘
//!                                                     │
//!                                   ┌─────────────────┤
//!                                   ▼                 ▼
//!                              ┌─────────┐      ┌──────────┐
//!                              │ Ledger  │      │  Export  │
//!                              │ (JSON)  │      │ mrc/xml  │
//!                              └─────────┘      └──────────┘
//! ```
//!
//! Extraction and transformation live in the `etd-depositor-core` crate and
//! never touch the filesystem. This crate adds everything with I/O.
//!
//! ## Quick Start
//!
//! ```bash
//! etd validate ./deposits/thesis-0001   # check one package
//! etd mappings ./config/mappings.toml  # inspect the vocabulary table
//! etd process                           # run the whole batch
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`checksum`] | Streaming md5/sha256/sha512 digests |
//! | [`manifest`] | BagIt declaration and manifest parsing |
//! | [`validate`] | Package validation and file roles |
//! | [`pipeline`] | Discovery and per-package orchestration |
//! | [`progress`] | Batch progress reporting |
//! | [`export`] | MARC, Crossref and ledger output files |

pub mod checksum;
pub mod config;
pub mod export;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod validate;
