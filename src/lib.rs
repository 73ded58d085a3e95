//! # Rusty Roster
//!
//! Splits an uploaded roster into random, balanced teams and returns ready-made
//! spreadsheets for them.
//!
//! ## Features
//!
//! - **Multi-format input**: Office Open XML workbooks (`.xlsx`, `.xlsm`),
//!   OpenDocument spreadsheets (`.ods`) and delimited text (`.csv`, `.tsv`),
//!   detected from the file content when no format is given
//! - **Fair shuffling**: Fisher-Yates over a caller-supplied random source, so runs
//!   are reproducible with a seeded generator
//! - **Balanced teams**: team sizes differ by at most one, larger teams first
//! - **Generated files**: one workbook with a sheet per team, one workbook per team,
//!   and a zip archive of the per-team workbooks
//! - **Deterministic output**: identical teams always serialize to identical bytes
//! - **Flexible delivery**: base64 content inline in the result, or files written
//!   below a run-scoped directory
//!
//! ## Example
//!
//! ```no_run
//! use rusty_roster::{generate_teams_with_thread_rng, GeneratorConfig, TeamRequest};
//!
//! let request = TeamRequest {
//!     team_count: 3,
//!     file_bytes: std::fs::read("roster.xlsx")?,
//!     team_names: Some("Red, Blue".to_owned()),
//!     format: None,
//! };
//! let result = generate_teams_with_thread_rng(request, &GeneratorConfig::default())?;
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod config;
pub mod error;
pub mod helpers;
pub mod package;
pub mod pipeline;
pub mod roster;
pub mod spreadsheet;
pub mod transport;
pub mod workbook;

pub use config::Delivery;
pub use config::GeneratorConfig;
pub use error::Failure;
pub use error::FailureKind;
pub use error::RosterError;
pub use pipeline::generate_teams;
pub use pipeline::generate_teams_with_thread_rng;
pub use pipeline::TeamRequest;
pub use spreadsheet::SourceFormat;
pub use transport::Artifact;
pub use transport::ArtifactContent;
pub use transport::TeamsResult;
