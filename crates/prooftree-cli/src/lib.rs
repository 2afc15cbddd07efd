//! Thin command-line surface over `prooftree-core`. Argument parsing and
//! rendering are not redesign targets (spec §1) — this crate exists only
//! so the workspace produces an end-to-end binary exercising the core; the
//! core exposes structured results only (spec §6).

#![forbid(unsafe_code)]

mod cli;

pub use cli::run;
