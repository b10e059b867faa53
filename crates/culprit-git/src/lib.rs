//! Git abstraction layer for culprit.
//!
//! This crate defines the [`VersionControl`] trait — the single interface
//! through which culprit interacts with version control. The engine crate
//! never spawns `git` itself; it depends on `culprit-git` and programs
//! against the trait, so tests can substitute scripted repositories and the
//! backend can change without touching the mining or trial code.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`VersionControl`] trait definition.
//! - [`types`] — value types used in trait signatures ([`CommitId`],
//!   [`DiffFile`], [`ChangeKind`], [`LogEntry`]).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// git-CLI-backed implementation
mod cli_impl;

pub use cli_impl::GitCli;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use culprit_git::{VersionControl, CommitId, GitError};`
pub use error::GitError;
pub use repo::VersionControl;
pub use types::{ChangeKind, CommitId, CommitIdParseError, DiffFile, LogEntry};
