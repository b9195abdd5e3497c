//! # vibe-core
//!
//! The workflow engine behind `vibe` (spec §4.4): a ticket-to-merge
//! pipeline that stitches a task tracker, a hosting platform (dual
//! backend), and a CI service into one `CommandContext`.
//!
//! ## Modules
//!
//! - [`context`] — `CommandContext`: merged config, the four service
//!   clients, and the working-copy handle, assembled once per command.
//! - [`confirm`] — the interactive-confirmation seam. Prompting itself
//!   (colors, spinners) is an external collaborator; this crate only
//!   owns the yes/no/stash decision points that gate destructive actions.
//! - [`template`] — PR/issue body composition: section fill and
//!   section-wise replace, located by markdown heading prefix.
//! - [`workflow`] — ticket-to-branch, PR create/update/status, merge
//!   trigger.
//! - [`issues`] — issue display, creation, and update.
//! - [`ci`] — CI status aggregation and single-build detail display.
//! - [`sprint`] — sprint-folder resolution, the one thing the core
//!   caches.
//!
//! Nothing here renders to a terminal or parses argv; that's `vibe-cli`'s
//! job. This crate exposes plain functions over `CommandContext` that a
//! CLI (or anything else) can drive.

pub mod ci;
pub mod confirm;
pub mod context;
pub mod issues;
pub mod sprint;
pub mod template;
pub mod workflow;

pub use context::CommandContext;
