//! plugreg - plugin registry updater
//!
//! Keeps a generated nix registry of editor plugins in sync with their
//! upstream GitHub repositories. For every line of the plugin list it finds
//! the latest commit of the tracked branch, prefetches that revision to learn
//! its content checksum, and renders the registry from a template.
//!
//! # Architecture Overview
//!
//! ```text
//! plugin list ──▶ spec ──▶ orchestrator ──▶ registry::emitter ──▶ generated.nix
//!                            │     │
//!                 github ◀───┘     └───▶ prefetch
//!                            cache (seeded by registry::current)
//! ```
//!
//! - [`spec`] parses `owner/repo[@branch][ as alias]` lines, failing fast
//! - [`github`] resolves the latest revision through the commit feed,
//!   detects moved repositories and probes for submodules
//! - [`prefetch`] computes checksums with the nix prefetch tools
//! - [`cache`] remembers checksums by revision across runs
//! - [`orchestrator`] runs all of the above on a bounded worker pool
//! - [`registry`] reads the current registry and writes the next one
//! - [`rewriter`] keeps the plugin list sorted and records renames
//! - [`git`] commits each step
//! - [`cli`] and [`config`] tie it together
//!
//! ## Plugin list
//!
//! ```text
//! tpope/vim-fugitive
//! neoclide/coc.nvim@release
//! junegunn/fzf.vim as fzf-vim-plugin
//! ```
//!
//! # Error handling
//!
//! A malformed line or a failed plugin fails the whole run; the registry is
//! only written when every plugin resolved. See [`core::error`].

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod git;
pub mod github;
pub mod models;
pub mod orchestrator;
pub mod prefetch;
pub mod registry;
pub mod rewriter;
pub mod spec;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
