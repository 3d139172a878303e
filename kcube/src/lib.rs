//! K-Cube: a personal knowledge-base version-control and sync engine.
//!
//! A vault is a directory tree tracked the way a VCS tracks a working copy,
//! except the "remote" is a sync server rather than another clone: content
//! is addressed by the SHA-256 of its compressed bytes, versions are
//! immutable manifests over those blobs, and a background worker keeps a
//! vault's local state converged with the server's.
//!
//! ## Layering
//!
//! - [`storage`] is the log-structured key-value engine ([`storage::log_cask::LogCask`])
//!   everything else is built on.
//! - [`object_store`] and [`index`] turn that engine into, respectively, a
//!   content-addressed blob store and a relational layer over versions,
//!   blobs, and file manifests.
//! - [`staging`] and [`repo`] implement the working-tree model: status,
//!   add, commit, reset, revert, restore, history.
//! - [`api_client`] and [`sync`] speak the server's sync protocol.
//! - [`watcher`], [`worker`], and [`supervisor`] make it all run
//!   unattended: one worker per vault, driven by filesystem events and a
//!   debounce timer, supervised from a single process-wide owner.

pub mod api_client;
pub mod config;
pub mod error;
pub mod index;
pub mod message;
pub mod object_store;
pub mod repo;
pub mod staging;
pub mod storage;
pub mod supervisor;
pub mod sync;
pub mod util;
pub mod watcher;
pub mod worker;

pub use error::{CResult, Error};
