//! `kcube` CLI: one-shot vault commands (`init`, `status`, `add`, `commit`,
//! `sync`, ...) over the `kcube` library crate.

pub mod command;
pub mod show;
pub mod trace;
