// src/task/mod.rs

//! Tasks and the records hanging off them.
//!
//! - `handle` is the public [`Task`] handle and its operations.
//! - `callback` holds prep / completion callback records.
//! - [`list`] is the caller-owned [`TaskList`] with bulk helpers.

mod callback;
mod handle;
mod link;
pub mod list;
mod scratch;

pub(crate) use callback::{CallbackKind, CallbackQueue, CallbackRecord};
pub use handle::{Task, TaskBody};
pub(crate) use link::DependencyLink;
pub use list::TaskList;
