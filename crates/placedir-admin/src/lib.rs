//! Admin entry manager for a places/locations directory
//!
//! [`FormController`] turns an operator's draft into a stored record,
//! uploading an optional image first. [`ListSynchronizer`] keeps the
//! displayed table in step with the data store and flips the `approved`
//! and `featured` flags. [`EntryManager`] wires the two together so that
//! every successful write is followed by a refresh.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod form;
pub mod list;
pub mod manager;

pub use form::{FormController, FormStatus, Submission};
pub use list::{ListSynchronizer, RecordRow};
pub use manager::{EntryManager, SubmitOutcome};
