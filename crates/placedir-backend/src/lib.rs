//! Object storage and data store clients for the places directory admin
//!
//! The admin flow depends only on the [`ObjectStorage`] and [`DataStore`]
//! traits. [`RestBackend`] implements both against the hosted backend's HTTP
//! API; [`InMemoryBackend`] implements both in process for tests and dry runs.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod error;
pub mod memory;
pub mod rest;
pub mod service;

pub use error::{BackendError, BackendResult};
pub use memory::{BackendCall, InMemoryBackend, Operation};
pub use rest::RestBackend;
pub use service::{DataStore, FieldUpdate, ObjectStorage, flag_update};
