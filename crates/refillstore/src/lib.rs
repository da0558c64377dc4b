//! # refillstore
//!
//! In-memory key store backing the refill cache.
//!
//! ## Layout
//! - **Keys**: ordered tuples of scalar arguments, kept next to their
//!   canonical JSON encoding
//! - **Buffers**: one FIFO queue of values per key
//! - **Snapshots**: the whole key→buffer map as one pretty-printed JSON
//!   object, written atomically

#![warn(missing_docs)]

mod error;
mod key;
pub mod snapshot;
mod store;

pub use error::{Error, Result};
pub use key::{Arg, FiniteFloat, Key};
pub use store::KeyStore;
