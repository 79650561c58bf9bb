//! Stages the free variables and result of a JIT-compiled debugger expression into a contiguous
//! argument struct in inferior-process memory, then transfers any mutations back out.
//!
//! A [`Materializer`] collects the entities an expression needs — local variables, persistent
//! `$`-variables, symbols, registers, and a result slot — in the order the expression's code
//! generator asked for them. [`Materializer::materialize`] copies each entity's current value
//! into the caller-allocated argument struct and returns a one-shot [`Dematerializer`]. After the
//! compiled expression runs inside the inferior, [`Dematerializer::dematerialize`] copies
//! anything the expression wrote back into the entities it came from, promoting the result slot
//! into a fresh persistent variable along the way.
//!
//! This crate does not generate or run expression code, allocate stack frames, or talk to a
//! process directly — it only coordinates the copy in each direction through the collaborator
//! traits in [`collaborators`].

pub mod address;
pub mod collaborators;
pub mod dematerializer;
pub mod entity;
pub mod error;
pub mod layout;
pub mod materializer;
pub mod permissions;
pub mod value;

pub use address::{Address, AddressKind, ByteOrder};
pub use dematerializer::Dematerializer;
pub use error::Error;
pub use materializer::{Materializer, TargetConfig};
