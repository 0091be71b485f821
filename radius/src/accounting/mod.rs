//! Usage accumulation between accounting requests and periodic persistence.

pub mod queue;
pub mod sync;
