//! The two cache engine entry points (C6, C7), each driven by a descriptor,
//! call arguments, and a deferred loader supplied by an external
//! interception layer (SPEC_FULL.md §6).

pub mod batch;
pub mod single;

pub use batch::BatchEngine;
pub use single::SingleLookupEngine;
