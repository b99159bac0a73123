//! Record store implementations
//!
//! - [`MemoryRecordStore`]: In-process store (tests, demos, the CLI snapshot)

pub mod memory;

pub use memory::MemoryRecordStore;
