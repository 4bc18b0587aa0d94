//! Module implement the bitmap secondary index: a fixed set of
//! recognised attribute values per indexed column, addressed through a
//! [master_table::MasterBlockTable] slot allocator.

pub mod index;
pub mod master_table;

pub use index::{BitMask, Bitarray, BitarrayCursor, ValueList};
pub use master_table::{MasterBlockTable, Slot};
