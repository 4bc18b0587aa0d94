//! Module implement common utility types shared by every index kind.

pub mod spinlock;
pub mod thread;

pub use spinlock::Spinlock;
pub use thread::Thread;
