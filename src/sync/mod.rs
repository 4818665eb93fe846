//! Thread synchronization primitives.
//!
//! The kernel's primitives form a tower: [`SpinLock`] is the atomic
//! section (the hosted stand-in for masking interrupts), [`Semaphore`]
//! adds FIFO blocking on top of it, and [`Lock`], [`Condition`], [`Port`]
//! and [`RwMutex`] are all built from semaphores.

mod condition;
mod lock;
mod port;
mod rwmutex;
mod semaphore;
mod spinlock;

pub use condition::Condition;
pub use lock::Lock;
pub use port::Port;
pub use rwmutex::RwMutex;
pub use semaphore::Semaphore;
pub use spinlock::{SpinLock, SpinLockGuard};
