//! The atomic-section primitive.
//!
//! On the modeled uniprocessor, kernel atomicity comes from disabling
//! interrupts around a handful of instructions. The hosted kernel runs on
//! real threads, so that primitive becomes a spin lock guarding the same
//! short sections; everything higher level (semaphores, locks, condition
//! variables) is built on top of it, and nothing ever blocks while
//! holding one.

use core::ops::{Deref, DerefMut};

/// A mutual exclusion primitive for short critical sections.
///
/// Protects the data with a busy-waiting lock. The data can only be
/// accessed through the guard returned from [`lock`], which releases the
/// lock when dropped.
///
/// [`lock`]: Self::lock
#[derive(Default)]
pub struct SpinLock<T>(spin::Mutex<T>);

/// RAII guard for [`SpinLock`]; the lock is released on drop.
pub struct SpinLockGuard<'a, T>(spin::MutexGuard<'a, T>);

impl<T> SpinLock<T> {
    /// Creates a new spin lock in an unlocked state ready for use.
    pub const fn new(t: T) -> Self {
        Self(spin::Mutex::new(t))
    }

    /// Acquires the lock, busy-waiting until it is available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        SpinLockGuard(self.0.lock())
    }

    /// Consumes the lock, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.0.into_inner()
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
