//! Synchronization primitives used by the allocator's hot path.
//!
//! [`SpinLock`] is a test-and-test-and-set lock, modeled directly on
//! `hadron_core::sync::SpinLock`. It is the per-word fallback `spec.md` §5
//! sanctions in place of a native 128-bit CAS: "a per-word spinlock; the
//! contract (atomic read-modify-write of the full cell) must be preserved."
//!
//! Under `cfg(loom)`, the atomic and cell primitives are swapped for loom's
//! checked equivalents so the TTAS protocol can be exhaustively interleaved
//! by loom's scheduler, the same compatibility-shim pattern as
//! `hadron_core::sync::loom_compat`.

use std::ops::{Deref, DerefMut};

#[cfg(loom)]
use loom::cell::{MutPtr, UnsafeCell};
#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(loom))]
use std::cell::UnsafeCell;
#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};

/// A spin-based mutual exclusion lock.
///
/// Uses test-and-test-and-set (TTAS) to reduce cache-line contention under
/// the retry storms a contended Armored Word can produce. Const-constructible
/// so it can seed a `Vec<SpinLock<T>>` of bitmap cells without per-element
/// runtime initialization overhead beyond the `Clone` used to fill the vec.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: `SpinLock` ensures exclusive access to `T` via atomic operations.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new unlocked `SpinLock` wrapping `value`.
    #[cfg(not(loom))]
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Creates a new unlocked `SpinLock` wrapping `value`.
    ///
    /// Not `const` under `cfg(loom)`: loom's checked primitives carry
    /// runtime-registered model state and cannot be built in a const context.
    #[cfg(loom)]
    pub fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it becomes available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinLockGuard { lock: self, ptr: self.lock_ptr() };
            }
            while self.locked.load(Ordering::Relaxed) {
                Self::spin();
            }
        }
    }

    #[cfg(loom)]
    fn lock_ptr(&self) -> MutPtr<T> {
        self.data.get_mut()
    }

    #[cfg(not(loom))]
    fn lock_ptr(&self) -> *mut T {
        self.data.get()
    }

    // Under loom, a busy spin never yields control back to the scheduler,
    // so the model never explores the interleaving where the lock is
    // released. `loom::thread::yield_now` hands control back explicitly.
    #[cfg(loom)]
    fn spin() {
        loom::thread::yield_now();
    }

    #[cfg(not(loom))]
    fn spin() {
        std::hint::spin_loop();
    }
}

/// RAII guard that releases the [`SpinLock`] when dropped.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    #[cfg(loom)]
    ptr: MutPtr<T>,
    #[cfg(not(loom))]
    ptr: *mut T,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard implies exclusive access.
        unsafe { &*self.data_ptr() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard implies exclusive access.
        unsafe { &mut *self.data_ptr() }
    }
}

impl<T> SpinLockGuard<'_, T> {
    #[cfg(loom)]
    fn data_ptr(&self) -> *mut T {
        self.ptr.with(|p| p)
    }

    #[cfg(not(loom))]
    fn data_ptr(&self) -> *mut T {
        self.ptr
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
