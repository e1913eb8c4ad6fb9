//! Mutual exclusion built on a generic [`RawLock`], following the
//! teacher's `Lock<R, T>` / `Guard` split (`kernel-rs/src/lock/mod.rs`):
//! the raw lock owns only the acquire/release protocol, `Lock<R, T>`
//! owns the protected data, and `Guard` ties the two together for the
//! duration of a critical section.
//!
//! Unlike the teacher, this crate does not itself mask interrupts on
//! acquire (`push_off`/`pop_off`): IRQ masking is a property of the
//! physical CPU a vCPU is pinned to, which is the scheduler's contract
//! (see [`crate::hal::scheduler`]), not this crate's.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A raw acquire/release protocol. Implementations must guarantee mutual
/// exclusion between `acquire()` returning and the matching `release()`.
pub trait RawLock {
    fn acquire(&self);
    fn release(&self);
}

/// A busy-waiting raw lock.
pub struct SpinRawLock {
    locked: AtomicBool,
}

impl SpinRawLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for SpinRawLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for SpinRawLock {
    fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Data protected by a [`RawLock`].
pub struct Lock<R: RawLock, T> {
    raw: R,
    data: UnsafeCell<T>,
}

unsafe impl<R: RawLock + Sync, T: Send> Sync for Lock<R, T> {}

pub struct Guard<'s, R: RawLock, T> {
    lock: &'s Lock<R, T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<'s, R: RawLock + Sync, T: Sync> Sync for Guard<'s, R, T> {}

impl<R: RawLock, T> Lock<R, T> {
    pub const fn new(raw: R, data: T) -> Self {
        Self {
            raw,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> Guard<'_, R, T> {
        self.raw.acquire();
        Guard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Raw pointer to the inner data. Caller must ensure exclusivity.
    pub fn get_mut_raw(&self) -> *mut T {
        self.data.get()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<R: RawLock, T> Drop for Guard<'_, R, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

impl<R: RawLock, T> Deref for Guard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<R: RawLock, T> DerefMut for Guard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// Convenience alias for the common case of a spin-protected value.
pub type SpinLock<T> = Lock<SpinRawLock, T>;

impl<T> SpinLock<T> {
    pub const fn spin(data: T) -> Self {
        Self::new(SpinRawLock::new(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_excludes_and_returns_data() {
        let l = SpinLock::spin(0u32);
        {
            let mut g = l.lock();
            *g += 1;
        }
        assert_eq!(*l.lock(), 1);
    }

    #[test]
    fn guard_deref_mut_updates_through_multiple_sections() {
        let l = SpinLock::spin(vec![1, 2, 3]);
        l.lock().push(4);
        assert_eq!(*l.lock(), vec![1, 2, 3, 4]);
    }
}
