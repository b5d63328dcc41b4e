//! Atomic runtime borrow tracking for shared component tables.
//!
//! Registered tables are shared between the owning registry and the systems
//! that captured them during setup. [`TableCell`] performs `RefCell`-style
//! borrow checking with a single atomic word so a table can cross thread
//! boundaries without an OS lock:
//!
//! | State | Meaning |
//! |------:|---------|
//! | `0`   | Unborrowed |
//! | `-1`  | Exclusively borrowed (one writer) |
//! | `n>0` | `n` shared readers |
//!
//! Borrowing never blocks. A conflicting borrow fails immediately with
//! [`ComponentError::BorrowConflict`]; systems that touch the same table
//! must be ordered by the system graph instead.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::error::{BorrowKind, ComponentError};

const EXCLUSIVE: isize = -1;

/// A thread-safe `RefCell` with non-blocking borrow checking.
pub struct TableCell<T> {
    value: UnsafeCell<T>,
    state: AtomicIsize,
    name: &'static str,
}

// SAFETY: access to `value` is guarded by `state`: shared borrows only hand
// out `&T` (requires `T: Sync`), exclusive borrows hand out `&mut T` to a
// single holder (requires `T: Send`).
unsafe impl<T: Send> Send for TableCell<T> {}
unsafe impl<T: Send + Sync> Sync for TableCell<T> {}

impl<T> TableCell<T> {
    /// Wrap `value`. `name` identifies the cell in borrow errors.
    #[must_use]
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            state: AtomicIsize::new(0),
            name,
        }
    }

    /// Name used in borrow errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire a shared borrow.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::BorrowConflict`] if the cell is exclusively
    /// borrowed.
    pub fn try_borrow(&self) -> Result<Ref<'_, T>, ComponentError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == EXCLUSIVE {
                return Err(self.conflict(BorrowKind::Exclusive));
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Ok(Ref {
            // SAFETY: the state now counts this reader, no writer can exist.
            value: unsafe { &*self.value.get() },
            state: &self.state,
        })
    }

    /// Acquire an exclusive borrow.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::BorrowConflict`] if any borrow is live.
    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, ComponentError> {
        match self
            .state
            .compare_exchange(0, EXCLUSIVE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(RefMut {
                // SAFETY: the state was 0 and is now EXCLUSIVE; no other
                // reference to the value exists until the guard drops.
                value: unsafe { &mut *self.value.get() },
                state: &self.state,
            }),
            Err(EXCLUSIVE) => Err(self.conflict(BorrowKind::Exclusive)),
            Err(_) => Err(self.conflict(BorrowKind::Shared)),
        }
    }

    /// Direct mutable access, statically checked through `&mut self`.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwrap the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn conflict(&self, held: BorrowKind) -> ComponentError {
        ComponentError::BorrowConflict {
            table: self.name,
            held,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_borrow() {
            Ok(value) => f.debug_struct("TableCell").field("value", &*value).finish(),
            Err(_) => f
                .debug_struct("TableCell")
                .field("value", &"<borrowed>")
                .finish(),
        }
    }
}

/// A shared borrow of a [`TableCell`].
pub struct Ref<'a, T: ?Sized> {
    value: &'a T,
    state: &'a AtomicIsize,
}

impl<'a, T: ?Sized> Ref<'a, T> {
    /// Narrow the guard to a part of the borrowed value.
    pub fn map<U: ?Sized, F>(guard: Self, f: F) -> Ref<'a, U>
    where
        F: FnOnce(&T) -> &U,
    {
        let guard = std::mem::ManuallyDrop::new(guard);
        Ref {
            value: f(guard.value),
            state: guard.state,
        }
    }

    /// Like [`Ref::map`], but the projection may fail, in which case the
    /// borrow is released.
    ///
    /// # Errors
    ///
    /// Returns the projection's error.
    pub fn try_map<U: ?Sized, E, F>(guard: Self, f: F) -> Result<Ref<'a, U>, E>
    where
        F: FnOnce(&T) -> Result<&U, E>,
    {
        let guard = std::mem::ManuallyDrop::new(guard);
        let state = guard.state;
        match f(guard.value) {
            Ok(value) => Ok(Ref { value, state }),
            Err(err) => {
                state.fetch_sub(1, Ordering::Release);
                Err(err)
            }
        }
    }
}

impl<T: ?Sized> Deref for Ref<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized> Drop for Ref<'_, T> {
    fn drop(&mut self) {
        self.state.fetch_sub(1, Ordering::Release);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Ref<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// An exclusive borrow of a [`TableCell`].
pub struct RefMut<'a, T: ?Sized> {
    value: &'a mut T,
    state: &'a AtomicIsize,
}

impl<'a, T: ?Sized> RefMut<'a, T> {
    /// Narrow the guard to a part of the borrowed value, keeping the
    /// exclusive borrow alive.
    pub fn map<U: ?Sized, F>(guard: Self, f: F) -> RefMut<'a, U>
    where
        F: FnOnce(&mut T) -> &mut U,
    {
        let guard = std::mem::ManuallyDrop::new(guard);
        let state = guard.state;
        // SAFETY: `guard` is never dropped, so moving the reference out does
        // not release the borrow; the returned guard takes over the release.
        let value = unsafe { std::ptr::read(&guard.value) };
        RefMut {
            value: f(value),
            state,
        }
    }

    /// Like [`RefMut::map`], but the projection may fail, in which case the
    /// borrow is released.
    ///
    /// # Errors
    ///
    /// Returns the projection's error.
    pub fn try_map<U: ?Sized, E, F>(guard: Self, f: F) -> Result<RefMut<'a, U>, E>
    where
        F: FnOnce(&mut T) -> Result<&mut U, E>,
    {
        let guard = std::mem::ManuallyDrop::new(guard);
        let state = guard.state;
        // SAFETY: see `map`.
        let value = unsafe { std::ptr::read(&guard.value) };
        match f(value) {
            Ok(value) => Ok(RefMut { value, state }),
            Err(err) => {
                state.store(0, Ordering::Release);
                Err(err)
            }
        }
    }
}

impl<T: ?Sized> Deref for RefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized> DerefMut for RefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T: ?Sized> Drop for RefMut<'_, T> {
    fn drop(&mut self) {
        self.state.store(0, Ordering::Release);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RefMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (*self.value).fmt(f)
    }
}
