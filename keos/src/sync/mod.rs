//! Synchronization primitives built on top of [`abyss::spinlock`].
//!
//! This module groups KeOS's synchronization building blocks: the
//! preemption-disabling [`SpinLock`](spinlock::SpinLock), the
//! reader/writer lock in [`rwlock`], and the thread-safe atomics in
//! [`atomic`]. Blocking primitives (mutexes, condition variables,
//! semaphores) that park the calling thread are built on top of these
//! by individual project crates.

pub mod atomic;
pub mod rwlock;
pub mod spinlock;

pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
