/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Tinix.
 *
 * Tinix is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Tinix is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Tinix. If not, see <https://www.gnu.org/licenses/>.
 */

//! Sleeping mutual exclusion.
//!
//! A thin, named wrapper around [`std::sync::Mutex`] so that call sites read
//! the way the rest of the kernel talks about locks ("the page cache lock",
//! "the filesystem lock") rather than about the standard library. Unlike a
//! spinlock, waiting here puts the thread to sleep, which is the
//! appropriate behavior for the coarse, potentially long-held locks
//! described in the concurrency model (page cache, filesystem, frame list).

use std::sync::{self, MutexGuard, PoisonError};

/// A sleeping mutex guarding `T`.
#[derive(Debug, Default)]
pub struct Mutex<T> {
	inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
	/// Creates a new mutex holding `value`.
	pub const fn new(value: T) -> Self {
		Self {
			inner: sync::Mutex::new(value),
		}
	}

	/// Acquires the lock, blocking the current thread until it is
	/// available.
	///
	/// A poisoned lock (a prior holder panicked while holding it) is
	/// treated as if the panic never happened: the teaching kernel has no
	/// notion of lock poisoning, only of a disk that is assumed reliable
	/// (see §4.1's failure policy).
	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn mutual_exclusion() {
		let counter = Arc::new(Mutex::new(0usize));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let counter = counter.clone();
				thread::spawn(move || {
					for _ in 0..1000 {
						*counter.lock() += 1;
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(*counter.lock(), 8000);
	}
}
