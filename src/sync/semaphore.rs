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

//! Counting semaphore with `down`/`up`, used to order fork and exit/wait
//! handoffs (see §5's "ordering guarantees").

use std::sync::{Condvar, Mutex};

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
	count: Mutex<usize>,
	cond: Condvar,
}

impl Semaphore {
	/// Creates a semaphore with the given initial count.
	pub fn new(initial: usize) -> Self {
		Self {
			count: Mutex::new(initial),
			cond: Condvar::new(),
		}
	}

	/// Blocks until the count is positive, then decrements it.
	pub fn down(&self) {
		let mut count = self.count.lock().unwrap();
		while *count == 0 {
			count = self.cond.wait(count).unwrap();
		}
		*count -= 1;
	}

	/// Increments the count, waking one waiter if any is blocked in
	/// [`Self::down`].
	pub fn up(&self) {
		let mut count = self.count.lock().unwrap();
		*count += 1;
		self.cond.notify_one();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn down_blocks_until_up() {
		let sem = Arc::new(Semaphore::new(0));
		let order = Arc::new(Mutex::new(Vec::new()));

		let sem2 = sem.clone();
		let order2 = order.clone();
		let waiter = thread::spawn(move || {
			sem2.down();
			order2.lock().unwrap().push("waiter");
		});

		thread::sleep(Duration::from_millis(20));
		order.lock().unwrap().push("main");
		sem.up();
		waiter.join().unwrap();

		let order = order.lock().unwrap();
		assert_eq!(order.as_slice(), ["main", "waiter"]);
	}
}
