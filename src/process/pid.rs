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

//! PID allocation: a bitfield of used ids, mirroring the swap disk's slot
//! bitmap (`crate::memory::swap`) rather than a bare atomic counter, so pids
//! actually get reused once a process is reaped.

use crate::sync::Mutex;

/// Type representing a process id, unique among currently-live processes.
pub type Pid = u32;

/// PID reserved for the very first process started by a kernel instance.
pub const INIT_PID: Pid = 1;

struct Inner {
	used: Vec<bool>,
}

/// The process-id allocator.
pub struct PidAllocator {
	inner: Mutex<Inner>,
}

impl PidAllocator {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner { used: Vec::new() }),
		}
	}

	/// Returns an unused pid starting from [`INIT_PID`] and marks it used.
	pub fn alloc(&self) -> Pid {
		let mut inner = self.inner.lock();
		if let Some(slot) = inner.used.iter().position(|&used| !used) {
			inner.used[slot] = true;
			return (slot + 1) as Pid;
		}
		inner.used.push(true);
		inner.used.len() as Pid
	}

	/// Returns `pid` to the free pool.
	pub fn free(&self, pid: Pid) {
		let mut inner = self.inner.lock();
		let idx = (pid - 1) as usize;
		if idx < inner.used.len() {
			inner.used[idx] = false;
		}
	}
}

impl Default for PidAllocator {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocates_distinct_increasing_pids() {
		let a = PidAllocator::new();
		assert_eq!(a.alloc(), 1);
		assert_eq!(a.alloc(), 2);
	}

	#[test]
	fn freed_pid_is_reused() {
		let a = PidAllocator::new();
		let p1 = a.alloc();
		a.alloc();
		a.free(p1);
		assert_eq!(a.alloc(), p1);
	}
}
