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

//! Per-process file-descriptor table (§3's `fd_table[]`/`next_fd`). Fds 0
//! and 1 are reserved for the keyboard/console and never occupy a slot
//! here (see [`crate::syscall`]).

use crate::errno::{EResult, Errno};
use crate::fs::{FileHandle, Filesystem};
use crate::sync::Mutex;
use std::collections::HashMap;

/// The first fd handed out by [`FdTable::insert`]; 0 and 1 are reserved.
pub const FIRST_FD: i32 = 2;

struct Inner {
	entries: HashMap<i32, FileHandle>,
	next_fd: i32,
}

/// A process's open-file table.
pub struct FdTable {
	inner: Mutex<Inner>,
}

impl FdTable {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				entries: HashMap::new(),
				next_fd: FIRST_FD,
			}),
		}
	}

	/// Allocates the next fd for `handle`.
	pub fn insert(&self, handle: FileHandle) -> i32 {
		let mut inner = self.inner.lock();
		let fd = inner.next_fd;
		inner.next_fd += 1;
		inner.entries.insert(fd, handle);
		fd
	}

	/// Runs `f` against the handle at `fd`, if open.
	pub fn with_handle<R>(&self, fd: i32, f: impl FnOnce(&mut FileHandle) -> R) -> EResult<R> {
		let mut inner = self.inner.lock();
		let handle = inner.entries.get_mut(&fd).ok_or(Errno::EBADF)?;
		Ok(f(handle))
	}

	/// Removes and returns the handle at `fd`, for the caller to close.
	pub fn remove(&self, fd: i32) -> EResult<FileHandle> {
		self.inner.lock().entries.remove(&fd).ok_or(Errno::EBADF)
	}

	/// Fork's fd-table duplication (§4.8 step 4): every handle is
	/// reopened independently via `fs`, at the same fd numbers.
	pub fn dup_all(&self, fs: &Filesystem) -> FdTable {
		let inner = self.inner.lock();
		let entries = inner
			.entries
			.iter()
			.map(|(&fd, handle)| (fd, fs.dup_handle(handle)))
			.collect();
		FdTable {
			inner: Mutex::new(Inner {
				entries,
				next_fd: inner.next_fd,
			}),
		}
	}

	/// Closes every open handle, e.g. on process exit (§4.8, §5's
	/// teardown order: "open files" first).
	pub fn close_all(&self, fs: &Filesystem) {
		let entries: Vec<_> = self.inner.lock().entries.drain().map(|(_, h)| h).collect();
		for handle in entries {
			fs.close_handle(handle);
		}
	}
}

impl Default for FdTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::RamDisk;

	fn new_fs() -> Filesystem {
		Filesystem::format(Box::new(RamDisk::new(512)), 8).unwrap()
	}

	#[test]
	fn insert_starts_at_first_fd() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.create(&root, "/a", 0, false).unwrap();
		let handle = fs.open_path(&root, "/a").unwrap();
		let table = FdTable::new();
		assert_eq!(table.insert(handle), FIRST_FD);
		fs.close_inode(root);
	}

	#[test]
	fn missing_fd_is_ebadf() {
		let table = FdTable::new();
		assert_eq!(table.remove(99).err(), Some(Errno::EBADF));
	}

	#[test]
	fn dup_all_gives_independent_handles() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.create(&root, "/a", 0, false).unwrap();
		let handle = fs.open_path(&root, "/a").unwrap();
		let table = FdTable::new();
		let fd = table.insert(handle);
		let dup = table.dup_all(&fs);
		table.with_handle(fd, |h| fs.write(h, b"parent")).unwrap();
		let n = dup.with_handle(fd, |h| fs.read(h, &mut [0u8; 6])).unwrap();
		assert_eq!(n, 6);
		table.remove(fd).map(|h| fs.close_handle(h)).unwrap();
		dup.close_all(&fs);
		fs.close_inode(root);
	}
}
