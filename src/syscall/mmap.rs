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

//! The `mmap` system call lazily maps an open file's contents into the
//! calling process's address space (§4.7). The mapped file is always one
//! of this kernel's own FAT-resident files, reached through
//! [`crate::fs::Filesystem::inode_file`] rather than a host path.

use crate::errno::EResult;
use crate::fs::Filesystem;
use crate::memory::BackingFile;
use crate::process::Process;
use std::sync::Arc;

pub fn mmap(
	process: &Process,
	fs: &Filesystem,
	fd: i32,
	addr: usize,
	length: usize,
	writable: bool,
	offset: u64,
) -> EResult<usize> {
	let inode_file = process.fds.with_handle(fd, |h| fs.inode_file(h))?;
	let file: Arc<dyn BackingFile> = Arc::new(inode_file);
	process.with_vm(|vm| vm.mmap(addr, length, writable, file, offset))
}
