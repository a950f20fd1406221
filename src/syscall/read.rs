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

//! The `read` system call. Fd 0 is special-cased to the host's stdin, the
//! hosted stand-in for keyboard input (§4.9); every other fd goes through
//! the calling process's file table.

use crate::errno::{EResult, Errno};
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::Process;
use crate::syscall::mem;
use std::io::Read as _;

pub fn read(
	process: &Process,
	fs: &Filesystem,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	fd: i32,
	buf_ptr: usize,
	count: usize,
) -> EResult<usize> {
	if count == 0 {
		return Ok(0);
	}
	let mut tmp = vec![0u8; count];
	let n = if fd == 0 {
		std::io::stdin().read(&mut tmp).map_err(|_| Errno::EINVAL)?
	} else if fd == 1 {
		return Err(Errno::EBADF);
	} else {
		process.fds.with_handle(fd, |h| fs.read(h, &mut tmp))?
	};
	process.with_vm(|vm| mem::write_bytes(vm, frames, swap, sp, buf_ptr, &tmp[..n]))?;
	Ok(n)
}
