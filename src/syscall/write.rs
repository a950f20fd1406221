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

//! The `write` system call. Fd 1 is special-cased to the host's stdout, the
//! hosted stand-in for console `putbuf` (§4.9); every other fd goes
//! through the calling process's file table.

use crate::errno::{EResult, Errno};
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::Process;
use crate::syscall::mem;
use std::io::Write as _;

pub fn write(
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
	process.with_vm(|vm| mem::read_bytes(vm, frames, swap, sp, buf_ptr, &mut tmp))?;
	if fd == 1 {
		std::io::stdout().write_all(&tmp).map_err(|_| Errno::EINVAL)?;
		Ok(count)
	} else if fd == 0 {
		Err(Errno::EBADF)
	} else {
		Ok(process.fds.with_handle(fd, |h| fs.write(h, &tmp))?)
	}
}
