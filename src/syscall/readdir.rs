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

//! The `readdir` system call advances a directory fd's cursor, writing the
//! next entry's name (NUL-terminated) into a user buffer.

use crate::errno::EResult;
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::Process;
use crate::syscall::mem;

pub fn readdir(
	process: &Process,
	fs: &Filesystem,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	fd: i32,
	out_ptr: usize,
) -> EResult<bool> {
	let name = process.fds.with_handle(fd, |h| fs.readdir(h))?;
	let Some(name) = name else {
		return Ok(false);
	};
	let mut bytes = name.into_bytes();
	bytes.push(0);
	process.with_vm(|vm| mem::write_bytes(vm, frames, swap, sp, out_ptr, &bytes))?;
	Ok(true)
}
