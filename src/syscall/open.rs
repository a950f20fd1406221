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

//! The `open` system call opens a path and assigns it the next free file
//! descriptor in the calling process's table (§4.5, §3's `next_fd`).

use crate::config::PATH_MAX;
use crate::errno::EResult;
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::Process;
use crate::syscall::mem;

pub fn open(
	process: &Process,
	fs: &Filesystem,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	path_ptr: usize,
) -> EResult<i32> {
	let path = process.with_vm(|vm| mem::read_c_string(vm, frames, swap, sp, path_ptr, PATH_MAX))?;
	let handle = fs.open_path(&process.cwd(), &path)?;
	Ok(process.fds.insert(handle))
}
