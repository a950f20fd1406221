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

//! User-pointer validation (§4.9 step 1): every syscall argument that is a
//! pointer is resolved through the calling process's SPT before the
//! dispatcher touches it, growing the stack through [`VmSpace::handle_fault`]
//! exactly as a real hardware fault would, rather than trusting the address
//! blindly the way a function call within the kernel itself can.

use crate::config::PAGE_SIZE;
use crate::errno::{EResult, Errno};
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::memory::{page_floor, VmSpace};

/// Resolves `va` to `(frame_id, writable)`, faulting it in if it is not yet
/// mapped.
fn translate(
	vm: &VmSpace,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	va: usize,
) -> EResult<(usize, bool)> {
	if let Some(mapping) = vm.table.translate(va) {
		return Ok(mapping);
	}
	vm.handle_fault(va, sp, frames, swap)?;
	vm.table.translate(va).ok_or(Errno::EFAULT)
}

/// Copies `buf.len()` bytes out of user memory starting at `addr`.
pub fn read_bytes(
	vm: &VmSpace,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	addr: usize,
	buf: &mut [u8],
) -> EResult<()> {
	let mut done = 0;
	while done < buf.len() {
		let va = addr + done;
		let page_va = page_floor(va);
		let (frame_id, _) = translate(vm, frames, swap, sp, va)?;
		if let Some(page) = vm.spt.find(page_va) {
			page.touch();
		}
		let page_off = va - page_va;
		let n = (PAGE_SIZE - page_off).min(buf.len() - done);
		frames.frame_by_id(frame_id).read_at(page_off, &mut buf[done..done + n]);
		done += n;
	}
	Ok(())
}

/// Copies `buf` into user memory starting at `addr`. Fails with
/// [`Errno::EFAULT`] if any page it covers is read-only.
pub fn write_bytes(
	vm: &VmSpace,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	addr: usize,
	buf: &[u8],
) -> EResult<()> {
	let mut done = 0;
	while done < buf.len() {
		let va = addr + done;
		let page_va = page_floor(va);
		let (frame_id, writable) = translate(vm, frames, swap, sp, va)?;
		if !writable {
			return Err(Errno::EFAULT);
		}
		if let Some(page) = vm.spt.find(page_va) {
			page.mark_dirty();
		}
		let page_off = va - page_va;
		let n = (PAGE_SIZE - page_off).min(buf.len() - done);
		frames.frame_by_id(frame_id).write_at(page_off, &buf[done..done + n]);
		done += n;
	}
	Ok(())
}

/// Reads a single little-endian machine word (a pointer or `size_t`
/// argument stashed in user memory, e.g. one slot of an `argv` vector).
pub fn read_word(vm: &VmSpace, frames: &FrameTable, swap: &SwapDisk, sp: usize, addr: usize) -> EResult<usize> {
	let mut buf = [0u8; 8];
	read_bytes(vm, frames, swap, sp, addr, &mut buf)?;
	Ok(usize::from_le_bytes(buf))
}

/// Reads a NUL-terminated string from user memory, one byte at a time,
/// bounded by `max_len` (callers pass [`crate::config::PATH_MAX`] for
/// paths).
pub fn read_c_string(
	vm: &VmSpace,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	addr: usize,
	max_len: usize,
) -> EResult<String> {
	let mut bytes = Vec::new();
	for i in 0..max_len {
		let mut b = [0u8; 1];
		read_bytes(vm, frames, swap, sp, addr + i, &mut b)?;
		if b[0] == 0 {
			return String::from_utf8(bytes).map_err(|_| Errno::EINVAL);
		}
		bytes.push(b[0]);
	}
	Err(Errno::ENAMETOOLONG)
}

/// Reads an `argv`-style array of `argc` string pointers, each resolved
/// through [`read_c_string`] (used by `exec`).
pub fn read_argv(
	vm: &VmSpace,
	frames: &FrameTable,
	swap: &SwapDisk,
	sp: usize,
	argv_addr: usize,
	argc: usize,
) -> EResult<Vec<String>> {
	let mut out = Vec::with_capacity(argc);
	for i in 0..argc {
		let ptr = read_word(vm, frames, swap, sp, argv_addr + i * 8)?;
		out.push(read_c_string(vm, frames, swap, sp, ptr, crate::config::PATH_MAX)?);
	}
	Ok(out)
}
