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

//! The `munmap` system call tears down a mapping created by `mmap`,
//! writing back dirty pages first (§4.7).

use crate::errno::EResult;
use crate::memory::frame::FrameTable;
use crate::process::Process;

pub fn munmap(process: &Process, frames: &FrameTable, addr: usize) -> EResult<()> {
	process.with_vm(|vm| vm.munmap(addr, frames))
}
