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

//! The `fork` system call duplicates the calling process (§4.8). The parent
//! sees the new child's pid; the child's own view of its return value is
//! out of scope (see [`crate::process`]'s module doc), since nothing in
//! this hosted model resumes a second thread of user instructions after
//! the split.

use crate::errno::EResult;
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::pid::Pid;
use crate::process::{Process, ProcessTable};
use std::sync::Arc;

pub fn fork(
	process: &Arc<Process>,
	table: &ProcessTable,
	fs: &Filesystem,
	frames: &FrameTable,
	swap: &SwapDisk,
) -> EResult<Pid> {
	process.fork(table, fs, frames, swap)
}
