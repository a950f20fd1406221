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

//! The `wait` system call blocks until a child exits and reaps it (§4.8).

use crate::errno::EResult;
use crate::process::pid::Pid;
use crate::process::{Process, ProcessTable};

pub fn wait(process: &Process, table: &ProcessTable, child_pid: Pid) -> EResult<i32> {
	process.wait(table, child_pid)
}
