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

//! System-call dispatch (C11, §4.9).
//!
//! On real hardware the syscall number and up to six arguments live in known
//! registers; here [`Regs`] stands in for that trap frame, and [`dispatch`]
//! stands in for the interrupt handler that would decode it. Every argument
//! that is a pointer is resolved through the calling process's address space
//! by [`mem`] before any handler sees it, so a wild pointer faults exactly
//! where the data model says it should rather than where the handler
//! happens to dereference it.
//!
//! Each syscall gets its own file, named after the call, the way this
//! crate's other multi-part facades are organized by operation rather than
//! by subsystem layer.

pub mod mem;

mod chdir;
mod close;
mod create;
mod exec;
mod exit;
mod filesize;
mod fork;
mod halt;
mod inumber;
mod isdir;
mod mkdir;
mod mmap;
mod munmap;
mod open;
mod read;
mod readdir;
mod remove;
mod seek;
mod symlink;
mod tell;
mod wait;
mod write;

use crate::errno::Errno;
use crate::fs::Filesystem;
use crate::memory::frame::FrameTable;
use crate::memory::swap::SwapDisk;
use crate::process::{Process, ProcessTable};
use std::sync::Arc;

/// The raw trap frame a syscall dispatch works from: a call number plus up
/// to six `usize`-wide argument slots, unpacked by each handler into its own
/// typed parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Regs {
	pub nr: u32,
	pub args: [usize; 6],
}

impl Regs {
	pub fn new(nr: u32, args: [usize; 6]) -> Self {
		Self { nr, args }
	}
}

/// The syscall set named in §4.9, in the order given there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Nr {
	Halt = 0,
	Exit = 1,
	Fork = 2,
	Exec = 3,
	Wait = 4,
	Create = 5,
	Remove = 6,
	Open = 7,
	Filesize = 8,
	Read = 9,
	Write = 10,
	Seek = 11,
	Tell = 12,
	Close = 13,
	Mmap = 14,
	Munmap = 15,
	Chdir = 16,
	Mkdir = 17,
	Readdir = 18,
	Isdir = 19,
	Inumber = 20,
	Symlink = 21,
}

impl Nr {
	fn from_u32(n: u32) -> Option<Self> {
		use Nr::*;
		Some(match n {
			0 => Halt,
			1 => Exit,
			2 => Fork,
			3 => Exec,
			4 => Wait,
			5 => Create,
			6 => Remove,
			7 => Open,
			8 => Filesize,
			9 => Read,
			10 => Write,
			11 => Seek,
			12 => Tell,
			13 => Close,
			14 => Mmap,
			15 => Munmap,
			16 => Chdir,
			17 => Mkdir,
			18 => Readdir,
			19 => Isdir,
			20 => Inumber,
			21 => Symlink,
			_ => return None,
		})
	}
}

/// The kernel-wide subsystems a dispatch needs, threaded through the same
/// way every facade in this crate takes them as explicit arguments rather
/// than bundling them into one God object.
pub struct Context<'a> {
	pub process: &'a Arc<Process>,
	pub table: &'a ProcessTable,
	pub fs: &'a Filesystem,
	pub frames: &'a FrameTable,
	pub swap: &'a SwapDisk,
	/// The calling thread's current stack pointer, used only to tell a
	/// legitimate stack-growing fault from a wild access (§4.6).
	pub sp: usize,
}

/// Runs one syscall to completion, converting its [`EResult`] into the
/// `-1`-on-error / value-on-success convention described in §6. An unknown
/// call number is treated the same as an invalid argument.
///
/// [`EResult`]: crate::errno::EResult
pub fn dispatch(ctx: &Context, regs: Regs) -> isize {
	let Some(nr) = Nr::from_u32(regs.nr) else {
		return fail(Errno::EINVAL);
	};
	let a = regs.args;
	match nr {
		Nr::Halt => {
			halt::halt();
			0
		}
		Nr::Exit => {
			exit::exit(ctx.process, ctx.fs, ctx.frames, a[0] as i32);
			0
		}
		Nr::Fork => to_isize(fork::fork(ctx.process, ctx.table, ctx.fs, ctx.frames, ctx.swap)),
		Nr::Exec => to_isize(exec::exec(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0],
			a[1],
			a[2],
		)),
		Nr::Wait => to_isize(wait::wait(ctx.process, ctx.table, a[0] as _)),
		Nr::Create => to_isize(create::create(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0],
			a[1] as u32,
		)),
		Nr::Remove => to_isize(remove::remove(ctx.process, ctx.fs, ctx.frames, ctx.swap, ctx.sp, a[0])),
		Nr::Open => to_isize(open::open(ctx.process, ctx.fs, ctx.frames, ctx.swap, ctx.sp, a[0])),
		Nr::Filesize => to_isize(filesize::filesize(ctx.process, ctx.fs, a[0] as i32)),
		Nr::Read => to_isize(read::read(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0] as i32,
			a[1],
			a[2],
		)),
		Nr::Write => to_isize(write::write(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0] as i32,
			a[1],
			a[2],
		)),
		Nr::Seek => to_isize(seek::seek(ctx.process, ctx.fs, a[0] as i32, a[1] as u32)),
		Nr::Tell => to_isize(tell::tell(ctx.process, ctx.fs, a[0] as i32)),
		Nr::Close => to_isize(close::close(ctx.process, ctx.fs, a[0] as i32)),
		Nr::Mmap => to_isize(mmap::mmap(
			ctx.process,
			ctx.fs,
			a[0] as i32,
			a[1],
			a[2],
			a[3] != 0,
			a[4] as u64,
		)),
		Nr::Munmap => to_isize(munmap::munmap(ctx.process, ctx.frames, a[0])),
		Nr::Chdir => to_isize(chdir::chdir(ctx.process, ctx.fs, ctx.frames, ctx.swap, ctx.sp, a[0])),
		Nr::Mkdir => to_isize(mkdir::mkdir(ctx.process, ctx.fs, ctx.frames, ctx.swap, ctx.sp, a[0])),
		Nr::Readdir => to_isize(readdir::readdir(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0] as i32,
			a[1],
		)),
		Nr::Isdir => to_isize(isdir::isdir(ctx.process, ctx.fs, a[0] as i32)),
		Nr::Inumber => to_isize(inumber::inumber(ctx.process, ctx.fs, a[0] as i32)),
		Nr::Symlink => to_isize(symlink::symlink(
			ctx.process,
			ctx.fs,
			ctx.frames,
			ctx.swap,
			ctx.sp,
			a[0],
			a[1],
		)),
	}
}

fn fail(errno: Errno) -> isize {
	crate::log!("syscall failed: {errno}");
	-1
}

/// Collapses a handler's [`EResult`] into the POSIX-style return convention:
/// the success value on `Ok`, `-1` on any `Err`.
///
/// [`EResult`]: crate::errno::EResult
trait IntoRet {
	fn into_ret(self) -> isize;
}

impl IntoRet for () {
	fn into_ret(self) -> isize {
		0
	}
}

impl IntoRet for bool {
	fn into_ret(self) -> isize {
		self as isize
	}
}

macro_rules! impl_into_ret_int {
	($($t:ty),*) => {
		$(impl IntoRet for $t {
			fn into_ret(self) -> isize {
				self as isize
			}
		})*
	};
}
impl_into_ret_int!(i32, u32, usize, u64);

fn to_isize<T: IntoRet>(result: Result<T, Errno>) -> isize {
	match result {
		Ok(v) => v.into_ret(),
		Err(e) => fail(e),
	}
}
