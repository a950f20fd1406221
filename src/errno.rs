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

//! Kernel-wide error codes.
//!
//! Every fallible facade operation returns [`EResult`]. Syscalls narrow this
//! down to the `-1`/positive-errno convention at the dispatch boundary
//! (see [`crate::syscall`]).

use std::fmt;

/// An abstract error kind, grouping the taxonomy described for the
/// filesystem, VM and process facades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
	/// No free cluster left in the FAT.
	ENOSPC,
	/// No free physical frame and eviction found nothing evictable.
	ENOMEM,
	/// The swap disk has no free slot.
	ENOSWAP,
	/// A path component does not exist.
	ENOENT,
	/// A name already exists where a unique name was required.
	EEXIST,
	/// A path component that should be a directory is not one.
	ENOTDIR,
	/// An operation required a directory to be empty.
	ENOTEMPTY,
	/// A name is empty, too long, or otherwise malformed.
	ENAMETOOLONG,
	/// An operation is not permitted on the current object (e.g. removing
	/// `.` or `..`, writing a deny-written executable).
	EPERM,
	/// An invalid argument was supplied.
	EINVAL,
	/// A user pointer did not refer to valid, mapped user memory.
	EFAULT,
	/// The executable being loaded has a malformed ELF header or program
	/// header.
	ENOEXEC,
	/// The given file descriptor is not open.
	EBADF,
	/// Too many symlink expansions were required to resolve a path.
	ELOOP,
	/// System-wide file descriptor table is full.
	ENFILE,
	/// The given pid is not a child of the caller, or has already been
	/// waited on.
	ECHILD,
}

impl Errno {
	/// Returns the conventional POSIX-style short name, as printed in
	/// kernel logs and `strace`-like traces.
	pub const fn name(self) -> &'static str {
		match self {
			Self::ENOSPC => "ENOSPC",
			Self::ENOMEM => "ENOMEM",
			Self::ENOSWAP => "ENOSWAP",
			Self::ENOENT => "ENOENT",
			Self::EEXIST => "EEXIST",
			Self::ENOTDIR => "ENOTDIR",
			Self::ENOTEMPTY => "ENOTEMPTY",
			Self::ENAMETOOLONG => "ENAMETOOLONG",
			Self::EPERM => "EPERM",
			Self::EINVAL => "EINVAL",
			Self::EFAULT => "EFAULT",
			Self::ENOEXEC => "ENOEXEC",
			Self::EBADF => "EBADF",
			Self::ELOOP => "ELOOP",
			Self::ENFILE => "ENFILE",
			Self::ECHILD => "ECHILD",
		}
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl std::error::Error for Errno {}

/// The result type returned by facade operations.
pub type EResult<T> = Result<T, Errno>;

/// Builds an [`Errno`] and logs it at the call site. Mirrors the
/// reference kernel's `errno!` macro, minus the no_std backtrace capture.
#[macro_export]
macro_rules! errno {
	($variant:ident) => {{
		$crate::errno::Errno::$variant
	}};
}
