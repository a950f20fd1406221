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

//! Directory layer (C5): named entries within a directory inode, `.`/`..`
//! handling, and the fixed-size entry record of §6.
//!
//! Offset 0 holds `.` (self), offset 1 holds `..` (parent) — the resolution
//! spec picks for §9's open question between the two disagreeing source
//! conventions. Root's `..` points to root.

use crate::config::NAME_MAX;
use crate::errno::{EResult, Errno};
use crate::fs::inode::{Inode, InodeTable};
use std::sync::Arc;

/// Size in bytes of one on-disk directory entry:
/// `inode_sector: u32, name: [u8; NAME_MAX + 1], in_use: bool`.
pub const ENTRY_SIZE: usize = 4 + (NAME_MAX + 1) + 1;

/// One directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub inode_sector: u32,
	pub name: String,
	pub in_use: bool,
}

impl DirEntry {
	fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
		let mut buf = [0u8; ENTRY_SIZE];
		buf[0..4].copy_from_slice(&self.inode_sector.to_le_bytes());
		let name_bytes = self.name.as_bytes();
		let n = name_bytes.len().min(NAME_MAX);
		buf[4..4 + n].copy_from_slice(&name_bytes[..n]);
		buf[4 + NAME_MAX + 1] = self.in_use as u8;
		buf
	}

	fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
		let inode_sector = u32::from_le_bytes(buf[0..4].try_into().unwrap());
		let name_end = buf[4..4 + NAME_MAX + 1]
			.iter()
			.position(|&b| b == 0)
			.unwrap_or(NAME_MAX + 1);
		let name = String::from_utf8_lossy(&buf[4..4 + name_end]).into_owned();
		let in_use = buf[4 + NAME_MAX + 1] != 0;
		Self {
			inode_sector,
			name,
			in_use,
		}
	}
}

/// Offset (in entry slots) of `.`.
const SELF_SLOT: u32 = 0;
/// Offset (in entry slots) of `..`.
const PARENT_SLOT: u32 = 1;
/// First slot usable by real entries.
const FIRST_REAL_SLOT: u32 = 2;

/// Operations on a directory, layered on top of [`InodeTable`].
pub struct DirOps {
	inodes: Arc<InodeTable>,
}

impl DirOps {
	pub fn new(inodes: Arc<InodeTable>) -> Self {
		Self { inodes }
	}

	fn read_slot(&self, dir: &Inode, slot: u32) -> Option<DirEntry> {
		let mut buf = [0u8; ENTRY_SIZE];
		let n = self
			.inodes
			.read_at(dir, &mut buf, slot * ENTRY_SIZE as u32);
		if n < ENTRY_SIZE {
			return None;
		}
		Some(DirEntry::from_bytes(&buf))
	}

	fn write_slot(&self, dir: &Inode, slot: u32, entry: &DirEntry) {
		self.inodes
			.write_at(dir, &entry.to_bytes(), slot * ENTRY_SIZE as u32);
	}

	/// Number of entry slots currently backed by the directory's data
	/// (including the two reserved ones).
	fn slot_count(&self, dir: &Inode) -> u32 {
		(dir.length().max(0) as u32) / ENTRY_SIZE as u32
	}

	/// Initializes a freshly created directory inode's `.`/`..` entries.
	pub fn init_self_parent(&self, dir: &Inode, dir_sector: u32, parent_sector: u32) {
		self.write_slot(
			dir,
			SELF_SLOT,
			&DirEntry {
				inode_sector: dir_sector,
				name: ".".into(),
				in_use: true,
			},
		);
		self.write_slot(
			dir,
			PARENT_SLOT,
			&DirEntry {
				inode_sector: parent_sector,
				name: "..".into(),
				in_use: true,
			},
		);
	}

	/// Looks up `name` in `dir`, resolving `.`/`..` against the reserved
	/// slots and scanning in-use entries otherwise.
	pub fn lookup(&self, dir: &Inode, name: &str) -> Option<u32> {
		if name == "." {
			return self.read_slot(dir, SELF_SLOT).map(|e| e.inode_sector);
		}
		if name == ".." {
			return self.read_slot(dir, PARENT_SLOT).map(|e| e.inode_sector);
		}
		let count = self.slot_count(dir);
		for slot in FIRST_REAL_SLOT..count {
			if let Some(entry) = self.read_slot(dir, slot) {
				if entry.in_use && entry.name == name {
					return Some(entry.inode_sector);
				}
			}
		}
		None
	}

	/// Adds `name -> inode_sector` to `dir`. Fails if `name` is empty, too
	/// long, or already present.
	pub fn add(&self, dir: &Inode, name: &str, inode_sector: u32) -> EResult<()> {
		if name.is_empty() {
			return Err(Errno::ENAMETOOLONG);
		}
		if name.len() > NAME_MAX {
			return Err(Errno::ENAMETOOLONG);
		}
		if self.lookup(dir, name).is_some() {
			return Err(Errno::EEXIST);
		}
		let count = self.slot_count(dir);
		let mut target = None;
		for slot in FIRST_REAL_SLOT..count {
			if let Some(entry) = self.read_slot(dir, slot) {
				if !entry.in_use {
					target = Some(slot);
					break;
				}
			}
		}
		let slot = target.unwrap_or(count.max(FIRST_REAL_SLOT));
		self.write_slot(
			dir,
			slot,
			&DirEntry {
				inode_sector,
				name: name.to_string(),
				in_use: true,
			},
		);
		Ok(())
	}

	/// Removes `name` from `dir`. Fails for `.`/`..`; callers are
	/// responsible for ensuring a directory target is empty before
	/// calling this (the facade enforces that, §4.5).
	pub fn remove_entry(&self, dir: &Inode, name: &str) -> EResult<u32> {
		if name == "." || name == ".." {
			return Err(Errno::EPERM);
		}
		let count = self.slot_count(dir);
		for slot in FIRST_REAL_SLOT..count {
			if let Some(mut entry) = self.read_slot(dir, slot) {
				if entry.in_use && entry.name == name {
					let sector = entry.inode_sector;
					entry.in_use = false;
					self.write_slot(dir, slot, &entry);
					return Ok(sector);
				}
			}
		}
		Err(Errno::ENOENT)
	}

	/// True iff no in-use entry exists past the two reserved slots.
	pub fn is_empty(&self, dir: &Inode) -> bool {
		let count = self.slot_count(dir);
		for slot in FIRST_REAL_SLOT..count {
			if let Some(entry) = self.read_slot(dir, slot) {
				if entry.in_use {
					return false;
				}
			}
		}
		true
	}

	/// Returns the name of the `index`-th in-use entry past the reserved
	/// slots, advancing a readdir cursor (see [`crate::process::DirHandle`]).
	pub fn readdir_at(&self, dir: &Inode, mut slot: u32) -> (Option<String>, u32) {
		let count = self.slot_count(dir);
		while slot < count {
			if let Some(entry) = self.read_slot(dir, slot) {
				slot += 1;
				if entry.in_use {
					return (Some(entry.name), slot);
				}
			} else {
				slot += 1;
			}
		}
		(None, slot)
	}

	/// First readdir slot, skipping the two reserved entries.
	pub fn first_slot() -> u32 {
		FIRST_REAL_SLOT
	}
}
