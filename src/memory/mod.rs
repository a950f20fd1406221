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

//! Demand-paged virtual memory: the frame table and second-chance eviction
//! (C7), the supplemental page table and page variants (C8, C9), and the
//! per-process address space ([`VmSpace`]) that ties them together for
//! page-fault handling and `mmap`/`munmap`.

pub mod frame;
pub mod page;
pub mod spt;
pub mod swap;
pub mod table;

use crate::config::{PAGE_SIZE, STACK_FAULT_SLACK, STACK_GROWTH_LIMIT, USER_STACK_TOP};
use crate::errno::{EResult, Errno};
use crate::sync::Mutex;
use frame::FrameTable;
use page::Page;
use spt::Spt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use swap::SwapDisk;
use table::PageTable;

/// A file-like object a page can be lazily backed by: a real host file for
/// `mmap` (§4.7), or — via [`crate::fs::Filesystem::inode_file`] — one of
/// this kernel's own FAT-resident files, used by the loader for a running
/// executable's segments.
pub trait BackingFile: Send + Sync {
	/// Current length in bytes.
	fn len(&self) -> u64;
	/// Reads up to `buf.len()` bytes starting at `offset`, returning the
	/// number actually read; short reads are treated as EOF by the caller.
	fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize;
	/// Writes `buf` at `offset`, returning the number of bytes written.
	fn write_at(&self, offset: u64, buf: &[u8]) -> usize;
}

/// Adapts an ordinary host file to [`BackingFile`], for `mmap`.
pub struct HostFile(Mutex<File>);

impl HostFile {
	pub fn new(file: File) -> Self {
		Self(Mutex::new(file))
	}
}

impl BackingFile for HostFile {
	fn len(&self) -> u64 {
		self.0.lock().metadata().map(|m| m.len()).unwrap_or(0)
	}

	fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
		let mut f = self.0.lock();
		if f.seek(SeekFrom::Start(offset)).is_err() {
			return 0;
		}
		let mut total = 0;
		while total < buf.len() {
			match f.read(&mut buf[total..]) {
				Ok(0) | Err(_) => break,
				Ok(n) => total += n,
			}
		}
		total
	}

	fn write_at(&self, offset: u64, buf: &[u8]) -> usize {
		let mut f = self.0.lock();
		if f.seek(SeekFrom::Start(offset)).is_err() {
			return 0;
		}
		match f.write_all(buf) {
			Ok(()) => buf.len(),
			Err(_) => 0,
		}
	}
}

/// A range of pages mapped by one `mmap` call, tracked so `munmap` can tear
/// it down as a unit (§4.7).
pub struct MmapRegion {
	pub addr: usize,
	pub length: usize,
	pages: Vec<Arc<Page>>,
}

/// A process's virtual address space: its page table, supplemental page
/// table, and the `mmap` regions layered over both.
pub struct VmSpace {
	pub table: Arc<PageTable>,
	pub spt: Arc<Spt>,
	mmap_regions: Mutex<Vec<MmapRegion>>,
}

/// Rounds `addr` down to a page boundary.
pub fn page_floor(addr: usize) -> usize {
	addr & !(PAGE_SIZE - 1)
}

impl VmSpace {
	pub fn new() -> Self {
		let table = Arc::new(PageTable::new());
		Self {
			spt: Arc::new(Spt::new(table.clone())),
			table,
			mmap_regions: Mutex::new(Vec::new()),
		}
	}

	/// Claims a single anonymous stack page at the top of the user address
	/// space (step 4 of §4.8's load sequence).
	pub fn init_stack(&self, frames: &FrameTable, swap: &SwapDisk) -> EResult<()> {
		let va = page_floor(USER_STACK_TOP - PAGE_SIZE);
		let page = self.spt.insert_anonymous(va, true, true)?;
		page.claim(&page, frames, swap)
	}

	/// Page-fault entry point (§4.7). `sp` is the faulting thread's stack
	/// pointer at the time of the fault, used to distinguish a legitimate
	/// stack-growth fault from a wild access.
	pub fn handle_fault(
		&self,
		addr: usize,
		sp: usize,
		frames: &FrameTable,
		swap: &SwapDisk,
	) -> EResult<()> {
		if addr >= USER_STACK_TOP {
			return Err(Errno::EFAULT);
		}
		let va = page_floor(addr);
		if let Some(page) = self.spt.find(va) {
			return page.claim(&page, frames, swap);
		}
		let within_growth_zone = addr + STACK_GROWTH_LIMIT >= USER_STACK_TOP;
		let looks_like_push = sp <= addr + STACK_FAULT_SLACK;
		if within_growth_zone && looks_like_push {
			let page = self.spt.insert_anonymous(va, true, true)?;
			return page.claim(&page, frames, swap);
		}
		Err(Errno::EFAULT)
	}

	/// `mmap(addr, length, writable, file, offset)` (§4.7). Every page
	/// shares the same `file` handle; since [`BackingFile`] access is
	/// offset-based rather than cursor-based, that sharing costs nothing
	/// and needs no per-page duplication.
	pub fn mmap(
		&self,
		addr: usize,
		length: usize,
		writable: bool,
		file: Arc<dyn BackingFile>,
		offset: u64,
	) -> EResult<usize> {
		if addr % PAGE_SIZE != 0 || length == 0 || offset >= PAGE_SIZE as u64 {
			return Err(Errno::EINVAL);
		}
		let mut regions = self.mmap_regions.lock();
		if regions.iter().any(|r| r.addr == addr) {
			return Err(Errno::EINVAL);
		}
		let file_len = file.len();
		let mut pages = Vec::new();
		let page_count = length.div_ceil(PAGE_SIZE);
		for i in 0..page_count {
			let page_offset = offset + (i * PAGE_SIZE) as u64;
			let read_bytes = file_len.saturating_sub(page_offset).min(PAGE_SIZE as u64) as usize;
			let page = self.spt.insert_file_backed(
				addr + i * PAGE_SIZE,
				writable,
				file.clone(),
				read_bytes,
				page_offset,
			)?;
			pages.push(page);
		}
		regions.push(MmapRegion {
			addr,
			length,
			pages,
		});
		Ok(addr)
	}

	/// `munmap(addr)`: writes back dirty loaded pages, then drops the
	/// region's entries from the SPT.
	pub fn munmap(&self, addr: usize, frames: &FrameTable) -> EResult<()> {
		let mut regions = self.mmap_regions.lock();
		let idx = regions
			.iter()
			.position(|r| r.addr == addr)
			.ok_or(Errno::EINVAL)?;
		let region = regions.remove(idx);
		for page in &region.pages {
			page.writeback_if_dirty();
			self.spt.remove(page.va, frames);
		}
		Ok(())
	}

	/// Releases everything on process termination, in the order §5
	/// prescribes past the point files/executable/mmap have already been
	/// torn down: address space, SPT.
	pub fn kill(&self, frames: &FrameTable) {
		self.spt.kill(frames);
	}
}

impl Default for VmSpace {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn page_floor_rounds_down() {
		assert_eq!(page_floor(0x1001), 0x1000);
		assert_eq!(page_floor(0x1000), 0x1000);
	}

	#[test]
	fn stack_init_claims_a_frame() {
		let space = VmSpace::new();
		let frames = FrameTable::new(4);
		let swap = SwapDisk::new(4);
		space.init_stack(&frames, &swap).unwrap();
		let va = page_floor(USER_STACK_TOP - PAGE_SIZE);
		assert!(space.table.translate(va).is_some());
	}

	#[test]
	fn fault_below_stack_grows_it() {
		let space = VmSpace::new();
		let frames = FrameTable::new(4);
		let swap = SwapDisk::new(4);
		space.init_stack(&frames, &swap).unwrap();
		let stack_bottom = page_floor(USER_STACK_TOP - PAGE_SIZE);
		let grown_va = stack_bottom - PAGE_SIZE;
		space
			.handle_fault(grown_va, grown_va, &frames, &swap)
			.unwrap();
		assert!(space.table.translate(grown_va).is_some());
	}

	#[test]
	fn fault_far_from_stack_is_rejected() {
		let space = VmSpace::new();
		let frames = FrameTable::new(4);
		let swap = SwapDisk::new(4);
		let far_below = USER_STACK_TOP - STACK_GROWTH_LIMIT * 2;
		assert_eq!(
			space.handle_fault(far_below, far_below, &frames, &swap),
			Err(Errno::EFAULT)
		);
	}

	#[test]
	fn mmap_rejects_unaligned_addr() {
		let space = VmSpace::new();
		let file: Arc<dyn BackingFile> = Arc::new(HostFile::new(tempfile::tempfile().unwrap()));
		assert_eq!(space.mmap(1, PAGE_SIZE, true, file, 0), Err(Errno::EINVAL));
	}

	#[test]
	fn mmap_then_munmap_round_trip() {
		let space = VmSpace::new();
		let frames = FrameTable::new(4);
		let mut raw = tempfile::tempfile().unwrap();
		raw.write_all(&vec![7u8; PAGE_SIZE]).unwrap();
		let file: Arc<dyn BackingFile> = Arc::new(HostFile::new(raw));
		let addr = space.mmap(0x1000, PAGE_SIZE, true, file, 0).unwrap();
		assert_eq!(addr, 0x1000);
		assert!(space.spt.find(0x1000).is_some());
		space.munmap(0x1000, &frames).unwrap();
		assert!(space.spt.find(0x1000).is_none());
	}
}
