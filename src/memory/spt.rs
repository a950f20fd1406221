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

//! Supplemental page table (C8): per-thread map from page-aligned virtual
//! address to [`Page`], plus the page-by-page copy that fork uses to give
//! the child its own address space.

use crate::errno::{EResult, Errno};
use crate::memory::frame::FrameTable;
use crate::memory::page::{Page, UninitTarget};
use crate::memory::swap::SwapDisk;
use crate::memory::table::PageTable;
use crate::memory::BackingFile;
use crate::sync::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One thread's supplemental page table, bound to the page table it
/// installs mappings into.
pub struct Spt {
	table: Arc<PageTable>,
	pages: Mutex<HashMap<usize, Arc<Page>>>,
}

impl Spt {
	pub fn new(table: Arc<PageTable>) -> Self {
		Self {
			table,
			pages: Mutex::new(HashMap::new()),
		}
	}

	/// Fails with [`Errno::EEXIST`] if `page.va` is already present.
	pub fn insert(&self, page: Arc<Page>) -> EResult<()> {
		let mut pages = self.pages.lock();
		if pages.contains_key(&page.va) {
			return Err(Errno::EEXIST);
		}
		pages.insert(page.va, page);
		Ok(())
	}

	/// Creates and inserts a lazily file-backed page at `va`.
	pub fn insert_file_backed(
		&self,
		va: usize,
		writable: bool,
		file: Arc<dyn BackingFile>,
		read_bytes: usize,
		offset: u64,
	) -> EResult<Arc<Page>> {
		let page = Arc::new(Page::new_uninit(
			va,
			writable,
			self.table.clone(),
			UninitTarget::FileBacked {
				file,
				read_bytes,
				offset,
			},
		));
		self.insert(page.clone())?;
		Ok(page)
	}

	/// Creates and inserts a demand-zero anonymous page at `va`.
	pub fn insert_anonymous(&self, va: usize, writable: bool, stack_marker: bool) -> EResult<Arc<Page>> {
		let page = Arc::new(Page::new_anonymous(va, writable, stack_marker, self.table.clone()));
		self.insert(page.clone())?;
		Ok(page)
	}

	pub fn find(&self, va: usize) -> Option<Arc<Page>> {
		self.pages.lock().get(&va).cloned()
	}

	/// Removes `va`'s entry, returning its frame (if loaded) to `frames`.
	pub fn remove(&self, va: usize, frames: &FrameTable) -> Option<Arc<Page>> {
		let page = self.pages.lock().remove(&va)?;
		if let Some(frame) = page.frame() {
			frames.release(&frame);
		}
		Some(page)
	}

	/// Destroys every page, releasing loaded frames back to `frames`.
	pub fn kill(&self, frames: &FrameTable) {
		let pages: Vec<_> = self.pages.lock().drain().map(|(_, p)| p).collect();
		for page in pages {
			if let Some(frame) = page.frame() {
				frames.release(&frame);
			}
		}
	}

	/// Fork's SPT copy (§4.7): for each page in `self`, give `dst` a
	/// matching page. A loaded page is deep-copied via a fresh frame; an
	/// unloaded (still `Uninit`) page copies its lazy descriptor so the
	/// child re-runs the same initializer independently, never costing a
	/// frame for a segment neither side has touched yet.
	pub fn copy(&self, dst: &Spt, frames: &FrameTable, swap: &SwapDisk) -> EResult<()> {
		let entries: Vec<_> = self.pages.lock().values().cloned().collect();
		for src_page in entries {
			if src_page.is_loaded() {
				let new_page = dst.insert_anonymous(src_page.va, src_page.writable(), src_page.is_stack_marker())?;
				new_page.claim(&new_page, frames, swap)?;
				let src_frame = src_page.frame().expect("loaded page has a frame");
				let dst_frame = new_page.frame().expect("just claimed");
				dst_frame.copy_from(&src_frame);
			} else {
				let target = src_page.clone_uninit_target();
				let new_page = Arc::new(Page::new_uninit(
					src_page.va,
					src_page.writable(),
					dst.table.clone(),
					target,
				));
				dst.insert(new_page)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_rejects_duplicate_address() {
		let spt = Spt::new(Arc::new(PageTable::new()));
		spt.insert_anonymous(0x1000, true, false).unwrap();
		assert_eq!(spt.insert_anonymous(0x1000, true, false).err(), Some(Errno::EEXIST));
	}

	#[test]
	fn remove_releases_frame() {
		let spt = Spt::new(Arc::new(PageTable::new()));
		let page = spt.insert_anonymous(0x1000, true, false).unwrap();
		let frames = FrameTable::new(1);
		let swap = SwapDisk::new(1);
		page.claim(&page, &frames, &swap).unwrap();
		assert_eq!(frames.free_count(), 0);
		spt.remove(0x1000, &frames);
		assert_eq!(frames.free_count(), 1);
	}

	#[test]
	fn copy_duplicates_loaded_page_contents() {
		let src_table = Arc::new(PageTable::new());
		let dst_table = Arc::new(PageTable::new());
		let src = Spt::new(src_table);
		let dst = Spt::new(dst_table);
		let frames = FrameTable::new(4);
		let swap = SwapDisk::new(4);
		let page = src.insert_anonymous(0x1000, true, false).unwrap();
		page.claim(&page, &frames, &swap).unwrap();
		page.frame().unwrap().load(b"parent-data");
		src.copy(&dst, &frames, &swap).unwrap();
		let copied = dst.find(0x1000).unwrap();
		assert!(copied.is_loaded());
		assert_eq!(&copied.frame().unwrap().snapshot()[..11], b"parent-data");
	}

	#[test]
	fn copy_of_unloaded_page_stays_unloaded() {
		let src = Spt::new(Arc::new(PageTable::new()));
		let dst = Spt::new(Arc::new(PageTable::new()));
		let frames = FrameTable::new(4);
		let swap = SwapDisk::new(4);
		src.insert_anonymous(0x1000, true, false).unwrap();
		src.copy(&dst, &frames, &swap).unwrap();
		let copied = dst.find(0x1000).unwrap();
		assert!(!copied.is_loaded());
		assert_eq!(frames.free_count(), 4);
	}
}
