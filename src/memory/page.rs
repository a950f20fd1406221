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

//! Virtual page variants (C9): uninitialized, anonymous, and file-backed
//! pages, plus the stack marker that exempts a page from eviction.

use crate::config::PAGE_SIZE;
use crate::errno::EResult;
use crate::memory::frame::{Frame, FrameTable};
use crate::memory::swap::SwapDisk;
use crate::memory::table::PageTable;
use crate::memory::BackingFile;
use crate::sync::Mutex;
use std::sync::Arc;

/// What an [`PageVariant::Uninit`] page becomes once its initializer runs.
#[derive(Clone)]
pub enum UninitTarget {
	Anonymous,
	FileBacked {
		file: Arc<dyn BackingFile>,
		read_bytes: usize,
		offset: u64,
	},
}

/// The variant-specific state carried by a page (§3's "virtual page").
enum PageVariant {
	Uninit(UninitTarget),
	Anonymous {
		swap_slot: Option<u32>,
	},
	FileBacked {
		file: Arc<dyn BackingFile>,
		read_bytes: usize,
		offset: u64,
		dirty: bool,
	},
}

struct Inner {
	loaded: bool,
	frame: Option<Arc<Frame>>,
	variant: PageVariant,
	/// Second-chance "accessed" bit (§4.6). Set whenever the mapping is
	/// installed; a real MMU would also set it on every hardware access,
	/// which this hosted model cannot intercept, so [`Page::touch`] stands
	/// in for that at the few call sites (page-fault retries, `read`/
	/// `write` through user buffers) that know they just touched the page.
	accessed: bool,
}

/// One entry of a [`super::spt::Spt`].
pub struct Page {
	pub va: usize,
	writable: bool,
	stack_marker: bool,
	table: Arc<PageTable>,
	inner: Mutex<Inner>,
}

impl Page {
	/// A page with an unresolved initial state: either plain anonymous
	/// demand-zero, or file-backed.
	pub fn new_uninit(
		va: usize,
		writable: bool,
		table: Arc<PageTable>,
		target: UninitTarget,
	) -> Self {
		Self {
			va,
			writable,
			stack_marker: false,
			table,
			inner: Mutex::new(Inner {
				loaded: false,
				frame: None,
				variant: PageVariant::Uninit(target),
				accessed: false,
			}),
		}
	}

	/// A page that is already anonymous from the start (the common case:
	/// stack pages and `sbrk`-style heap growth).
	pub fn new_anonymous(va: usize, writable: bool, stack_marker: bool, table: Arc<PageTable>) -> Self {
		Self {
			va,
			writable,
			stack_marker,
			table,
			inner: Mutex::new(Inner {
				loaded: false,
				frame: None,
				variant: PageVariant::Anonymous { swap_slot: None },
				accessed: false,
			}),
		}
	}

	pub fn is_stack_marker(&self) -> bool {
		self.stack_marker
	}

	pub fn writable(&self) -> bool {
		self.writable
	}

	/// A copy of this page's still-unresolved variant descriptor, for
	/// fork's SPT copy of an unloaded page (§4.7). Panics if the page has
	/// already been claimed — callers check [`Page::is_loaded`] first, and
	/// `loaded` only ever becomes true together with the variant leaving
	/// `Uninit`.
	pub fn clone_uninit_target(&self) -> UninitTarget {
		match &self.inner.lock().variant {
			PageVariant::Uninit(target) => target.clone(),
			_ => unreachable!("clone_uninit_target called on a resolved page"),
		}
	}

	pub fn is_loaded(&self) -> bool {
		self.inner.lock().loaded
	}

	/// Reads and clears the accessed bit — the second-chance test of
	/// §4.6.
	pub fn accessed_then_clear(&self) -> bool {
		let mut inner = self.inner.lock();
		let was = inner.accessed;
		inner.accessed = false;
		was
	}

	/// Marks the page as having just been touched by its owning thread.
	pub fn touch(&self) {
		self.inner.lock().accessed = true;
	}

	/// The claim path (§4.7): acquire a frame, run the variant's
	/// `swap_in`, and install the mapping. Idempotent if already loaded.
	pub fn claim(&self, self_arc: &Arc<Page>, frames: &FrameTable, swap: &SwapDisk) -> EResult<()> {
		if self.is_loaded() {
			return Ok(());
		}
		let frame = frames.get_frame(swap, self_arc)?;
		let mut inner = self.inner.lock();
		let writable = match &mut inner.variant {
			PageVariant::Uninit(target) => {
				let (next, writable) = match target {
					UninitTarget::Anonymous => {
						frame.load(&[]);
						(PageVariant::Anonymous { swap_slot: None }, self.writable)
					}
					UninitTarget::FileBacked {
						file,
						read_bytes,
						offset,
					} => {
						let mut buf = vec![0u8; *read_bytes];
						file.read_at(*offset, &mut buf);
						frame.load(&buf);
						(
							PageVariant::FileBacked {
								file: file.clone(),
								read_bytes: *read_bytes,
								offset: *offset,
								dirty: false,
							},
							self.writable,
						)
					}
				};
				inner.variant = next;
				writable
			}
			PageVariant::Anonymous { swap_slot } => {
				match swap_slot.take() {
					Some(slot) => {
						let mut buf = [0u8; PAGE_SIZE];
						swap.read_slot(slot, &mut buf);
						frame.load(&buf);
						swap.free(slot);
					}
					None => frame.load(&[]),
				}
				self.writable
			}
			PageVariant::FileBacked {
				file,
				read_bytes,
				offset,
				dirty,
			} => {
				let mut buf = vec![0u8; *read_bytes];
				file.read_at(*offset, &mut buf);
				frame.load(&buf);
				*dirty = false;
				self.writable
			}
		};
		inner.frame = Some(frame.clone());
		inner.loaded = true;
		inner.accessed = true;
		self.table.install(self.va, frame.id, writable);
		Ok(())
	}

	/// The eviction protocol of §4.6: clear the mapping, then persist via
	/// the variant's `swap_out`, returning the frame to its caller (who
	/// already holds the frame-list lock and will reassign it).
	pub fn evict(&self, frame: &Frame, swap: &SwapDisk) {
		self.table.clear(self.va);
		let mut inner = self.inner.lock();
		match &mut inner.variant {
			PageVariant::Anonymous { swap_slot } => {
				let slot = swap.allocate();
				swap.write_slot(slot, &frame.snapshot());
				*swap_slot = Some(slot);
			}
			PageVariant::FileBacked {
				file,
				read_bytes,
				offset,
				dirty,
			} => {
				if *dirty {
					let bytes = frame.snapshot();
					file.write_at(*offset, &bytes[..*read_bytes]);
					*dirty = false;
				}
			}
			PageVariant::Uninit(_) => unreachable!("an unloaded page cannot be an eviction candidate"),
		}
		inner.loaded = false;
		inner.frame = None;
	}

	/// Marks a loaded, file-backed page dirty (a `write` syscall landed on
	/// it). No-op for other variants.
	pub fn mark_dirty(&self) {
		if let PageVariant::FileBacked { dirty, .. } = &mut self.inner.lock().variant {
			*dirty = true;
		}
		self.touch();
	}

	/// Used by `munmap`: if loaded and dirty, writes bytes back immediately
	/// rather than waiting for eviction.
	pub fn writeback_if_dirty(&self) {
		let mut inner = self.inner.lock();
		let Some(frame) = inner.frame.clone() else {
			return;
		};
		if let PageVariant::FileBacked {
			file,
			read_bytes,
			offset,
			dirty,
		} = &mut inner.variant
		{
			if *dirty {
				let bytes = frame.snapshot();
				file.write_at(*offset, &bytes[..*read_bytes]);
				*dirty = false;
			}
		}
	}

	/// The frame currently backing this page, if loaded.
	pub fn frame(&self) -> Option<Arc<Frame>> {
		self.inner.lock().frame.clone()
	}

	#[cfg(test)]
	pub fn mark_loaded_for_test(&self, frame: &Arc<Frame>) {
		let mut inner = self.inner.lock();
		inner.loaded = true;
		inner.frame = Some(frame.clone());
		inner.accessed = true;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::frame::FrameTable;

	#[test]
	fn anonymous_claim_zero_fills() {
		let table = Arc::new(PageTable::new());
		let page = Arc::new(Page::new_anonymous(0x1000, true, false, table.clone()));
		let frames = FrameTable::new(2);
		let swap = SwapDisk::new(2);
		page.claim(&page, &frames, &swap).unwrap();
		assert!(page.is_loaded());
		assert!(table.translate(0x1000).is_some());
	}

	#[test]
	fn swap_round_trip_preserves_bytes() {
		let table = Arc::new(PageTable::new());
		let page = Arc::new(Page::new_anonymous(0x1000, true, false, table));
		let frames = FrameTable::new(1);
		let swap = SwapDisk::new(1);
		page.claim(&page, &frames, &swap).unwrap();
		let frame = page.frame().unwrap();
		frame.load(&[0x55; 16]);
		page.evict(&frame, &swap);
		assert!(!page.is_loaded());
		frames.release(&frame);
		page.claim(&page, &frames, &swap).unwrap();
		let frame2 = page.frame().unwrap();
		assert_eq!(&frame2.snapshot()[..16], &[0x55; 16]);
	}

	#[test]
	fn uninit_file_backed_switches_variant_on_first_claim() {
		use crate::memory::HostFile;
		use std::io::Write as _;
		let mut file = tempfile::tempfile().unwrap();
		file.write_all(b"hello world").unwrap();
		let table = Arc::new(PageTable::new());
		let page = Arc::new(Page::new_uninit(
			0x2000,
			false,
			table,
			UninitTarget::FileBacked {
				file: Arc::new(HostFile::new(file)),
				read_bytes: 11,
				offset: 0,
			},
		));
		let frames = FrameTable::new(1);
		let swap = SwapDisk::new(1);
		page.claim(&page, &frames, &swap).unwrap();
		let frame = page.frame().unwrap();
		assert_eq!(&frame.snapshot()[..11], b"hello world");
	}
}
