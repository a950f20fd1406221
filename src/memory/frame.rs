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

//! Frame table & second-chance eviction (C7): a fixed pool of physical
//! frames shared by every process, with a clock hand walking the list in
//! insertion order to pick a victim when the pool is exhausted.

use crate::config::PAGE_SIZE;
use crate::errno::EResult;
use crate::memory::page::Page;
use crate::memory::swap::SwapDisk;
use crate::sync::Mutex;
use std::sync::Arc;

/// One page-sized slab of physical memory.
pub struct Frame {
	pub id: usize,
	data: Mutex<Box<[u8; PAGE_SIZE]>>,
	owner: Mutex<Option<Arc<Page>>>,
}

impl Frame {
	fn fresh(id: usize) -> Self {
		Self {
			id,
			data: Mutex::new(Box::new([0u8; PAGE_SIZE])),
			owner: Mutex::new(None),
		}
	}

	fn zero(&self) {
		self.data.lock().fill(0);
	}

	/// Copies `bytes` in at offset 0, zero-filling the remainder of the
	/// frame (used for both "read file bytes, zero the tail" and loading a
	/// swap slot back in).
	pub fn load(&self, bytes: &[u8]) {
		let mut data = self.data.lock();
		let n = bytes.len().min(PAGE_SIZE);
		data[..n].copy_from_slice(&bytes[..n]);
		data[n..].fill(0);
	}

	/// A copy of the frame's current contents, e.g. for writing back to a
	/// file or a swap slot.
	pub fn snapshot(&self) -> [u8; PAGE_SIZE] {
		let mut out = [0u8; PAGE_SIZE];
		out.copy_from_slice(self.data.lock().as_slice());
		out
	}

	/// Byte-for-byte copy from `src` into `self`, used by [`super::spt::Spt::copy`]
	/// when duplicating a loaded page on fork.
	pub fn copy_from(&self, src: &Frame) {
		*self.data.lock() = src.data.lock().clone();
	}

	/// Overwrites `bytes.len()` bytes starting at `offset`, used by the
	/// process loader to place argv strings and segment contents directly
	/// into an already-claimed frame.
	pub fn write_at(&self, offset: usize, bytes: &[u8]) {
		let mut data = self.data.lock();
		data[offset..offset + bytes.len()].copy_from_slice(bytes);
	}

	/// Copies `buf.len()` bytes starting at `offset` out of the frame, used
	/// by the syscall dispatcher to read through a user pointer.
	pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
		let data = self.data.lock();
		buf.copy_from_slice(&data[offset..offset + buf.len()]);
	}
}

/// The global pool of physical frames.
pub struct FrameTable {
	frames: Vec<Arc<Frame>>,
	/// Doubles as the frame-list lock of §5: held for the whole scan/evict
	/// sequence, not just the clock-hand update.
	clock: Mutex<usize>,
}

impl FrameTable {
	pub fn new(count: usize) -> Self {
		Self {
			frames: (0..count).map(|id| Arc::new(Frame::fresh(id))).collect(),
			clock: Mutex::new(0),
		}
	}

	/// Returns a frame now owned by `owner`, evicting a victim if the pool
	/// is full (§4.6's `get_frame`).
	pub fn get_frame(&self, swap: &SwapDisk, owner: &Arc<Page>) -> EResult<Arc<Frame>> {
		let mut hand = self.clock.lock();
		for frame in &self.frames {
			let mut slot = frame.owner.lock();
			if slot.is_none() {
				*slot = Some(owner.clone());
				drop(slot);
				frame.zero();
				return Ok(frame.clone());
			}
		}
		self.evict_locked(&mut hand, swap, owner)
	}

	fn evict_locked(
		&self,
		hand: &mut usize,
		swap: &SwapDisk,
		new_owner: &Arc<Page>,
	) -> EResult<Arc<Frame>> {
		let n = self.frames.len();
		let bound = 2 * n;
		for _ in 0..bound {
			let idx = *hand % n;
			*hand = (idx + 1) % n;
			let frame = &self.frames[idx];
			let mut slot = frame.owner.lock();
			let Some(page) = slot.clone() else {
				continue;
			};
			if page.is_stack_marker() {
				continue;
			}
			if page.accessed_then_clear() {
				continue;
			}
			drop(slot);
			page.evict(frame, swap);
			let mut slot = frame.owner.lock();
			*slot = Some(new_owner.clone());
			drop(slot);
			frame.zero();
			return Ok(frame.clone());
		}
		panic!("frame eviction scan exceeded 2x the frame list length");
	}

	/// Releases `frame` back to the free pool without going through
	/// eviction (used when a page is explicitly destroyed, e.g. `munmap`
	/// or [`super::spt::Spt::remove`]).
	pub fn release(&self, frame: &Frame) {
		*self.frames[frame.id].owner.lock() = None;
	}

	/// Looks up a frame by its pool-assigned id, e.g. to write through a
	/// page-table translation obtained from [`super::table::PageTable::translate`].
	pub fn frame_by_id(&self, id: usize) -> &Arc<Frame> {
		&self.frames[id]
	}

	/// Number of frames with no owner.
	pub fn free_count(&self) -> usize {
		self.frames
			.iter()
			.filter(|f| f.owner.lock().is_none())
			.count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::table::PageTable;

	fn leaf_page(va: usize) -> Arc<Page> {
		Arc::new(Page::new_anonymous(va, true, false, Arc::new(PageTable::new())))
	}

	#[test]
	fn fresh_pool_hands_out_distinct_frames() {
		let frames = FrameTable::new(2);
		let swap = SwapDisk::new(2);
		let a = leaf_page(0x1000);
        let b = leaf_page(0x2000);
		let fa = frames.get_frame(&swap, &a).unwrap();
		let fb = frames.get_frame(&swap, &b).unwrap();
		assert_ne!(fa.id, fb.id);
		assert_eq!(frames.free_count(), 0);
	}

	#[test]
	fn exhausted_pool_evicts_unaccessed_victim() {
		let frames = FrameTable::new(1);
		let swap = SwapDisk::new(1);
		let a = leaf_page(0x1000);
		let fa = frames.get_frame(&swap, &a).unwrap();
		a.mark_loaded_for_test(&fa);
		let b = leaf_page(0x2000);
		let fb = frames.get_frame(&swap, &b).unwrap();
		assert_eq!(fa.id, fb.id);
	}

	#[test]
	fn stack_marker_is_never_evicted() {
		let frames = FrameTable::new(1);
		let swap = SwapDisk::new(1);
		let stack = Arc::new(Page::new_anonymous(0x1000, true, true, Arc::new(PageTable::new())));
		let frame = frames.get_frame(&swap, &stack).unwrap();
		stack.mark_loaded_for_test(&frame);
		let other = leaf_page(0x2000);
		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			frames.get_frame(&swap, &other)
		}));
		assert!(result.is_err());
	}
}
