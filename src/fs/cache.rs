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

//! Page cache (buffer cache, C2): a sector-granular write-back cache with
//! second-chance eviction in front of a [`BlockDevice`].
//!
//! A single lock guards every slot for the cache's whole lifetime (see §5);
//! this is coarse but matches the reference kernel's own page cache, which
//! is likewise protected by one lock across read/write/evict.

use crate::config::SECTOR_SIZE;
use crate::device::BlockDevice;
use crate::sync::Mutex;

/// One cached sector.
struct Slot {
	loaded: bool,
	dirty: bool,
	accessed: bool,
	sector_no: u64,
	buf: [u8; SECTOR_SIZE],
}

impl Slot {
	const fn empty() -> Self {
		Self {
			loaded: false,
			dirty: false,
			accessed: false,
			sector_no: 0,
			buf: [0; SECTOR_SIZE],
		}
	}
}

struct Inner {
	device: Box<dyn BlockDevice>,
	slots: Vec<Slot>,
	/// Clock hand for second-chance eviction.
	hand: usize,
}

impl Inner {
	/// Finds the slot index currently holding `sector`, if any.
	fn find(&self, sector: u64) -> Option<usize> {
		self.slots
			.iter()
			.position(|s| s.loaded && s.sector_no == sector)
	}

	/// Finds a free (unoccupied) slot index, if any.
	fn find_free(&self) -> Option<usize> {
		self.slots.iter().position(|s| !s.loaded)
	}

	/// Writes a dirty slot back to the device and clears its dirty bit.
	fn flush_slot(&mut self, idx: usize) {
		let slot = &mut self.slots[idx];
		if slot.dirty {
			self.device.write_sector(slot.sector_no, &slot.buf);
			slot.dirty = false;
		}
	}

	/// Second-chance clock: picks a slot to evict, flushing it first if
	/// dirty. Bounded at `2 * slots.len()` iterations (§4.1); exceeding
	/// that is a bug in the cache, not a recoverable runtime condition.
	fn evict_one(&mut self) -> usize {
		let n = self.slots.len();
		let bound = 2 * n.max(1);
		for _ in 0..bound {
			let idx = self.hand;
			self.hand = (self.hand + 1) % n;
			if self.slots[idx].accessed {
				self.slots[idx].accessed = false;
				continue;
			}
			self.flush_slot(idx);
			self.slots[idx].loaded = false;
			return idx;
		}
		panic!("page cache: second-chance eviction did not terminate within bound");
	}

	/// Returns the slot index backing `sector`, loading or evicting as
	/// necessary. A subsequent read of an untouched byte range in a
	/// partially-overwritten sector must still see real disk contents, so
	/// this always fetches on a fresh slot, even for writers.
	fn slot_for(&mut self, sector: u64) -> usize {
		if let Some(idx) = self.find(sector) {
			return idx;
		}
		let idx = self.find_free().unwrap_or_else(|| self.evict_one());
		let slot = &mut self.slots[idx];
		slot.sector_no = sector;
		slot.loaded = true;
		slot.dirty = false;
		slot.accessed = false;
		self.device.read_sector(sector, &mut slot.buf);
		idx
	}
}

/// The page cache (buffer cache).
pub struct Cache {
	inner: Mutex<Inner>,
}

impl Cache {
	/// Creates a cache of `slot_count` slots in front of `device`.
	pub fn new(device: Box<dyn BlockDevice>, slot_count: usize) -> Self {
		let slots = (0..slot_count.max(1)).map(|_| Slot::empty()).collect();
		Self {
			inner: Mutex::new(Inner {
				device,
				slots,
				hand: 0,
			}),
		}
	}

	/// Copies sector `sector`'s current contents into `buf`
	/// (`buf.len() == SECTOR_SIZE`).
	pub fn read(&self, sector: u64, buf: &mut [u8]) {
		let mut inner = self.inner.lock();
		let idx = inner.slot_for(sector);
		inner.slots[idx].accessed = true;
		buf.copy_from_slice(&inner.slots[idx].buf);
	}

	/// Overwrites sector `sector` with `buf` (`buf.len() == SECTOR_SIZE`).
	/// The write is visible to the device only once the slot is flushed
	/// (on eviction or [`Self::shutdown`]), but is visible to any
	/// subsequent [`Self::read`] of the same sector immediately.
	pub fn write(&self, sector: u64, buf: &[u8]) {
		let mut inner = self.inner.lock();
		let idx = inner.slot_for(sector);
		inner.slots[idx].buf.copy_from_slice(buf);
		inner.slots[idx].dirty = true;
		inner.slots[idx].accessed = true;
	}

	/// Flushes every dirty slot to the device.
	pub fn shutdown(&self) {
		let mut inner = self.inner.lock();
		for idx in 0..inner.slots.len() {
			inner.flush_slot(idx);
		}
	}
}
