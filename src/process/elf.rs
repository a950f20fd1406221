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

//! Just enough ELF64 parsing to drive the VM loader (§4.8): the header, the
//! loadable program headers, and the bounds checks that reject a malformed
//! image before any page gets mapped for it.

use crate::config::USER_STACK_TOP;
use crate::errno::{EResult, Errno};

const EI_NIDENT: usize = 16;
const ELFMAG: &[u8; 4] = b"\x7fELF";
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;
/// Segment flag: writable.
pub const PF_W: u32 = 0x2;

/// A `PT_LOAD` entry, with the fields the loader actually consults.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
	pub vaddr: usize,
	pub file_offset: u64,
	pub file_size: usize,
	pub mem_size: usize,
	pub writable: bool,
}

/// The subset of an ELF64 image the loader needs: entry point plus the
/// loadable segments, in file order.
#[derive(Debug)]
pub struct ElfImage {
	pub entry: usize,
	pub segments: Vec<Segment>,
}

fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
	Some(u16::from_le_bytes(bytes.get(off..off + 2)?.try_into().ok()?))
}

fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
	Some(u32::from_le_bytes(bytes.get(off..off + 4)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], off: usize) -> Option<u64> {
	Some(u64::from_le_bytes(bytes.get(off..off + 8)?.try_into().ok()?))
}

/// Parses and validates `bytes` as an ELF64 executable (§4.8 step 3).
/// Rejects anything with a bad magic/class/encoding, a program header table
/// out of range, or a `PT_LOAD` segment that would land outside the user
/// address range — all "format errors" per §7, surfaced as [`Errno::ENOEXEC`].
pub fn parse(bytes: &[u8]) -> EResult<ElfImage> {
	if bytes.len() < EI_NIDENT + 48 {
		return Err(Errno::ENOEXEC);
	}
	if &bytes[0..4] != ELFMAG {
		return Err(Errno::ENOEXEC);
	}
	if bytes[4] != ELFCLASS64 || bytes[5] != ELFDATA2LSB {
		return Err(Errno::ENOEXEC);
	}
	let e_entry = read_u64(bytes, 24).ok_or(Errno::ENOEXEC)? as usize;
	let e_phoff = read_u64(bytes, 32).ok_or(Errno::ENOEXEC)?;
	let e_phentsize = read_u16(bytes, 54).ok_or(Errno::ENOEXEC)? as usize;
	let e_phnum = read_u16(bytes, 56).ok_or(Errno::ENOEXEC)? as usize;
	if e_phentsize < 56 {
		return Err(Errno::ENOEXEC);
	}

	let mut segments = Vec::new();
	for i in 0..e_phnum {
		let base = e_phoff as usize + i * e_phentsize;
		let p_type = read_u32(bytes, base).ok_or(Errno::ENOEXEC)?;
		if p_type != PT_LOAD {
			continue;
		}
		let p_flags = read_u32(bytes, base + 4).ok_or(Errno::ENOEXEC)?;
		let p_offset = read_u64(bytes, base + 8).ok_or(Errno::ENOEXEC)?;
		let p_vaddr = read_u64(bytes, base + 16).ok_or(Errno::ENOEXEC)? as usize;
		let p_filesz = read_u64(bytes, base + 32).ok_or(Errno::ENOEXEC)? as usize;
		let p_memsz = read_u64(bytes, base + 40).ok_or(Errno::ENOEXEC)? as usize;

		let file_end = (p_offset as usize)
			.checked_add(p_filesz)
			.ok_or(Errno::ENOEXEC)?;
		if file_end > bytes.len() || p_filesz > p_memsz {
			return Err(Errno::ENOEXEC);
		}
		let mem_end = p_vaddr.checked_add(p_memsz).ok_or(Errno::ENOEXEC)?;
		if mem_end >= USER_STACK_TOP {
			return Err(Errno::ENOEXEC);
		}
		segments.push(Segment {
			vaddr: p_vaddr,
			file_offset: p_offset,
			file_size: p_filesz,
			mem_size: p_memsz,
			writable: p_flags & PF_W != 0,
		});
	}
	if e_entry >= USER_STACK_TOP {
		return Err(Errno::ENOEXEC);
	}
	Ok(ElfImage {
		entry: e_entry,
		segments,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn header(e_entry: u64, e_phoff: u64, e_phnum: u16) -> Vec<u8> {
		let mut h = vec![0u8; 64];
		h[0..4].copy_from_slice(ELFMAG);
		h[4] = ELFCLASS64;
		h[5] = ELFDATA2LSB;
		h[24..32].copy_from_slice(&e_entry.to_le_bytes());
		h[32..40].copy_from_slice(&e_phoff.to_le_bytes());
		h[54..56].copy_from_slice(&56u16.to_le_bytes());
		h[56..58].copy_from_slice(&e_phnum.to_le_bytes());
		h
	}

	fn push_phdr(buf: &mut Vec<u8>, p_type: u32, p_flags: u32, p_offset: u64, p_vaddr: u64, p_filesz: u64, p_memsz: u64) {
		buf.extend_from_slice(&p_type.to_le_bytes());
		buf.extend_from_slice(&p_flags.to_le_bytes());
		buf.extend_from_slice(&p_offset.to_le_bytes());
		buf.extend_from_slice(&p_vaddr.to_le_bytes());
		buf.extend_from_slice(&0u64.to_le_bytes()); // p_paddr
		buf.extend_from_slice(&p_filesz.to_le_bytes());
		buf.extend_from_slice(&p_memsz.to_le_bytes());
		buf.extend_from_slice(&0u64.to_le_bytes()); // p_align
	}

	#[test]
	fn rejects_bad_magic() {
		let bytes = vec![0u8; 128];
		assert_eq!(parse(&bytes), Err(Errno::ENOEXEC));
	}

	#[test]
	fn parses_one_load_segment() {
		let mut bytes = header(0x1000, 64, 1);
		push_phdr(&mut bytes, PT_LOAD, PF_W, 0, 0x1000, 16, 16);
		bytes.extend_from_slice(&[0xaa; 16]);
		let image = parse(&bytes).unwrap();
		assert_eq!(image.entry, 0x1000);
		assert_eq!(image.segments.len(), 1);
		assert!(image.segments[0].writable);
	}

	#[test]
	fn rejects_segment_past_user_space() {
		let mut bytes = header(0x1000, 64, 1);
		push_phdr(&mut bytes, PT_LOAD, 0, 0, USER_STACK_TOP as u64, 0, 16);
		assert_eq!(parse(&bytes), Err(Errno::ENOEXEC));
	}

	#[test]
	fn rejects_filesz_exceeding_memsz() {
		let mut bytes = header(0x1000, 64, 1);
		push_phdr(&mut bytes, PT_LOAD, 0, 0, 0x1000, 32, 16);
		assert_eq!(parse(&bytes), Err(Errno::ENOEXEC));
	}
}
