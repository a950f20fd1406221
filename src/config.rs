/*
 * Copyright 2025 Luc Lenôtre
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

//! Runtime configuration.
//!
//! The reference kernel bakes its configuration into the binary at build
//! time via a `toml`-parsed build script (see `build/config.rs` upstream).
//! Because this crate is hosted rather than booted as a kernel image, the
//! same pair of crates (`serde`, `toml`) is used to load an equivalent
//! document at runtime instead, so the sizing knobs below can be changed
//! without recompiling.

use serde::Deserialize;

/// Sector size in bytes. The spec parameterizes this; 512 is canonical.
pub const SECTOR_SIZE: usize = 512;
/// One cluster is one sector (`SECTORS_PER_CLUSTER = 1`).
pub const SECTORS_PER_CLUSTER: usize = 1;
/// Maximum length of a single path component.
pub const NAME_MAX: usize = 14;
/// Maximum length of a whole path.
pub const PATH_MAX: usize = 128;
/// Page size for the VM subsystem.
pub const PAGE_SIZE: usize = 4096;
/// Sectors making up one swapped-out page.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;
/// Bound on fixed-point symlink substitution (see §9's open question).
pub const MAX_SYMLINK_EXPANSIONS: usize = 8;
/// Top of the user address space; the stack starts just below this.
pub const USER_STACK_TOP: usize = 0xc000_0000;
/// How far below [`USER_STACK_TOP`] a faulting access is still considered
/// a legitimate stack-growth request.
pub const STACK_GROWTH_LIMIT: usize = 1 << 20;
/// A fault at `a` counts as stack growth only if the faulting stack
/// pointer is `a + STACK_FAULT_SLACK` or below (covers a `push`
/// instruction faulting just past the current top of stack).
pub const STACK_FAULT_SLACK: usize = 8;

/// Kernel-wide sizing configuration, loadable from a TOML document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
	/// Number of slots in the page cache (buffer cache).
	pub cache_size: usize,
	/// Number of physical frames in the frame pool.
	pub frame_count: usize,
	/// Number of page-sized slots on the swap disk.
	pub swap_slots: usize,
}

impl Default for KernelConfig {
	fn default() -> Self {
		Self {
			cache_size: 64,
			frame_count: 256,
			swap_slots: 256,
		}
	}
}

impl KernelConfig {
	/// Parses a configuration document, e.g. the contents of `tinix.toml`.
	pub fn parse(toml_text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(toml_text)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_empty() {
		let cfg = KernelConfig::parse("").unwrap();
		assert_eq!(cfg.cache_size, 64);
	}

	#[test]
	fn overrides_apply() {
		let cfg = KernelConfig::parse("cache_size = 8\nframe_count = 4\n").unwrap();
		assert_eq!(cfg.cache_size, 8);
		assert_eq!(cfg.frame_count, 4);
		assert_eq!(cfg.swap_slots, 256);
	}
}
