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

//! End-to-end scenarios from the data model's testable-properties list,
//! exercised against the public facades rather than any one module's
//! internals.

use std::sync::Arc;
use std::thread;
use tinix::device::RamDisk;
use tinix::errno::Errno;
use tinix::fs::{Filesystem, Inode};
use tinix::memory::frame::FrameTable;
use tinix::memory::swap::SwapDisk;
use tinix::process::{Process, ProcessTable};
use tinix::syscall::{self, mem, Context, Nr, Regs};

fn new_fs() -> Filesystem {
	Filesystem::format(Box::new(RamDisk::new(2048)), 64).unwrap()
}

/// A minimal valid ELF64 image with one `PT_LOAD` segment, entry `0x1000`.
fn make_elf(data: &[u8]) -> Vec<u8> {
	let mut bytes = vec![0u8; 64 + 56];
	bytes[0..4].copy_from_slice(b"\x7fELF");
	bytes[4] = 2;
	bytes[5] = 1;
	bytes[24..32].copy_from_slice(&0x1000u64.to_le_bytes());
	bytes[32..40].copy_from_slice(&64u64.to_le_bytes());
	bytes[54..56].copy_from_slice(&56u16.to_le_bytes());
	bytes[56..58].copy_from_slice(&1u16.to_le_bytes());
	let ph = 64;
	bytes[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes());
	bytes[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes());
	bytes[ph + 8..ph + 16].copy_from_slice(&(120u64).to_le_bytes());
	bytes[ph + 16..ph + 24].copy_from_slice(&0x1000u64.to_le_bytes());
	bytes[ph + 32..ph + 40].copy_from_slice(&(data.len() as u64).to_le_bytes());
	bytes[ph + 40..ph + 48].copy_from_slice(&(data.len() as u64).to_le_bytes());
	bytes.extend_from_slice(data);
	bytes
}

fn write_elf(fs: &Filesystem, root: &Arc<Inode>, name: &str, data: &[u8]) {
	let elf = make_elf(data);
	fs.create(root, name, elf.len() as u32, false).unwrap();
	let mut fh = fs.open_path(root, name).unwrap();
	fs.write(&mut fh, &elf);
	fs.close_handle(fh);
}

fn boot(fs: &Filesystem, table: &ProcessTable, frames: &FrameTable, swap: &SwapDisk) -> Arc<Process> {
	let root = fs.open_root();
	write_elf(fs, &root, "/init", b"");
	let proc = Process::load(table, fs, frames, swap, &root, "/init", &[]).unwrap();
	fs.close_inode(root);
	proc
}

/// Scenario 1: create/read-back.
#[test]
fn create_read_back() {
	let fs = new_fs();
	let root = fs.open_root();
	fs.create(&root, "/a", 512, false).unwrap();
	let mut fh = fs.open_path(&root, "/a").unwrap();
	assert_eq!(fs.write(&mut fh, b"hello"), 5);
	fs.close_handle(fh);

	let mut fh2 = fs.open_path(&root, "/a").unwrap();
	let mut buf = [0u8; 5];
	assert_eq!(fs.read(&mut fh2, &mut buf), 5);
	assert_eq!(&buf, b"hello");
	fs.close_handle(fh2);
	fs.close_inode(root);
}

/// Scenario 2: directory uniqueness — a second `create` of the same name
/// under the same directory fails.
#[test]
fn directory_uniqueness() {
	let fs = new_fs();
	let root = fs.open_root();
	fs.create(&root, "/d", 0, true).unwrap();
	let dir = fs.chdir(&root, "/d").unwrap();
	fs.create(&dir, "x", 0, false).unwrap();
	assert_eq!(fs.create(&dir, "x", 0, false), Err(Errno::EEXIST));
	fs.close_inode(dir);
	fs.close_inode(root);
}

/// Scenario 3: a non-empty directory refuses removal until emptied.
#[test]
fn non_empty_dir_removal() {
	let fs = new_fs();
	let root = fs.open_root();
	fs.create(&root, "/d", 0, true).unwrap();
	fs.create(&root, "/d/x", 0, false).unwrap();
	assert_eq!(fs.remove(&root, "/d"), Err(Errno::ENOTEMPTY));
	fs.remove(&root, "/d/x").unwrap();
	fs.remove(&root, "/d").unwrap();
	fs.close_inode(root);
}

/// Scenario 4: a file's cluster chain grows to cover everything written to
/// it, and `filesize` reports the written length.
#[test]
fn file_extension() {
	let fs = new_fs();
	let root = fs.open_root();
	fs.create(&root, "/f", 0, false).unwrap();
	let mut fh = fs.open_path(&root, "/f").unwrap();
	let buf = vec![0x5au8; 10_000];
	let mut done = 0;
	while done < buf.len() {
		done += fs.write(&mut fh, &buf[done..]);
	}
	assert_eq!(fs.filesize(&fh), 10_000);
	fs.close_handle(fh);
	fs.close_inode(root);
}

/// Scenario 5: an access well below the current stack top, but still
/// within the growth slack, faults in a fresh stack page rather than
/// failing.
#[test]
fn stack_growth_on_demand() {
	let fs = new_fs();
	let table = ProcessTable::new();
	let frames = FrameTable::new(256);
	let swap = SwapDisk::new(256);
	let proc = boot(&fs, &table, &frames, &swap);

	let target = tinix::config::USER_STACK_TOP - 4096 - 8;
	let c = Context {
		process: &proc,
		table: &table,
		fs: &fs,
		frames: &frames,
		swap: &swap,
		sp: target,
	};
	let buf_addr = target - 64;
	proc.with_vm(|vm| mem::write_bytes(vm, &frames, &swap, c.sp, buf_addr, b"z"))
		.unwrap();
	let n = syscall::dispatch(&c, Regs::new(Nr::Read as u32, [0, buf_addr, 1, 0, 0, 0]));
	// fd 0 here reads from stdin in a hosted process, but the point of this
	// scenario is that the pointer validation step (which runs before the
	// handler touches the fd) didn't fail with EFAULT. Confirm the
	// underlying page actually got mapped.
	assert!(n >= -1);
	assert!(proc.with_vm(|vm| vm.table.translate(tinix::memory::page_floor(buf_addr))).is_some());
	proc.exit(&fs, &frames, 0);
}

/// Scenario 6: fork isolation — parent and child each see their own write
/// to a shared anonymous page's virtual address after fork, and each
/// process's `wait`-observed exit status reflects only its own write.
#[test]
fn fork_isolation_of_anonymous_pages() {
	let fs = Arc::new(new_fs());
	let table = Arc::new(ProcessTable::new());
	let frames = Arc::new(FrameTable::new(256));
	let swap = Arc::new(SwapDisk::new(256));
	let root = fs.open_root();
	write_elf(&fs, &root, "/init", b"");
	let parent = Process::load(&table, &fs, &frames, &swap, &root, "/init", &[]).unwrap();
	fs.close_inode(root);

	let x_addr = tinix::config::USER_STACK_TOP - 4096;
	let sp = tinix::config::USER_STACK_TOP - 4;
	parent
		.with_vm(|vm| mem::write_bytes(vm, &frames, &swap, sp, x_addr, &7i32.to_le_bytes()))
		.unwrap();

	let child_pid = parent.fork(&table, &fs, &frames, &swap).unwrap();
	let child = table.lookup(child_pid).unwrap();

	let fs2 = fs.clone();
	let frames2 = frames.clone();
	let swap2 = swap.clone();
	let handle = thread::spawn(move || {
		child
			.with_vm(|vm| mem::write_bytes(vm, &frames2, &swap2, sp, x_addr, &9i32.to_le_bytes()))
			.unwrap();
		child.exit(&fs2, &frames2, 9);
	});

	let status = parent.wait(&table, child_pid).unwrap();
	handle.join().unwrap();
	assert_eq!(status, 9);

	let mut buf = [0u8; 4];
	parent
		.with_vm(|vm| mem::read_bytes(vm, &frames, &swap, sp, x_addr, &mut buf))
		.unwrap();
	assert_eq!(i32::from_le_bytes(buf), 7);

	parent.exit(&fs, &frames, 7);
}
