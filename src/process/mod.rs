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

//! Process lifecycle (C10): `load`/`fork`/`exec`/`wait`/`exit` over the
//! fs and memory facades, plus the fd table, pid allocator and ELF/stack
//! helpers that back them.
//!
//! Processes are modeled as real OS threads (see [`crate::sync`]): `fork`
//! and `exit`/`wait` hand off through genuine [`Semaphore`]s rather than a
//! simulated scheduler, so a caller that wants the real concurrent
//! handshake (a child exiting on one thread while its parent waits on
//! another) can just `std::thread::spawn` it, the same way this crate's own
//! tests do.
//!
//! Executing the loaded image's own instructions is out of scope (see
//! [`elf`]): `load`/`exec` stop at recording the entry point, initial stack
//! pointer, and argument vector a real trap-frame setup would consume.

pub mod elf;
pub mod fd;
pub mod pid;
pub mod stack;

use crate::config::PAGE_SIZE;
use crate::errno::{EResult, Errno};
use crate::fs::{FileHandle, Filesystem, Inode};
use crate::memory::frame::FrameTable;
use crate::memory::page::Page;
use crate::memory::swap::SwapDisk;
use crate::memory::VmSpace;
use crate::sync::{Mutex, Semaphore};
use fd::FdTable;
use pid::{Pid, PidAllocator};
use std::collections::HashMap;
use std::sync::Arc;

/// A process's run state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Ready,
	Running,
	Blocked,
	Dying,
}

/// What `load`/`exec` hand back for a process to record: everything a real
/// trap-frame setup would need to resume into user mode.
#[derive(Debug, Clone, Copy)]
pub struct LoadedImage {
	pub entry: usize,
	pub initial_sp: usize,
	pub argc: usize,
	pub argv: usize,
}

/// One process (§3). Every lifecycle method takes the kernel-wide
/// subsystems it needs (`fs`, `frames`, `swap`, [`ProcessTable`]) as
/// explicit arguments rather than bundling them into a context struct,
/// matching how [`crate::memory::VmSpace`] and [`Filesystem`] are already
/// threaded through this crate.
pub struct Process {
	pub pid: Pid,
	status: Mutex<Status>,
	priority: Mutex<i32>,
	parent: Option<Pid>,
	children: Mutex<Vec<Pid>>,
	exit_status: Mutex<Option<i32>>,
	wait_semaphore: Semaphore,
	exit_semaphore: Semaphore,
	fork_copy_semaphore: Semaphore,
	fork_copy_ok: Mutex<bool>,
	pub fds: FdTable,
	cwd: Mutex<Arc<Inode>>,
	vm: Mutex<VmSpace>,
	program_file: Mutex<Option<FileHandle>>,
	image: Mutex<Option<LoadedImage>>,
}

/// The system-wide table of live processes, keyed by pid.
pub struct ProcessTable {
	pids: PidAllocator,
	processes: Mutex<HashMap<Pid, Arc<Process>>>,
}

impl ProcessTable {
	pub fn new() -> Self {
		Self {
			pids: PidAllocator::new(),
			processes: Mutex::new(HashMap::new()),
		}
	}

	fn register(&self, process: Arc<Process>) {
		self.processes.lock().insert(process.pid, process);
	}

	pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
		self.processes.lock().get(&pid).cloned()
	}

	/// Drops a reaped process from the table, e.g. once its parent's
	/// `wait` has collected its exit status.
	pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
		self.processes.lock().remove(&pid)
	}
}

impl Default for ProcessTable {
	fn default() -> Self {
		Self::new()
	}
}

/// Reads the whole of an open file into memory, for the ELF loader. Small
/// enough in this teaching-scale filesystem (no huge binaries) that
/// reading ahead of parsing is simpler than the reference kernel's
/// page-by-page demand loading of `.text`/`.data`.
fn read_whole(fs: &Filesystem, handle: &mut FileHandle) -> Vec<u8> {
	let size = fs.filesize(handle).max(0) as usize;
	let mut buf = vec![0u8; size];
	let mut done = 0;
	while done < size {
		let n = fs.read(handle, &mut buf[done..]);
		if n == 0 {
			break;
		}
		done += n;
	}
	buf.truncate(done);
	buf
}

/// The shared core of [`Process::load`] and [`Process::exec`] (§4.8 steps
/// 1-5): open the executable with writes denied, parse its ELF image,
/// build a fresh address space with each `PT_LOAD` segment's bytes loaded
/// eagerly into anonymous pages (the executable's own demand-paging is
/// out of scope; `mmap`'d files remain genuinely lazy, see
/// [`crate::memory::VmSpace::mmap`]), claim the stack, and marshal `args`
/// onto it.
///
/// On any failure, the opened executable is closed before returning so
/// the caller never has to.
fn build_image(
	fs: &Filesystem,
	frames: &FrameTable,
	swap: &SwapDisk,
	cwd: &Arc<Inode>,
	path: &str,
	args: &[String],
) -> EResult<(VmSpace, FileHandle, LoadedImage)> {
	let mut exe = fs.open_executable(cwd, path)?;
	let result = (|| -> EResult<(VmSpace, LoadedImage)> {
		let bytes = read_whole(fs, &mut exe);
		let image = elf::parse(&bytes)?;
		let vm = VmSpace::new();
		for seg in &image.segments {
			if seg.vaddr % PAGE_SIZE != 0 {
				return Err(Errno::ENOEXEC);
			}
			let page_count = seg.mem_size.div_ceil(PAGE_SIZE).max(1);
			for i in 0..page_count {
				let page_va = seg.vaddr + i * PAGE_SIZE;
				let page = Arc::new(Page::new_anonymous(page_va, seg.writable, false, vm.table.clone()));
				vm.spt.insert(page.clone())?;
				page.claim(&page, frames, swap)?;
				let seg_off = i * PAGE_SIZE;
				let read_bytes = (seg.file_size as usize).saturating_sub(seg_off).min(PAGE_SIZE);
				if read_bytes > 0 {
					let start = seg.file_offset as usize + seg_off;
					let frame = page.frame().expect("just claimed");
					frame.write_at(0, &bytes[start..start + read_bytes]);
				}
			}
		}
		vm.init_stack(frames, swap)?;
		let layout = stack::marshal_args(&vm, frames, swap, args)?;
		Ok((
			vm,
			LoadedImage {
				entry: image.entry,
				initial_sp: layout.initial_sp,
				argc: layout.argc,
				argv: layout.argv,
			},
		))
	})();
	match result {
		Ok((vm, loaded)) => Ok((vm, exe, loaded)),
		Err(e) => {
			fs.close_executable(exe);
			Err(e)
		}
	}
}

impl Process {
	/// `load(path, args)` (§4.8): builds the very first process running
	/// `path`, with no parent. Used to bootstrap a run; every later
	/// process comes from [`Process::fork`] plus, optionally,
	/// [`Process::exec`].
	pub fn load(
		table: &ProcessTable,
		fs: &Filesystem,
		frames: &FrameTable,
		swap: &SwapDisk,
		cwd: &Arc<Inode>,
		path: &str,
		args: &[String],
	) -> EResult<Arc<Process>> {
		let (vm, exe, loaded) = build_image(fs, frames, swap, cwd, path, args)?;
		fs.reopen_inode(cwd);
		let pid = table.pids.alloc();
		let process = Arc::new(Process {
			pid,
			status: Mutex::new(Status::Ready),
			priority: Mutex::new(0),
			parent: None,
			children: Mutex::new(Vec::new()),
			exit_status: Mutex::new(None),
			wait_semaphore: Semaphore::new(0),
			exit_semaphore: Semaphore::new(0),
			fork_copy_semaphore: Semaphore::new(0),
			fork_copy_ok: Mutex::new(true),
			fds: FdTable::new(),
			cwd: Mutex::new(cwd.clone()),
			vm: Mutex::new(vm),
			program_file: Mutex::new(Some(exe)),
			image: Mutex::new(Some(loaded)),
		});
		table.register(process.clone());
		Ok(process)
	}

	pub fn status(&self) -> Status {
		*self.status.lock()
	}

	pub fn image(&self) -> Option<LoadedImage> {
		*self.image.lock()
	}

	pub fn cwd(&self) -> Arc<Inode> {
		self.cwd.lock().clone()
	}

	/// Runs `f` against the process's address space, for page-fault
	/// handling and `mmap`/`munmap` at the syscall boundary.
	pub fn with_vm<R>(&self, f: impl FnOnce(&VmSpace) -> R) -> R {
		f(&self.vm.lock())
	}

	/// `chdir(path)`, called through the owning process so its cwd
	/// reference is swapped consistently.
	pub fn chdir(&self, fs: &Filesystem, path: &str) -> EResult<()> {
		let new_cwd = fs.chdir(&self.cwd.lock(), path)?;
		let old = std::mem::replace(&mut *self.cwd.lock(), new_cwd);
		fs.close_inode(old);
		Ok(())
	}

	pub fn parent(&self) -> Option<Pid> {
		self.parent
	}

	pub fn children(&self) -> Vec<Pid> {
		self.children.lock().clone()
	}

	/// `fork()` (§4.8): duplicates the address space and fd table into a
	/// brand-new process, which becomes a child of `self`. The copy runs
	/// synchronously (there being no separately-scheduled child thread
	/// before this call returns) but still goes through the same
	/// `fork_copy_semaphore`/`fork_copy_ok` handshake the data model
	/// describes, so a caller testing the protocol directly sees the real
	/// thing rather than a shortcut.
	pub fn fork(
		self: &Arc<Process>,
		table: &ProcessTable,
		fs: &Filesystem,
		frames: &FrameTable,
		swap: &SwapDisk,
	) -> EResult<Pid> {
		let pid = table.pids.alloc();
		let child_vm = VmSpace::new();
		let copy_ok = {
			let parent_vm = self.vm.lock();
			parent_vm.spt.copy(&child_vm.spt, frames, swap).is_ok()
		};
		let child_exe = self.program_file.lock().as_ref().map(|exe| {
			let dup = fs.dup_handle(exe);
			dup.inode.deny_write();
			dup
		});
		let child_cwd = {
			let cwd = self.cwd.lock().clone();
			fs.reopen_inode(&cwd);
			cwd
		};
		let child = Arc::new(Process {
			pid,
			status: Mutex::new(Status::Ready),
			priority: Mutex::new(*self.priority.lock()),
			parent: Some(self.pid),
			children: Mutex::new(Vec::new()),
			exit_status: Mutex::new(None),
			wait_semaphore: Semaphore::new(0),
			exit_semaphore: Semaphore::new(0),
			fork_copy_semaphore: Semaphore::new(0),
			fork_copy_ok: Mutex::new(copy_ok),
			fds: self.fds.dup_all(fs),
			cwd: Mutex::new(child_cwd),
			vm: Mutex::new(child_vm),
			program_file: Mutex::new(child_exe),
			image: Mutex::new(*self.image.lock()),
		});
		// The child signals once its copy is in; the parent waits on
		// that before deciding whether to hand back a pid or an error.
		child.fork_copy_semaphore.up();
		child.fork_copy_semaphore.down();
		if !*child.fork_copy_ok.lock() {
			table.pids.free(pid);
			return Err(Errno::ENOMEM);
		}
		self.children.lock().push(pid);
		table.register(child);
		Ok(pid)
	}

	/// `exec(path, args)` (§4.8): replaces the calling process's image in
	/// place. On failure the process is left running its old image, per
	/// §4.8's "the caller sees -1; the process is not killed".
	pub fn exec(
		&self,
		fs: &Filesystem,
		frames: &FrameTable,
		swap: &SwapDisk,
		path: &str,
		args: &[String],
	) -> EResult<()> {
		let cwd = self.cwd.lock().clone();
		let (new_vm, new_exe, loaded) = build_image(fs, frames, swap, &cwd, path, args)?;
		if let Some(old_exe) = self.program_file.lock().take() {
			fs.close_executable(old_exe);
		}
		self.vm.lock().kill(frames);
		*self.vm.lock() = new_vm;
		*self.program_file.lock() = Some(new_exe);
		*self.image.lock() = Some(loaded);
		Ok(())
	}

	/// `wait(child_pid)` (§4.8): blocks until `child_pid` exits, then
	/// reaps it. Fails with [`Errno::ECHILD`] if `child_pid` is not a
	/// live child of `self` — including a child already waited on, since
	/// a successful wait removes it from `self`'s child list.
	pub fn wait(&self, table: &ProcessTable, child_pid: Pid) -> EResult<i32> {
		if !self.children.lock().contains(&child_pid) {
			return Err(Errno::ECHILD);
		}
		let child = table.lookup(child_pid).ok_or(Errno::ECHILD)?;
		child.wait_semaphore.down();
		let status = child
			.exit_status
			.lock()
			.expect("exited child always records a status before signaling wait_semaphore");
		self.children.lock().retain(|&p| p != child_pid);
		table.remove(child_pid);
		child.exit_semaphore.up();
		Ok(status)
	}

	/// `exit(status)` (§4.8, §5's teardown order): closes open files, the
	/// executable, and the address space, then hands off to a waiting
	/// parent and blocks until it has collected the exit status.
	pub fn exit(&self, fs: &Filesystem, frames: &FrameTable, status: i32) {
		*self.status.lock() = Status::Dying;
		self.fds.close_all(fs);
		if let Some(exe) = self.program_file.lock().take() {
			fs.close_executable(exe);
		}
		self.vm.lock().kill(frames);
		let cwd = self.cwd.lock().clone();
		fs.close_inode(cwd);
		*self.exit_status.lock() = Some(status);
		self.wait_semaphore.up();
		self.exit_semaphore.down();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::RamDisk;
	use crate::memory::frame::FrameTable;
	use crate::memory::swap::SwapDisk;
	use std::thread;

	fn new_fs() -> Filesystem {
		Filesystem::format(Box::new(RamDisk::new(1024)), 16).unwrap()
	}

	/// Builds a minimal valid ELF64 executable with one small `PT_LOAD`
	/// segment containing `data`, entry point `0x1000`.
	fn make_elf(data: &[u8]) -> Vec<u8> {
		let mut bytes = vec![0u8; 64 + 56];
		bytes[0..4].copy_from_slice(b"\x7fELF");
		bytes[4] = 2; // ELFCLASS64
		bytes[5] = 1; // ELFDATA2LSB
		bytes[24..32].copy_from_slice(&0x1000u64.to_le_bytes()); // e_entry
		bytes[32..40].copy_from_slice(&64u64.to_le_bytes()); // e_phoff
		bytes[54..56].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
		bytes[56..58].copy_from_slice(&1u16.to_le_bytes()); // e_phnum
		let ph = 64;
		bytes[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
		bytes[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes()); // p_flags
		bytes[ph + 8..ph + 16].copy_from_slice(&(120u64).to_le_bytes()); // p_offset
		bytes[ph + 16..ph + 24].copy_from_slice(&0x1000u64.to_le_bytes()); // p_vaddr
		bytes[ph + 32..ph + 40].copy_from_slice(&(data.len() as u64).to_le_bytes()); // p_filesz
		bytes[ph + 40..ph + 48].copy_from_slice(&(data.len() as u64).to_le_bytes()); // p_memsz
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

	#[test]
	fn load_denies_writes_to_its_executable() {
		let fs = new_fs();
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"hello");
		let table = ProcessTable::new();
		let frames = FrameTable::new(16);
		let swap = SwapDisk::new(16);
		let proc = Process::load(&table, &fs, &frames, &swap, &root, "/p", &[]).unwrap();
		let mut fh = fs.open_path(&root, "/p").unwrap();
		assert_eq!(fs.write(&mut fh, b"x"), 0);
		fs.close_handle(fh);
		proc.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}

	#[test]
	fn load_records_entry_and_args() {
		let fs = new_fs();
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"");
		let table = ProcessTable::new();
		let frames = FrameTable::new(16);
		let swap = SwapDisk::new(16);
		let args = vec!["p".to_string(), "x".to_string()];
		let proc = Process::load(&table, &fs, &frames, &swap, &root, "/p", &args).unwrap();
		let image = proc.image().unwrap();
		assert_eq!(image.entry, 0x1000);
		assert_eq!(image.argc, 2);
		proc.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}

	#[test]
	fn wait_on_unknown_child_is_echild() {
		let fs = new_fs();
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"");
		let table = ProcessTable::new();
		let frames = FrameTable::new(16);
		let swap = SwapDisk::new(16);
		let proc = Process::load(&table, &fs, &frames, &swap, &root, "/p", &[]).unwrap();
		assert_eq!(proc.wait(&table, 999), Err(Errno::ECHILD));
		proc.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}

	#[test]
	fn fork_gives_child_an_independent_address_space() {
		let fs = new_fs();
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"");
		let table = ProcessTable::new();
		let frames = FrameTable::new(16);
		let swap = SwapDisk::new(16);
		let parent = Process::load(&table, &fs, &frames, &swap, &root, "/p", &[]).unwrap();
		let child_pid = parent.fork(&table, &fs, &frames, &swap).unwrap();
		assert_eq!(parent.children(), vec![child_pid]);
		let child = table.lookup(child_pid).unwrap();
		assert_eq!(child.parent(), Some(parent.pid));
		child.exit(&fs, &frames, 0);
		parent.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}

	#[test]
	fn wait_collects_exit_status_from_a_concurrently_exiting_child() {
		let fs = Arc::new(new_fs());
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"");
		let table = Arc::new(ProcessTable::new());
		let frames = Arc::new(FrameTable::new(16));
		let swap = Arc::new(SwapDisk::new(16));
		let parent = Process::load(&table, &fs, &frames, &swap, &root, "/p", &[]).unwrap();
		let child_pid = parent.fork(&table, &fs, &frames, &swap).unwrap();
		let child = table.lookup(child_pid).unwrap();

		let fs2 = fs.clone();
		let frames2 = frames.clone();
		let handle = thread::spawn(move || {
			child.exit(&fs2, &frames2, 7);
		});

		let status = parent.wait(&table, child_pid).unwrap();
		assert_eq!(status, 7);
		assert!(table.lookup(child_pid).is_none());
		handle.join().unwrap();

		parent.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}

	#[test]
	fn exec_failure_leaves_process_running() {
		let fs = new_fs();
		let root = fs.open_root();
		write_elf(&fs, &root, "/p", b"");
		let table = ProcessTable::new();
		let frames = FrameTable::new(16);
		let swap = SwapDisk::new(16);
		let proc = Process::load(&table, &fs, &frames, &swap, &root, "/p", &[]).unwrap();
		let before = proc.image().unwrap().entry;
		assert_eq!(
			proc.exec(&fs, &frames, &swap, "/missing", &[]),
			Err(Errno::ENOENT)
		);
		assert_eq!(proc.image().unwrap().entry, before);
		proc.exit(&fs, &frames, 0);
		fs.close_inode(root);
	}
}
