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

//! Filesystem facade (C6): the single-entry operations that compose the
//! FAT allocator, inode layer, and directory layer (C3-C5) into the
//! create/open/remove/mkdir/chdir/readdir/symlink surface the syscall
//! dispatcher calls.
//!
//! All facade operations hold [`Filesystem`]'s own lock for their whole
//! duration — coarse-grained, as §4.5 calls for at this scale.

pub mod boot;
pub mod cache;
pub mod dir;
pub mod fat;
pub mod inode;
pub mod path;

use crate::config::SECTOR_SIZE;
use crate::device::BlockDevice;
use crate::errno::{EResult, Errno};
use crate::memory::BackingFile;
use crate::sync::Mutex;
use boot::BootRecord;
use cache::Cache;
use dir::DirOps;
use fat::Fat;
use inode::{Inode, InodeTable};
use path::SymlinkRecord;
use std::sync::Arc;

/// An open directory reference plus a readdir cursor (§3's "directory
/// handle").
pub struct DirHandle {
	pub inode: Arc<Inode>,
	pub pos: u32,
}

/// An open file reference (§3's "file handle"). For directory file
/// descriptors, also carries a [`DirHandle`] for `readdir`.
pub struct FileHandle {
	pub inode: Arc<Inode>,
	pub pos: u32,
	pub deny_write: bool,
	pub dir: Option<DirHandle>,
}

struct Inner {
	symlinks: Vec<SymlinkRecord>,
}

/// Adapts one of this kernel's own FAT-resident files to [`BackingFile`],
/// so `mmap(fd, ...)` can lazily page in a file that lives on the
/// filesystem rather than on the host. Closes its inode reference when
/// dropped, mirroring [`Filesystem::close_handle`].
pub struct InodeFile {
	inodes: Arc<InodeTable>,
	inode: Arc<Inode>,
}

impl BackingFile for InodeFile {
	fn len(&self) -> u64 {
		self.inode.length() as u64
	}

	fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
		self.inodes.read_at(&self.inode, buf, offset as u32)
	}

	fn write_at(&self, offset: u64, buf: &[u8]) -> usize {
		self.inodes.write_at(&self.inode, buf, offset as u32)
	}
}

impl Drop for InodeFile {
	fn drop(&mut self) {
		self.inodes.close(self.inode.clone());
	}
}

/// The filesystem facade.
pub struct Filesystem {
	cache: Arc<Cache>,
	fat: Arc<Fat>,
	inodes: Arc<InodeTable>,
	dirs: DirOps,
	root_sector: u32,
	lock: Mutex<Inner>,
}

/// Reserves the directory-entry byte size used for a directory with no
/// entries beyond `.`/`..` yet (callers pass this to `create`).
pub const EMPTY_DIR_SIZE: u32 = 2 * dir::ENTRY_SIZE as u32;

impl Filesystem {
	fn from_parts(cache: Arc<Cache>, fat: Arc<Fat>, root_sector: u32) -> Self {
		let inodes = Arc::new(InodeTable::new(cache.clone(), fat.clone()));
		Self {
			cache,
			fat,
			dirs: DirOps::new(inodes.clone()),
			inodes,
			root_sector,
			lock: Mutex::new(Inner {
				symlinks: Vec::new(),
			}),
		}
	}

	/// Formats a brand-new filesystem on `device` (`filesys_init(format =
	/// true)` in §8's scenarios).
	pub fn format(device: Box<dyn BlockDevice>, fat_sectors: u32) -> EResult<Self> {
		let total_sectors = device.sector_count() as u32;
		let cache = Arc::new(Cache::new(device, 64));
		let boot = BootRecord::new(total_sectors, fat_sectors);
		let fat = Arc::new(Fat::format(cache.clone(), boot));
		let root_sector = fat.cluster_to_data_sector(boot.root_dir_cluster) as u32;
		let fs = Self::from_parts(cache, fat, root_sector);
		let root = fs.inodes.create(root_sector, EMPTY_DIR_SIZE, true)?;
		fs.dirs.init_self_parent(&root, root_sector, root_sector);
		fs.inodes.close(root);
		fs.fat.flush();
		Ok(fs)
	}

	/// Opens an already-formatted filesystem (`filesys_init(format =
	/// false)`).
	pub fn open(mut device: Box<dyn BlockDevice>) -> EResult<Self> {
		let mut buf = [0u8; SECTOR_SIZE];
		device.read_sector(0, &mut buf);
		let boot = BootRecord::from_bytes(&buf).ok_or(Errno::EINVAL)?;
		let cache = Arc::new(Cache::new(device, 64));
		let fat = Arc::new(Fat::load(cache.clone(), boot));
		let root_sector = fat.cluster_to_data_sector(boot.root_dir_cluster) as u32;
		Ok(Self::from_parts(cache, fat, root_sector))
	}

	/// Opens the root directory inode. Caller must close it.
	pub fn open_root(&self) -> Arc<Inode> {
		self.inodes.open(self.root_sector)
	}

	/// Flushes the FAT and every dirty cache slot (`shutdown`, §4.1/§4.2).
	pub fn shutdown(&self) {
		self.fat.flush();
		self.cache.shutdown();
	}

	/// Resolves `path` against `cwd` to `(parent_dir, last_name)`, per
	/// §4.4. Applies symlink substitution first. Caller must close the
	/// returned parent directory inode.
	///
	/// Takes `self.lock` for its own duration; callers that already hold it
	/// (every facade method below) must go through [`Self::resolve_locked`]
	/// instead to avoid locking the same mutex twice from one thread.
	pub fn resolve(&self, cwd: &Arc<Inode>, path: &str) -> EResult<(Arc<Inode>, String)> {
		let inner = self.lock.lock();
		self.resolve_locked(&inner, cwd, path)
	}

	fn resolve_locked(
		&self,
		inner: &Inner,
		cwd: &Arc<Inode>,
		path: &str,
	) -> EResult<(Arc<Inode>, String)> {
		let expanded = path::expand_symlinks(path, &inner.symlinks)?;
		let split = path::split(&expanded)?;
		let mut dir = if split.absolute {
			self.open_root()
		} else {
			self.inodes.reopen(cwd);
			cwd.clone()
		};
		if split.components.is_empty() {
			return Ok((dir, ".".to_string()));
		}
		let (last, parents) = split.components.split_last().unwrap();
		for name in parents {
			if !dir.is_dir() {
				self.inodes.close(dir);
				return Err(Errno::ENOTDIR);
			}
			let next_sector = self.dirs.lookup(&dir, name).ok_or(Errno::ENOENT);
			self.inodes.close(dir);
			let next_sector = next_sector?;
			dir = self.inodes.open(next_sector);
		}
		Ok((dir, last.clone()))
	}

	/// `create(path, size, is_dir)`: resolves, allocates an inode cluster,
	/// initializes it, and links it into its parent directory. Releases
	/// the allocated cluster on any failure (§7's partial-failure
	/// composition).
	pub fn create(&self, cwd: &Arc<Inode>, path: &str, size: u32, is_dir: bool) -> EResult<()> {
		let guard = self.lock.lock();
		let (dir, name) = self.resolve_locked(&guard, cwd, path)?;
		let result = self.create_in(&dir, &name, size, is_dir);
		self.inodes.close(dir);
		result
	}

	fn create_in(&self, dir: &Inode, name: &str, size: u32, is_dir: bool) -> EResult<()> {
		if name.is_empty() || name == "." || name == ".." {
			return Err(Errno::EEXIST);
		}
		let cluster = self.fat.allocate_one().ok_or(Errno::ENOSPC)?;
		let sector = self.fat.cluster_to_data_sector(cluster) as u32;
		let effective_size = if is_dir { EMPTY_DIR_SIZE } else { size };
		let inode = match self.inodes.create(sector, effective_size, is_dir) {
			Ok(i) => i,
			Err(e) => {
				self.fat.put(cluster, fat::FREE);
				return Err(e);
			}
		};
		if is_dir {
			self.dirs.init_self_parent(&inode, sector, dir.sector);
		}
		if let Err(e) = self.dirs.add(dir, name, sector) {
			self.inodes.remove(&inode);
			self.inodes.close(inode);
			self.fat.put(cluster, fat::FREE);
			return Err(e);
		}
		self.inodes.close(inode);
		Ok(())
	}

	/// `mkdir(path)` = `create(path, 0, true)`.
	pub fn mkdir(&self, cwd: &Arc<Inode>, path: &str) -> EResult<()> {
		self.create(cwd, path, 0, true)
	}

	/// `open(path)`: resolves, looks up, and opens the target inode. If it
	/// is a directory, attaches a fresh readdir cursor.
	pub fn open_path(&self, cwd: &Arc<Inode>, path: &str) -> EResult<FileHandle> {
		let guard = self.lock.lock();
		let (dir, name) = self.resolve_locked(&guard, cwd, path)?;
		let sector = self.dirs.lookup(&dir, &name);
		self.inodes.close(dir);
		let sector = sector.ok_or(Errno::ENOENT)?;
		let inode = self.inodes.open(sector);
		let dir_handle = if inode.is_dir() {
			self.inodes.reopen(&inode);
			Some(DirHandle {
				inode: inode.clone(),
				pos: DirOps::first_slot(),
			})
		} else {
			None
		};
		Ok(FileHandle {
			inode,
			pos: 0,
			deny_write: false,
			dir: dir_handle,
		})
	}

	/// Opens `path` as a running executable (§4.8 step 2): like
	/// [`Self::open_path`], but marks the inode write-denied for as long
	/// as the returned handle is held.
	pub fn open_executable(&self, cwd: &Arc<Inode>, path: &str) -> EResult<FileHandle> {
		let handle = self.open_path(cwd, path)?;
		handle.inode.deny_write();
		Ok(FileHandle {
			deny_write: true,
			..handle
		})
	}

	/// Closes an executable handle opened via [`Self::open_executable`],
	/// releasing its write-denial before closing the inode.
	pub fn close_executable(&self, handle: FileHandle) {
		handle.inode.allow_write();
		self.close_handle(handle);
	}

	/// `remove(path)`: refuses a non-empty directory.
	pub fn remove(&self, cwd: &Arc<Inode>, path: &str) -> EResult<()> {
		let guard = self.lock.lock();
		let (dir, name) = self.resolve_locked(&guard, cwd, path)?;
		let result = (|| {
			let sector = self.dirs.lookup(&dir, &name).ok_or(Errno::ENOENT)?;
			let target = self.inodes.open(sector);
			if target.is_dir() && !self.dirs.is_empty(&target) {
				self.inodes.close(target);
				return Err(Errno::ENOTEMPTY);
			}
			self.dirs.remove_entry(&dir, &name)?;
			self.inodes.remove(&target);
			self.inodes.close(target);
			Ok(())
		})();
		self.inodes.close(dir);
		result
	}

	/// `chdir(path)`: resolves the whole path as a directory, returning
	/// the new cwd inode for the caller to swap in (closing the old one).
	pub fn chdir(&self, cwd: &Arc<Inode>, path: &str) -> EResult<Arc<Inode>> {
		let guard = self.lock.lock();
		let (dir, name) = self.resolve_locked(&guard, cwd, path)?;
		let sector = self.dirs.lookup(&dir, &name);
		self.inodes.close(dir);
		let sector = sector.ok_or(Errno::ENOENT)?;
		let inode = self.inodes.open(sector);
		if !inode.is_dir() {
			self.inodes.close(inode);
			return Err(Errno::ENOTDIR);
		}
		Ok(inode)
	}

	/// `readdir(fd, out)`: advances the handle's directory cursor,
	/// returning the next entry name, if any.
	pub fn readdir(&self, handle: &mut FileHandle) -> Option<String> {
		let dir_handle = handle.dir.as_mut()?;
		let (name, next_pos) = self.dirs.readdir_at(&dir_handle.inode, dir_handle.pos);
		dir_handle.pos = next_pos;
		name
	}

	/// `isdir(fd)`.
	pub fn isdir(&self, handle: &FileHandle) -> bool {
		handle.inode.is_dir()
	}

	/// `inumber(fd)`.
	pub fn inumber(&self, handle: &FileHandle) -> u32 {
		handle.inode.inumber()
	}

	/// `filesize(fd)`.
	pub fn filesize(&self, handle: &FileHandle) -> i32 {
		handle.inode.length()
	}

	/// Reads into `buf` at the handle's current position, advancing it.
	pub fn read(&self, handle: &mut FileHandle, buf: &mut [u8]) -> usize {
		let n = self.inodes.read_at(&handle.inode, buf, handle.pos);
		handle.pos += n as u32;
		n
	}

	/// Writes `buf` at the handle's current position, advancing it and
	/// extending the file if necessary.
	pub fn write(&self, handle: &mut FileHandle, buf: &[u8]) -> usize {
		let n = self.inodes.write_at(&handle.inode, buf, handle.pos);
		handle.pos += n as u32;
		n
	}

	/// `seek(fd, pos)`.
	pub fn seek(&self, handle: &mut FileHandle, pos: u32) {
		handle.pos = pos;
	}

	/// `tell(fd)`.
	pub fn tell(&self, handle: &FileHandle) -> u32 {
		handle.pos
	}

	/// Closes a file handle, releasing its directory cursor's extra inode
	/// reference first if present.
	pub fn close_handle(&self, handle: FileHandle) {
		if let Some(dir_handle) = handle.dir {
			self.inodes.close(dir_handle.inode);
		}
		self.inodes.close(handle.inode);
	}

	/// `symlink(target, linkpath)`: ensures `target` exists (creating an
	/// empty marker inode if not), then records the substitution. Per
	/// §9's resolution, this always succeeds regardless of whether
	/// `target` pre-existed; only a later `open(linkpath)` can fail with
	/// `ENOENT`.
	pub fn symlink(&self, cwd: &Arc<Inode>, target: &str, linkpath: &str) -> EResult<()> {
		let resolved = {
			let guard = self.lock.lock();
			self.resolve_locked(&guard, cwd, target).ok()
		};
		if let Some((dir, name)) = resolved {
			let exists = self.dirs.lookup(&dir, &name).is_some();
			if !exists {
				let _ = self.create_in(&dir, &name, 0, false);
			}
			self.inodes.close(dir);
		}
		let mut inner = self.lock.lock();
		inner.symlinks.push(SymlinkRecord {
			linkpath: linkpath.to_string(),
			target: target.to_string(),
		});
		Ok(())
	}

	/// Duplicates a file handle for fork (§4.8 step 4): reopens the
	/// backing inode(s) rather than aliasing the existing reference, so
	/// the two file descriptors close independently.
	pub fn dup_handle(&self, handle: &FileHandle) -> FileHandle {
		self.inodes.reopen(&handle.inode);
		let dir = handle.dir.as_ref().map(|d| {
			self.inodes.reopen(&d.inode);
			DirHandle {
				inode: d.inode.clone(),
				pos: d.pos,
			}
		});
		FileHandle {
			inode: handle.inode.clone(),
			pos: handle.pos,
			deny_write: handle.deny_write,
			dir,
		}
	}

	pub fn close_inode(&self, inode: Arc<Inode>) {
		self.inodes.close(inode);
	}

	pub fn reopen_inode(&self, inode: &Arc<Inode>) {
		self.inodes.reopen(inode);
	}

	/// Wraps `handle`'s inode as a [`BackingFile`], for `mmap(fd, ...)`.
	/// Reopens the inode so the returned [`InodeFile`] closes independently
	/// of `handle`.
	pub fn inode_file(&self, handle: &FileHandle) -> InodeFile {
		self.inodes.reopen(&handle.inode);
		InodeFile {
			inodes: self.inodes.clone(),
			inode: handle.inode.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::RamDisk;

	fn new_fs() -> Filesystem {
		Filesystem::format(Box::new(RamDisk::new(512)), 8).unwrap()
	}

	#[test]
	fn create_read_back() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.create(&root, "/a", 512, false).unwrap();
		let mut fh = fs.open_path(&root, "/a").unwrap();
		let n = fs.write(&mut fh, b"hello");
		assert_eq!(n, 5);
		fs.close_handle(fh);
		let mut fh2 = fs.open_path(&root, "/a").unwrap();
		let mut buf = [0u8; 5];
		let n = fs.read(&mut fh2, &mut buf);
		assert_eq!(n, 5);
		assert_eq!(&buf, b"hello");
		fs.close_handle(fh2);
		fs.close_inode(root);
	}

	#[test]
	fn directory_uniqueness() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.mkdir(&root, "/d").unwrap();
		let d = fs.chdir(&root, "/d").unwrap();
		fs.create(&d, "x", 0, false).unwrap();
		assert_eq!(fs.create(&d, "x", 0, false), Err(Errno::EEXIST));
		fs.close_inode(d);
		fs.close_inode(root);
	}

	#[test]
	fn non_empty_dir_removal_refused() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.mkdir(&root, "/d").unwrap();
		fs.create(&root, "/d/x", 0, false).unwrap();
		assert_eq!(fs.remove(&root, "/d"), Err(Errno::ENOTEMPTY));
		fs.remove(&root, "/d/x").unwrap();
		fs.remove(&root, "/d").unwrap();
		fs.close_inode(root);
	}

	#[test]
	fn file_extension_grows_chain() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.create(&root, "/f", 0, false).unwrap();
		let mut fh = fs.open_path(&root, "/f").unwrap();
		let data = vec![b'a'; 10_000];
		let n = fs.write(&mut fh, &data);
		assert_eq!(n, 10_000);
		assert_eq!(fs.filesize(&fh), 10_000);
		fs.close_handle(fh);
		fs.close_inode(root);
	}

	#[test]
	fn symlink_prefix_substitution() {
		let fs = new_fs();
		let root = fs.open_root();
		fs.mkdir(&root, "/a").unwrap();
		let a = fs.chdir(&root, "/a").unwrap();
		fs.create(&a, "b", 0, false).unwrap();
		fs.close_inode(a);
		fs.symlink(&root, "/a/b", "/c").unwrap();
		let fh = fs.open_path(&root, "/c").unwrap();
		assert!(!fs.isdir(&fh));
		fs.close_handle(fh);
		fs.close_inode(root);
	}

	#[test]
	fn persistence_across_shutdown_and_reopen() {
		use crate::device::FileDevice;
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("disk.img");
		{
			let device = FileDevice::open(&path, 512).unwrap();
			let fs = Filesystem::format(Box::new(device), 8).unwrap();
			let root = fs.open_root();
			fs.create(&root, "/p", 0, false).unwrap();
			let mut fh = fs.open_path(&root, "/p").unwrap();
			fs.write(&mut fh, b"durable");
			fs.close_handle(fh);
			fs.close_inode(root);
			fs.shutdown();
		}
		let device = FileDevice::open(&path, 512).unwrap();
		let fs = Filesystem::open(Box::new(device)).unwrap();
		let root = fs.open_root();
		let mut fh2 = fs.open_path(&root, "/p").unwrap();
		let mut buf = [0u8; 7];
		fs.read(&mut fh2, &mut buf);
		assert_eq!(&buf, b"durable");
		fs.close_handle(fh2);
		fs.close_inode(root);
	}
}
