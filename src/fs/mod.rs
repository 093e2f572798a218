//! Top-level VFS surface: path resolution in front of the mounted
//! filesystem, and the open/read/write/seek/mkdir/rmdir/unlink/rename/
//! getdents operations a process's handle table calls through.
//!
//! Grounded on the reference kernel's `filesystem/mod.rs` `VirtualFS`:
//! one resolver sitting in front of the backing store, returning
//! `Errno` the way `VirtualFS::resolve`/`open` return `IoResultPure`.
//! This core's writable tree is entirely ramfs; a FAT32 image can
//! additionally be mounted read-only under a fixed directory
//! (`mount_fat32`), mirrored in as ramfs inodes flagged `readonly` so
//! the existing single-inode-table resolver needs no dual-dispatch
//! path. The multi-mount `Tree` the reference kernel built for
//! arbitrary attachment points has no counterpart here — see
//! DESIGN.md.

pub mod fat32;
pub mod handle;
pub mod inode;
pub mod mmap;
pub mod path;
pub mod ramfs;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::errno::Errno;
use crate::fs::handle::{FsHandle, OpenFlags, SpecFlags};
use crate::fs::inode::{CloseAction, InodeId, InodeKind};
use crate::fs::path::Path;
use crate::fs::ramfs::{DirCursor, DirEntryRecord, RamFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

pub struct Vfs {
    ramfs: RamFs,
}

impl Vfs {
    pub fn new() -> Self {
        Vfs { ramfs: RamFs::new() }
    }

    pub fn root(&self) -> InodeId {
        self.ramfs.root()
    }

    /// Mounts a FAT32 volume image read-only under `/rofs`, mirroring
    /// every entry in as a `readonly`-flagged ramfs inode. Fails if the
    /// image's boot sector doesn't parse, or if `/rofs` already exists.
    pub fn mount_fat32(&mut self, image: Vec<u8>) -> Result<(), Errno> {
        let volume = fat32::Fat32Volume::mount(&image)?;
        let mount_dir = self.ramfs.create_dir(self.root(), "rofs")?;
        self.ramfs.inode_mut(mount_dir).unwrap().readonly = true;
        self.mirror_fat32_dir(&volume, volume.root_cluster(), mount_dir)?;
        Ok(())
    }

    fn mirror_fat32_dir(
        &mut self,
        volume: &fat32::Fat32Volume<'_>,
        cluster: u32,
        dest_dir: InodeId,
    ) -> Result<(), Errno> {
        for entry in volume.read_dir(cluster) {
            match entry.kind {
                fat32::EntryKind::Dir => {
                    let id = self.ramfs.create_dir(dest_dir, &entry.name)?;
                    self.ramfs.inode_mut(id).unwrap().readonly = true;
                    self.mirror_fat32_dir(volume, entry.first_cluster, id)?;
                }
                fat32::EntryKind::File => {
                    let id = self.ramfs.create_file(dest_dir, &entry.name, true)?;
                    let data = volume.read_file(&entry)?;
                    self.ramfs.inode_mut(id).unwrap().ops_mut().write(0, &data)?;
                    self.ramfs.inode_mut(id).unwrap().readonly = true;
                }
            }
        }
        Ok(())
    }

    /// Resolves a path to an inode. Relative paths are resolved
    /// against `cwd_id`; absolute paths always start at the root.
    fn resolve(&self, cwd_id: InodeId, path: &Path<'_>) -> Result<InodeId, Errno> {
        let mut current = if path.is_absolute() { self.root() } else { cwd_id };
        for component in path.components() {
            if component.is_empty() || component == "." {
                continue;
            }
            current = self.ramfs.lookup(current, component)?;
        }
        Ok(current)
    }

    /// Resolves every component but the last, returning the parent
    /// directory's inode and the final component's name.
    fn resolve_parent(&self, cwd_id: InodeId, path: &Path<'_>) -> Result<(InodeId, String), Errno> {
        let name = path.file_name().ok_or(Errno::Inval)?.to_string();
        let parent_id = match path.parent() {
            Some(parent) => self.resolve(cwd_id, &parent)?,
            None => {
                if path.is_absolute() {
                    self.root()
                } else {
                    cwd_id
                }
            }
        };
        Ok((parent_id, name))
    }

    pub fn open(&mut self, cwd_id: InodeId, path_str: &str, flags: OpenFlags) -> Result<FsHandle, Errno> {
        let path = Path::new(path_str);

        let inode_id = match self.resolve(cwd_id, &path) {
            Ok(id) => {
                if flags.contains(OpenFlags::CREAT) && flags.contains(OpenFlags::EXCL) {
                    return Err(Errno::Exist);
                }
                id
            }
            Err(Errno::NoEnt) if flags.contains(OpenFlags::CREAT) => {
                let (parent_id, name) = self.resolve_parent(cwd_id, &path)?;
                if self.ramfs.inode(parent_id).ok_or(Errno::NoEnt)?.readonly {
                    return Err(Errno::Rofs);
                }
                self.ramfs.create_file(parent_id, &name, false)?
            }
            Err(e) => return Err(e),
        };

        let write_intent = flags.can_write() || flags.contains(OpenFlags::TRUNC);
        if write_intent && self.ramfs.inode(inode_id).ok_or(Errno::NoEnt)?.readonly {
            return Err(Errno::Rofs);
        }

        let kind = self.ramfs.inode(inode_id).ok_or(Errno::NoEnt)?.kind();
        if flags.contains(OpenFlags::DIRECTORY) && kind != InodeKind::Dir {
            return Err(Errno::NotDir);
        }
        if kind == InodeKind::Dir && flags.can_write() {
            return Err(Errno::IsDir);
        }

        if flags.contains(OpenFlags::TRUNC) && kind == InodeKind::File {
            self.ramfs.inode_mut(inode_id).unwrap().ops_mut().truncate(0)?;
        }

        let spec_flags = if self.ramfs.inode(inode_id).unwrap().ops().mmap_supported() {
            SpecFlags::MMAP_SUPPORTED
        } else {
            SpecFlags::empty()
        };

        self.ramfs.inode_mut(inode_id).unwrap().open();
        let handle = FsHandle::new(inode_id, flags, spec_flags);
        if flags.contains(OpenFlags::APPEND) {
            handle.set_position(self.ramfs.inode(inode_id).unwrap().ops().size());
        }
        Ok(handle)
    }

    /// Closes a handle's reference to its inode. Must be called
    /// exactly once per `open`/`clone_ref`'d handle (not per `reopen`,
    /// which already called `open` itself for its own reference).
    pub fn close(&mut self, handle: &FsHandle) {
        let Some(inode) = self.ramfs.inode_mut(handle.inode) else {
            return;
        };
        if inode.close() == CloseAction::Destroy {
            self.ramfs.destroy_inode(handle.inode);
        }
    }

    pub fn read(&mut self, handle: &FsHandle, buf: &mut [u8]) -> Result<usize, Errno> {
        if !handle.flags.can_read() {
            return Err(Errno::BadF);
        }
        let inode = self.ramfs.inode_mut(handle.inode).ok_or(Errno::NoEnt)?;
        let pos = handle.position();
        let n = inode.ops_mut().read(pos, buf)?;
        handle.advance(n as u64);
        Ok(n)
    }

    pub fn write(&mut self, handle: &FsHandle, buf: &[u8]) -> Result<usize, Errno> {
        if !handle.flags.can_write() {
            return Err(Errno::BadF);
        }
        let inode = self.ramfs.inode_mut(handle.inode).ok_or(Errno::NoEnt)?;
        let pos = if handle.flags.contains(OpenFlags::APPEND) {
            inode.ops().size()
        } else {
            handle.position()
        };
        let n = inode.ops_mut().write(pos, buf)?;
        handle.set_position(pos + n as u64);
        Ok(n)
    }

    pub fn seek(&self, handle: &FsHandle, whence: Whence, offset: i64) -> Result<u64, Errno> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => handle.position(),
            Whence::End => self.ramfs.inode(handle.inode).ok_or(Errno::NoEnt)?.ops().size(),
        };
        let new_pos = base as i64 + offset;
        if new_pos < 0 {
            return Err(Errno::Inval);
        }
        handle.set_position(new_pos as u64);
        Ok(new_pos as u64)
    }

    pub fn mkdir(&mut self, cwd_id: InodeId, path_str: &str) -> Result<InodeId, Errno> {
        let path = Path::new(path_str);
        let (parent_id, name) = self.resolve_parent(cwd_id, &path)?;
        self.ramfs.create_dir(parent_id, &name)
    }

    pub fn rmdir(&mut self, cwd_id: InodeId, path_str: &str) -> Result<(), Errno> {
        let path = Path::new(path_str);
        let (parent_id, name) = self.resolve_parent(cwd_id, &path)?;
        self.ramfs.rmdir(parent_id, &name)
    }

    pub fn unlink(&mut self, cwd_id: InodeId, path_str: &str) -> Result<(), Errno> {
        let path = Path::new(path_str);
        let (parent_id, name) = self.resolve_parent(cwd_id, &path)?;
        self.ramfs.unlink(parent_id, &name)
    }

    pub fn rename(&mut self, cwd_id: InodeId, src: &str, dst: &str) -> Result<(), Errno> {
        let (src_parent, src_name) = self.resolve_parent(cwd_id, &Path::new(src))?;
        let (dst_parent, dst_name) = self.resolve_parent(cwd_id, &Path::new(dst))?;
        self.ramfs.rename(src_parent, &src_name, dst_parent, &dst_name)
    }

    pub fn getdents(
        &self,
        dir_handle: &FsHandle,
        cursor: DirCursor,
        max_entries: usize,
    ) -> Result<(Vec<DirEntryRecord>, DirCursor), Errno> {
        self.ramfs.getdents(dir_handle.inode, cursor, max_entries)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_existing_round_trips_data() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let h = vfs.open(root, "/a.txt", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.write(&h, b"hi").unwrap();
        vfs.close(&h);

        let h2 = vfs.open(root, "/a.txt", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(vfs.read(&h2, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn open_without_creat_on_missing_path_fails() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        assert_eq!(vfs.open(root, "/missing", OpenFlags::RDONLY).unwrap_err(), Errno::NoEnt);
    }

    #[test]
    fn exclusive_create_on_existing_path_fails() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        vfs.open(root, "/a", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        let err = vfs
            .open(root, "/a", OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::EXCL)
            .unwrap_err();
        assert_eq!(err, Errno::Exist);
    }

    #[test]
    fn mkdir_then_nested_relative_open_resolves_through_cwd() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let dir_id = vfs.mkdir(root, "/sub").unwrap();
        let h = vfs.open(dir_id, "inner", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.write(&h, b"x").unwrap();
        vfs.close(&h);

        let h2 = vfs.open(root, "/sub/inner", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(vfs.read(&h2, &mut buf).unwrap(), 1);
    }

    #[test]
    fn append_write_always_targets_end_of_file_regardless_of_cursor() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let h = vfs.open(root, "/log", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.write(&h, b"abc").unwrap();
        h.set_position(0);

        let append_handle = vfs.open(root, "/log", OpenFlags::WRONLY | OpenFlags::APPEND).unwrap();
        vfs.write(&append_handle, b"def").unwrap();

        let reader = vfs.open(root, "/log", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 6];
        vfs.read(&reader, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn seek_end_then_read_returns_nothing() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let h = vfs.open(root, "/f", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.write(&h, b"12345").unwrap();
        vfs.seek(&h, Whence::End, 0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(&h, &mut buf).unwrap(), 0);
    }

    #[test]
    fn directory_cannot_be_opened_for_writing() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        vfs.mkdir(root, "/d").unwrap();
        let err = vfs.open(root, "/d", OpenFlags::RDWR).unwrap_err();
        assert_eq!(err, Errno::IsDir);
    }

    #[test]
    fn inode_with_open_handle_survives_unlink_until_close() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let h = vfs.open(root, "/ghost", OpenFlags::RDWR | OpenFlags::CREAT).unwrap();
        vfs.write(&h, b"still here").unwrap();
        vfs.unlink(root, "/ghost").unwrap();

        // The path is gone, but the already-open handle keeps working.
        let mut buf = [0u8; 10];
        assert_eq!(vfs.read(&h, &mut buf).unwrap(), 10);
        assert_eq!(vfs.open(root, "/ghost", OpenFlags::RDONLY).unwrap_err(), Errno::NoEnt);

        vfs.close(&h);
    }

    fn build_fat32_image() -> Vec<u8> {
        const SECTOR_SIZE: usize = 512;
        let mut img = alloc::vec![0u8; 8 * SECTOR_SIZE];

        img[11..13].copy_from_slice(&512u16.to_le_bytes());
        img[13] = 1; // sectors per cluster
        img[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
        img[16] = 1; // num FATs
        img[32..36].copy_from_slice(&8u32.to_le_bytes()); // total sectors
        img[36..40].copy_from_slice(&1u32.to_le_bytes()); // FAT size (sectors)
        img[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
        img[510] = 0x55;
        img[511] = 0xAA;

        let fat_entry = |img: &mut [u8], cluster: u32, val: u32| {
            let off = SECTOR_SIZE + cluster as usize * 4;
            img[off..off + 4].copy_from_slice(&val.to_le_bytes());
        };
        fat_entry(&mut img, 2, 0x0FFF_FFFF);
        fat_entry(&mut img, 3, 0x0FFF_FFFF);

        let root_off = 2 * SECTOR_SIZE;
        img[root_off..root_off + 8].copy_from_slice(b"HELLO   ");
        img[root_off + 8..root_off + 11].copy_from_slice(b"TXT");
        img[root_off + 26..root_off + 28].copy_from_slice(&3u16.to_le_bytes());
        img[root_off + 28..root_off + 32].copy_from_slice(&5u32.to_le_bytes());

        let data_off = 3 * SECTOR_SIZE;
        img[data_off..data_off + 5].copy_from_slice(b"World");

        img
    }

    #[test]
    fn read_open_against_fat32_mount_returns_mirrored_contents() {
        let mut vfs = Vfs::new();
        vfs.mount_fat32(build_fat32_image()).unwrap();
        let h = vfs.open(vfs.root(), "/rofs/HELLO.TXT", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(vfs.read(&h, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"World");
    }

    #[test]
    fn write_open_against_fat32_mount_returns_rofs() {
        let mut vfs = Vfs::new();
        vfs.mount_fat32(build_fat32_image()).unwrap();
        let err = vfs.open(vfs.root(), "/rofs/HELLO.TXT", OpenFlags::RDWR).unwrap_err();
        assert_eq!(err, Errno::Rofs);
    }

    #[test]
    fn creating_a_new_file_under_fat32_mount_returns_rofs() {
        let mut vfs = Vfs::new();
        vfs.mount_fat32(build_fat32_image()).unwrap();
        let err = vfs
            .open(vfs.root(), "/rofs/new.txt", OpenFlags::RDWR | OpenFlags::CREAT)
            .unwrap_err();
        assert_eq!(err, Errno::Rofs);
    }
}
