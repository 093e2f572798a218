//! Read-only FAT32 adapter.
//!
//! Grounded directly on `common/fat32_base.c` (`original_source/`);
//! there is no teacher precedent for this filesystem. The reference
//! kernel addresses a FAT32 volume as a single in-memory blob rather
//! than through a block device (its FAT32 partitions are loaded
//! wholesale at boot), so this adapter does the same: every method
//! takes byte offsets directly into an `&[u8]` volume image.
//!
//! Long file names are supported only in their ASCII subset, matching
//! the reference kernel's own documented limitation. Lookups use the
//! reference kernel's deliberately non-compliant rule: a long name
//! compares case-sensitively, a bare short (8.3) name case-
//! insensitively — this is what lets a case-sensitive UNIX-style
//! lookup work at all on a filesystem that is otherwise case-blind.
//! Write support is out of scope.

use alloc::string::String;
use alloc::vec::Vec;

use crate::errno::Errno;

pub const SECTOR_SIZE: usize = 512;

const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LONG_NAME: u8 = 0x0F;

const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub has_long_name: bool,
    pub kind: EntryKind,
    pub first_cluster: u32,
    pub file_size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub fat_size_sectors: u32,
    pub root_cluster: u32,
    pub total_sectors: u32,
}

impl Bpb {
    /// Parses the first sector of a FAT32 volume. Only the fields this
    /// read-only adapter needs are read.
    pub fn parse(sector0: &[u8]) -> Result<Bpb, Errno> {
        if sector0.len() < SECTOR_SIZE {
            return Err(Errno::Inval);
        }
        if sector0[510] != 0x55 || sector0[511] != 0xAA {
            return Err(Errno::Inval);
        }

        let u16_at = |off: usize| u16::from_le_bytes([sector0[off], sector0[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_le_bytes([sector0[off], sector0[off + 1], sector0[off + 2], sector0[off + 3]])
        };

        let bytes_per_sector = u16_at(11);
        let sectors_per_cluster = sector0[13];
        let reserved_sectors = u16_at(14);
        let num_fats = sector0[16];
        let tot_sec16 = u16_at(19);
        let fat_sz16 = u16_at(22);
        let tot_sec32 = u32_at(32);
        let fat_sz32 = u32_at(36);
        let root_cluster = u32_at(44);

        let fat_size_sectors = if fat_sz16 != 0 { fat_sz16 as u32 } else { fat_sz32 };
        let total_sectors = if tot_sec16 != 0 { tot_sec16 as u32 } else { tot_sec32 };

        if fat_size_sectors == 0 || bytes_per_sector == 0 || sectors_per_cluster == 0 {
            return Err(Errno::Inval);
        }

        Ok(Bpb {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size_sectors,
            root_cluster,
            total_sectors,
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    fn first_data_sector(&self) -> u32 {
        self.reserved_sectors as u32 + self.num_fats as u32 * self.fat_size_sectors
    }

    fn first_sector_of_cluster(&self, cluster: u32) -> u32 {
        (cluster - 2) * self.sectors_per_cluster as u32 + self.first_data_sector()
    }
}

fn is_long_name_entry(raw: &[u8]) -> bool {
    raw[11] & ATTR_LONG_NAME == ATTR_LONG_NAME
}

/// The Microsoft-specified rotate-right checksum of an 11-byte 8.3
/// short name, used to verify a preceding run of long-name entries
/// actually belongs to the short entry that follows it.
fn short_name_checksum(raw11: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for &b in raw11 {
        sum = (if sum & 1 != 0 { 0x80u8 } else { 0 }).wrapping_add(sum >> 1).wrapping_add(b);
    }
    sum
}

fn decode_short_name(raw11: &[u8]) -> String {
    let mut s = String::new();
    let mut i = 0;
    while i < 8 && raw11[i] != b' ' {
        s.push(raw11[i] as char);
        i += 1;
    }
    if raw11[8] != b' ' {
        s.push('.');
        let mut j = 8;
        while j < 11 && raw11[j] != b' ' {
            s.push(raw11[j] as char);
            j += 1;
        }
    }
    s
}

/// Appends this entry's characters to `out`. Returns `false` if a
/// non-ASCII UTF-16 code unit is found (unsupported; the caller drops
/// the whole accumulated name and falls back to the short name).
fn lfn_chars(raw: &[u8], out: &mut Vec<u8>) -> bool {
    for &(start, end) in &[(1usize, 11usize), (14, 26), (28, 32)] {
        let mut i = start;
        while i < end {
            let lo = raw[i];
            let hi = raw[i + 1];
            if hi != 0 {
                return false;
            }
            if lo == 0 || lo == 0xFF {
                return true;
            }
            out.push(lo);
            i += 2;
        }
    }
    true
}

fn name_matches(entry: &DirEntry, query: &str) -> bool {
    if entry.has_long_name {
        entry.name == query
    } else {
        entry.name.eq_ignore_ascii_case(query)
    }
}

pub struct Fat32Volume<'a> {
    image: &'a [u8],
    bpb: Bpb,
}

impl<'a> Fat32Volume<'a> {
    pub fn mount(image: &'a [u8]) -> Result<Self, Errno> {
        let bpb = Bpb::parse(image)?;
        Ok(Fat32Volume { image, bpb })
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb.root_cluster
    }

    fn sector(&self, sector: u32) -> &[u8] {
        let start = sector as usize * self.bpb.bytes_per_sector as usize;
        &self.image[start..start + self.bpb.bytes_per_sector as usize]
    }

    fn cluster_data(&self, cluster: u32) -> &[u8] {
        let first_sector = self.bpb.first_sector_of_cluster(cluster);
        let start = first_sector as usize * self.bpb.bytes_per_sector as usize;
        let len = self.bpb.cluster_size();
        &self.image[start..start + len]
    }

    fn fat_entry(&self, cluster: u32) -> u32 {
        let fat_offset = cluster as usize * 4;
        let fat_sector = self.bpb.reserved_sectors as u32
            + (fat_offset / self.bpb.bytes_per_sector as usize) as u32;
        let ent_offset = fat_offset % self.bpb.bytes_per_sector as usize;
        let sec = self.sector(fat_sector);
        u32::from_le_bytes([
            sec[ent_offset],
            sec[ent_offset + 1],
            sec[ent_offset + 2],
            sec[ent_offset + 3],
        ]) & 0x0FFF_FFFF
    }

    fn is_end_of_chain(val: u32) -> bool {
        val >= END_OF_CHAIN_MIN
    }

    fn is_bad_cluster(val: u32) -> bool {
        val == BAD_CLUSTER
    }

    /// Every raw 32-byte directory-entry slot across the cluster chain
    /// starting at `first_cluster`.
    fn dir_entry_slots(&self, first_cluster: u32) -> Vec<&[u8]> {
        let mut slots = Vec::new();
        let mut cluster = first_cluster;
        loop {
            for chunk in self.cluster_data(cluster).chunks(32) {
                slots.push(chunk);
            }
            let next = self.fat_entry(cluster);
            if Self::is_end_of_chain(next) {
                break;
            }
            debug_assert!(!Self::is_bad_cluster(next), "bad cluster in chain");
            cluster = next;
        }
        slots
    }

    /// Lists a directory's entries, combining runs of long-name
    /// entries with the short entry that terminates them the way
    /// `fat_walk_directory` does. A run whose checksum does not match
    /// the following short entry, or that contains a non-ASCII
    /// character, is dropped and the short name is used instead.
    pub fn read_dir(&self, first_cluster: u32) -> Vec<DirEntry> {
        let mut out = Vec::new();
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut chksum: Option<u8> = None;

        for raw in self.dir_entry_slots(first_cluster) {
            if raw[0] == 0x00 {
                break;
            }
            if raw[0] == 0xE5 {
                chunks.clear();
                chksum = None;
                continue;
            }
            if is_long_name_entry(raw) {
                let this_chksum = raw[13];
                if chksum != Some(this_chksum) {
                    chunks.clear();
                    chksum = Some(this_chksum);
                }
                let mut piece = Vec::new();
                if !lfn_chars(raw, &mut piece) {
                    chunks.clear();
                    chksum = None;
                    continue;
                }
                chunks.push(piece);
                continue;
            }
            if raw[11] & ATTR_VOLUME_ID != 0 {
                chunks.clear();
                chksum = None;
                continue;
            }
            if raw[0] == b'.' {
                // skips "." and ".."; not legal as a short-name lead byte otherwise
                chunks.clear();
                chksum = None;
                continue;
            }

            let has_long_name = !chunks.is_empty() && chksum == Some(short_name_checksum(&raw[0..11]));
            let name = if has_long_name {
                // entries are stored highest-ordinal (last name chunk) first
                chunks.iter().rev().flat_map(|c| c.iter()).map(|&b| b as char).collect()
            } else {
                decode_short_name(&raw[0..11])
            };

            let attr = raw[11];
            let first_cluster_hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
            let first_cluster_lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;
            let file_size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);

            out.push(DirEntry {
                name,
                has_long_name,
                kind: if attr & ATTR_DIRECTORY != 0 { EntryKind::Dir } else { EntryKind::File },
                first_cluster: (first_cluster_hi << 16) | first_cluster_lo,
                file_size,
            });

            chunks.clear();
            chksum = None;
        }

        out
    }

    /// Resolves an absolute path, descending one directory per
    /// component.
    pub fn lookup(&self, path: &str) -> Result<DirEntry, Errno> {
        if !path.starts_with('/') {
            return Err(Errno::Inval);
        }
        let components: Vec<&str> = path.trim_start_matches('/').split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Err(Errno::Inval);
        }

        let mut cluster = self.root_cluster();
        let mut last: Option<DirEntry> = None;
        for (i, component) in components.iter().enumerate() {
            let entries = self.read_dir(cluster);
            let found = entries.into_iter().find(|e| name_matches(e, component)).ok_or(Errno::NoEnt)?;
            if i + 1 < components.len() {
                if found.kind != EntryKind::Dir {
                    return Err(Errno::NotDir);
                }
                cluster = found.first_cluster;
            }
            last = Some(found);
        }
        last.ok_or(Errno::NoEnt)
    }

    /// Reads a file's entire contents by walking its cluster chain.
    /// A chain that ends before `file_size` bytes have been read
    /// simply yields a shorter (truncated) result.
    pub fn read_file(&self, entry: &DirEntry) -> Result<Vec<u8>, Errno> {
        if entry.kind != EntryKind::File {
            return Err(Errno::IsDir);
        }
        let mut out = Vec::with_capacity(entry.file_size as usize);
        let mut remaining = entry.file_size as usize;
        if remaining == 0 {
            return Ok(out);
        }
        let mut cluster = entry.first_cluster;
        loop {
            let data = self.cluster_data(cluster);
            let take = remaining.min(data.len());
            out.extend_from_slice(&data[..take]);
            remaining -= take;
            if remaining == 0 {
                break;
            }
            let next = self.fat_entry(cluster);
            if Self::is_end_of_chain(next) {
                break;
            }
            cluster = next;
        }
        Ok(out)
    }
}
