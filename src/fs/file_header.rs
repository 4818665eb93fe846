//! Disk file headers (inodes).
//!
//! A file header records a file's size and where its bytes live, and
//! serializes into exactly one disk sector. The first `NUM_DIRECT - 1`
//! slots point straight at data sectors; a file needing more than that
//! uses the last slot to link a *tail* header, another full file header
//! describing the remaining bytes. Offset translation therefore peels
//! off `MAX_DIRECT_SPAN` bytes per level and recurses into the tail.
//!
//! Headers carry no permissions, ownership or timestamps — only the
//! geometry. Allocation and growth claim sectors from the free-sector
//! bitmap and roll every claimed sector back if any single claim fails,
//! so a failed operation leaves the bitmap exactly as it found it.

use crate::constants::{MAX_DIRECT_SPAN, NUM_DIRECT, SECTOR_SIZE};
use crate::fs::SynchDisk;
use crate::util::Bitmap;
use static_assertions::const_assert;

// One encoded header must fit in a sector.
const_assert!(4 + 4 + 4 * NUM_DIRECT <= SECTOR_SIZE);

/// On-disk layout of a file header: `num_bytes`, `num_sectors`, then the
/// sector table, all 32-bit little-endian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFileHeader {
    /// Bytes covered by this header's subtree.
    pub num_bytes: u32,
    /// Data sectors covered by this header's subtree
    /// (`ceil(num_bytes / SECTOR_SIZE)`).
    pub num_sectors: u32,
    /// Data sector table; slot `NUM_DIRECT - 1` is the tail-header link
    /// when `num_sectors >= NUM_DIRECT`.
    pub data_sectors: [u32; NUM_DIRECT],
}

impl Default for RawFileHeader {
    fn default() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            data_sectors: [0; NUM_DIRECT],
        }
    }
}

impl RawFileHeader {
    /// Encode into one sector, little-endian.
    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut out = [0u8; SECTOR_SIZE];
        out[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        out[4..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        for (i, sector) in self.data_sectors.iter().enumerate() {
            out[8 + i * 4..12 + i * 4].copy_from_slice(&sector.to_le_bytes());
        }
        out
    }

    /// Decode from one sector, little-endian.
    pub fn decode(bytes: &[u8; SECTOR_SIZE]) -> Self {
        let word =
            |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        let mut data_sectors = [0u32; NUM_DIRECT];
        for (i, sector) in data_sectors.iter_mut().enumerate() {
            *sector = word(8 + i * 4);
        }
        Self {
            num_bytes: word(0),
            num_sectors: word(4),
            data_sectors,
        }
    }
}

/// In-memory file header, with its tail chain decoded.
#[derive(Clone, Debug, Default)]
pub struct FileHeader {
    raw: RawFileHeader,
    tail: Option<Box<FileHeader>>,
}

fn sectors_for(bytes: usize) -> usize {
    bytes.div_ceil(SECTOR_SIZE)
}

impl FileHeader {
    /// Total sectors a file of `bytes` bytes occupies, indirection
    /// headers included. Slightly conservative for the headers, which is
    /// what an allocation pre-check wants.
    pub fn total_sectors(bytes: usize) -> usize {
        let raw = sectors_for(bytes);
        raw + raw.div_ceil(NUM_DIRECT)
    }

    /// Bytes in the file.
    pub fn length(&self) -> usize {
        self.raw.num_bytes as usize
    }

    /// The raw on-disk form of this header (tail excluded).
    pub fn raw(&self) -> &RawFileHeader {
        &self.raw
    }

    fn direct_count(&self) -> usize {
        (self.raw.num_sectors as usize).min(NUM_DIRECT - 1)
    }

    fn has_tail(&self) -> bool {
        self.raw.num_sectors as usize >= NUM_DIRECT
    }

    fn rollback(free_map: &mut Bitmap, claimed: &[usize]) {
        for &sector in claimed {
            free_map.clear(sector);
        }
    }

    /// Initialize a fresh header for a file of `file_size` bytes,
    /// claiming data (and tail-header) sectors from `free_map`.
    ///
    /// Returns `false` — with `free_map` untouched — if the disk cannot
    /// hold the file.
    pub fn allocate(&mut self, free_map: &mut Bitmap, file_size: usize) -> bool {
        if free_map.count_clear() < Self::total_sectors(file_size) {
            return false;
        }

        let raw_sectors = sectors_for(file_size);
        self.raw.num_bytes = file_size as u32;
        self.raw.num_sectors = raw_sectors as u32;

        let mut claimed = Vec::new();
        for i in 0..raw_sectors.min(NUM_DIRECT - 1) {
            let Some(sector) = free_map.find() else {
                Self::rollback(free_map, &claimed);
                return false;
            };
            self.raw.data_sectors[i] = sector as u32;
            claimed.push(sector);
        }

        if raw_sectors > NUM_DIRECT - 1 {
            let Some(tail_sector) = free_map.find() else {
                Self::rollback(free_map, &claimed);
                return false;
            };
            claimed.push(tail_sector);
            let mut tail = FileHeader::default();
            if !tail.allocate(free_map, file_size - MAX_DIRECT_SPAN) {
                Self::rollback(free_map, &claimed);
                return false;
            }
            self.raw.data_sectors[NUM_DIRECT - 1] = tail_sector as u32;
            self.tail = Some(Box::new(tail));
        }
        true
    }

    /// Grow the file by `additional` bytes, claiming only the sectors
    /// the growth needs. An existing tail grows recursively; growth past
    /// the direct span creates one.
    ///
    /// Returns `false` — with `free_map` untouched — on exhaustion.
    pub fn extend(&mut self, free_map: &mut Bitmap, additional: usize) -> bool {
        if additional == 0 {
            return true;
        }

        if let Some(tail) = self.tail.as_mut() {
            if !tail.extend(free_map, additional) {
                return false;
            }
            self.raw.num_bytes += additional as u32;
            self.raw.num_sectors = sectors_for(self.raw.num_bytes as usize) as u32;
            return true;
        }

        let new_bytes = self.raw.num_bytes as usize + additional;
        let new_sectors = sectors_for(new_bytes);
        let old_sectors = self.raw.num_sectors as usize;

        let mut claimed = Vec::new();
        for i in old_sectors..new_sectors.min(NUM_DIRECT - 1) {
            let Some(sector) = free_map.find() else {
                Self::rollback(free_map, &claimed);
                return false;
            };
            self.raw.data_sectors[i] = sector as u32;
            claimed.push(sector);
        }

        if new_sectors > NUM_DIRECT - 1 {
            let Some(tail_sector) = free_map.find() else {
                Self::rollback(free_map, &claimed);
                return false;
            };
            claimed.push(tail_sector);
            let mut tail = FileHeader::default();
            if !tail.allocate(free_map, new_bytes - MAX_DIRECT_SPAN) {
                Self::rollback(free_map, &claimed);
                return false;
            }
            self.raw.data_sectors[NUM_DIRECT - 1] = tail_sector as u32;
            self.tail = Some(Box::new(tail));
        }

        self.raw.num_bytes = new_bytes as u32;
        self.raw.num_sectors = new_sectors as u32;
        true
    }

    /// Return every sector of the file — tail chain first, then this
    /// level's data sectors — to `free_map`.
    pub fn deallocate(&mut self, free_map: &mut Bitmap) {
        if let Some(mut tail) = self.tail.take() {
            tail.deallocate(free_map);
            free_map.clear(self.raw.data_sectors[NUM_DIRECT - 1] as usize);
        }
        for i in 0..self.direct_count() {
            let sector = self.raw.data_sectors[i] as usize;
            assert!(free_map.test(sector), "deallocating an unclaimed sector");
            free_map.clear(sector);
        }
        self.raw = RawFileHeader::default();
    }

    /// The disk sector holding the byte at `offset`.
    ///
    /// # Panics
    /// Panics if `offset` is past the end of the file.
    pub fn byte_to_sector(&self, offset: usize) -> usize {
        assert!(offset < self.length(), "offset beyond end of file");
        if offset / SECTOR_SIZE < NUM_DIRECT - 1 {
            self.raw.data_sectors[offset / SECTOR_SIZE] as usize
        } else {
            self.tail
                .as_ref()
                .expect("offset within length but no tail header")
                .byte_to_sector(offset - MAX_DIRECT_SPAN)
        }
    }

    /// Read the header chain rooted at `sector` from disk.
    pub fn fetch_from(disk: &SynchDisk, sector: usize) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(sector, &mut buf);
        let raw = RawFileHeader::decode(&buf);
        let tail = (raw.num_sectors as usize >= NUM_DIRECT).then(|| {
            Box::new(Self::fetch_from(
                disk,
                raw.data_sectors[NUM_DIRECT - 1] as usize,
            ))
        });
        Self { raw, tail }
    }

    /// Write the header chain back to disk, rooted at `sector`.
    pub fn write_back(&self, disk: &SynchDisk, sector: usize) {
        disk.write_sector(sector, &self.raw.encode());
        if let Some(tail) = self.tail.as_ref() {
            tail.write_back(disk, self.raw.data_sectors[NUM_DIRECT - 1] as usize);
        }
    }

    /// Walk every sector the chain claims (data sectors and tail-header
    /// sectors), for consistency checking.
    pub fn claimed_sectors(&self) -> Vec<usize> {
        let mut sectors: Vec<usize> = (0..self.direct_count())
            .map(|i| self.raw.data_sectors[i] as usize)
            .collect();
        if let Some(tail) = self.tail.as_ref() {
            sectors.push(self.raw.data_sectors[NUM_DIRECT - 1] as usize);
            sectors.extend(tail.claimed_sectors());
        }
        sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_SECTORS;

    #[test]
    fn small_file_stays_direct() {
        let mut map = Bitmap::new(NUM_SECTORS);
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, 3 * SECTOR_SIZE + 1));
        assert_eq!(header.raw().num_sectors, 4);
        assert!(!header.has_tail());
        assert_eq!(header.byte_to_sector(0), header.raw().data_sectors[0] as usize);
        assert_eq!(
            header.byte_to_sector(3 * SECTOR_SIZE),
            header.raw().data_sectors[3] as usize
        );
    }

    #[test]
    fn crossing_the_direct_span_creates_a_tail() {
        let mut map = Bitmap::new(NUM_SECTORS);
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, MAX_DIRECT_SPAN + 1));
        assert!(header.has_tail());
        // The byte just past the direct span translates through the tail.
        let sector = header.byte_to_sector(MAX_DIRECT_SPAN);
        assert!(map.test(sector));
    }

    #[test]
    fn extend_across_the_boundary_preserves_direct_sectors() {
        let mut map = Bitmap::new(NUM_SECTORS);
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, 10 * SECTOR_SIZE));
        let before: Vec<u32> = header.raw().data_sectors[..10].to_vec();
        assert!(header.extend(&mut map, MAX_DIRECT_SPAN));
        assert!(header.has_tail());
        assert_eq!(&header.raw().data_sectors[..10], &before[..]);
        assert_eq!(header.length(), 10 * SECTOR_SIZE + MAX_DIRECT_SPAN);
    }

    #[test]
    fn deallocate_returns_every_sector() {
        let mut map = Bitmap::new(NUM_SECTORS);
        let clear_before = map.count_clear();
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, MAX_DIRECT_SPAN + 5 * SECTOR_SIZE));
        header.deallocate(&mut map);
        assert_eq!(map.count_clear(), clear_before);
    }

    #[test]
    fn failed_allocation_rolls_back() {
        let mut map = Bitmap::new(8);
        let mut header = FileHeader::default();
        assert!(!header.allocate(&mut map, 20 * SECTOR_SIZE));
        assert_eq!(map.count_clear(), 8);
    }

    #[test]
    fn failed_extension_rolls_back() {
        let mut map = Bitmap::new(6);
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, 4 * SECTOR_SIZE));
        assert!(!header.extend(&mut map, 10 * SECTOR_SIZE));
        assert_eq!(map.count_clear(), 2);
        assert_eq!(header.length(), 4 * SECTOR_SIZE);
    }

    #[test]
    fn survives_disk_round_trip() {
        let disk = SynchDisk::new();
        let mut map = Bitmap::new(NUM_SECTORS);
        map.mark(5); // header's own sector
        let mut header = FileHeader::default();
        assert!(header.allocate(&mut map, MAX_DIRECT_SPAN + 3 * SECTOR_SIZE));
        header.write_back(&disk, 5);
        let loaded = FileHeader::fetch_from(&disk, 5);
        assert_eq!(loaded.length(), header.length());
        for offset in [0, SECTOR_SIZE, MAX_DIRECT_SPAN, MAX_DIRECT_SPAN + SECTOR_SIZE] {
            assert_eq!(loaded.byte_to_sector(offset), header.byte_to_sector(offset));
        }
    }
}
