// Shared-memory ring layout: a fixed header followed by `slot_count`
// frame slots, mapped into every attached process.
//
// Single-writer / multi-reader discipline: only the producer stores to
// the header cursor and the slot contents; readers hold a read-only
// mapping and a private cursor. Per-slot sequence words make torn reads
// detectable — a slot is written as invalidate / payload / revalidate,
// and a reader re-checks the sequence after copying.

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use memmap2::{Mmap, MmapMut, MmapOptions};

/// Magic word identifying a framesink preview ring.
pub const RING_MAGIC: u32 = 0xFEFD;
/// Bumped whenever the mapped layout changes.
pub const RING_VERSION: u32 = 1;

const HEADER_LEN: usize = 64;
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_SLOT_COUNT: usize = 8;
const OFF_SLOT_CAPACITY: usize = 12;
const OFF_CLOSED: usize = 16;
const OFF_WRITE_CURSOR: usize = 24;

const SLOT_HEADER_LEN: usize = 32;
const SLOT_OFF_SEQ: usize = 0;
const SLOT_OFF_WIDTH: usize = 8;
const SLOT_OFF_HEIGHT: usize = 12;
const SLOT_OFF_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    pub slot_count: u32,
    pub slot_capacity: u32,
}

impl RingGeometry {
    pub fn new(slot_count: u32, slot_capacity: u32) -> Self {
        Self {
            slot_count,
            slot_capacity,
        }
    }

    // Payload area padded so every slot header stays 8-byte aligned.
    fn slot_stride(&self) -> usize {
        SLOT_HEADER_LEN + (self.slot_capacity as usize).next_multiple_of(8)
    }

    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.slot_count as usize * self.slot_stride()
    }

    fn slot_offset(&self, slot: u64) -> usize {
        HEADER_LEN + slot as usize * self.slot_stride()
    }
}

/// Frames irretrievably overwritten before a reader at `cursor` could
/// observe them. Frames newer than `write_cursor - slot_count` are still
/// resident in the ring and not counted.
pub fn lost_frames(cursor: u64, write_cursor: u64, slot_count: u32) -> u64 {
    write_cursor
        .saturating_sub(slot_count as u64)
        .saturating_sub(cursor)
}

// The header fields below are only ever accessed through these atomics;
// offsets are 8-byte aligned and the mapping is page aligned.
fn atomic_u32(base: *const u8, off: usize) -> &'static AtomicU32 {
    unsafe { &*(base.add(off) as *const AtomicU32) }
}

fn atomic_u64(base: *const u8, off: usize) -> &'static AtomicU64 {
    unsafe { &*(base.add(off) as *const AtomicU64) }
}

fn read_u32(base: *const u8, off: usize) -> u32 {
    atomic_u32(base, off).load(Ordering::Acquire)
}

/// Producer-side mapping. Exactly one exists per channel.
pub struct RingWriter {
    map: MmapMut,
    geo: RingGeometry,
}

impl RingWriter {
    /// Initialize `file` as an empty ring and map it writable.
    pub fn create(file: &File, geo: RingGeometry) -> io::Result<Self> {
        file.set_len(geo.total_len() as u64)?;
        let map = unsafe { MmapOptions::new().map_mut(file)? };
        let writer = Self { map, geo };

        let base = writer.map.as_ptr();
        atomic_u32(base, OFF_SLOT_COUNT).store(geo.slot_count, Ordering::Release);
        atomic_u32(base, OFF_SLOT_CAPACITY).store(geo.slot_capacity, Ordering::Release);
        atomic_u32(base, OFF_CLOSED).store(0, Ordering::Release);
        atomic_u64(base, OFF_WRITE_CURSOR).store(0, Ordering::Release);
        atomic_u32(base, OFF_VERSION).store(RING_VERSION, Ordering::Release);
        // Magic last: a reader that maps mid-initialization sees no magic
        // rather than a half-initialized header.
        atomic_u32(base, OFF_MAGIC).store(RING_MAGIC, Ordering::Release);
        Ok(writer)
    }

    pub fn write_cursor(&self) -> u64 {
        atomic_u64(self.map.as_ptr(), OFF_WRITE_CURSOR).load(Ordering::Acquire)
    }

    /// Write one frame into the next slot and advance the cursor.
    /// Never blocks; the payload must fit `slot_capacity` (checked by
    /// the caller). Returns the published frame index.
    pub fn publish(&mut self, width: u32, height: u32, payload: &[u8]) -> u64 {
        debug_assert!(payload.len() <= self.geo.slot_capacity as usize);

        let index = self.write_cursor();
        let slot = self.geo.slot_offset(index % self.geo.slot_count as u64);
        let base = self.map.as_ptr();

        let seq = atomic_u64(base, slot + SLOT_OFF_SEQ);
        seq.store(0, Ordering::Release);
        fence(Ordering::Release);

        atomic_u32(base, slot + SLOT_OFF_WIDTH).store(width, Ordering::Relaxed);
        atomic_u32(base, slot + SLOT_OFF_HEIGHT).store(height, Ordering::Relaxed);
        atomic_u32(base, slot + SLOT_OFF_LEN).store(payload.len() as u32, Ordering::Relaxed);
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.map.as_mut_ptr().add(slot + SLOT_HEADER_LEN),
                payload.len(),
            );
        }

        fence(Ordering::Release);
        seq.store(index + 1, Ordering::Release);
        atomic_u64(base, OFF_WRITE_CURSOR).store(index + 1, Ordering::Release);
        index
    }

    /// Flag the channel closed for every attached reader.
    pub fn mark_closed(&self) {
        atomic_u32(self.map.as_ptr(), OFF_CLOSED).store(1, Ordering::Release);
    }
}

/// Read-only mapping held by each attached reader.
pub struct RingView {
    map: Mmap,
    geo: RingGeometry,
}

impl RingView {
    /// Map `file` and validate that it is a compatible ring.
    pub fn open(file: &File) -> io::Result<Self> {
        let map = unsafe { MmapOptions::new().map(file)? };
        if map.len() < HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "short ring file"));
        }
        let base = map.as_ptr();
        if read_u32(base, OFF_MAGIC) != RING_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad ring magic"));
        }
        if read_u32(base, OFF_VERSION) != RING_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported ring version",
            ));
        }
        let geo = RingGeometry::new(
            read_u32(base, OFF_SLOT_COUNT),
            read_u32(base, OFF_SLOT_CAPACITY),
        );
        if geo.slot_count == 0 || map.len() < geo.total_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ring geometry does not match file size",
            ));
        }
        Ok(Self { map, geo })
    }

    pub fn geometry(&self) -> RingGeometry {
        self.geo
    }

    pub fn write_cursor(&self) -> u64 {
        atomic_u64(self.map.as_ptr(), OFF_WRITE_CURSOR).load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        atomic_u32(self.map.as_ptr(), OFF_CLOSED).load(Ordering::Acquire) != 0
    }

    /// Copy the frame published at `index` out of its slot, or `None`
    /// if the writer has overwritten (or is overwriting) it.
    pub fn read_frame(&self, index: u64) -> Option<(u32, u32, Vec<u8>)> {
        let slot = self.geo.slot_offset(index % self.geo.slot_count as u64);
        let base = self.map.as_ptr();
        let seq = atomic_u64(base, slot + SLOT_OFF_SEQ);

        if seq.load(Ordering::Acquire) != index + 1 {
            return None;
        }
        let width = read_u32(base, slot + SLOT_OFF_WIDTH);
        let height = read_u32(base, slot + SLOT_OFF_HEIGHT);
        let len = read_u32(base, slot + SLOT_OFF_LEN) as usize;
        if len > self.geo.slot_capacity as usize {
            return None;
        }
        let mut payload = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(
                base.add(slot + SLOT_HEADER_LEN),
                payload.as_mut_ptr(),
                len,
            );
        }
        // Re-check after the copy: an unchanged sequence proves the slot
        // was not rewritten underneath us.
        fence(Ordering::Acquire);
        if seq.load(Ordering::Relaxed) != index + 1 {
            return None;
        }
        Some((width, height, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ring(geo: RingGeometry) -> (tempfile::NamedTempFile, RingWriter) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let writer = RingWriter::create(file.as_file(), geo).unwrap();
        (file, writer)
    }

    #[test]
    fn publish_and_read_round_trip() {
        let geo = RingGeometry::new(3, 64);
        let (file, mut writer) = temp_ring(geo);
        let view = RingView::open(file.as_file()).unwrap();

        assert_eq!(writer.publish(4, 2, &[7u8; 32]), 0);
        assert_eq!(view.write_cursor(), 1);
        let (w, h, data) = view.read_frame(0).unwrap();
        assert_eq!((w, h), (4, 2));
        assert_eq!(data, vec![7u8; 32]);
    }

    #[test]
    fn overwritten_slot_is_not_readable() {
        let geo = RingGeometry::new(2, 16);
        let (file, mut writer) = temp_ring(geo);
        let view = RingView::open(file.as_file()).unwrap();

        writer.publish(1, 1, &[1u8; 4]);
        writer.publish(1, 1, &[2u8; 4]);
        writer.publish(1, 1, &[3u8; 4]); // reuses slot 0, clobbering frame 0

        assert!(view.read_frame(0).is_none());
        assert!(view.read_frame(1).is_some());
        assert!(view.read_frame(2).is_some());
    }

    #[test]
    fn open_rejects_foreign_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(4096).unwrap();
        assert!(RingView::open(file.as_file()).is_err());
    }

    #[test]
    fn lost_frame_arithmetic() {
        // Reader attached since creation, 5 publishes into 3 slots: the
        // two oldest frames aged out.
        assert_eq!(lost_frames(0, 5, 3), 2);
        // Within one ring of the writer: nothing lost.
        assert_eq!(lost_frames(2, 5, 3), 0);
        assert_eq!(lost_frames(5, 5, 3), 0);
        // Far behind.
        assert_eq!(lost_frames(10, 100, 8), 82);
    }

    #[test]
    fn closed_flag_is_visible() {
        let geo = RingGeometry::new(2, 16);
        let (file, writer) = temp_ring(geo);
        let view = RingView::open(file.as_file()).unwrap();
        assert!(!view.is_closed());
        writer.mark_closed();
        assert!(view.is_closed());
    }
}
