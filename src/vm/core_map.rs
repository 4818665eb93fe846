//! The core map: one entry per physical frame.
//!
//! Tracks, for every frame, which process and virtual page own it plus
//! an `(accessed, modified)` pair maintained by the user-transfer layer.
//! When no frame is free, [`CoreMap::frame_to_swap`] picks a victim by
//! an improved second-chance rotation over the frames, classifying each
//! by its bit pair:
//!
//! - `(0,0)` — take it;
//! - `(0,1)` — clear `modified`, move on (clean next pass);
//! - `(1,0)` — clear `accessed` but *set* `modified`, moving the frame
//!   into the to-be-written class rather than the evictable one;
//! - `(1,1)` — clear `accessed`, move on.
//!
//! Every step strictly degrades a frame's class, so a victim is found
//! within four sweeps of the table; the rotation pointer persists
//! across calls.

/// Identifier of a user process (its address space).
pub type SpaceId = u32;

/// State of one physical frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoreEntry {
    /// The `(process, virtual page)` occupying the frame; `None` for a
    /// free frame.
    pub owner: Option<(SpaceId, usize)>,
    /// Touched since the replacement pointer last passed by.
    pub accessed: bool,
    /// Written since the frame was loaded.
    pub modified: bool,
}

/// The frame table.
pub struct CoreMap {
    core: Vec<CoreEntry>,
    next_victim: usize,
}

impl CoreMap {
    /// Creates a core map of `num_frames` free frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            core: vec![CoreEntry::default(); num_frames],
            next_victim: 0,
        }
    }

    /// Number of frames tracked.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Whether the map tracks zero frames.
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// The state of `frame`.
    pub fn entry(&self, frame: usize) -> CoreEntry {
        self.core[frame]
    }

    /// Claim a free frame for `(pid, vpn)` if one exists.
    pub fn reserve_next_available(&mut self, vpn: usize, pid: SpaceId) -> Option<usize> {
        let frame = self.core.iter().position(|e| e.owner.is_none())?;
        self.stamp(frame, vpn, pid);
        Some(frame)
    }

    /// Pick a victim frame by the second-chance rotation. The caller
    /// evicts the previous occupant and re-stamps the frame.
    pub fn frame_to_swap(&mut self) -> usize {
        loop {
            let index = self.next_victim;
            self.next_victim = (index + 1) % self.core.len();
            let entry = &mut self.core[index];
            match (entry.accessed, entry.modified) {
                (false, false) => return index,
                (false, true) => entry.modified = false,
                (true, false) => {
                    entry.accessed = false;
                    entry.modified = true;
                }
                (true, true) => entry.accessed = false,
            }
        }
    }

    /// Record `(pid, vpn)` as the occupant of `frame`, with fresh bits.
    pub fn stamp(&mut self, frame: usize, vpn: usize, pid: SpaceId) {
        self.core[frame] = CoreEntry {
            owner: Some((pid, vpn)),
            accessed: false,
            modified: false,
        };
    }

    /// Note a read through `frame`.
    pub fn mark_accessed(&mut self, frame: usize) {
        self.core[frame].accessed = true;
    }

    /// Note a write through `frame`.
    pub fn mark_modified(&mut self, frame: usize) {
        self.core[frame].accessed = true;
        self.core[frame].modified = true;
    }

    /// Free `frame`.
    pub fn reset(&mut self, frame: usize) {
        self.core[frame] = CoreEntry::default();
    }

    /// Free every frame owned by `pid`, when its address space dies.
    pub fn free_process_frames(&mut self, pid: SpaceId) {
        for entry in &mut self.core {
            if matches!(entry.owner, Some((owner, _)) if owner == pid) {
                *entry = CoreEntry::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_fills_frames_in_order() {
        let mut map = CoreMap::new(3);
        assert_eq!(map.reserve_next_available(0, 1), Some(0));
        assert_eq!(map.reserve_next_available(1, 1), Some(1));
        assert_eq!(map.reserve_next_available(2, 1), Some(2));
        assert_eq!(map.reserve_next_available(3, 1), None);
    }

    #[test]
    fn untouched_frame_is_the_first_victim() {
        let mut map = CoreMap::new(3);
        for vpn in 0..3 {
            map.reserve_next_available(vpn, 1);
        }
        map.mark_accessed(0);
        map.mark_modified(1);
        // Frame 2 is (0,0); frames 0 and 1 get their second chance.
        assert_eq!(map.frame_to_swap(), 2);
    }

    #[test]
    fn clean_but_accessed_frames_degrade_through_the_dirty_class() {
        let mut map = CoreMap::new(2);
        map.reserve_next_available(0, 1);
        map.reserve_next_available(1, 1);
        map.mark_accessed(0);
        map.mark_accessed(1);
        // Pass 1 demotes both (1,0) frames to (0,1); pass 2 cleans them
        // to (0,0); frame 0 is reached first on pass 3.
        assert_eq!(map.frame_to_swap(), 0);
    }

    #[test]
    fn a_victim_is_found_within_bounded_sweeps() {
        let mut map = CoreMap::new(4);
        for vpn in 0..4 {
            map.reserve_next_available(vpn, 7);
            map.mark_modified(vpn);
        }
        // Worst class everywhere still terminates.
        let victim = map.frame_to_swap();
        assert!(victim < 4);
    }

    #[test]
    fn freeing_a_process_releases_only_its_frames() {
        let mut map = CoreMap::new(4);
        map.reserve_next_available(0, 1);
        map.reserve_next_available(0, 2);
        map.reserve_next_available(1, 1);
        map.free_process_frames(1);
        assert!(map.entry(0).owner.is_none());
        assert_eq!(map.entry(1).owner, Some((2, 0)));
        assert!(map.entry(2).owner.is_none());
    }
}
