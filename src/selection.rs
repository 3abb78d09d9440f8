use std::collections::HashMap;

use crate::coords::{Position, Resolution};
use crate::mask::MaskImage;

/// Originating click or stroke anchor for a group of selected pixels.
pub type RegionTag = Position;

pub const HIGHLIGHT: u8 = 255;

/// The unit of brush painting: the pixel itself and its 8-neighbourhood.
#[rustfmt::skip]
pub const BRUSH_FOOTPRINT: [(i32, i32); 9] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0), (0, 0), (1, 0),
    (-1, 1), (0, 1), (1, 1),
];

/// Selected image-space pixels, each tagged with the action that produced it.
/// A pixel keeps the tag of whichever stroke or merge selected it first.
#[derive(Debug, Default)]
pub struct SelectionStore {
    bounds: Resolution,
    entries: HashMap<Position, RegionTag>,
    version: u64,
}

impl SelectionStore {
    pub fn new(bounds: Resolution) -> Self {
        SelectionStore { bounds, ..Default::default() }
    }

    pub fn bounds(&self) -> Resolution {
        self.bounds
    }

    pub fn reset(&mut self, bounds: Resolution) {
        self.clear();
        self.bounds = bounds;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.entries.contains_key(&pos)
    }

    pub fn tag_of(&self, pos: Position) -> Option<RegionTag> {
        self.entries.get(&pos).copied()
    }

    pub fn add_brush(&mut self, center: Position, tag: RegionTag) -> usize {
        let mut added = 0;
        for (dx, dy) in BRUSH_FOOTPRINT {
            if let Some(pos) = center.offset(dx, dy, self.bounds) {
                if self.insert(pos, tag) {
                    added += 1;
                }
            }
        }
        self.touch(added)
    }

    pub fn remove_brush(&mut self, center: Position) -> usize {
        let mut removed = 0;
        for (dx, dy) in BRUSH_FOOTPRINT {
            if let Some(pos) = center.offset(dx, dy, self.bounds) {
                if self.entries.remove(&pos).is_some() {
                    removed += 1;
                }
            }
        }
        self.touch(removed)
    }

    pub fn remove_by_tag(&mut self, tag: RegionTag) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, t| *t != tag);
        self.touch(before - self.entries.len())
    }

    /// Removes the whole region owning `pos`, if `pos` is selected at all.
    pub fn remove_region_at(&mut self, pos: Position) -> usize {
        match self.tag_of(pos) {
            Some(tag) => self.remove_by_tag(tag),
            None => 0,
        }
    }

    /// Resizes `mask` to the store bounds and selects every foreground pixel
    /// under `origin_tag`. Returns the number of pixels newly selected.
    pub fn merge_mask_result(&mut self, origin_tag: RegionTag, mask: &MaskImage) -> usize {
        let resized = mask.resize_nearest(self.bounds);
        let mut added = 0;
        for (x, y) in resized.foreground() {
            if self.insert(Position::new(x, y), origin_tag) {
                added += 1;
            }
        }
        self.touch(added)
    }

    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.touch(removed);
    }

    pub fn export_mask(&self, resolution: Resolution) -> Vec<u8> {
        let mut out = vec![0u8; resolution.area()];
        for pos in self.entries.keys() {
            if let Some(idx) = resolution.index_of(*pos) {
                out[idx] = HIGHLIGHT;
            }
        }
        out
    }

    fn insert(&mut self, pos: Position, tag: RegionTag) -> bool {
        if self.entries.contains_key(&pos) {
            return false;
        }
        self.entries.insert(pos, tag);
        true
    }

    fn touch(&mut self, changed: usize) -> usize {
        if changed > 0 {
            self.version += 1;
        }
        changed
    }
}
