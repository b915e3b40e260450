//! Uniform-grid spatial hash for neighbor search.
//!
//! Uses a sorted entry array + per-key offset table rather than `HashMap` so
//! the data layout uploads directly to GPU storage buffers (no pointer
//! chasing). The table is sized to the particle count: a cell's hash is
//! reduced to a key by `hash % n`, so no separate table-size parameter
//! exists and different cells may alias into the same bucket. Queries reject
//! aliases by comparing the exact cell hash before the distance filter.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};

/// Hash constants -- two large odd multipliers.
const HASH_K1: u32 = 15823;
const HASH_K2: u32 = 9737333;

/// The nine cell offsets of the 3x3 block around a cell.
const NEIGHBOR_OFFSETS: [IVec2; 9] = [
    IVec2::new(-1, 1),
    IVec2::new(0, 1),
    IVec2::new(1, 1),
    IVec2::new(-1, 0),
    IVec2::new(0, 0),
    IVec2::new(1, 0),
    IVec2::new(-1, -1),
    IVec2::new(0, -1),
    IVec2::new(1, -1),
];

/// One spatial index entry: `(particle index, cell hash, cell key)`.
///
/// Padded to 16 bytes so the entry array is byte-exact against the
/// `vec4<u32>`-strided layout the compute shaders read.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SpatialEntry {
    /// Particle index (stable identity).
    pub index: u32,
    /// Full cell hash, kept for alias rejection during queries.
    pub hash: u32,
    /// `hash % n` -- bucket key the entry array is sorted by.
    pub key: u32,
    _pad: u32,
}

/// Uniform-grid spatial hash over 2D points.
///
/// Rebuilt every frame from predicted positions; entry and offset arrays are
/// allocated once at construction and reused in place.
pub struct SpatialHashMap {
    count: usize,
    /// Entries sorted by `key` after [`rebuild`](Self::rebuild).
    entries: Vec<SpatialEntry>,
    /// `offsets[key]` = first sorted-entry index with that key, or the
    /// sentinel `count` for an empty bucket.
    offsets: Vec<u32>,
    /// Per-particle cell keys in identity order, refreshed by each rebuild.
    keys: Vec<f32>,
}

impl SpatialHashMap {
    /// Create a spatial hash sized to `particle_count` (fixed for the
    /// lifetime of the map).
    pub fn new(particle_count: usize) -> Self {
        assert!(particle_count > 0, "particle count must be positive");
        Self {
            count: particle_count,
            entries: vec![SpatialEntry::zeroed(); particle_count],
            offsets: vec![particle_count as u32; particle_count],
            keys: vec![0.0; particle_count],
        }
    }

    /// Map a position to its grid cell. Cells are `radius x radius` squares
    /// so one cell matches the interaction range.
    #[inline]
    pub fn cell_of(point: Vec2, radius: f32) -> IVec2 {
        (point / radius).floor().as_ivec2()
    }

    /// Hash a cell coordinate. Simple multiplicative hash, not
    /// collision-free: different cells may alias.
    #[inline]
    pub fn hash_cell(cell: IVec2) -> u32 {
        (cell.x as u32)
            .wrapping_mul(HASH_K1)
            .wrapping_add((cell.y as u32).wrapping_mul(HASH_K2))
    }

    /// Reduce a cell hash to a bucket key. Bucket count equals particle
    /// count.
    #[inline]
    pub fn key_from_hash(hash: u32, count: usize) -> u32 {
        hash % count as u32
    }

    /// Number of particles (and buckets).
    pub fn count(&self) -> usize {
        self.count
    }

    /// The sorted entry array. Valid after [`rebuild`](Self::rebuild).
    pub fn entries(&self) -> &[SpatialEntry] {
        &self.entries
    }

    /// The bucket offset table. `offsets[key] == count` marks an empty
    /// bucket.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Rebuild the index from `points` (typically predicted positions).
    ///
    /// `points.len()` must equal the construction count. Recomputes every
    /// entry, stable-sorts by key, then records the start of each key run.
    pub fn rebuild(&mut self, points: &[Vec2], radius: f32) {
        debug_assert_eq!(points.len(), self.count);
        let n = self.count as u32;

        // Reset all buckets to the "absent" sentinel before scattering runs.
        self.offsets.fill(n);

        for (i, &p) in points.iter().enumerate() {
            let hash = Self::hash_cell(Self::cell_of(p, radius));
            self.entries[i] = SpatialEntry {
                index: i as u32,
                hash,
                key: Self::key_from_hash(hash, self.count),
                _pad: 0,
            };
        }

        // Stable merge sort: contiguous same-key runs, ties kept in
        // insertion order.
        self.entries.sort_by_key(|e| e.key);

        for i in 0..self.count {
            let entry = self.entries[i];
            let prev = if i == 0 {
                u32::MAX
            } else {
                self.entries[i - 1].key
            };
            if entry.key != prev {
                self.offsets[entry.key as usize] = i as u32;
            }
            self.keys[entry.index as usize] = entry.key as f32;
        }
    }

    /// Visit every particle within `radius` of `points[target]`, including
    /// `target` itself. `f` receives the neighbor index and the squared
    /// distance.
    ///
    /// Scans the 3x3 cell block around the target's cell; each candidate
    /// run is filtered by exact hash (alias rejection) and squared
    /// distance.
    pub fn for_each_neighbor<F>(&self, target: usize, points: &[Vec2], radius: f32, mut f: F)
    where
        F: FnMut(usize, f32),
    {
        let center = Self::cell_of(points[target], radius);
        let pos = points[target];
        let radius_sq = radius * radius;
        let n = self.count as u32;

        for offset in NEIGHBOR_OFFSETS {
            let hash = Self::hash_cell(center + offset);
            let key = Self::key_from_hash(hash, self.count);
            let start = self.offsets[key as usize];

            let mut idx = start;
            while idx < n {
                let entry = self.entries[idx as usize];
                if entry.key != key {
                    break; // end of the contiguous run
                }
                idx += 1;
                if entry.hash != hash {
                    continue; // different cell aliased into this bucket
                }
                let j = entry.index as usize;
                let d2 = (points[j] - pos).length_squared();
                if d2 <= radius_sq {
                    f(j, d2);
                }
            }
        }
    }

    /// Per-particle cell keys in particle-identity order, refreshed by
    /// [`rebuild`](Self::rebuild). Used by the renderer for debug coloring
    /// of grid occupancy; the backing storage is reused across frames.
    pub fn cell_keys(&self) -> &[f32] {
        &self.keys
    }
}
