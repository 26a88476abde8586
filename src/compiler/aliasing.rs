//! Transient memory aliasing.
//!
//! Resources whose lifetimes do not overlap may share the same bytes of a
//! heap. Each aliasing group is packed independently into a stack of buckets:
//! the largest unplaced allocation anchors a new bucket, and smaller
//! allocations are placed into the tightest free region of an existing bucket
//! that no lifetime-overlapping allocation occupies.
//!
//! Lifetimes are closed intervals of dependency levels.

use std::collections::BTreeMap;
use std::fmt;
use std::iter;
use std::ops::Range;

use super::levels::ResourceUsageTimeline;
use crate::config::{CompilerConfig, HeapTier};
use crate::error::{CompileError, CompileResult};
use crate::graph::{AllocationRequest, ResourceId, ResourceRegistry};

/// Class of resources that may be placed in the same heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AliasingGroup {
    /// Color render targets and depth-stencil textures.
    RenderTargetsAndDepthStencils,
    /// Textures that are neither render targets nor depth-stencils.
    Textures,
    /// Buffers.
    Buffers,
    /// Any resource kind. Used for every resource on [`HeapTier::Tier2`].
    Universal,
}

impl fmt::Display for AliasingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AliasingGroup::RenderTargetsAndDepthStencils => "render target and depth stencil",
            AliasingGroup::Textures => "textures",
            AliasingGroup::Buffers => "buffers",
            AliasingGroup::Universal => "universal",
        };
        f.write_str(name)
    }
}

/// Closed interval of dependency levels during which a resource is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    /// First level the resource is used in.
    pub start: usize,
    /// Last level the resource is used in, inclusive.
    pub end: usize,
}

impl Lifetime {
    /// Create a lifetime covering levels `start..=end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Check if two lifetimes share at least one level.
    pub fn overlaps(&self, other: &Lifetime) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Placement of one transient resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasingMetadata {
    /// The placed resource.
    pub resource: ResourceId,
    /// Size the resource asked for.
    pub requested_size: u64,
    /// Size reserved in the heap, rounded up to the placement alignment.
    pub size: u64,
    /// Dependency levels during which the memory is in use.
    pub lifetime: Lifetime,
    /// Heap the resource lives in. Always `Universal` on tier 2 hardware.
    pub group: AliasingGroup,
    /// Byte offset from the start of the group's heap.
    pub heap_offset: u64,
}

impl AliasingMetadata {
    fn end_offset(&self) -> u64 {
        self.heap_offset.saturating_add(self.size)
    }

    fn shares_memory_with(&self, other: &AliasingMetadata) -> bool {
        self.shared_range(other).is_some()
    }

    /// Byte range both resources occupy in the same heap.
    fn shared_range(&self, other: &AliasingMetadata) -> Option<Range<u64>> {
        let start = self.heap_offset.max(other.heap_offset);
        let end = self.end_offset().min(other.end_offset());
        (self.group == other.group && start < end).then_some(start..end)
    }

    fn covers(&self, range: &Range<u64>) -> bool {
        self.heap_offset <= range.start && range.end <= self.end_offset()
    }
}

/// `after` reuses memory last used by `before`.
///
/// The execution layer issues an aliasing barrier before `after` is first
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasingBarrier {
    /// Resource that used the memory last.
    pub before: ResourceId,
    /// Resource taking the memory over.
    pub after: ResourceId,
}

/// Result of memory aliasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLayout {
    allocations: BTreeMap<ResourceId, AliasingMetadata>,
    heap_sizes: BTreeMap<AliasingGroup, u64>,
    barriers: Vec<AliasingBarrier>,
}

impl MemoryLayout {
    /// Get the placement of a resource.
    pub fn allocation(&self, resource: ResourceId) -> Option<&AliasingMetadata> {
        self.allocations.get(&resource)
    }

    /// All placements, ordered by resource id.
    pub fn allocations(&self) -> impl Iterator<Item = &AliasingMetadata> {
        self.allocations.values()
    }

    /// Size of the heap backing `group`, zero if nothing was placed in it.
    pub fn heap_size(&self, group: AliasingGroup) -> u64 {
        self.heap_sizes.get(&group).copied().unwrap_or(0)
    }

    /// Heap size of every group that received allocations.
    pub fn heap_sizes(&self) -> &BTreeMap<AliasingGroup, u64> {
        &self.heap_sizes
    }

    /// Sum of all heap sizes.
    pub fn total_size(&self) -> u64 {
        self.heap_sizes.values().sum()
    }

    /// All aliasing barriers, grouped by the resource taking memory over.
    pub fn barriers(&self) -> &[AliasingBarrier] {
        &self.barriers
    }

    /// Barriers that must be issued before `resource` is first used.
    pub fn barriers_before(&self, resource: ResourceId) -> impl Iterator<Item = &AliasingBarrier> {
        self.barriers
            .iter()
            .filter(move |barrier| barrier.after == resource)
    }

    /// Check if no resource requested memory.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    resource: ResourceId,
    offset: u64,
    size: u64,
    lifetime: Lifetime,
}

#[derive(Debug, Default)]
struct Bucket {
    size: u64,
    placed: Vec<Placement>,
}

impl Bucket {
    /// Smallest free region that fits `size` bytes during `lifetime`.
    ///
    /// Ties go to the lowest offset.
    fn find_gap(&self, size: u64, lifetime: Lifetime) -> Option<u64> {
        let mut occupied: Vec<(u64, u64)> = self
            .placed
            .iter()
            .filter(|placement| placement.lifetime.overlaps(&lifetime))
            .map(|placement| (placement.offset, placement.offset.saturating_add(placement.size)))
            .collect();
        occupied.sort_unstable();

        let mut best: Option<(u64, u64)> = None;
        let mut cursor = 0u64;
        for (start, end) in occupied
            .into_iter()
            .chain(iter::once((self.size, self.size)))
        {
            if start > cursor {
                let gap = start - cursor;
                if gap >= size && best.map_or(true, |(best_gap, _)| gap < best_gap) {
                    best = Some((gap, cursor));
                }
            }
            cursor = cursor.max(end);
        }
        best.map(|(_, offset)| offset)
    }
}

struct Candidate {
    resource: ResourceId,
    requested_size: u64,
    size: u64,
    lifetime: Lifetime,
}

/// Place every requested allocation and compute heap sizes and barriers.
///
/// Resources without a usage timeline are treated as alive for the whole
/// frame.
pub(crate) fn alias_memory(
    requests: &BTreeMap<ResourceId, AllocationRequest>,
    timelines: &BTreeMap<ResourceId, ResourceUsageTimeline>,
    level_count: usize,
    config: &CompilerConfig,
    registry: &ResourceRegistry,
) -> CompileResult<MemoryLayout> {
    let alignment = config.placement_alignment.max(1);
    let whole_frame = Lifetime::new(0, level_count.saturating_sub(1));

    let mut groups: BTreeMap<AliasingGroup, Vec<Candidate>> = BTreeMap::new();
    for (&resource, request) in requests {
        let lifetime = match timelines.get(&resource) {
            Some(timeline) => Lifetime::new(timeline.first_level, timeline.last_level),
            None => {
                log::warn!(
                    "'{}' has an allocation but is never used by a pass",
                    registry.name(resource)
                );
                whole_frame
            }
        };
        let group = match config.heap_tier {
            HeapTier::Tier1 => request.group,
            HeapTier::Tier2 => AliasingGroup::Universal,
        };
        groups.entry(group).or_default().push(Candidate {
            resource,
            requested_size: request.size,
            size: align_up(request.size.max(1), alignment),
            lifetime,
        });
    }

    let mut layout = MemoryLayout::default();
    for (group, mut candidates) in groups {
        candidates.sort_by(|a, b| b.size.cmp(&a.size).then(a.resource.cmp(&b.resource)));

        let buckets = pack_group(group, &candidates, config.max_heap_size, registry)?;

        let mut base = 0u64;
        for bucket in &buckets {
            for placement in &bucket.placed {
                let requested_size = candidates
                    .iter()
                    .find(|candidate| candidate.resource == placement.resource)
                    .map_or(placement.size, |candidate| candidate.requested_size);
                layout.allocations.insert(
                    placement.resource,
                    AliasingMetadata {
                        resource: placement.resource,
                        requested_size,
                        size: placement.size,
                        lifetime: placement.lifetime,
                        group,
                        heap_offset: base.saturating_add(placement.offset),
                    },
                );
            }
            // Bucket sizes add up to the heap size checked while packing.
            base = base.saturating_add(bucket.size);
        }

        log::debug!(
            "Aliased {} resources into a {} byte {} heap ({} buckets)",
            candidates.len(),
            base,
            group,
            buckets.len()
        );
        layout.heap_sizes.insert(group, base);
    }

    layout.barriers = aliasing_barriers(&layout.allocations);
    Ok(layout)
}

fn pack_group(
    group: AliasingGroup,
    candidates: &[Candidate],
    max_heap_size: Option<u64>,
    registry: &ResourceRegistry,
) -> CompileResult<Vec<Bucket>> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut heap_size = 0u64;

    for candidate in candidates {
        let slot = buckets.iter().enumerate().find_map(|(index, bucket)| {
            bucket
                .find_gap(candidate.size, candidate.lifetime)
                .map(|offset| (index, offset))
        });

        let (index, offset) = match slot {
            Some(slot) => slot,
            None => {
                let limit = max_heap_size.unwrap_or(u64::MAX);
                let Some(required) = heap_size
                    .checked_add(candidate.size)
                    .filter(|&required| required <= limit)
                else {
                    return Err(CompileError::AllocationOverflow {
                        resource: registry.name(candidate.resource).to_string(),
                        group,
                        size: candidate.size,
                        required: heap_size.saturating_add(candidate.size),
                        limit,
                    });
                };
                heap_size = required;
                buckets.push(Bucket {
                    size: candidate.size,
                    placed: Vec::new(),
                });
                (buckets.len() - 1, 0)
            }
        };

        log::trace!(
            "'{}' placed in bucket {} at offset {}",
            registry.name(candidate.resource),
            index,
            offset
        );
        buckets[index].placed.push(Placement {
            resource: candidate.resource,
            offset,
            size: candidate.size,
            lifetime: candidate.lifetime,
        });
    }

    Ok(buckets)
}

/// Every pair where `after` takes over bytes that `before` used last.
///
/// `before -> after` is skipped only when a resource living strictly between
/// them covers all bytes the two share; that resource then carries the
/// barrier instead.
fn aliasing_barriers(allocations: &BTreeMap<ResourceId, AliasingMetadata>) -> Vec<AliasingBarrier> {
    let mut barriers = Vec::new();
    for after in allocations.values() {
        for before in allocations.values() {
            if before.lifetime.end >= after.lifetime.start {
                continue;
            }
            let Some(shared) = before.shared_range(after) else {
                continue;
            };
            let hidden = allocations.values().any(|mid| {
                before.lifetime.end < mid.lifetime.start
                    && mid.lifetime.end < after.lifetime.start
                    && mid.group == after.group
                    && mid.covers(&shared)
            });
            if !hidden {
                barriers.push(AliasingBarrier {
                    before: before.resource,
                    after: after.resource,
                });
            }
        }
    }
    barriers
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment).saturating_mul(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    struct Fixture {
        registry: ResourceRegistry,
        requests: BTreeMap<ResourceId, AllocationRequest>,
        timelines: BTreeMap<ResourceId, ResourceUsageTimeline>,
        level_count: usize,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: ResourceRegistry::default(),
                requests: BTreeMap::new(),
                timelines: BTreeMap::new(),
                level_count: 0,
            }
        }

        fn add(
            &mut self,
            name: &str,
            size: u64,
            group: AliasingGroup,
            levels: Option<(usize, usize)>,
        ) -> ResourceId {
            let id = self.registry.intern(name);
            self.requests.insert(id, AllocationRequest { size, group });
            if let Some((first, last)) = levels {
                self.timelines.insert(
                    id,
                    ResourceUsageTimeline {
                        first_execution: first,
                        last_execution: last,
                        first_level: first,
                        last_level: last,
                    },
                );
                self.level_count = self.level_count.max(last + 1);
            }
            id
        }

        fn alias(&self, config: &CompilerConfig) -> CompileResult<MemoryLayout> {
            alias_memory(
                &self.requests,
                &self.timelines,
                self.level_count,
                config,
                &self.registry,
            )
        }
    }

    fn offset(layout: &MemoryLayout, id: ResourceId) -> u64 {
        layout.allocation(id).unwrap().heap_offset
    }

    #[test]
    fn test_lifetime_overlap_is_closed() {
        assert!(Lifetime::new(0, 1).overlaps(&Lifetime::new(1, 2)));
        assert!(Lifetime::new(2, 5).overlaps(&Lifetime::new(3, 3)));
        assert!(!Lifetime::new(0, 1).overlaps(&Lifetime::new(2, 3)));
    }

    #[test]
    fn test_disjoint_lifetimes_share_offset() {
        let mut fixture = Fixture::new();
        let a = fixture.add("A", MIB, AliasingGroup::Buffers, Some((0, 1)));
        let b = fixture.add("B", MIB, AliasingGroup::Buffers, Some((2, 3)));
        let c = fixture.add("C", MIB, AliasingGroup::Buffers, Some((4, 5)));

        let layout = fixture.alias(&CompilerConfig::default()).unwrap();
        assert_eq!(offset(&layout, a), 0);
        assert_eq!(offset(&layout, b), 0);
        assert_eq!(offset(&layout, c), 0);
        assert_eq!(layout.heap_size(AliasingGroup::Buffers), MIB);
    }

    #[test]
    fn test_overlapping_lifetimes_do_not_share_memory() {
        let mut fixture = Fixture::new();
        let a = fixture.add("A", MIB, AliasingGroup::Textures, Some((0, 2)));
        let b = fixture.add("B", MIB, AliasingGroup::Textures, Some((2, 3)));

        let layout = fixture.alias(&CompilerConfig::default()).unwrap();
        assert_ne!(offset(&layout, a), offset(&layout, b));
        assert_eq!(layout.heap_size(AliasingGroup::Textures), 2 * MIB);
        assert!(layout.barriers().is_empty());
    }

    #[test]
    fn test_small_allocations_fill_anchor_bucket() {
        let config = CompilerConfig::new().with_placement_alignment(1);
        let mut fixture = Fixture::new();
        let big = fixture.add("Big", 4, AliasingGroup::Buffers, Some((0, 1)));
        let left = fixture.add("Left", 2, AliasingGroup::Buffers, Some((2, 3)));
        let right = fixture.add("Right", 2, AliasingGroup::Buffers, Some((2, 3)));

        let layout = fixture.alias(&config).unwrap();
        assert_eq!(offset(&layout, big), 0);
        assert_eq!(offset(&layout, left), 0);
        assert_eq!(offset(&layout, right), 2);
        assert_eq!(layout.heap_size(AliasingGroup::Buffers), 4);
    }

    #[test]
    fn test_find_gap_prefers_tightest_region() {
        let lifetime = Lifetime::new(0, 0);
        let placed = |resource: u32, offset: u64, size: u64| Placement {
            resource: ResourceId::new(resource),
            offset,
            size,
            lifetime,
        };
        let bucket = Bucket {
            size: 10,
            placed: vec![placed(0, 0, 2), placed(1, 5, 1), placed(2, 8, 2)],
        };

        // Free regions are [2, 5) and [6, 8).
        assert_eq!(bucket.find_gap(2, lifetime), Some(6));
        assert_eq!(bucket.find_gap(3, lifetime), Some(2));
        assert_eq!(bucket.find_gap(4, lifetime), None);
        // Nothing overlaps a later lifetime, so the whole bucket is free.
        assert_eq!(bucket.find_gap(10, Lifetime::new(1, 1)), Some(0));
    }

    #[test]
    fn test_sizes_and_offsets_are_aligned() {
        let config = CompilerConfig::new().with_placement_alignment(256);
        let mut fixture = Fixture::new();
        let a = fixture.add("A", 100, AliasingGroup::Buffers, Some((0, 0)));
        let b = fixture.add("B", 300, AliasingGroup::Buffers, Some((0, 0)));

        let layout = fixture.alias(&config).unwrap();
        let a_meta = layout.allocation(a).unwrap();
        assert_eq!(a_meta.requested_size, 100);
        assert_eq!(a_meta.size, 256);
        assert_eq!(layout.allocation(b).unwrap().size, 512);
        assert_eq!(offset(&layout, b), 0);
        assert_eq!(offset(&layout, a), 512);
        assert_eq!(layout.total_size(), 768);
    }

    #[test]
    fn test_groups_use_separate_heaps() {
        let mut fixture = Fixture::new();
        let texture = fixture.add("Texture", MIB, AliasingGroup::Textures, Some((0, 0)));
        let buffer = fixture.add("Buffer", MIB, AliasingGroup::Buffers, Some((1, 1)));

        let layout = fixture.alias(&CompilerConfig::default()).unwrap();
        assert_eq!(offset(&layout, texture), 0);
        assert_eq!(offset(&layout, buffer), 0);
        assert_eq!(layout.heap_sizes().len(), 2);
        assert_eq!(layout.total_size(), 2 * MIB);
    }

    #[test]
    fn test_tier2_merges_groups() {
        let config = CompilerConfig::new().with_heap_tier(HeapTier::Tier2);
        let mut fixture = Fixture::new();
        let texture = fixture.add("Texture", MIB, AliasingGroup::Textures, Some((0, 0)));
        let buffer = fixture.add("Buffer", MIB, AliasingGroup::Buffers, Some((1, 1)));

        let layout = fixture.alias(&config).unwrap();
        assert_eq!(layout.allocation(texture).unwrap().group, AliasingGroup::Universal);
        assert_eq!(offset(&layout, texture), offset(&layout, buffer));
        assert_eq!(layout.heap_size(AliasingGroup::Universal), MIB);
        assert_eq!(layout.heap_size(AliasingGroup::Textures), 0);
    }

    #[test]
    fn test_heap_limit_overflow() {
        let config = CompilerConfig::new()
            .with_placement_alignment(1)
            .with_max_heap_size(1024);
        let mut fixture = Fixture::new();
        fixture.add("A", 1024, AliasingGroup::Buffers, Some((0, 0)));
        fixture.add("B", 1024, AliasingGroup::Buffers, Some((0, 0)));

        assert_eq!(
            fixture.alias(&config),
            Err(CompileError::AllocationOverflow {
                resource: "B".to_string(),
                group: AliasingGroup::Buffers,
                size: 1024,
                required: 2048,
                limit: 1024,
            })
        );
    }

    #[test]
    fn test_barriers_follow_most_recent_user() {
        let mut fixture = Fixture::new();
        let a = fixture.add("A", MIB, AliasingGroup::Buffers, Some((0, 1)));
        let b = fixture.add("B", MIB, AliasingGroup::Buffers, Some((2, 3)));
        let c = fixture.add("C", MIB, AliasingGroup::Buffers, Some((4, 5)));

        let layout = fixture.alias(&CompilerConfig::default()).unwrap();
        assert_eq!(
            layout.barriers(),
            &[
                AliasingBarrier { before: a, after: b },
                AliasingBarrier { before: b, after: c },
            ]
        );
        assert_eq!(layout.barriers_before(a).count(), 0);
    }

    #[test]
    fn test_barriers_cover_partially_reused_bytes() {
        // Middle only reuses the low half, so Last inherits the high half
        // straight from First.
        let config = CompilerConfig::new().with_placement_alignment(1);
        let mut fixture = Fixture::new();
        let first = fixture.add("First", 4, AliasingGroup::Buffers, Some((0, 1)));
        let middle = fixture.add("Middle", 2, AliasingGroup::Buffers, Some((2, 3)));
        let last = fixture.add("Last", 4, AliasingGroup::Buffers, Some((4, 5)));

        let layout = fixture.alias(&config).unwrap();
        assert_eq!(offset(&layout, first), 0);
        assert_eq!(offset(&layout, middle), 0);
        assert_eq!(offset(&layout, last), 0);
        assert_eq!(
            layout.barriers(),
            &[
                AliasingBarrier { before: first, after: middle },
                AliasingBarrier { before: first, after: last },
                AliasingBarrier { before: middle, after: last },
            ]
        );
        assert_eq!(layout.barriers_before(last).count(), 2);
    }

    #[test]
    fn test_barrier_skips_fully_covered_predecessor() {
        let config = CompilerConfig::new().with_placement_alignment(1);
        let mut fixture = Fixture::new();
        let first = fixture.add("First", 2, AliasingGroup::Buffers, Some((0, 0)));
        let middle = fixture.add("Middle", 4, AliasingGroup::Buffers, Some((1, 1)));
        let last = fixture.add("Last", 2, AliasingGroup::Buffers, Some((2, 2)));

        let layout = fixture.alias(&config).unwrap();
        assert_eq!(
            layout.barriers(),
            &[
                AliasingBarrier { before: first, after: middle },
                AliasingBarrier { before: middle, after: last },
            ]
        );
    }

    #[test]
    fn test_huge_allocations_overflow_instead_of_wrapping() {
        let mut fixture = Fixture::new();
        fixture.add("A", 1 << 63, AliasingGroup::Buffers, Some((0, 0)));
        fixture.add("B", 1 << 63, AliasingGroup::Buffers, Some((0, 0)));

        assert_eq!(
            fixture.alias(&CompilerConfig::default()),
            Err(CompileError::AllocationOverflow {
                resource: "B".to_string(),
                group: AliasingGroup::Buffers,
                size: 1 << 63,
                required: u64::MAX,
                limit: u64::MAX,
            })
        );
    }

    #[test]
    fn test_missing_timeline_spans_whole_frame() {
        let mut fixture = Fixture::new();
        let used = fixture.add("Used", MIB, AliasingGroup::Buffers, Some((3, 3)));
        let unused = fixture.add("Unused", MIB, AliasingGroup::Buffers, None);

        let layout = fixture.alias(&CompilerConfig::default()).unwrap();
        assert_eq!(layout.allocation(unused).unwrap().lifetime, Lifetime::new(0, 3));
        assert_ne!(offset(&layout, used), offset(&layout, unused));
    }

    #[test]
    fn test_group_display() {
        assert_eq!(AliasingGroup::Buffers.to_string(), "buffers");
        assert_eq!(AliasingGroup::Universal.to_string(), "universal");
    }
}
