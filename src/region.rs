use std::collections::BTreeMap;

use crate::protection::{Protection, RegionState, RegionType};
use crate::target::VirtualMemory;

/// A contiguous span of a process's virtual address space sharing one
/// commit state, protection, and backing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Start address in the target's virtual address space.
    base_address: usize,
    /// Size of the region in bytes.
    size: usize,
    /// Commit state.
    state: RegionState,
    /// Access rights.
    protection: Protection,
    /// Backing kind.
    kind: RegionType,
}

impl MemoryRegion {
    /// Creates a new region description.
    ///
    /// The OS never reports a region whose `base_address + size` overflows
    /// the address width; a backend that does produces a region that fails
    /// every containment check.
    pub fn new(
        base_address: usize,
        size: usize,
        state: RegionState,
        protection: Protection,
        kind: RegionType,
    ) -> Self {
        Self {
            base_address,
            size,
            state,
            protection,
            kind,
        }
    }

    /// Start address of the region in the target's address space.
    pub fn base_address(&self) -> usize {
        self.base_address
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last address of the region, saturating at the top of
    /// the address space.
    pub fn end(&self) -> usize {
        self.base_address.saturating_add(self.size)
    }

    /// Commit state of the region.
    pub fn state(&self) -> RegionState {
        self.state
    }

    /// Access rights of the region.
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Backing kind of the region.
    pub fn kind(&self) -> RegionType {
        self.kind
    }

    /// Whether `[address, address + size)` lies entirely inside this region.
    ///
    /// Both range ends are computed with overflow checks, so a wrapping
    /// range, or a malformed region whose extent wraps, never contains
    /// anything.
    pub fn contains_range(&self, address: usize, size: usize) -> bool {
        let Some(range_end) = address.checked_add(size) else {
            return false;
        };
        let Some(region_end) = self.base_address.checked_add(self.size) else {
            return false;
        };
        address >= self.base_address && range_end <= region_end
    }
}

/// Regions keyed by base address: sorted ascending, non-overlapping.
/// Rebuilt fresh on every enumeration, never cached.
pub type RegionMap = BTreeMap<usize, MemoryRegion>;

/// Walks the target's address space from address zero and collects every
/// committed region with a readable protection.
///
/// The cursor advances to `base + size` of each queried region. A failed
/// query is the OS's end-of-address-space signal and terminates the walk;
/// free, reserved, and no-access regions are skipped but still advance the
/// cursor.
pub fn enumerate_regions<M: VirtualMemory>(target: &M) -> RegionMap {
    let mut regions = RegionMap::new();
    let mut address = 0usize;

    while let Ok(region) = target.query(address) {
        if region.state() == RegionState::Committed && region.protection().is_readable() {
            regions.insert(region.base_address(), region);
        }

        let Some(next) = region.base_address().checked_add(region.size()) else {
            break;
        };
        // A backend reporting a zero-size region would otherwise spin here.
        if next <= address {
            break;
        }
        address = next;
    }

    regions
}

/// Whether `size` bytes at `address` can be written through one region.
///
/// Requires the covering region to be committed with a write-capable
/// protection, and the whole range to stay inside it: an address that is
/// valid itself but whose range crosses into the next region reports false.
/// A failed query reports false rather than an error.
pub fn is_address_valid<M: VirtualMemory>(target: &M, address: usize, size: usize) -> bool {
    let Ok(region) = target.query(address) else {
        return false;
    };

    region.state() == RegionState::Committed
        && region.protection().is_writable()
        && region.contains_range(address, size)
}
