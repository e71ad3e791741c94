//! Exercises the portable core against a synthetic address space.

use std::cell::RefCell;
use std::rc::Rc;

use memprobe::{
    enumerate_regions, is_address_valid, Error, MemoryAccessor, MemoryRegion, OsError, Protection,
    RegionState, RegionType, VirtualMemory,
};

const ERROR_INVALID_PARAMETER: i32 = 87;
const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_NOACCESS: i32 = 998;

const RW: Protection = Protection::READ.union(Protection::WRITE);
const RWX: Protection = RW.union(Protection::EXECUTE);

struct FakeRegion {
    base: usize,
    size: usize,
    state: RegionState,
    protection: Protection,
    kind: RegionType,
    bytes: Vec<u8>,
    /// Protection changes on this region fail with ERROR_ACCESS_DENIED.
    deny_protect: bool,
    /// Raw writes into this region fail with ERROR_NOACCESS.
    deny_write: bool,
}

struct Inner {
    regions: Vec<FakeRegion>,
    /// When set, the next raw write reports this many bytes written.
    short_write: Option<usize>,
    /// When set, this many more protection changes succeed; the rest fail
    /// with ERROR_ACCESS_DENIED.
    protect_budget: Option<u32>,
}

/// A fake target process: a handful of regions tiling the low address
/// space, with byte storage behind the committed ones. Clones share state
/// so a test can keep inspecting the space after handing it to an accessor.
#[derive(Clone)]
struct FakeSpace(Rc<RefCell<Inner>>);

impl FakeSpace {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            regions: Vec::new(),
            short_write: None,
            protect_budget: None,
        })))
    }

    fn with_region(
        self,
        base: usize,
        size: usize,
        state: RegionState,
        protection: Protection,
    ) -> Self {
        self.0.borrow_mut().regions.push(FakeRegion {
            base,
            size,
            state,
            protection,
            kind: RegionType::Private,
            bytes: vec![0; size],
            deny_protect: false,
            deny_write: false,
        });
        self
    }

    fn deny_protect_at(self, base: usize) -> Self {
        self.with_flag(base, |r| r.deny_protect = true)
    }

    fn deny_write_at(self, base: usize) -> Self {
        self.with_flag(base, |r| r.deny_write = true)
    }

    fn with_flag(self, base: usize, f: impl FnOnce(&mut FakeRegion)) -> Self {
        {
            let mut inner = self.0.borrow_mut();
            let region = inner
                .regions
                .iter_mut()
                .find(|r| r.base == base)
                .expect("no such region in fixture");
            f(region);
        }
        self
    }

    fn set_short_write(&self, written: usize) {
        self.0.borrow_mut().short_write = Some(written);
    }

    fn fail_protect_after(&self, successes: u32) {
        self.0.borrow_mut().protect_budget = Some(successes);
    }

    fn protection_at(&self, address: usize) -> Protection {
        self.query(address).expect("address not mapped").protection()
    }
}

impl VirtualMemory for FakeSpace {
    fn query(&self, address: usize) -> Result<MemoryRegion, OsError> {
        let inner = self.0.borrow();
        inner
            .regions
            .iter()
            .find(|r| address >= r.base && address < r.base + r.size)
            .map(|r| MemoryRegion::new(r.base, r.size, r.state, r.protection, r.kind))
            .ok_or(OsError(ERROR_INVALID_PARAMETER))
    }

    fn protect(
        &self,
        address: usize,
        _size: usize,
        protection: Protection,
    ) -> Result<Protection, OsError> {
        let mut inner = self.0.borrow_mut();
        if let Some(budget) = inner.protect_budget.as_mut() {
            if *budget == 0 {
                return Err(OsError(ERROR_ACCESS_DENIED));
            }
            *budget -= 1;
        }
        let region = inner
            .regions
            .iter_mut()
            .find(|r| address >= r.base && address < r.base + r.size)
            .ok_or(OsError(ERROR_INVALID_PARAMETER))?;
        if region.deny_protect {
            return Err(OsError(ERROR_ACCESS_DENIED));
        }
        let previous = region.protection;
        region.protection = protection;
        Ok(previous)
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> Result<(), OsError> {
        let inner = self.0.borrow();
        let region = inner
            .regions
            .iter()
            .find(|r| address >= r.base && address < r.base + r.size)
            .ok_or(OsError(ERROR_NOACCESS))?;
        if region.state != RegionState::Committed || !region.protection.is_readable() {
            return Err(OsError(ERROR_NOACCESS));
        }
        let offset = address - region.base;
        let end = offset.checked_add(buf.len()).ok_or(OsError(ERROR_NOACCESS))?;
        if end > region.size {
            return Err(OsError(ERROR_NOACCESS));
        }
        buf.copy_from_slice(&region.bytes[offset..end]);
        Ok(())
    }

    fn write(&self, address: usize, bytes: &[u8]) -> Result<usize, OsError> {
        let mut inner = self.0.borrow_mut();
        let short_write = inner.short_write.take();
        let region = inner
            .regions
            .iter_mut()
            .find(|r| address >= r.base && address < r.base + r.size)
            .ok_or(OsError(ERROR_NOACCESS))?;
        if region.state != RegionState::Committed
            || !region.protection.is_writable()
            || region.deny_write
        {
            return Err(OsError(ERROR_NOACCESS));
        }
        let offset = address - region.base;
        let count = short_write.unwrap_or(bytes.len()).min(bytes.len());
        let end = offset.checked_add(count).ok_or(OsError(ERROR_NOACCESS))?;
        if end > region.size {
            return Err(OsError(ERROR_NOACCESS));
        }
        region.bytes[offset..end].copy_from_slice(&bytes[..count]);
        Ok(count)
    }
}

/// Free gap, RW scratch, reserved gap, no-access page, read-only page,
/// executable image-ish page.
fn mixed_space() -> FakeSpace {
    FakeSpace::new()
        .with_region(0x0000, 0x1000, RegionState::Free, Protection::NO_ACCESS)
        .with_region(0x1000, 0x1000, RegionState::Committed, RW)
        .with_region(0x2000, 0x1000, RegionState::Reserved, Protection::NO_ACCESS)
        .with_region(0x3000, 0x1000, RegionState::Committed, Protection::NO_ACCESS)
        .with_region(0x4000, 0x1000, RegionState::Committed, Protection::READ)
        .with_region(
            0x5000,
            0x1000,
            RegionState::Committed,
            Protection::READ | Protection::EXECUTE,
        )
}

fn attached(space: &FakeSpace) -> MemoryAccessor<FakeSpace> {
    let mut accessor = MemoryAccessor::new("target.exe");
    accessor.attach_target(space.clone());
    accessor
}

#[test]
fn enumeration_keeps_committed_readable_regions_only() {
    let space = mixed_space();
    let regions = enumerate_regions(&space);

    let bases: Vec<usize> = regions.keys().copied().collect();
    assert_eq!(bases, vec![0x1000, 0x4000, 0x5000]);
}

#[test]
fn enumeration_is_sorted_and_non_overlapping() {
    let space = mixed_space();
    let regions: Vec<MemoryRegion> = enumerate_regions(&space).into_values().collect();

    for pair in regions.windows(2) {
        assert!(pair[0].base_address() < pair[1].base_address());
        assert!(pair[0].end() <= pair[1].base_address());
    }
}

#[test]
fn validator_accepts_range_inside_writable_region() {
    let space = mixed_space();
    assert!(is_address_valid(&space, 0x1000, 4));
    assert!(is_address_valid(&space, 0x1ffc, 4));
}

#[test]
fn validator_rejects_range_crossing_region_boundary() {
    let space = mixed_space();
    // 0x1ffe itself is writable, but the 4-byte range spills into 0x2000.
    assert!(is_address_valid(&space, 0x1ffe, 1));
    assert!(!is_address_valid(&space, 0x1ffe, 4));
}

#[test]
fn validator_rejects_unwritable_and_unmapped_addresses() {
    let space = mixed_space();
    assert!(!is_address_valid(&space, 0x4000, 4)); // read-only
    assert!(!is_address_valid(&space, 0x2000, 4)); // reserved
    assert!(!is_address_valid(&space, 0x0000, 4)); // free
    assert!(!is_address_valid(&space, 0xffff_0000, 4)); // query fails
}

#[test]
fn write_then_read_round_trips() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    let payload = [0xde, 0xad, 0xbe, 0xef];
    accessor.write(&payload, 0x1100).expect("write");
    let bytes = accessor.read(0x1100, 4).expect("read");
    assert_eq!(bytes, payload);
}

#[test]
fn successful_write_restores_prior_protection() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    assert_eq!(space.protection_at(0x1000), RW);
    accessor.write(&7i32.to_le_bytes(), 0x1000).expect("write");
    assert_eq!(space.protection_at(0x1000), RW);
}

#[test]
fn write_into_protect_denied_region_fails_without_touching_it() {
    // Committed read-only page that refuses protection changes, next to a
    // writable scratch page.
    let space = FakeSpace::new()
        .with_region(0x1000, 0x1000, RegionState::Committed, RW)
        .with_region(0x2000, 0x1000, RegionState::Committed, Protection::READ)
        .deny_protect_at(0x2000);
    let mut accessor = attached(&space);

    accessor.write(&[1, 2, 3, 4], 0x1000).expect("writable page");

    let err = accessor.write(&[1, 2, 3, 4], 0x2000).unwrap_err();
    assert!(matches!(
        err,
        Error::RegionInaccessible { .. } | Error::ProtectionChange { .. }
    ));
    assert_eq!(space.protection_at(0x2000), Protection::READ);
}

#[test]
fn write_into_no_access_region_is_inaccessible() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    let err = accessor.write(&[0u8; 4], 0x3000).unwrap_err();
    assert!(matches!(err, Error::RegionInaccessible { address: 0x3000 }));
}

#[test]
fn short_write_fails_and_leaves_protection_relaxed() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    space.set_short_write(2);
    let err = accessor.write(&[1, 2, 3, 4], 0x1200).unwrap_err();
    assert!(matches!(
        err,
        Error::PartialWrite {
            written: 2,
            expected: 4,
            ..
        }
    ));
    // The relaxed protection is deliberately not rolled back on this path.
    assert_eq!(space.protection_at(0x1200), RWX);
}

#[test]
fn failed_restore_reports_and_leaves_protection_altered() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    // The relaxing protect succeeds, the restoring one is refused.
    space.fail_protect_after(1);
    let err = accessor.write(&[1, 2, 3, 4], 0x1300).unwrap_err();
    assert!(matches!(
        err,
        Error::ProtectionRestore {
            address: 0x1300,
            ..
        }
    ));
    // The write itself landed, and the region keeps the relaxed protection.
    assert_eq!(space.protection_at(0x1300), RWX);

    accessor.read(0x1300, 4).expect("read back");
    assert_eq!(accessor.decode::<i32>().unwrap(), i32::from_le_bytes([1, 2, 3, 4]));
}

#[test]
fn write_to_unmapped_address_fails_on_the_query() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    let err = accessor.write(&[1, 2, 3, 4], 0xffff_0000).unwrap_err();
    assert!(matches!(
        err,
        Error::QueryFailed {
            address: 0xffff_0000,
            ..
        }
    ));
}

#[test]
fn every_operation_requires_an_attached_target() {
    let mut accessor = MemoryAccessor::<FakeSpace>::new("target.exe");

    assert!(matches!(
        accessor.memory_regions().unwrap_err(),
        Error::NotAttached
    ));
    assert!(matches!(
        accessor.is_address_valid(0x1000, 4).unwrap_err(),
        Error::NotAttached
    ));
    assert!(matches!(
        accessor.read(0x1000, 4).unwrap_err(),
        Error::NotAttached
    ));
    assert!(matches!(
        accessor.write(&[0u8; 4], 0x1000).unwrap_err(),
        Error::NotAttached
    ));
    assert!(matches!(
        accessor.scan_and_write(&[0u8; 4]).unwrap_err(),
        Error::NotAttached
    ));
}

#[test]
fn close_is_idempotent_and_detaches() {
    let space = mixed_space();
    let mut accessor = attached(&space);
    assert!(accessor.is_attached());

    accessor.close();
    assert!(!accessor.is_attached());
    accessor.close();
    assert!(matches!(accessor.read(0x1000, 4), Err(Error::NotAttached)));
}

#[test]
fn reattach_replaces_the_previous_target() {
    let space = mixed_space();
    let mut accessor = attached(&space);
    accessor.attach_target(space.clone());

    // The prior backend was dropped before the new one was installed:
    // only the fixture handle and the accessor's copy remain.
    assert_eq!(Rc::strong_count(&space.0), 2);
    assert!(accessor.is_attached());
}

#[test]
fn scan_and_write_plants_value_in_first_fitting_writable_region() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    let address = accessor
        .scan_and_write(&1337i32.to_le_bytes())
        .expect("one RW region exists");
    assert_eq!(address, 0x1000);

    accessor.read(address, 4).expect("read back");
    assert_eq!(accessor.decode::<i32>().unwrap(), 1337);
}

#[test]
fn scan_and_write_skips_small_and_refusing_regions() {
    let space = FakeSpace::new()
        .with_region(0x0000, 0x1000, RegionState::Free, Protection::NO_ACCESS)
        .with_region(0x1000, 0x2, RegionState::Committed, RW)
        .with_region(0x1002, 0xffe, RegionState::Free, Protection::NO_ACCESS)
        .with_region(0x2000, 0x1000, RegionState::Committed, RW)
        .with_region(0x3000, 0x1000, RegionState::Committed, RW)
        .deny_write_at(0x2000);
    let mut accessor = attached(&space);

    let address = accessor.scan_and_write(&42i32.to_le_bytes()).expect("scan");
    assert_eq!(address, 0x3000);
}

#[test]
fn scan_and_write_reports_failure_when_nothing_fits() {
    let space = FakeSpace::new()
        .with_region(0x0000, 0x1000, RegionState::Free, Protection::NO_ACCESS)
        .with_region(0x1000, 0x1000, RegionState::Committed, Protection::READ)
        .with_region(0x2000, 0x2, RegionState::Committed, RW);
    let mut accessor = attached(&space);

    let err = accessor.scan_and_write(&42i32.to_le_bytes()).unwrap_err();
    assert!(matches!(err, Error::NoWritableRegion));
}

#[test]
fn read_buffer_grows_and_never_shrinks() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    assert_eq!(accessor.read(0x1000, 16).unwrap().len(), 16);
    assert_eq!(accessor.buffer().len(), 16);

    assert_eq!(accessor.read(0x1000, 4).unwrap().len(), 4);
    assert_eq!(accessor.buffer().len(), 16);
}

#[test]
fn decode_is_width_checked_against_the_last_read() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    accessor.write(&0x0102_0304i32.to_le_bytes(), 0x1000).unwrap();
    accessor.read(0x1000, 4).unwrap();

    assert_eq!(accessor.decode::<i32>().unwrap(), 0x0102_0304);
    assert_eq!(accessor.decode::<u16>().unwrap(), 0x0304);

    let err = accessor.decode::<u64>().unwrap_err();
    assert!(matches!(
        err,
        Error::DecodeOutOfBounds {
            needed: 8,
            available: 4,
        }
    ));
}

#[test]
fn unvalidated_read_of_unmapped_address_fails() {
    let space = mixed_space();
    let mut accessor = attached(&space);

    let err = accessor.read(0xffff_0000, 4).unwrap_err();
    assert!(matches!(err, Error::ReadFailed { size: 4, .. }));
}
