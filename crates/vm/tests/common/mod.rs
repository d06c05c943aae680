//! Shared fixtures for the VM integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use test_support::mock::{MockBlockDevice, MockFramePool, MockPageTable, UserMemory};
use vm::{PAGE_SIZE, PageDescriptor, PhysFramePool, Pid, Vaddr, VmConfig, VmSystem};

/// First user page used by the tests.
pub const BASE: usize = 0x1000_0000;

pub struct Harness {
    pub system: Arc<VmSystem>,
    pub pool: Arc<MockFramePool>,
    pub swap_dev: Arc<MockBlockDevice>,
}

/// A VM system with `frames` user pages and room for `swap_slots` swapped pages.
pub fn harness(frames: usize, swap_slots: usize) -> Harness {
    test_support::init_arch_ops();
    let pool = MockFramePool::new(frames);
    let swap_dev = MockBlockDevice::with_slots(swap_slots);
    let system = VmSystem::new(VmConfig::new(), pool.clone(), swap_dev.clone());
    Harness {
        system,
        pool,
        swap_dev,
    }
}

impl Harness {
    /// A fresh process with an empty address space.
    pub fn process(&self, pid: usize) -> UserMemory {
        let page_table = MockPageTable::new();
        let space = self.system.create_space(Pid(pid), page_table.clone());
        UserMemory::new(space, page_table, self.pool.clone())
    }

    /// Frame-table invariants: bounded by the pool, every entry committed.
    pub fn assert_frame_table_consistent(&self) {
        let frames = self.system.frames().snapshot();
        assert!(frames.len() <= self.pool.total_pages());
        assert_eq!(frames.len(), self.pool.allocated_pages());
        for info in &frames {
            assert!(info.committed, "frame {:?} not owned by its descriptor", info.id);
        }
    }
}

/// Address of the `n`th test page.
pub fn page(n: usize) -> Vaddr {
    Vaddr(BASE + n * PAGE_SIZE)
}

/// Installs a writable anonymous page at `page(n)`.
pub fn add_anon(mem: &UserMemory, n: usize) {
    mem.space()
        .insert_page(PageDescriptor::anonymous(page(n).floor(), true))
        .unwrap();
}

/// A full page whose bytes all derive from `seed`.
pub fn fill(seed: u8) -> Vec<u8> {
    (0..PAGE_SIZE).map(|i| seed.wrapping_add((i % 13) as u8)).collect()
}
