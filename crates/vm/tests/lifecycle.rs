mod common;

use common::{add_anon, fill, harness, page};
use test_support::mock::MockFile;
use vm::{PAGE_SIZE, PageState, VmError, teardown_process_memory};

#[test]
fn test_teardown_releases_frames_and_swap_slots() {
    let h = harness(2, 16);
    let mem = h.process(1);
    for n in 0..6 {
        add_anon(&mem, n);
        mem.write(page(n), &fill(n as u8)).unwrap();
    }
    let before = h.system.stats();
    assert_eq!(before.swap_slots_used, 4);
    assert_eq!(before.resident_frames, 2);

    teardown_process_memory(mem.space());

    let after = h.system.stats();
    assert_eq!(after.swap_slots_used, 0);
    assert_eq!(after.resident_frames, 0);
    assert_eq!(h.pool.allocated_pages(), 0);
    assert_eq!(mem.space().page_count(), 0);
    assert_eq!(mem.page_table().mapped_count(), 0);
}

#[test]
fn test_teardown_writes_back_mappings_and_closes_them() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(PAGE_SIZE);
    mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();
    mem.write_byte(page(0), 0x42).unwrap();

    mem.space().teardown();
    assert_eq!(file.contents()[0], 0x42);
    assert_eq!(file.open_handles(), 1);
    assert!(mem.space().is_torn_down());
}

#[test]
fn test_teardown_is_idempotent() {
    let h = harness(2, 4);
    let mem = h.process(1);
    add_anon(&mem, 0);
    mem.write_byte(page(0), 1).unwrap();

    mem.space().teardown();
    mem.space().teardown();
    assert_eq!(h.pool.allocated_pages(), 0);
    assert_eq!(
        mem.space().mmap(&MockFile::patterned(PAGE_SIZE).as_vm_file(), page(4)),
        Err(VmError::AddressSpaceGone)
    );
}

#[test]
fn test_dropping_the_space_releases_memory() {
    let h = harness(1, 4);
    {
        let mem = h.process(1);
        add_anon(&mem, 0);
        add_anon(&mem, 1);
        mem.write_byte(page(0), 1).unwrap();
        mem.write_byte(page(1), 2).unwrap();
        assert_eq!(h.system.stats().swap_slots_used, 1);
    }
    assert_eq!(h.system.stats().swap_slots_used, 0);
    assert_eq!(h.pool.allocated_pages(), 0);
    assert!(h.system.frames().is_empty());
}

#[test]
fn test_exit_of_one_process_leaves_the_other_intact() {
    let h = harness(2, 8);
    let a = h.process(1);
    let b = h.process(2);
    for n in 0..3 {
        add_anon(&a, n);
        add_anon(&b, n);
        a.write(page(n), &fill(1 + n as u8)).unwrap();
        b.write(page(n), &fill(100 + n as u8)).unwrap();
    }

    a.space().teardown();
    for n in 0..3 {
        assert_eq!(b.read(page(n), PAGE_SIZE).unwrap(), fill(100 + n as u8));
    }
    assert!(h.system.frames().snapshot().iter().all(|f| f.pid == b.space().pid()));
    assert_ne!(b.space().page_state(page(0)), None);
    assert_eq!(b.space().page_state(page(9)), None::<PageState>);
}
