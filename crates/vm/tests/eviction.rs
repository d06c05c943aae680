mod common;

use common::{add_anon, fill, harness, page};
use vm::{PAGE_SIZE, PageDirectory, PageState};

#[test]
fn test_anonymous_pages_survive_swap() {
    let h = harness(2, 16);
    let mem = h.process(1);
    for n in 0..5 {
        add_anon(&mem, n);
        mem.write(page(n), &fill(n as u8)).unwrap();
    }
    for n in 0..5 {
        assert_eq!(mem.read(page(n), PAGE_SIZE).unwrap(), fill(n as u8));
    }

    let stats = h.system.stats();
    assert!(stats.evictions >= 3);
    assert!(stats.swap_outs >= 3);
    assert!(stats.resident_frames <= 2);
    h.assert_frame_table_consistent();
}

#[test]
fn test_single_frame_alternation() {
    let h = harness(1, 4);
    let mem = h.process(1);
    add_anon(&mem, 0);
    add_anon(&mem, 1);

    for i in 0..10u8 {
        mem.write_byte(page(0), i).unwrap();
        mem.write_byte(page(1), 100 + i).unwrap();
        assert_eq!(mem.read_byte(page(0)).unwrap(), i);
        assert_eq!(mem.read_byte(page(1)).unwrap(), 100 + i);
    }

    let space = mem.space();
    assert_eq!(space.page_state(page(1)), Some(PageState::Resident));
    assert_eq!(space.page_state(page(0)), Some(PageState::Swapped));
    assert_eq!(h.system.stats().swap_slots_used, 1);
    assert_eq!(h.system.frames().len(), 1);
}

#[test]
fn test_fresh_anonymous_page_is_zeroed_after_frame_reuse() {
    let h = harness(1, 4);
    let mem = h.process(1);
    add_anon(&mem, 0);
    add_anon(&mem, 1);
    mem.write(page(0), &fill(0x5a)).unwrap();

    // 唯一的帧被换出后重新分配给第二页
    assert_eq!(mem.read(page(1), PAGE_SIZE).unwrap(), vec![0u8; PAGE_SIZE]);
    assert_eq!(mem.read(page(0), PAGE_SIZE).unwrap(), fill(0x5a));
}

#[test]
fn test_clock_gives_accessed_frame_a_second_chance() {
    let h = harness(4, 32);
    let mem = h.process(1);
    let pt = mem.page_table().clone();
    for n in 0..4 {
        add_anon(&mem, n);
        mem.write_byte(page(n), n as u8).unwrap();
    }
    for n in 1..4 {
        pt.clear_accessed(page(n));
    }

    for cycle in 0..10 {
        mem.read_byte(page(0)).unwrap();

        let fresh = 4 + cycle;
        add_anon(&mem, fresh);
        mem.write_byte(page(fresh), fresh as u8).unwrap();
        pt.clear_accessed(page(fresh));

        assert_eq!(mem.space().page_state(page(0)), Some(PageState::Resident));
        assert_eq!(h.system.stats().evictions, cycle + 1);
    }

    // 其余页按时钟顺序被换出，内容不丢
    for n in 1..14 {
        assert_eq!(mem.read_byte(page(n)).unwrap(), n as u8);
    }
}

#[test]
fn test_pages_of_two_processes_compete_for_frames() {
    let h = harness(2, 16);
    let a = h.process(1);
    let b = h.process(2);
    for n in 0..3 {
        add_anon(&a, n);
        add_anon(&b, n);
    }

    for n in 0..3 {
        a.write(page(n), &fill(10 + n as u8)).unwrap();
        b.write(page(n), &fill(20 + n as u8)).unwrap();
    }
    h.assert_frame_table_consistent();

    for n in 0..3 {
        assert_eq!(a.read(page(n), PAGE_SIZE).unwrap(), fill(10 + n as u8));
        assert_eq!(b.read(page(n), PAGE_SIZE).unwrap(), fill(20 + n as u8));
    }

    let pids: Vec<_> = h.system.frames().snapshot().iter().map(|f| f.pid).collect();
    assert_eq!(pids.len(), 2);
}

#[test]
fn test_descriptor_state_follows_residency() {
    let h = harness(1, 4);
    let mem = h.process(1);
    add_anon(&mem, 0);
    add_anon(&mem, 1);
    let space = mem.space();

    assert_eq!(space.page_state(page(0)), Some(PageState::Unloaded));
    mem.write_byte(page(0), 1).unwrap();
    assert_eq!(space.page_state(page(0)), Some(PageState::Resident));
    assert!(mem.page_table().entry(page(0)).is_some());

    mem.write_byte(page(1), 2).unwrap();
    assert_eq!(space.page_state(page(0)), Some(PageState::Swapped));
    assert!(mem.page_table().entry(page(0)).is_none());

    mem.read_byte(page(0)).unwrap();
    assert_eq!(space.page_state(page(0)), Some(PageState::Resident));
    assert_eq!(space.page_state(page(1)), Some(PageState::Swapped));
    // 换入后槽位已释放，只剩第二页占用的一个
    assert_eq!(h.system.stats().swap_slots_used, 1);
}
