mod common;

use common::{add_anon, harness, page};
use test_support::mock::{MockFile, file::pattern};
use vm::{MappingId, PAGE_SIZE, PageState, Vaddr, VmConfig, VmError, VmFile};

#[test]
fn test_mmap_is_lazy() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(2 * PAGE_SIZE + 10);
    let id = mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();
    assert_eq!(id, MappingId(0));

    assert_eq!(mem.space().page_count(), 3);
    assert!(file.read_log().is_empty());
    assert_eq!(h.pool.allocated_pages(), 0);
    for n in 0..3 {
        assert_eq!(mem.space().page_state(page(n)), Some(PageState::Unloaded));
    }

    // 最后一页只有 10 字节来自文件
    let tail = mem.read(page(2), PAGE_SIZE).unwrap();
    assert_eq!(&tail[..10], &file.contents()[2 * PAGE_SIZE..]);
    assert!(tail[10..].iter().all(|&b| b == 0));
    assert_eq!(file.read_log(), vec![(2 * PAGE_SIZE, 10)]);
}

#[test]
fn test_munmap_writes_back_only_dirty_pages() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(2 * PAGE_SIZE + 10);
    let id = mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();

    mem.read_byte(page(0)).unwrap();
    mem.write_byte(Vaddr(page(1).0 + 5), 0xff).unwrap();
    mem.read_byte(page(2)).unwrap();

    mem.space().munmap(id).unwrap();
    assert_eq!(file.write_log(), vec![(PAGE_SIZE, PAGE_SIZE)]);
    let contents = file.contents();
    assert_eq!(contents.len(), 2 * PAGE_SIZE + 10);
    assert_eq!(contents[PAGE_SIZE + 5], 0xff);
    assert_eq!(contents[PAGE_SIZE + 4], pattern(PAGE_SIZE + 4));

    assert_eq!(mem.space().page_count(), 0);
    assert_eq!(mem.page_table().mapped_count(), 0);
    assert_eq!(h.pool.allocated_pages(), 0);
    // 映射的句柄已关闭，调用者的句柄仍然打开
    assert_eq!(file.open_handles(), 1);
    assert!(!file.is_closed());
}

#[test]
fn test_partial_last_page_writes_only_file_bytes() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(PAGE_SIZE + 10);
    let id = mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();

    mem.write(Vaddr(page(1).0 + 2), &[1, 2, 3]).unwrap();
    mem.write_byte(Vaddr(page(1).0 + 100), 9).unwrap();
    mem.space().munmap(id).unwrap();

    assert_eq!(file.write_log(), vec![(PAGE_SIZE, 10)]);
    let contents = file.contents();
    assert_eq!(contents.len(), PAGE_SIZE + 10);
    assert_eq!(&contents[PAGE_SIZE + 2..PAGE_SIZE + 5], &[1, 2, 3]);
}

#[test]
fn test_munmap_twice_fails() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(PAGE_SIZE);
    let id = mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();
    mem.space().munmap(id).unwrap();
    assert_eq!(mem.space().munmap(id), Err(VmError::NoSuchMapping));
    assert_eq!(mem.space().munmap(MappingId(77)), Err(VmError::NoSuchMapping));
}

#[test]
fn test_mapping_ids_are_never_reused() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(PAGE_SIZE).as_vm_file();
    let first = mem.space().mmap(&file, page(0)).unwrap();
    mem.space().munmap(first).unwrap();
    let second = mem.space().mmap(&file, page(0)).unwrap();
    let third = mem.space().mmap(&file, page(4)).unwrap();
    assert_eq!((first, second, third), (MappingId(0), MappingId(1), MappingId(2)));
    assert_eq!(mem.space().mapping_ids(), vec![MappingId(1), MappingId(2)]);
}

#[test]
fn test_mmap_rejects_bad_requests() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let space = mem.space();
    let file = MockFile::patterned(2 * PAGE_SIZE).as_vm_file();
    let cfg = VmConfig::new();

    assert_eq!(space.mmap(&file, Vaddr(0)), Err(VmError::InvalidAddress));
    assert_eq!(space.mmap(&file, Vaddr(cfg.phys_base)), Err(VmError::InvalidAddress));
    assert_eq!(space.mmap(&file, Vaddr(page(0).0 + 1)), Err(VmError::Misaligned));
    // 跨越用户区间上界
    assert_eq!(
        space.mmap(&file, Vaddr(cfg.phys_base - PAGE_SIZE)),
        Err(VmError::InvalidAddress)
    );

    let empty = MockFile::new(&[]);
    assert_eq!(space.mmap(&empty.as_vm_file(), page(0)), Err(VmError::EmptyFile));

    assert_eq!(space.page_count(), 0);
}

#[test]
fn test_mmap_rejects_overlap_with_any_page() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let space = mem.space();
    let file = MockFile::patterned(2 * PAGE_SIZE);

    add_anon(&mem, 1);
    assert_eq!(space.mmap(&file.as_vm_file(), page(0)), Err(VmError::Overlap));

    space.mmap(&file.as_vm_file(), page(4)).unwrap();
    assert_eq!(space.mmap(&file.as_vm_file(), page(5)), Err(VmError::Overlap));
    assert_eq!(space.mmap(&file.as_vm_file(), page(3)), Err(VmError::Overlap));
    space.mmap(&file.as_vm_file(), page(6)).unwrap();

    // 被拒绝的请求不会留下打开的句柄
    assert_eq!(file.open_handles(), 3);
}

#[test]
fn test_evicted_dirty_file_page_is_written_back() {
    let h = harness(1, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(2 * PAGE_SIZE);
    mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();

    mem.write_byte(Vaddr(page(0).0 + 1), 0xaa).unwrap();
    mem.read_byte(page(1)).unwrap();
    assert_eq!(mem.space().page_state(page(0)), Some(PageState::Unloaded));
    assert_eq!(file.contents()[1], 0xaa);
    assert_eq!(h.system.stats().file_writebacks, 1);
    assert_eq!(h.system.stats().swap_slots_used, 0);

    // 干净页被驱逐时不写文件
    assert_eq!(mem.read_byte(Vaddr(page(0).0 + 1)).unwrap(), 0xaa);
    assert_eq!(mem.space().page_state(page(1)), Some(PageState::Unloaded));
    assert_eq!(file.write_log(), vec![(0, PAGE_SIZE)]);
}

#[test]
fn test_mapping_outlives_callers_handle() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let file = MockFile::patterned(PAGE_SIZE);
    mem.space().mmap(&file.as_vm_file(), page(0)).unwrap();

    file.close();
    assert!(file.is_closed());
    assert_eq!(file.open_handles(), 1);
    assert_eq!(mem.read_byte(Vaddr(page(0).0 + 3)).unwrap(), pattern(3));
}

#[test]
fn test_munmap_all_unmaps_every_mapping() {
    let h = harness(4, 4);
    let mem = h.process(1);
    let a = MockFile::patterned(PAGE_SIZE);
    let b = MockFile::patterned(PAGE_SIZE);
    mem.space().mmap(&a.as_vm_file(), page(0)).unwrap();
    mem.space().mmap(&b.as_vm_file(), page(1)).unwrap();
    mem.write_byte(page(0), 1).unwrap();
    mem.write_byte(page(1), 2).unwrap();

    mem.space().munmap_all();
    assert!(mem.space().mapping_ids().is_empty());
    assert_eq!(a.contents()[0], 1);
    assert_eq!(b.contents()[0], 2);
    assert_eq!(a.open_handles(), 1);
    assert_eq!(b.open_handles(), 1);
    assert_eq!(h.pool.allocated_pages(), 0);
}
