//! 物理页池的 Mock 实现
//!
//! 在堆上分配一块连续内存充当用户物理内存，用 [`vm::Bitmap`] 记录每页的分配状态。
//! 物理地址从 [`POOL_PADDR_BASE`] 开始编号；归还的页被填成 [`POISON`]，
//! 以便发现遗漏的清零。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;
use sync::SpinLock;
use vm::{Bitmap, PAGE_SIZE, Paddr, PhysFramePool, UsizeConvert};

/// 第一页的物理地址
pub const POOL_PADDR_BASE: usize = 0x8000_0000;

/// 未清零页的填充字节
pub const POISON: u8 = 0xcc;

/// Mock 物理页池
pub struct MockFramePool {
    base: NonNull<u8>,
    pages: usize,
    bitmap: SpinLock<Bitmap>,
}

// SAFETY: 对 arena 的访问按页由调用者（帧表）保证互斥，位图由锁保护
unsafe impl Send for MockFramePool {}
unsafe impl Sync for MockFramePool {}

impl MockFramePool {
    /// 创建 `pages` 页的页池
    pub fn new(pages: usize) -> Arc<Self> {
        let arena: Box<[u8]> = vec![POISON; pages * PAGE_SIZE].into_boxed_slice();
        let base = NonNull::from(Box::leak(arena)).cast::<u8>();
        Arc::new(MockFramePool {
            base,
            pages,
            bitmap: SpinLock::new(Bitmap::new(pages)),
        })
    }

    fn index_of(&self, paddr: Paddr) -> usize {
        let offset = paddr.as_usize() - POOL_PADDR_BASE;
        assert!(offset % PAGE_SIZE == 0, "unaligned paddr {:#x}", paddr.as_usize());
        let idx = offset / PAGE_SIZE;
        assert!(idx < self.pages, "paddr {:#x} outside the pool", paddr.as_usize());
        idx
    }

    fn page_ptr(&self, idx: usize) -> *mut u8 {
        // SAFETY: idx < pages，偏移在 arena 之内
        unsafe { self.base.as_ptr().add(idx * PAGE_SIZE) }
    }

    /// 已分配页数
    pub fn allocated_pages(&self) -> usize {
        self.bitmap.lock().used()
    }

    /// 空闲页数
    pub fn free_pages(&self) -> usize {
        let (_, _, free) = self.bitmap.lock().get_stats();
        free
    }

    /// 复制一页的内容
    pub fn read_page(&self, paddr: Paddr) -> Vec<u8> {
        let idx = self.index_of(Paddr(paddr.as_usize() & !(PAGE_SIZE - 1)));
        // SAFETY: 页在 arena 之内
        unsafe { core::slice::from_raw_parts(self.page_ptr(idx), PAGE_SIZE) }.to_vec()
    }
}

impl Drop for MockFramePool {
    fn drop(&mut self) {
        let slice = core::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.pages * PAGE_SIZE);
        // SAFETY: 指针来自 new 中 Box::leak 的 arena，长度一致
        drop(unsafe { Box::from_raw(slice) });
    }
}

impl PhysFramePool for MockFramePool {
    fn alloc_page(&self, zero: bool) -> Option<Paddr> {
        let idx = self.bitmap.lock().alloc()?;
        if zero {
            // SAFETY: 该页刚被分配，只有调用者能访问
            unsafe { core::ptr::write_bytes(self.page_ptr(idx), 0, PAGE_SIZE) };
        }
        Some(Paddr(POOL_PADDR_BASE + idx * PAGE_SIZE))
    }

    fn free_page(&self, paddr: Paddr) {
        let idx = self.index_of(paddr);
        // SAFETY: 调用者归还页后不再访问
        unsafe { core::ptr::write_bytes(self.page_ptr(idx), POISON, PAGE_SIZE) };
        assert!(self.bitmap.lock().free(idx), "double free of paddr {:#x}", paddr.as_usize());
    }

    fn total_pages(&self) -> usize {
        self.pages
    }

    fn paddr_to_vaddr(&self, paddr: Paddr) -> usize {
        let offset = paddr.as_usize() - POOL_PADDR_BASE;
        assert!(offset < self.pages * PAGE_SIZE, "paddr {:#x} outside the pool", paddr.as_usize());
        self.base.as_ptr() as usize + offset
    }
}
