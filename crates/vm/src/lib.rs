//! 按需分页的虚拟内存管理
//!
//! 提供补充页表、全局帧表（时钟驱逐）、交换区、缺页处理和文件内存映射。
//!
//! # 组成
//!
//! - [`VmSystem`]：全局共享部分（页池、[`FrameTable`]、[`SwapStore`]、文件系统锁）
//! - [`AddressSpace`]：每个进程的 [`SupplementalPageTable`]、页表和 mmap 映射
//! - [`AddressSpace::resolve_fault`]：缺页处理
//! - [`AddressSpace::mmap`] / [`AddressSpace::munmap`]：文件映射
//!
//! # 外部依赖
//!
//! 物理页池、硬件页表、交换块设备和文件都通过 trait 抽象：
//! [`PhysFramePool`]、[`PageDirectory`]、[`BlockDevice`]、[`VmFile`]。
//! 锁来自 `sync` crate，使用前必须调用 `sync::register_arch_ops`。

#![no_std]

extern crate alloc;

pub mod address;
pub mod bitmap;
pub mod config;
pub mod error;
pub mod fault;
pub mod file;
pub mod frame_table;
pub mod mmap;
pub mod ops;
pub mod page;
pub mod space;
pub mod swap;
pub mod system;
pub mod task;

pub use address::{Paddr, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use bitmap::Bitmap;
pub use config::{PAGE_SIZE, VmConfig};
pub use error::{KILLED_EXIT_STATUS, KillReason, Terminate, VmError, VmResult};
pub use fault::{FaultFlags, PageFault};
pub use file::{FileIo, LoadError, VmFile};
pub use frame_table::{FrameId, FrameInfo, FrameStats, FrameTable};
pub use mmap::MappingId;
pub use ops::{BlockDevice, PageDirectory, PhysFramePool};
pub use page::{
    AlreadyMapped, FileSource, PageDescriptor, PageKind, PageState, Residency,
    SupplementalPageTable,
};
pub use space::{AddressSpace, Pid, teardown_process_memory};
pub use swap::{SlotId, SwapError, SwapStore};
pub use system::{VmStats, VmSystem};
pub use task::{TaskContext, handle_page_fault};

#[cfg(test)]
pub(crate) mod test_util {
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct DummyArchOps;

    impl sync::ArchOps for DummyArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            0
        }

        unsafe fn restore_interrupts(&self, _flags: usize) {}
    }

    static DUMMY_ARCH_OPS: DummyArchOps = DummyArchOps;
    static INIT: AtomicUsize = AtomicUsize::new(0);

    /// 注册测试用的 ArchOps（只注册一次）
    pub fn init_sync() {
        if INIT
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            unsafe { sync::register_arch_ops(&DUMMY_ARCH_OPS) };
            INIT.store(2, Ordering::Release);
            return;
        }
        while INIT.load(Ordering::Acquire) != 2 {
            core::hint::spin_loop();
        }
    }
}
