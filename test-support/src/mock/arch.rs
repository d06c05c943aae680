//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 架构操作：用一个原子布尔值模拟本地中断使能位
pub struct MockArchOps {
    /// 中断是否使能
    pub interrupt_state: AtomicBool,
}

impl MockArchOps {
    /// 创建中断使能的实例
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
        }
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

impl sync::ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();

static INIT: AtomicUsize = AtomicUsize::new(0);

/// 向 `sync` 注册 [`MOCK_ARCH_OPS`]，多次（包括并发）调用只注册一次
pub fn init_arch_ops() {
    if INIT
        .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        // SAFETY: 由 INIT 保证只执行一次，其他调用者会等待它完成
        unsafe { sync::register_arch_ops(&MOCK_ARCH_OPS) };
        INIT.store(2, Ordering::Release);
        return;
    }
    while INIT.load(Ordering::Acquire) != 2 {
        core::hint::spin_loop();
    }
}
