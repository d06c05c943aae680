//! 虚拟内存系统
//!
//! [`VmSystem`] 持有全局共享的部分：物理页池、帧表、交换区和文件系统锁。
//! 内核启动时创建一次，由所有 [`AddressSpace`](crate::AddressSpace) 共享。

use alloc::sync::Arc;

use crate::config::VmConfig;
use crate::file::FileIo;
use crate::frame_table::FrameTable;
use crate::ops::{BlockDevice, PageDirectory, PhysFramePool};
use crate::space::{AddressSpace, Pid};
use crate::swap::SwapStore;

/// 全局统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmStats {
    /// 用户页池总页数
    pub user_pages: usize,
    /// 当前占用的帧数
    pub resident_frames: usize,
    /// 累计驱逐次数
    pub evictions: usize,
    /// 驱逐时写回文件的次数
    pub file_writebacks: usize,
    /// 累计换出次数
    pub swap_outs: usize,
    /// 累计换入次数
    pub swap_ins: usize,
    /// 交换槽总数
    pub swap_slots: usize,
    /// 已占用交换槽数
    pub swap_slots_used: usize,
}

/// 虚拟内存系统
pub struct VmSystem {
    config: VmConfig,
    pool: Arc<dyn PhysFramePool>,
    swap: Arc<SwapStore>,
    file_io: Arc<FileIo>,
    frames: FrameTable,
}

impl VmSystem {
    /// 用给定的页池和交换设备初始化
    pub fn new(
        config: VmConfig,
        pool: Arc<dyn PhysFramePool>,
        swap_device: Arc<dyn BlockDevice>,
    ) -> Arc<Self> {
        let swap = Arc::new(SwapStore::new(swap_device));
        let file_io = Arc::new(FileIo::new());
        let frames = FrameTable::new(pool.clone(), swap.clone(), file_io.clone());
        log::info!(
            "vm: initialized with {} user pages, {} swap slots",
            pool.total_pages(),
            swap.total_slots()
        );
        Arc::new(VmSystem {
            config,
            pool,
            swap,
            file_io,
            frames,
        })
    }

    /// 为进程创建地址空间
    pub fn create_space(self: &Arc<Self>, pid: Pid, page_dir: Arc<dyn PageDirectory>) -> Arc<AddressSpace> {
        AddressSpace::new(self, pid, page_dir)
    }

    /// 地址空间布局
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 物理页池
    pub fn pool(&self) -> &dyn PhysFramePool {
        self.pool.as_ref()
    }

    /// 帧表
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// 交换区
    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// 文件系统锁
    pub fn file_io(&self) -> &FileIo {
        &self.file_io
    }

    /// 统计信息
    pub fn stats(&self) -> VmStats {
        let frames = self.frames.stats();
        let (swap_outs, swap_ins) = self.swap.counters();
        VmStats {
            user_pages: self.pool.total_pages(),
            resident_frames: frames.resident,
            evictions: frames.evictions,
            file_writebacks: frames.file_writebacks,
            swap_outs,
            swap_ins,
            swap_slots: self.swap.total_slots(),
            swap_slots_used: self.swap.used_slots(),
        }
    }
}
