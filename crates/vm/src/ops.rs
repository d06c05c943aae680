//! 外部协作者接口
//!
//! 虚拟内存管理器不拥有物理页分配器、硬件页表和交换块设备，
//! 只通过这里的 trait 使用它们。内核（或测试桩）负责提供实现。

use crate::address::{Paddr, Vaddr};

/// 用户物理页池
///
/// 页池本身不保存任何所有权信息；谁在使用哪一帧由
/// [`FrameTable`](crate::FrameTable) 记录。
pub trait PhysFramePool: Send + Sync {
    /// 分配一页，`zero` 为真时先清零。池空时返回 `None`。
    fn alloc_page(&self, zero: bool) -> Option<Paddr>;

    /// 归还一页
    fn free_page(&self, paddr: Paddr);

    /// 池中的总页数
    fn total_pages(&self) -> usize;

    /// 物理地址到内核可直接访问的虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: Paddr) -> usize;
}

/// 单个进程的硬件页表
///
/// 访问位和脏位由 MMU 置位；虚拟内存管理器只读取和清除它们。
/// 实现必须允许其他 CPU 并发调用（驱逐会访问别的进程的页表）。
pub trait PageDirectory: Send + Sync {
    /// 建立 `vaddr -> paddr` 映射，页表页分配失败时返回 false
    fn set_mapping(&self, vaddr: Vaddr, paddr: Paddr, writable: bool) -> bool;

    /// 撤销映射；之后的访问将再次缺页
    fn clear_mapping(&self, vaddr: Vaddr);

    /// 查询映射
    fn get_mapping(&self, vaddr: Vaddr) -> Option<Paddr>;

    /// 访问位
    fn is_accessed(&self, vaddr: Vaddr) -> bool;

    /// 清除访问位
    fn clear_accessed(&self, vaddr: Vaddr);

    /// 脏位
    fn is_dirty(&self, vaddr: Vaddr) -> bool;
}

/// 交换分区所在的块设备
///
/// 读写以扇区为单位；`buf` 的长度总是等于 [`BlockDevice::sector_size`]。
pub trait BlockDevice: Send + Sync {
    /// 读一个扇区
    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool;

    /// 写一个扇区
    fn write_sector(&self, sector: usize, buf: &[u8]) -> bool;

    /// 扇区大小（字节）
    fn sector_size(&self) -> usize;

    /// 设备的扇区总数
    fn size_in_sectors(&self) -> usize;
}
