//! 补充页表
//!
//! 记录一个进程每个用户虚拟页应当如何获得内容，按页号索引。
//! 补充页表本身不加锁，由所属的 [`AddressSpace`](crate::AddressSpace) 用自旋锁保护。

use alloc::sync::Arc;
use hashbrown::HashMap;

use crate::address::{Vaddr, Vpn};
use crate::frame_table::FrameTable;
use crate::page::PageDescriptor;

/// 页号已有描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyMapped(pub Vpn);

/// 补充页表
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    pages: HashMap<Vpn, Arc<PageDescriptor>>,
}

impl SupplementalPageTable {
    /// 创建空表
    pub fn new() -> Self {
        SupplementalPageTable {
            pages: HashMap::new(),
        }
    }

    /// 查找包含 `vaddr` 的页的描述符
    pub fn lookup(&self, vaddr: Vaddr) -> Option<Arc<PageDescriptor>> {
        self.get(vaddr.floor())
    }

    /// 按页号查找
    pub fn get(&self, vpn: Vpn) -> Option<Arc<PageDescriptor>> {
        self.pages.get(&vpn).cloned()
    }

    /// 页号是否已有描述符
    pub fn contains(&self, vpn: Vpn) -> bool {
        self.pages.contains_key(&vpn)
    }

    /// 插入描述符，页号已被占用时拒绝
    pub fn insert(&mut self, desc: Arc<PageDescriptor>) -> Result<(), AlreadyMapped> {
        let vpn = desc.vpn();
        if self.pages.contains_key(&vpn) {
            return Err(AlreadyMapped(vpn));
        }
        self.pages.insert(vpn, desc);
        Ok(())
    }

    /// 移除描述符（不释放其资源）
    pub fn remove(&mut self, vpn: Vpn) -> Option<Arc<PageDescriptor>> {
        self.pages.remove(&vpn)
    }

    /// 描述符数量
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 遍历所有描述符（顺序不定）
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PageDescriptor>> {
        self.pages.values()
    }

    /// 销毁全部描述符：驻留页释放帧，已换出页释放槽位
    pub(crate) fn destroy_all(&mut self, frames: &FrameTable) {
        for (_, desc) in self.pages.drain() {
            let pin = desc.pin();
            frames.destroy_page(&pin);
        }
    }
}
