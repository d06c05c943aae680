//! 硬件页表的 Mock 实现
//!
//! 除了 [`PageDirectory`] 的各项操作，还用 [`MockPageTable::access`] 模拟 MMU：
//! 未映射或权限不足时报告缺页，成功访问时置访问位（写访问另置脏位）。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use sync::SpinLock;
use vm::{FaultFlags, PageDirectory, Paddr, UsizeConvert, Vaddr, Vpn};

/// 一个页表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPte {
    /// 物理页地址
    pub paddr: Paddr,
    /// 用户可写
    pub writable: bool,
    /// 访问位
    pub accessed: bool,
    /// 脏位
    pub dirty: bool,
}

/// Mock 页表
pub struct MockPageTable {
    entries: SpinLock<BTreeMap<Vpn, MockPte>>,
    fail_next_map: AtomicBool,
}

impl MockPageTable {
    /// 创建空页表
    pub fn new() -> Arc<Self> {
        Arc::new(MockPageTable {
            entries: SpinLock::new(BTreeMap::new()),
            fail_next_map: AtomicBool::new(false),
        })
    }

    /// 模拟一次用户访问
    ///
    /// 成功时以被访问字节的物理地址调用 `f`；否则返回硬件会报告的缺页原因。
    pub fn access<R>(
        &self,
        vaddr: Vaddr,
        write: bool,
        f: impl FnOnce(Paddr) -> R,
    ) -> Result<R, FaultFlags> {
        let mut flags = FaultFlags::USER;
        if write {
            flags |= FaultFlags::WRITE;
        }

        let mut entries = self.entries.lock();
        let Some(pte) = entries.get_mut(&vaddr.floor()) else {
            return Err(flags);
        };
        if write && !pte.writable {
            return Err(flags | FaultFlags::PRESENT);
        }
        pte.accessed = true;
        if write {
            pte.dirty = true;
        }
        Ok(f(Paddr(pte.paddr.as_usize() + vaddr.page_offset())))
    }

    /// 页表项快照
    pub fn entry(&self, vaddr: Vaddr) -> Option<MockPte> {
        self.entries.lock().get(&vaddr.floor()).copied()
    }

    /// 当前映射的页数
    pub fn mapped_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// 模拟页表页分配失败：下一次 `set_mapping` 返回 false
    pub fn fail_next_mapping(&self) {
        self.fail_next_map.store(true, Ordering::SeqCst);
    }
}

impl PageDirectory for MockPageTable {
    fn set_mapping(&self, vaddr: Vaddr, paddr: Paddr, writable: bool) -> bool {
        if self.fail_next_map.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.entries.lock().insert(
            vaddr.floor(),
            MockPte {
                paddr,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    fn clear_mapping(&self, vaddr: Vaddr) {
        self.entries.lock().remove(&vaddr.floor());
    }

    fn get_mapping(&self, vaddr: Vaddr) -> Option<Paddr> {
        self.entries.lock().get(&vaddr.floor()).map(|pte| pte.paddr)
    }

    fn is_accessed(&self, vaddr: Vaddr) -> bool {
        self.entries
            .lock()
            .get(&vaddr.floor())
            .is_some_and(|pte| pte.accessed)
    }

    fn clear_accessed(&self, vaddr: Vaddr) {
        if let Some(pte) = self.entries.lock().get_mut(&vaddr.floor()) {
            pte.accessed = false;
        }
    }

    fn is_dirty(&self, vaddr: Vaddr) -> bool {
        self.entries
            .lock()
            .get(&vaddr.floor())
            .is_some_and(|pte| pte.dirty)
    }
}
