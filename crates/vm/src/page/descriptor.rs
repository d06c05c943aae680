//! 页描述符
//!
//! 描述符的不变部分（页号、可写性、内容来源）在创建后不再改变；
//! 可变部分（驻留位置、钉住标记）由描述符自己的自旋锁保护。
//!
//! # 钉住
//!
//! 缺页处理、驱逐和销毁在改变一页的驻留位置之前都必须先钉住描述符，
//! 同一时刻只有一方能持有 [`PinGuard`]。驱逐方只尝试钉住（失败就换下一个候选帧），
//! 其余各方自旋等待。

use alloc::sync::Arc;
use core::fmt;
use core::hint;
use sync::SpinLock;

use crate::address::{Vaddr, Vpn};
use crate::file::VmFile;
use crate::frame_table::FrameId;
use crate::swap::SlotId;

/// 文件中的一段内容：从 `offset` 读 `read_bytes` 字节，其后 `zero_bytes` 字节填零
#[derive(Clone)]
pub struct FileSource {
    /// 文件句柄
    pub file: Arc<dyn VmFile>,
    /// 文件内偏移
    pub offset: usize,
    /// 来自文件的字节数
    pub read_bytes: usize,
    /// 补零的字节数
    pub zero_bytes: usize,
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .finish_non_exhaustive()
    }
}

/// 页的内容来源
#[derive(Debug, Clone)]
pub enum PageKind {
    /// 匿名页：首次访问时清零，驱逐时进交换区
    Anonymous,
    /// 文件映射页（mmap）：驱逐时脏页写回文件
    FileBacked(FileSource),
    /// 可执行文件段：从文件载入，驱逐时进交换区，从不写回文件
    Binary(FileSource),
}

impl PageKind {
    /// 文件来源（匿名页没有）
    pub fn source(&self) -> Option<&FileSource> {
        match self {
            PageKind::Anonymous => None,
            PageKind::FileBacked(src) | PageKind::Binary(src) => Some(src),
        }
    }
}

/// 页当前的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// 不在内存也不在交换区，下次访问从来源载入
    Unloaded,
    /// 位于帧表中的某一帧
    Resident(FrameId),
    /// 位于交换区的某个槽位
    Swapped(SlotId),
}

/// [`Residency`] 去掉编号后的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// 未载入
    Unloaded,
    /// 驻留内存
    Resident,
    /// 已换出
    Swapped,
}

impl Residency {
    /// 对应的状态
    pub fn state(&self) -> PageState {
        match self {
            Residency::Unloaded => PageState::Unloaded,
            Residency::Resident(_) => PageState::Resident,
            Residency::Swapped(_) => PageState::Swapped,
        }
    }
}

#[derive(Debug)]
struct DescriptorState {
    residency: Residency,
    pinned: bool,
}

/// 一个用户虚拟页的描述符
pub struct PageDescriptor {
    vpn: Vpn,
    writable: bool,
    kind: PageKind,
    state: SpinLock<DescriptorState>,
}

impl PageDescriptor {
    /// 创建一个处于 [`Residency::Unloaded`] 的描述符
    pub fn new(vpn: Vpn, kind: PageKind, writable: bool) -> Arc<Self> {
        Arc::new(PageDescriptor {
            vpn,
            writable,
            kind,
            state: SpinLock::new(DescriptorState {
                residency: Residency::Unloaded,
                pinned: false,
            }),
        })
    }

    /// 匿名页
    pub fn anonymous(vpn: Vpn, writable: bool) -> Arc<Self> {
        Self::new(vpn, PageKind::Anonymous, writable)
    }

    /// 文件映射页，总是可写
    pub fn file_backed(vpn: Vpn, source: FileSource) -> Arc<Self> {
        Self::new(vpn, PageKind::FileBacked(source), true)
    }

    /// 可执行文件段页
    pub fn binary(vpn: Vpn, source: FileSource, writable: bool) -> Arc<Self> {
        Self::new(vpn, PageKind::Binary(source), writable)
    }

    /// 页号
    pub fn vpn(&self) -> Vpn {
        self.vpn
    }

    /// 页起始地址
    pub fn vaddr(&self) -> Vaddr {
        self.vpn.start_addr()
    }

    /// 用户是否可写
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// 内容来源
    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// 当前位置
    pub fn residency(&self) -> Residency {
        self.state.lock().residency
    }

    /// 当前状态
    pub fn state(&self) -> PageState {
        self.residency().state()
    }

    /// 是否被钉住
    pub fn is_pinned(&self) -> bool {
        self.state.lock().pinned
    }

    /// 尝试钉住，已被他人钉住时返回 `None`
    pub(crate) fn try_pin(&self) -> Option<PinGuard<'_>> {
        let mut state = self.state.lock();
        if state.pinned {
            return None;
        }
        state.pinned = true;
        Some(PinGuard { desc: self })
    }

    /// 钉住，必要时自旋等待当前持有者完成
    ///
    /// 调用者不得持有帧表锁、文件系统锁或其他描述符的钉住。
    pub(crate) fn pin(&self) -> PinGuard<'_> {
        loop {
            if let Some(guard) = self.try_pin() {
                return guard;
            }
            hint::spin_loop();
        }
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("vpn", &self.vpn)
            .field("writable", &self.writable)
            .field("kind", &self.kind)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// 钉住凭证，Drop 时解除钉住
pub(crate) struct PinGuard<'a> {
    desc: &'a PageDescriptor,
}

impl PinGuard<'_> {
    pub(crate) fn residency(&self) -> Residency {
        self.desc.state.lock().residency
    }

    pub(crate) fn set_residency(&self, residency: Residency) {
        self.desc.state.lock().residency = residency;
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.desc.state.lock().pinned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::init_sync;

    #[test]
    fn test_new_descriptor_is_unloaded() {
        init_sync();
        let desc = PageDescriptor::anonymous(Vpn(0x10000), true);
        assert_eq!(desc.state(), PageState::Unloaded);
        assert_eq!(desc.vaddr(), Vaddr(0x1000_0000));
        assert!(!desc.is_pinned());
    }

    #[test]
    fn test_pin_is_exclusive() {
        init_sync();
        let desc = PageDescriptor::anonymous(Vpn(1), false);
        let guard = desc.pin();
        assert!(desc.is_pinned());
        assert!(desc.try_pin().is_none());
        guard.set_residency(Residency::Swapped(SlotId(3)));
        drop(guard);
        assert!(!desc.is_pinned());
        assert_eq!(desc.residency(), Residency::Swapped(SlotId(3)));
        assert!(desc.try_pin().is_some());
    }
}
