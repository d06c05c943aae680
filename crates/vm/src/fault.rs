//! 缺页处理
//!
//! 用户态缺页（以及内核代用户访问时的缺页）都经由
//! [`AddressSpace::resolve_fault`] 解决：找到描述符、必要时扩展栈、
//! 分配帧（可能驱逐其他进程的帧）、按描述符记录的来源填充、建立映射。
//! 无法解决时返回 [`Terminate`]，调用者应以 `-1` 结束当前进程。

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::address::Vaddr;
use crate::error::{KillReason, Terminate};
use crate::frame_table::{FrameId, FrameOwner, frame_bytes};
use crate::page::{PageDescriptor, PageKind, PinGuard, Residency};
use crate::space::AddressSpace;

bitflags! {
    /// 硬件报告的缺页原因
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultFlags: u32 {
        /// 页存在，缺页由权限违规引起
        const PRESENT = 1 << 0;
        /// 写访问
        const WRITE = 1 << 1;
        /// 用户态访问
        const USER = 1 << 2;
    }
}

/// 一次缺页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// 触发缺页的地址
    pub addr: Vaddr,
    /// 缺页原因
    pub flags: FaultFlags,
    /// 用户栈指针（内核态缺页时为陷入内核时保存的用户栈指针）
    pub user_sp: Option<Vaddr>,
}

impl PageFault {
    /// 构造缺页
    pub const fn new(addr: Vaddr, flags: FaultFlags) -> Self {
        PageFault {
            addr,
            flags,
            user_sp: None,
        }
    }

    /// 用户态读缺页
    pub const fn read(addr: Vaddr) -> Self {
        Self::new(addr, FaultFlags::USER)
    }

    /// 用户态写缺页
    pub const fn write(addr: Vaddr) -> Self {
        Self::new(addr, FaultFlags::USER.union(FaultFlags::WRITE))
    }

    /// 附带用户栈指针，用于判断栈增长
    pub const fn with_sp(mut self, sp: Vaddr) -> Self {
        self.user_sp = Some(sp);
        self
    }

    /// 是否为写访问
    pub const fn is_write(&self) -> bool {
        self.flags.contains(FaultFlags::WRITE)
    }
}

impl AddressSpace {
    /// 解决一次缺页
    ///
    /// 成功返回后，重新执行触发缺页的访问不会再因同一原因缺页。
    /// 失败时没有留下任何部分状态：分配的帧已归还，描述符状态不变。
    pub fn resolve_fault(&self, fault: PageFault) -> Result<(), Terminate> {
        let addr = fault.addr;
        let kill = |reason| {
            log::info!("vm: pid {:?} killed at {:#x}: {:?}", self.pid(), addr, reason);
            Terminate::new(addr, reason)
        };

        if self.is_torn_down() {
            return Err(kill(KillReason::NoAddressSpace));
        }
        if !self.system().config().is_user_vaddr(addr) {
            return Err(kill(KillReason::BadAddress));
        }
        if fault.flags.contains(FaultFlags::PRESENT) {
            return Err(kill(if fault.is_write() {
                KillReason::WriteToReadOnly
            } else {
                KillReason::ProtectionViolation
            }));
        }

        let desc = match self.lookup(addr) {
            Some(desc) => desc,
            None => self
                .grow_stack(&fault)
                .ok_or_else(|| kill(KillReason::NoDescriptor))?,
        };
        if fault.is_write() && !desc.writable() {
            return Err(kill(KillReason::WriteToReadOnly));
        }

        let pin = desc.pin();
        self.load_page(&desc, &pin).map_err(kill)
    }

    /// 把已钉住的页载入内存并建立映射
    pub(crate) fn load_page(
        &self,
        desc: &Arc<PageDescriptor>,
        pin: &PinGuard<'_>,
    ) -> Result<(), KillReason> {
        let slot = match pin.residency() {
            Residency::Resident(id) => return self.remap_resident(desc, id),
            Residency::Swapped(slot) => Some(slot),
            Residency::Unloaded => None,
        };

        let system = self.system();
        let frames = system.frames();
        let vaddr = desc.vaddr();
        let zero = slot.is_none() && matches!(desc.kind(), PageKind::Anonymous);
        let (id, paddr) = frames.allocate(
            zero,
            FrameOwner {
                pid: self.pid(),
                page_dir: self.page_dir(),
                desc,
            },
        );

        // 映射先于填充建立：填充失败时 discard 会一并撤销映射
        if !self.page_dir().set_mapping(vaddr, paddr, desc.writable()) {
            frames.discard(id);
            return Err(KillReason::MapFailed);
        }

        // SAFETY: 帧尚未提交，只有本线程能访问
        let page = unsafe { frame_bytes(system.pool(), paddr) };
        let filled = match (slot, desc.kind()) {
            (Some(slot), _) => system.swap().swap_in(slot, page).map_err(|err| {
                log::error!("vm: swap in of {:?} for {:#x} failed: {:?}", slot, vaddr, err);
                KillReason::SwapRead
            }),
            (None, PageKind::Anonymous) => Ok(()),
            (None, PageKind::FileBacked(src) | PageKind::Binary(src)) => {
                system.file_io().load_page(src, page).map_err(|err| {
                    log::warn!("vm: loading {:#x} from file failed: {:?}", vaddr, err);
                    KillReason::FileRead
                })
            }
        };
        if let Err(reason) = filled {
            frames.discard(id);
            return Err(reason);
        }

        frames.commit(id, pin);
        Ok(())
    }

    /// 页已驻留：映射还在就是伪缺页，否则按帧表记录重新建立映射
    fn remap_resident(&self, desc: &PageDescriptor, id: FrameId) -> Result<(), KillReason> {
        let vaddr = desc.vaddr();
        if self.page_dir().get_mapping(vaddr).is_some() {
            return Ok(());
        }
        let paddr = self
            .system()
            .frames()
            .paddr(id)
            .ok_or(KillReason::MapFailed)?;
        if self.page_dir().set_mapping(vaddr, paddr, desc.writable()) {
            Ok(())
        } else {
            Err(KillReason::MapFailed)
        }
    }

    /// 对栈区内、且不低于 `sp - slack` 的访问新建一页匿名页
    fn grow_stack(&self, fault: &PageFault) -> Option<Arc<PageDescriptor>> {
        let sp = fault.user_sp?;
        if !self.system().config().is_stack_access(fault.addr, sp) {
            return None;
        }
        let desc = PageDescriptor::anonymous(fault.addr.floor(), true);
        self.spt.lock().insert(desc.clone()).ok()?;
        log::debug!("vm: pid {:?} stack grows to {:#x}", self.pid(), desc.vaddr());
        Some(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_constructors() {
        let v = Vaddr(0x0804_9000);
        let read = PageFault::read(v);
        assert!(!read.is_write());
        assert!(read.flags.contains(FaultFlags::USER));
        assert_eq!(read.user_sp, None);

        let write = PageFault::write(v).with_sp(Vaddr(0xbfff_f000));
        assert!(write.is_write());
        assert!(!write.flags.contains(FaultFlags::PRESENT));
        assert_eq!(write.user_sp, Some(Vaddr(0xbfff_f000)));
    }
}
