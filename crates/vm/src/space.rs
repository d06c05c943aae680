//! 进程地址空间
//!
//! [`AddressSpace`] 把一个进程的补充页表、页表和 mmap 映射表绑在一起，
//! 并提供装载器使用的 [`map_segment`](AddressSpace::map_segment) /
//! [`setup_stack`](AddressSpace::setup_stack) 以及进程退出时的
//! [`teardown`](AddressSpace::teardown)。
//!
//! 缺页处理见 [`crate::fault`]，mmap/munmap 见 [`crate::mmap`]。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use sync::SpinLock;

use crate::address::{UsizeConvert, Vaddr, VpnRange};
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::file::VmFile;
use crate::mmap::MmapTable;
use crate::ops::PageDirectory;
use crate::page::{AlreadyMapped, FileSource, PageDescriptor, PageState, SupplementalPageTable};
use crate::system::VmSystem;

/// 进程号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pid(pub usize);

/// 一个用户进程的虚拟地址空间
pub struct AddressSpace {
    pid: Pid,
    system: Arc<VmSystem>,
    page_dir: Arc<dyn PageDirectory>,
    pub(crate) spt: SpinLock<SupplementalPageTable>,
    pub(crate) mmaps: SpinLock<MmapTable>,
    torn_down: AtomicBool,
}

impl AddressSpace {
    /// 为进程创建空地址空间
    pub fn new(system: &Arc<VmSystem>, pid: Pid, page_dir: Arc<dyn PageDirectory>) -> Arc<Self> {
        log::debug!("vm: address space created for pid {:?}", pid);
        Arc::new(AddressSpace {
            pid,
            system: system.clone(),
            page_dir,
            spt: SpinLock::new(SupplementalPageTable::new()),
            mmaps: SpinLock::new(MmapTable::new()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// 进程号
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 所属的虚拟内存系统
    pub fn system(&self) -> &Arc<VmSystem> {
        &self.system
    }

    /// 进程页表
    pub fn page_dir(&self) -> &Arc<dyn PageDirectory> {
        &self.page_dir
    }

    /// 是否已经销毁
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_alive(&self) -> VmResult<()> {
        if self.is_torn_down() {
            return Err(VmError::AddressSpaceGone);
        }
        Ok(())
    }

    /// 查找包含 `vaddr` 的页的描述符
    pub fn lookup(&self, vaddr: Vaddr) -> Option<Arc<PageDescriptor>> {
        self.spt.lock().lookup(vaddr)
    }

    /// 包含 `vaddr` 的页当前的状态，没有描述符时返回 `None`
    pub fn page_state(&self, vaddr: Vaddr) -> Option<PageState> {
        self.lookup(vaddr).map(|desc| desc.state())
    }

    /// 描述符数量
    pub fn page_count(&self) -> usize {
        self.spt.lock().len()
    }

    /// 直接插入一个描述符
    pub fn insert_page(&self, desc: Arc<PageDescriptor>) -> Result<(), AlreadyMapped> {
        self.spt.lock().insert(desc)
    }

    /// 惰性映射可执行文件的一个段
    ///
    /// 从 `upage` 开始的 `(read_bytes + zero_bytes) / PAGE_SIZE` 页，
    /// 每页从文件读 `min(剩余 read_bytes, PAGE_SIZE)` 字节，其余补零。
    /// 只建立描述符，不读文件。
    pub fn map_segment(
        &self,
        file: &Arc<dyn VmFile>,
        offset: usize,
        upage: Vaddr,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> VmResult<()> {
        self.ensure_alive()?;
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(VmError::InvalidAddress)?;
        if !upage.is_page_aligned() || offset % PAGE_SIZE != 0 || total % PAGE_SIZE != 0 {
            return Err(VmError::Misaligned);
        }
        let config = self.system.config();
        let end = upage.checked_add(total).ok_or(VmError::InvalidAddress)?;
        if !config.is_user_vaddr(upage) || end.as_usize() > config.phys_base {
            return Err(VmError::InvalidAddress);
        }

        let range = VpnRange::covering(upage, total);
        let mut spt = self.spt.lock();
        if range.iter().any(|vpn| spt.contains(vpn)) {
            return Err(VmError::Overlap);
        }

        let mut remaining = read_bytes;
        for (i, vpn) in range.iter().enumerate() {
            let page_read = remaining.min(PAGE_SIZE);
            let source = FileSource {
                file: file.clone(),
                offset: offset + i * PAGE_SIZE,
                read_bytes: page_read,
                zero_bytes: PAGE_SIZE - page_read,
            };
            spt.insert(PageDescriptor::binary(vpn, source, writable))
                .map_err(|_| VmError::Overlap)?;
            remaining -= page_read;
        }
        log::debug!(
            "vm: pid {:?} segment at {:#x}, {} pages ({} file bytes)",
            self.pid,
            upage,
            range.len(),
            read_bytes
        );
        Ok(())
    }

    /// 建立初始用户栈：紧贴 `phys_base` 之下的一页清零匿名页，立即载入
    ///
    /// 返回初始栈指针。
    pub fn setup_stack(&self) -> VmResult<Vaddr> {
        self.ensure_alive()?;
        let top = self.system.config().stack_top();
        let vpn = Vaddr::from_usize(top.as_usize() - PAGE_SIZE).floor();
        let desc = PageDescriptor::anonymous(vpn, true);
        self.spt
            .lock()
            .insert(desc.clone())
            .map_err(|_| VmError::Overlap)?;

        let pin = desc.pin();
        if let Err(reason) = self.load_page(&desc, &pin) {
            drop(pin);
            self.spt.lock().remove(vpn);
            return Err(reason.into());
        }
        Ok(top)
    }

    /// 释放进程的全部虚拟内存：先解除所有 mmap（脏页写回），再销毁补充页表
    ///
    /// 重复调用无效果。
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.munmap_all();
        let mut spt = self.spt.lock();
        let pages = spt.len();
        spt.destroy_all(self.system.frames());
        log::debug!("vm: pid {:?} torn down, {} pages released", self.pid, pages);
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// 进程退出时释放其虚拟内存
pub fn teardown_process_memory(space: &AddressSpace) {
    space.teardown();
}
