//! 文件内存映射
//!
//! `mmap` 把整个文件惰性映射到一段页对齐的用户地址，每页一个
//! [`PageKind::FileBacked`] 描述符；映射持有一个重新打开的文件句柄，
//! 与调用者的句柄互不影响。`munmap` 把仍驻留的脏页写回文件，
//! 销毁描述符并关闭该句柄。
//!
//! 映射号在每个进程内从 0 开始单调递增，不会复用。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::address::{UsizeConvert, Vaddr, VpnRange};
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::file::VmFile;
use crate::frame_table::frame_bytes;
use crate::page::{FileSource, PageDescriptor, PageKind, Residency};
use crate::space::AddressSpace;

/// 映射号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MappingId(pub usize);

struct Mapping {
    /// 映射专用的文件句柄
    file: Arc<dyn VmFile>,
    /// 按地址升序排列的页
    pages: Vec<Arc<PageDescriptor>>,
}

/// 进程的映射表
pub(crate) struct MmapTable {
    next_id: usize,
    mappings: BTreeMap<MappingId, Mapping>,
}

impl MmapTable {
    pub(crate) const fn new() -> Self {
        MmapTable {
            next_id: 0,
            mappings: BTreeMap::new(),
        }
    }

    fn insert(&mut self, mapping: Mapping) -> MappingId {
        let id = MappingId(self.next_id);
        self.next_id += 1;
        self.mappings.insert(id, mapping);
        id
    }

    fn remove(&mut self, id: MappingId) -> Option<Mapping> {
        self.mappings.remove(&id)
    }

    fn take_all(&mut self) -> BTreeMap<MappingId, Mapping> {
        core::mem::take(&mut self.mappings)
    }
}

impl AddressSpace {
    /// 把 `file` 整个映射到 `addr`
    ///
    /// 拒绝：空地址、非用户地址、未页对齐、空文件、越过用户区间上界，
    /// 以及与已有页（任何类型）重叠的区间。
    pub fn mmap(&self, file: &Arc<dyn VmFile>, addr: Vaddr) -> VmResult<MappingId> {
        self.ensure_alive()?;
        let config = self.system().config();
        if addr.is_null() || !config.is_user_vaddr(addr) {
            return Err(VmError::InvalidAddress);
        }
        if !addr.is_page_aligned() {
            return Err(VmError::Misaligned);
        }

        let file_io = self.system().file_io();
        let len = file_io.length(file.as_ref());
        if len == 0 {
            return Err(VmError::EmptyFile);
        }
        let end = addr.checked_add(len).ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > config.phys_base {
            return Err(VmError::InvalidAddress);
        }

        let handle = file_io.reopen(file.as_ref()).map_err(|errno| {
            log::warn!("vm: mmap reopen failed: {}", errno);
            VmError::Io
        })?;

        let range = VpnRange::covering(addr, len);
        let pages: Vec<_> = range
            .iter()
            .enumerate()
            .map(|(i, vpn)| {
                let offset = i * PAGE_SIZE;
                let read_bytes = (len - offset).min(PAGE_SIZE);
                PageDescriptor::file_backed(
                    vpn,
                    FileSource {
                        file: handle.clone(),
                        offset,
                        read_bytes,
                        zero_bytes: PAGE_SIZE - read_bytes,
                    },
                )
            })
            .collect();

        {
            let mut spt = self.spt.lock();
            if range.iter().any(|vpn| spt.contains(vpn)) {
                drop(spt);
                file_io.close(handle.as_ref());
                return Err(VmError::Overlap);
            }
            for desc in &pages {
                spt.insert(desc.clone()).map_err(|_| VmError::Overlap)?;
            }
        }

        let id = self.mmaps.lock().insert(Mapping {
            file: handle,
            pages,
        });
        log::debug!(
            "vm: pid {:?} mmap {:?} at {:#x}, {} bytes in {} pages",
            self.pid(),
            id,
            addr,
            len,
            range.len()
        );
        Ok(id)
    }

    /// 解除映射
    pub fn munmap(&self, id: MappingId) -> VmResult<()> {
        let mapping = self
            .mmaps
            .lock()
            .remove(id)
            .ok_or(VmError::NoSuchMapping)?;
        self.unmap(id, mapping);
        Ok(())
    }

    /// 解除本进程的全部映射
    pub fn munmap_all(&self) {
        let mappings = self.mmaps.lock().take_all();
        for (id, mapping) in mappings {
            self.unmap(id, mapping);
        }
    }

    /// 当前有效的映射号
    pub fn mapping_ids(&self) -> Vec<MappingId> {
        self.mmaps.lock().mappings.keys().copied().collect()
    }

    fn unmap(&self, id: MappingId, mapping: Mapping) {
        let system = self.system();
        let mut written = 0;
        for desc in &mapping.pages {
            let pin = desc.pin();
            if let (Residency::Resident(frame), PageKind::FileBacked(src)) =
                (pin.residency(), desc.kind())
            {
                if self.page_dir().is_dirty(desc.vaddr()) {
                    if let Some(paddr) = system.frames().paddr(frame) {
                        // SAFETY: 描述符已钉住，帧不会被驱逐
                        let page = unsafe { frame_bytes(system.pool(), paddr) };
                        match system.file_io().write_back(src, page) {
                            Ok(()) => written += 1,
                            Err(errno) => log::error!(
                                "vm: munmap write-back of {:#x} failed: {}",
                                desc.vaddr(),
                                errno
                            ),
                        }
                    }
                }
            }
            system.frames().destroy_page(&pin);
            drop(pin);
            self.spt.lock().remove(desc.vpn());
        }
        system.file_io().close(mapping.file.as_ref());
        log::debug!(
            "vm: pid {:?} munmap {:?}, {} dirty pages written back",
            self.pid(),
            id,
            written
        );
    }
}
