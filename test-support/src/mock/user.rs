//! 以用户进程的视角读写内存
//!
//! 每次访问先交给 [`MockPageTable::access`]；缺页时调用
//! [`AddressSpace::resolve_fault`] 后重试，和真实硬件重新执行指令一样。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use vm::{AddressSpace, PAGE_SIZE, PageFault, PhysFramePool, Terminate, UsizeConvert, Vaddr};

use super::frame_pool::MockFramePool;
use super::page_table::MockPageTable;

/// 同一地址连续缺页超过此次数视为处理程序有误
const MAX_FAULTS_PER_ACCESS: usize = 64;

/// 一个用户进程的内存访问器
pub struct UserMemory {
    space: Arc<AddressSpace>,
    page_table: Arc<MockPageTable>,
    pool: Arc<MockFramePool>,
    sp: Vaddr,
}

impl UserMemory {
    /// 创建访问器，栈指针初始为 `stack_top`
    pub fn new(space: Arc<AddressSpace>, page_table: Arc<MockPageTable>, pool: Arc<MockFramePool>) -> Self {
        let sp = space.system().config().stack_top();
        UserMemory {
            space,
            page_table,
            pool,
            sp,
        }
    }

    /// 地址空间
    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// 页表
    pub fn page_table(&self) -> &Arc<MockPageTable> {
        &self.page_table
    }

    /// 设置用户栈指针
    pub fn set_sp(&mut self, sp: Vaddr) {
        self.sp = sp;
    }

    /// 写入 `data`
    pub fn write(&self, addr: Vaddr, data: &[u8]) -> Result<(), Terminate> {
        let mut done = 0;
        while done < data.len() {
            let cur = Vaddr(addr.as_usize() + done);
            let n = (PAGE_SIZE - cur.page_offset()).min(data.len() - done);
            let chunk = &data[done..done + n];
            self.access_page(cur, n, true, |bytes| bytes.copy_from_slice(chunk))?;
            done += n;
        }
        Ok(())
    }

    /// 读取 `len` 字节
    pub fn read(&self, addr: Vaddr, len: usize) -> Result<Vec<u8>, Terminate> {
        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let cur = Vaddr(addr.as_usize() + done);
            let n = (PAGE_SIZE - cur.page_offset()).min(len - done);
            let dst = &mut out[done..done + n];
            self.access_page(cur, n, false, |bytes| dst.copy_from_slice(bytes))?;
            done += n;
        }
        Ok(out)
    }

    /// 写一个字节
    pub fn write_byte(&self, addr: Vaddr, value: u8) -> Result<(), Terminate> {
        self.write(addr, &[value])
    }

    /// 读一个字节
    pub fn read_byte(&self, addr: Vaddr) -> Result<u8, Terminate> {
        Ok(self.read(addr, 1)?[0])
    }

    /// 在一页之内访问 `[addr, addr + len)`
    fn access_page(
        &self,
        addr: Vaddr,
        len: usize,
        write: bool,
        mut f: impl FnMut(&mut [u8]),
    ) -> Result<(), Terminate> {
        for _ in 0..MAX_FAULTS_PER_ACCESS {
            let result = self.page_table.access(addr, write, |paddr| {
                let kva = self.pool.paddr_to_vaddr(paddr);
                debug_assert!(addr.page_offset() + len <= PAGE_SIZE);
                // SAFETY: 映射存在期间该页属于本进程；访问期间持有页表锁，驱逐无法撤销映射
                let bytes = unsafe { core::slice::from_raw_parts_mut(kva as *mut u8, len) };
                f(bytes)
            });
            match result {
                Ok(()) => return Ok(()),
                Err(flags) => self
                    .space
                    .resolve_fault(PageFault::new(addr, flags).with_sp(self.sp))?,
            }
        }
        panic!("page fault at {:#x} keeps recurring", addr.as_usize());
    }
}
