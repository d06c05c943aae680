//! 文件接口与全局文件系统锁
//!
//! 文件系统不是线程安全的：所有经由虚拟内存管理器发起的文件 I/O
//! 都通过 [`FileIo`] 串行化。

use alloc::sync::Arc;
use sync::SpinLock;

use crate::config::PAGE_SIZE;
use crate::page::FileSource;

const EINVAL: isize = -22;

/// 可映射到内存的打开文件
pub trait VmFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize>;

    /// 文件长度（字节）
    fn length(&self) -> usize;

    /// 打开同一文件的一个新句柄（与原句柄的生命周期无关）
    fn reopen(&self) -> Result<Arc<dyn VmFile>, isize>;

    /// 关闭句柄
    fn close(&self);
}

/// 页载入失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// 文件系统返回错误码
    Errno(isize),
    /// 读到的字节数少于描述符记录的 `read_bytes`
    ShortRead {
        /// 期望字节数
        expected: usize,
        /// 实际字节数
        actual: usize,
    },
    /// 描述符记录的 `read_bytes` 超出一页
    OutOfPage {
        /// 记录的字节数
        read_bytes: usize,
    },
}

/// 文件系统锁
///
/// 包装对 [`VmFile`] 的所有调用。加锁顺序中位于帧表锁和描述符锁之后。
pub struct FileIo {
    lock: SpinLock<()>,
}

impl FileIo {
    /// 创建文件系统锁
    pub const fn new() -> Self {
        FileIo {
            lock: SpinLock::new(()),
        }
    }

    /// 加锁读取
    pub fn read_at(&self, file: &dyn VmFile, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        let _fs = self.lock.lock();
        file.read_at(offset, buf)
    }

    /// 加锁写入
    pub fn write_at(&self, file: &dyn VmFile, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        let _fs = self.lock.lock();
        file.write_at(offset, buf)
    }

    /// 加锁获取文件长度
    pub fn length(&self, file: &dyn VmFile) -> usize {
        let _fs = self.lock.lock();
        file.length()
    }

    /// 加锁重新打开文件
    pub fn reopen(&self, file: &dyn VmFile) -> Result<Arc<dyn VmFile>, isize> {
        let _fs = self.lock.lock();
        file.reopen()
    }

    /// 加锁关闭文件
    pub fn close(&self, file: &dyn VmFile) {
        let _fs = self.lock.lock();
        file.close();
    }

    /// 按描述符记录的 `(offset, read_bytes)` 读入一页，剩余部分清零
    pub(crate) fn load_page(&self, src: &FileSource, page: &mut [u8]) -> Result<(), LoadError> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let read_bytes = src.read_bytes;
        if read_bytes > page.len() {
            return Err(LoadError::OutOfPage { read_bytes });
        }
        if read_bytes > 0 {
            let actual = self
                .read_at(src.file.as_ref(), src.offset, &mut page[..read_bytes])
                .map_err(LoadError::Errno)?;
            if actual != read_bytes {
                return Err(LoadError::ShortRead {
                    expected: read_bytes,
                    actual,
                });
            }
        }
        page[read_bytes..].fill(0);
        Ok(())
    }

    /// 把一页中属于文件的前 `read_bytes` 字节写回
    pub(crate) fn write_back(&self, src: &FileSource, page: &[u8]) -> Result<(), isize> {
        let read_bytes = src.read_bytes;
        if read_bytes > page.len() {
            return Err(EINVAL);
        }
        let written = self.write_at(src.file.as_ref(), src.offset, &page[..read_bytes])?;
        if written != read_bytes {
            log::warn!(
                "vm: partial write-back at offset {:#x}: {} of {} bytes",
                src.offset,
                written,
                read_bytes
            );
        }
        Ok(())
    }
}

impl Default for FileIo {
    fn default() -> Self {
        Self::new()
    }
}
