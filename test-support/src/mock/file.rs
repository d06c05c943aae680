//! 内存模拟的文件
//!
//! 同一文件的多个句柄（[`VmFile::reopen`] 得到的）共享一个 inode，
//! inode 记录每次读写的 `(offset, len)` 以及仍未关闭的句柄数。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use sync::SpinLock;
use vm::VmFile;

/// EIO
const EIO: isize = -5;

struct MockInode {
    data: SpinLock<Vec<u8>>,
    reads: SpinLock<Vec<(usize, usize)>>,
    writes: SpinLock<Vec<(usize, usize)>>,
    open_handles: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// 内存模拟的打开文件
pub struct MockFile {
    inode: Arc<MockInode>,
    closed: AtomicBool,
}

impl MockFile {
    /// 以给定内容创建文件并打开一个句柄
    pub fn new(data: &[u8]) -> Arc<Self> {
        let inode = Arc::new(MockInode {
            data: SpinLock::new(data.to_vec()),
            reads: SpinLock::new(Vec::new()),
            writes: SpinLock::new(Vec::new()),
            open_handles: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        });
        Self::open(inode)
    }

    /// 长度为 `len`、第 i 字节为 `pattern(i)` 的文件
    pub fn patterned(len: usize) -> Arc<Self> {
        let data: Vec<u8> = (0..len).map(pattern).collect();
        Self::new(&data)
    }

    fn open(inode: Arc<MockInode>) -> Arc<Self> {
        inode.open_handles.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockFile {
            inode,
            closed: AtomicBool::new(false),
        })
    }

    /// 作为 trait 对象使用
    pub fn as_vm_file(self: &Arc<Self>) -> Arc<dyn VmFile> {
        self.clone()
    }

    /// 当前文件内容
    pub fn contents(&self) -> Vec<u8> {
        self.inode.data.lock().clone()
    }

    /// 所有读请求的 `(offset, len)`
    pub fn read_log(&self) -> Vec<(usize, usize)> {
        self.inode.reads.lock().clone()
    }

    /// 所有写请求的 `(offset, len)`
    pub fn write_log(&self) -> Vec<(usize, usize)> {
        self.inode.writes.lock().clone()
    }

    /// 同一文件仍打开的句柄数
    pub fn open_handles(&self) -> usize {
        self.inode.open_handles.load(Ordering::SeqCst)
    }

    /// 本句柄是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 之后的读请求全部失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.inode.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后的写请求全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.inode.fail_writes.store(fail, Ordering::SeqCst);
    }
}

/// [`MockFile::patterned`] 使用的字节模式
pub fn pattern(i: usize) -> u8 {
    (i % 251) as u8
}

impl VmFile for MockFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        if self.inode.fail_reads.load(Ordering::SeqCst) {
            return Err(EIO);
        }
        self.inode.reads.lock().push((offset, buf.len()));
        let data = self.inode.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    /// 不扩展文件：超出当前长度的部分被截断
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        if self.inode.fail_writes.load(Ordering::SeqCst) {
            return Err(EIO);
        }
        self.inode.writes.lock().push((offset, buf.len()));
        let mut data = self.inode.data.lock();
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    fn length(&self) -> usize {
        self.inode.data.lock().len()
    }

    fn reopen(&self) -> Result<Arc<dyn VmFile>, isize> {
        let file: Arc<dyn VmFile> = MockFile::open(self.inode.clone());
        Ok(file)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inode.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
