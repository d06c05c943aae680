//! 内存模拟的交换块设备

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use sync::SpinLock;
use vm::{BlockDevice, PAGE_SIZE};

/// 默认扇区大小
pub const SECTOR_SIZE: usize = 512;

/// 内存模拟的块设备
pub struct MockBlockDevice {
    /// 存储数据
    data: SpinLock<Vec<u8>>,
    sector_size: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockBlockDevice {
    /// 创建指定扇区数的设备
    pub fn new(sectors: usize, sector_size: usize) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(vec![0u8; sectors * sector_size]),
            sector_size,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// 恰好容纳 `slots` 页的设备（512 字节扇区）
    pub fn with_slots(slots: usize) -> Arc<Self> {
        Self::new(slots * PAGE_SIZE / SECTOR_SIZE, SECTOR_SIZE)
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 累计读扇区次数
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// 累计写扇区次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 之后的读请求全部失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后的写请求全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl BlockDevice for MockBlockDevice {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> bool {
        if buf.len() != self.sector_size || self.fail_reads.load(Ordering::SeqCst) {
            return false;
        }

        let data = self.data.lock();
        let offset = sector * self.sector_size;
        if offset + self.sector_size > data.len() {
            return false;
        }

        buf.copy_from_slice(&data[offset..offset + self.sector_size]);
        self.reads.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) -> bool {
        if buf.len() != self.sector_size || self.fail_writes.load(Ordering::SeqCst) {
            return false;
        }

        let mut data = self.data.lock();
        let offset = sector * self.sector_size;
        if offset + self.sector_size > data.len() {
            return false;
        }

        data[offset..offset + self.sector_size].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn size_in_sectors(&self) -> usize {
        self.data.lock().len() / self.sector_size
    }
}
