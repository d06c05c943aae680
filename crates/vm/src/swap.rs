//! 交换区
//!
//! 把块设备按页划分成槽位，每个槽位占 `PAGE_SIZE / sector_size` 个连续扇区。
//! 槽位占用情况由 [`Bitmap`] 记录，只在位图操作期间持锁，扇区 I/O 在锁外进行：
//! 槽位一旦被标记占用，就只属于发起操作的那一方。

use alloc::sync::Arc;
use sync::SpinLock;

use crate::bitmap::Bitmap;
use crate::config::PAGE_SIZE;
use crate::ops::BlockDevice;

/// 交换槽编号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SlotId(pub usize);

/// 交换区错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// 没有空闲槽位
    Full,
    /// 槽位编号超出交换区
    InvalidSlot(SlotId),
    /// 槽位当前未被占用
    SlotNotInUse(SlotId),
    /// 块设备读写失败
    Io,
}

struct SlotTable {
    slots: Bitmap,
    swap_outs: usize,
    swap_ins: usize,
}

/// 交换区
pub struct SwapStore {
    device: Arc<dyn BlockDevice>,
    sector_size: usize,
    sectors_per_slot: usize,
    table: SpinLock<SlotTable>,
}

impl SwapStore {
    /// 在块设备上建立交换区
    ///
    /// # Panics
    /// 扇区大小为 0 或不能整除页大小时 panic
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        let sector_size = device.sector_size();
        if sector_size == 0 || PAGE_SIZE % sector_size != 0 {
            panic!("vm: swap sector size {sector_size} does not divide the page size");
        }
        let sectors_per_slot = PAGE_SIZE / sector_size;
        let slot_count = device.size_in_sectors() / sectors_per_slot;
        log::info!(
            "vm: swap store with {} slots ({} sectors of {} bytes each)",
            slot_count,
            sectors_per_slot,
            sector_size
        );
        SwapStore {
            device,
            sector_size,
            sectors_per_slot,
            table: SpinLock::new(SlotTable {
                slots: Bitmap::new(slot_count),
                swap_outs: 0,
                swap_ins: 0,
            }),
        }
    }

    /// 槽位总数
    pub fn total_slots(&self) -> usize {
        self.table.lock().slots.total()
    }

    /// 已占用槽位数
    pub fn used_slots(&self) -> usize {
        self.table.lock().slots.used()
    }

    /// 槽位是否已被占用
    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        self.table.lock().slots.is_used(slot.0)
    }

    /// 累计换出/换入次数
    pub fn counters(&self) -> (usize, usize) {
        let table = self.table.lock();
        (table.swap_outs, table.swap_ins)
    }

    /// 把一页写入新分配的槽位
    ///
    /// 写入失败时槽位被回收。
    pub fn swap_out(&self, page: &[u8]) -> Result<SlotId, SwapError> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        let slot = {
            let mut table = self.table.lock();
            table.slots.alloc().map(SlotId).ok_or(SwapError::Full)?
        };

        let base = slot.0 * self.sectors_per_slot;
        for (i, chunk) in page.chunks(self.sector_size).enumerate() {
            if !self.device.write_sector(base + i, chunk) {
                log::error!("vm: swap write failed at sector {}", base + i);
                self.table.lock().slots.free(slot.0);
                return Err(SwapError::Io);
            }
        }

        self.table.lock().swap_outs += 1;
        Ok(slot)
    }

    /// 把槽位内容读回一页并释放槽位
    ///
    /// 读取失败时槽位保持占用，内容不变。
    pub fn swap_in(&self, slot: SlotId, page: &mut [u8]) -> Result<(), SwapError> {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        self.validate(slot)?;

        let base = slot.0 * self.sectors_per_slot;
        for (i, chunk) in page.chunks_mut(self.sector_size).enumerate() {
            if !self.device.read_sector(base + i, chunk) {
                log::error!("vm: swap read failed at sector {}", base + i);
                return Err(SwapError::Io);
            }
        }

        let mut table = self.table.lock();
        let freed = table.slots.free(slot.0);
        debug_assert!(freed, "vm: swap slot {slot:?} freed twice");
        table.swap_ins += 1;
        Ok(())
    }

    /// 不读取内容直接释放槽位（页被销毁时使用）
    pub fn free_slot(&self, slot: SlotId) -> Result<(), SwapError> {
        let mut table = self.table.lock();
        if slot.0 >= table.slots.total() {
            return Err(SwapError::InvalidSlot(slot));
        }
        if !table.slots.free(slot.0) {
            return Err(SwapError::SlotNotInUse(slot));
        }
        Ok(())
    }

    fn validate(&self, slot: SlotId) -> Result<(), SwapError> {
        let table = self.table.lock();
        if slot.0 >= table.slots.total() {
            return Err(SwapError::InvalidSlot(slot));
        }
        if !table.slots.is_used(slot.0) {
            return Err(SwapError::SlotNotInUse(slot));
        }
        Ok(())
    }
}
