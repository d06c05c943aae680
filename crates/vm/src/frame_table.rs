//! 全局帧表
//!
//! 记录每个被用户页占用的物理帧：归属哪个进程、哪个虚拟页、由哪个描述符描述。
//! 物理页池耗尽时按时钟（second-chance）算法选出一帧驱逐，
//! 驱逐可以选中任意进程的帧。
//!
//! # 加锁顺序
//!
//! 帧表锁 → 描述符锁 → 交换区锁 / 文件系统锁。
//! 驱逐期间一直持有帧表锁（包括换出和写回的 I/O），因此同一时刻最多只有一次驱逐。
//!
//! # 帧的生命周期
//!
//! 1. [`FrameTable::allocate`]：帧进入帧表，但描述符还不指向它（未提交），驱逐会跳过它；
//! 2. [`FrameTable::commit`]：在帧表锁下把描述符置为 `Resident`，之后才可能被驱逐；
//! 3. [`FrameTable::release`] / [`FrameTable::discard`] / 驱逐：帧离开帧表并归还页池。

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::hint;
use sync::SpinLock;

use crate::address::{Paddr, Vaddr};
use crate::config::PAGE_SIZE;
use crate::file::FileIo;
use crate::ops::{PageDirectory, PhysFramePool};
use crate::page::{PageDescriptor, PageKind, PinGuard, Residency};
use crate::space::Pid;
use crate::swap::{SlotId, SwapStore};

/// 帧表项编号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FrameId(pub usize);

/// 新帧的归属
pub(crate) struct FrameOwner<'a> {
    pub pid: Pid,
    pub page_dir: &'a Arc<dyn PageDirectory>,
    pub desc: &'a Arc<PageDescriptor>,
}

struct Frame {
    paddr: Paddr,
    vaddr: Vaddr,
    pid: Pid,
    owner: Weak<PageDescriptor>,
    page_dir: Arc<dyn PageDirectory>,
}

/// 帧表项快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// 帧表项编号
    pub id: FrameId,
    /// 物理地址
    pub paddr: Paddr,
    /// 映射的用户虚拟地址
    pub vaddr: Vaddr,
    /// 所属进程
    pub pid: Pid,
    /// 描述符是否反过来指向这一帧（未提交的帧为 false）
    pub committed: bool,
}

/// 帧表统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// 当前占用的帧数
    pub resident: usize,
    /// 累计驱逐次数
    pub evictions: usize,
    /// 驱逐时写回文件的次数
    pub file_writebacks: usize,
}

struct FrameTableInner {
    /// 帧表项，下标即 [`FrameId`]
    frames: Vec<Option<Frame>>,
    /// 空闲下标，后进先出
    free_ids: Vec<usize>,
    /// 时钟指针
    hand: usize,
    stats: FrameStats,
}

impl FrameTableInner {
    fn insert(&mut self, frame: Frame) -> FrameId {
        self.stats.resident += 1;
        match self.free_ids.pop() {
            Some(idx) => {
                self.frames[idx] = Some(frame);
                FrameId(idx)
            }
            None => {
                self.frames.push(Some(frame));
                FrameId(self.frames.len() - 1)
            }
        }
    }

    fn take(&mut self, id: FrameId) -> Option<Frame> {
        let frame = self.frames.get_mut(id.0)?.take()?;
        self.free_ids.push(id.0);
        self.stats.resident -= 1;
        Some(frame)
    }
}

/// 帧在内核直接映射区中的字节视图
///
/// # Safety
/// 调用者必须独占该帧：帧未提交，或其描述符已被调用者钉住
#[allow(single_use_lifetimes)]
pub(crate) unsafe fn frame_bytes<'a>(pool: &dyn PhysFramePool, paddr: Paddr) -> &'a mut [u8] {
    let kva = pool.paddr_to_vaddr(paddr);
    // SAFETY: 页池保证直接映射区中的整页可访问，独占性由调用者保证
    unsafe { core::slice::from_raw_parts_mut(kva as *mut u8, PAGE_SIZE) }
}

/// 全局帧表
pub struct FrameTable {
    pool: Arc<dyn PhysFramePool>,
    swap: Arc<SwapStore>,
    file_io: Arc<FileIo>,
    inner: SpinLock<FrameTableInner>,
}

impl FrameTable {
    /// 创建空帧表
    pub fn new(pool: Arc<dyn PhysFramePool>, swap: Arc<SwapStore>, file_io: Arc<FileIo>) -> Self {
        FrameTable {
            pool,
            swap,
            file_io,
            inner: SpinLock::new(FrameTableInner {
                frames: Vec::new(),
                free_ids: Vec::new(),
                hand: 0,
                stats: FrameStats::default(),
            }),
        }
    }

    /// 当前占用的帧数
    pub fn len(&self) -> usize {
        self.inner.lock().stats.resident
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 统计信息
    pub fn stats(&self) -> FrameStats {
        self.inner.lock().stats
    }

    /// 所有帧表项的快照
    pub fn snapshot(&self) -> Vec<FrameInfo> {
        let inner = self.inner.lock();
        inner
            .frames
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let frame = slot.as_ref()?;
                let committed = frame
                    .owner
                    .upgrade()
                    .is_some_and(|desc| desc.residency() == Residency::Resident(FrameId(idx)));
                Some(FrameInfo {
                    id: FrameId(idx),
                    paddr: frame.paddr,
                    vaddr: frame.vaddr,
                    pid: frame.pid,
                    committed,
                })
            })
            .collect()
    }

    /// 帧的物理地址
    pub fn paddr(&self, id: FrameId) -> Option<Paddr> {
        let inner = self.inner.lock();
        inner.frames.get(id.0)?.as_ref().map(|frame| frame.paddr)
    }

    /// 为 `owner` 分配一帧
    ///
    /// 页池为空时驱逐一帧后重试，因此不会返回“内存不足”。
    /// 返回的帧处于未提交状态，调用者必须随后 [`commit`](Self::commit)
    /// 或 [`discard`](Self::discard)。
    ///
    /// # Panics
    /// 页池为空且帧表也为空（没有任何可驱逐的帧）时 panic
    pub(crate) fn allocate(&self, zero: bool, owner: FrameOwner<'_>) -> (FrameId, Paddr) {
        let vaddr = owner.desc.vaddr();
        loop {
            let mut inner = self.inner.lock();
            if let Some(paddr) = self.pool.alloc_page(zero) {
                let id = inner.insert(Frame {
                    paddr,
                    vaddr,
                    pid: owner.pid,
                    owner: Arc::downgrade(owner.desc),
                    page_dir: owner.page_dir.clone(),
                });
                log::trace!("vm: frame {:?} ({:#x}) -> pid {:?} vaddr {:#x}", id, paddr, owner.pid, vaddr);
                return (id, paddr);
            }

            if inner.stats.resident == 0 {
                panic!("vm: user pool exhausted and the frame table is empty");
            }

            if !self.evict_one(&mut inner) {
                // 所有帧都被钉住，放开帧表锁等持有者完成
                drop(inner);
                hint::spin_loop();
            }
        }
    }

    /// 提交：描述符从此指向这一帧，帧变为可驱逐
    pub(crate) fn commit(&self, id: FrameId, pin: &PinGuard<'_>) {
        let _inner = self.inner.lock();
        pin.set_residency(Residency::Resident(id));
    }

    /// 撤销一帧未提交的分配（缺页处理失败时的回滚）
    pub(crate) fn discard(&self, id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.take(id) {
            frame.page_dir.clear_mapping(frame.vaddr);
            self.pool.free_page(frame.paddr);
        }
    }

    /// 释放描述符当前占用的帧，描述符回到 `Unloaded`
    ///
    /// # Panics
    /// 帧表中没有该帧时 panic
    pub(crate) fn release(&self, id: FrameId, pin: &PinGuard<'_>) {
        let mut inner = self.inner.lock();
        let Some(frame) = inner.take(id) else {
            panic!("vm: releasing frame {id:?} which is not in the frame table");
        };
        frame.page_dir.clear_mapping(frame.vaddr);
        self.pool.free_page(frame.paddr);
        pin.set_residency(Residency::Unloaded);
    }

    /// 销毁一页：驻留则释放帧，已换出则释放槽位
    pub(crate) fn destroy_page(&self, pin: &PinGuard<'_>) {
        match pin.residency() {
            Residency::Resident(id) => self.release(id, pin),
            Residency::Swapped(slot) => {
                if let Err(err) = self.swap.free_slot(slot) {
                    log::warn!("vm: freeing swap slot {:?} failed: {:?}", slot, err);
                }
                pin.set_residency(Residency::Unloaded);
            }
            Residency::Unloaded => {}
        }
    }

    /// 时钟扫描，驱逐一帧
    ///
    /// 返回 false 表示扫描两圈都没有找到可驱逐的帧（全部被钉住或未提交）。
    fn evict_one(&self, inner: &mut FrameTableInner) -> bool {
        let slots = inner.frames.len();
        for _ in 0..slots * 2 {
            let idx = inner.hand;
            inner.hand = (inner.hand + 1) % slots;

            let Some(frame) = inner.frames[idx].as_ref() else {
                continue;
            };
            let vaddr = frame.vaddr;
            let page_dir = frame.page_dir.clone();

            let Some(desc) = frame.owner.upgrade() else {
                // 描述符已消失但帧还在：直接回收
                log::warn!("vm: reclaiming orphaned frame {} (vaddr {:#x})", idx, vaddr);
                if let Some(frame) = inner.take(FrameId(idx)) {
                    page_dir.clear_mapping(vaddr);
                    self.pool.free_page(frame.paddr);
                }
                return true;
            };

            let Some(pin) = desc.try_pin() else {
                continue;
            };
            if pin.residency() != Residency::Resident(FrameId(idx)) {
                continue;
            }

            if page_dir.is_accessed(vaddr) {
                page_dir.clear_accessed(vaddr);
                continue;
            }

            let Some(frame) = inner.take(FrameId(idx)) else {
                continue;
            };
            let dirty = frame.page_dir.is_dirty(vaddr);
            // 脏位在撤销映射前采样，写回在撤销映射之后进行（而不是先写回再撤销）：
            // 写回期间进程再访问会缺页并等待钉住
            frame.page_dir.clear_mapping(vaddr);

            // SAFETY: 帧已离开帧表，其描述符由本函数钉住
            let bytes = unsafe { frame_bytes(self.pool.as_ref(), frame.paddr) };
            let next = match desc.kind() {
                PageKind::Anonymous | PageKind::Binary(_) => {
                    Residency::Swapped(self.swap_out_or_panic(bytes))
                }
                PageKind::FileBacked(src) => {
                    if dirty {
                        match self.file_io.write_back(src, bytes) {
                            Ok(()) => inner.stats.file_writebacks += 1,
                            Err(errno) => log::error!(
                                "vm: write-back of pid {:?} vaddr {:#x} failed ({}), modification lost",
                                frame.pid,
                                vaddr,
                                errno
                            ),
                        }
                    }
                    Residency::Unloaded
                }
            };
            pin.set_residency(next);
            drop(pin);

            self.pool.free_page(frame.paddr);
            inner.stats.evictions += 1;
            log::debug!(
                "vm: evicted pid {:?} vaddr {:#x} -> {:?}",
                frame.pid,
                vaddr,
                next
            );
            return true;
        }
        false
    }

    fn swap_out_or_panic(&self, page: &[u8]) -> SlotId {
        match self.swap.swap_out(page) {
            Ok(slot) => slot,
            Err(err) => panic!("vm: cannot evict page, swap out failed: {err:?}"),
        }
    }
}
