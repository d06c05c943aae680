//! 地址与页号抽象
//!
//! 虚拟地址 ([`Vaddr`])、物理地址 ([`Paddr`]) 和虚拟页号 ([`Vpn`]) 都是对 `usize` 的
//! 透明包装，避免把三者混用。

use crate::config::PAGE_SIZE;

/// 与 `usize` 互相转换
pub trait UsizeConvert: Copy {
    /// 取出内部值
    fn as_usize(&self) -> usize;
    /// 由 `usize` 构造
    fn from_usize(value: usize) -> Self;
}

/// 为 `usize` 新类型实现 [`UsizeConvert`] 与十六进制格式化
macro_rules! impl_usize_convert {
    ($($type:ident),* $(,)?) => {
        $(
            impl UsizeConvert for $type {
                fn as_usize(&self) -> usize {
                    self.0
                }

                fn from_usize(value: usize) -> Self {
                    Self(value)
                }
            }

            impl core::fmt::LowerHex for $type {
                fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                    core::fmt::LowerHex::fmt(&self.0, f)
                }
            }
        )*
    };
}

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Vaddr(pub usize);

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Paddr(pub usize);

/// 虚拟页号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Vpn(pub usize);

impl_usize_convert!(Vaddr, Paddr, Vpn);

impl Vaddr {
    /// 空指针
    pub const NULL: Vaddr = Vaddr(0);

    /// 页内偏移
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// 是否页对齐
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// 是否为空指针
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 所在页的页号（向下取整）
    pub const fn floor(self) -> Vpn {
        Vpn(self.0 / PAGE_SIZE)
    }

    /// 向下对齐到页边界
    pub const fn align_down(self) -> Vaddr {
        Vaddr(self.0 & !(PAGE_SIZE - 1))
    }

    /// 带溢出检查的加法
    pub fn checked_add(self, bytes: usize) -> Option<Vaddr> {
        self.0.checked_add(bytes).map(Vaddr)
    }
}

impl Paddr {
    /// 是否页对齐
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }
}

impl Vpn {
    /// 页的起始地址
    pub const fn start_addr(self) -> Vaddr {
        Vaddr(self.0 * PAGE_SIZE)
    }

    /// 向后偏移若干页
    pub const fn offset(self, pages: usize) -> Vpn {
        Vpn(self.0 + pages)
    }
}

/// 半开页号区间 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VpnRange {
    /// 起始页号（含）
    pub start: Vpn,
    /// 结束页号（不含）
    pub end: Vpn,
}

impl VpnRange {
    /// 从起始页号和页数构造
    pub const fn from_start_len(start: Vpn, len: usize) -> Self {
        VpnRange {
            start,
            end: Vpn(start.0 + len),
        }
    }

    /// 覆盖 `[start, start + bytes)` 的最小页区间
    pub const fn covering(start: Vaddr, bytes: usize) -> Self {
        let first = start.floor();
        let last = (start.0 + bytes).div_ceil(PAGE_SIZE);
        VpnRange {
            start: first,
            end: Vpn(last),
        }
    }

    /// 区间内的页数
    pub const fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    /// 区间是否为空
    pub const fn is_empty(&self) -> bool {
        self.end.0 == self.start.0
    }

    /// 遍历区间内的页号
    pub fn iter(&self) -> impl Iterator<Item = Vpn> + use<> {
        (self.start.0..self.end.0).map(Vpn)
    }
}
