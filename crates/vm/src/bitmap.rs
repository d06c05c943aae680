//! 位图分配器
//!
//! 每个 bit 表示一个槽位（0=空闲，1=已占用），用 `Vec<u64>` 存储以便按字跳过全满区域。
//! 交换槽和测试用物理页池都基于它。
//!
//! 分配从 `last_alloc_hint` 开始循环查找第一个空闲位；释放直接清除对应 bit。

use alloc::vec::Vec;

/// 槽位位图
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// 位图数据
    bits: Vec<u64>,
    /// 总槽位数
    total: usize,
    /// 已占用槽位数（用于快速统计）
    used: usize,
    /// 上次分配所在的字下标
    last_alloc_hint: usize,
}

impl Bitmap {
    /// 创建一个全部空闲的位图
    pub fn new(total: usize) -> Self {
        Bitmap {
            bits: alloc::vec![0u64; total.div_ceil(64)],
            total,
            used: 0,
            last_alloc_hint: 0,
        }
    }

    /// 槽位是否空闲（越界视为不空闲）
    #[inline]
    pub fn is_free(&self, idx: usize) -> bool {
        idx < self.total && (self.bits[idx / 64] & (1u64 << (idx % 64))) == 0
    }

    /// 槽位是否已被占用（越界视为未占用）
    #[inline]
    pub fn is_used(&self, idx: usize) -> bool {
        idx < self.total && !self.is_free(idx)
    }

    #[inline]
    fn mark_used(&mut self, idx: usize) {
        self.bits[idx / 64] |= 1u64 << (idx % 64);
    }

    #[inline]
    fn mark_free(&mut self, idx: usize) {
        self.bits[idx / 64] &= !(1u64 << (idx % 64));
    }

    /// 占用一个空闲槽位，全部占满时返回 `None`
    pub fn alloc(&mut self) -> Option<usize> {
        let words = self.bits.len();
        if words == 0 {
            return None;
        }

        // 循环查找：[hint, end) + [0, hint)
        for offset in 0..words {
            let word_idx = (self.last_alloc_hint + offset) % words;
            let word = self.bits[word_idx];
            if word == u64::MAX {
                continue;
            }

            let idx = word_idx * 64 + (!word).trailing_zeros() as usize;
            if idx >= self.total {
                continue;
            }

            self.mark_used(idx);
            self.used += 1;
            self.last_alloc_hint = word_idx;
            return Some(idx);
        }

        None
    }

    /// 释放槽位，槽位越界或本来就空闲时返回 false
    pub fn free(&mut self, idx: usize) -> bool {
        if !self.is_used(idx) {
            return false;
        }
        self.mark_free(idx);
        self.used -= 1;
        true
    }

    /// 总槽位数
    pub fn total(&self) -> usize {
        self.total
    }

    /// 已占用槽位数
    pub fn used(&self) -> usize {
        self.used
    }

    /// 获取统计信息
    ///
    /// # 返回值
    /// (总数, 已占用, 空闲)
    pub fn get_stats(&self) -> (usize, usize, usize) {
        (self.total, self.used, self.total - self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_until_full() {
        let mut bm = Bitmap::new(70);
        for expected in 0..70 {
            assert_eq!(bm.alloc(), Some(expected));
        }
        assert_eq!(bm.alloc(), None);
        assert_eq!(bm.get_stats(), (70, 70, 0));
    }

    #[test]
    fn test_free_and_reuse() {
        let mut bm = Bitmap::new(3);
        let a = bm.alloc().unwrap();
        let b = bm.alloc().unwrap();
        assert!(bm.free(a));
        assert!(!bm.free(a), "double free must be rejected");
        assert!(!bm.free(99), "out of range must be rejected");
        assert_eq!(bm.alloc(), Some(a));
        assert!(bm.is_used(b));
        assert_eq!(bm.used(), 2);
    }

    #[test]
    fn test_empty_bitmap() {
        let mut bm = Bitmap::new(0);
        assert_eq!(bm.alloc(), None);
        assert!(!bm.is_free(0));
    }
}
