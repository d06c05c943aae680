//! 虚拟内存配置
//!
//! 页大小是编译期常量；用户地址空间布局和栈增长策略由 [`VmConfig`] 描述，
//! 在创建 [`VmSystem`](crate::VmSystem) 时传入。

use crate::address::{UsizeConvert, Vaddr};

/// 页大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// 用户地址空间默认下界（与 ELF 默认装载地址一致）
pub const DEFAULT_USER_BASE: usize = 0x0804_8000;

/// 用户/内核分界（`PHYS_BASE`）
pub const DEFAULT_PHYS_BASE: usize = 0xc000_0000;

/// 用户栈的最大尺寸
pub const DEFAULT_MAX_STACK_SIZE: usize = 8 * 1024 * 1024;

/// 栈指针以下仍视为合法栈访问的字节数（覆盖 `PUSHA` 一次压入的 32 字节）
pub const DEFAULT_STACK_SLACK: usize = 32;

/// 用户地址空间布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// 用户可访问的最低地址（含）
    pub user_base: usize,
    /// 用户可访问的最高地址（不含），栈从这里向下增长
    pub phys_base: usize,
    /// 栈区允许增长到的最大尺寸
    pub max_stack_size: usize,
    /// 栈指针以下允许的访问距离
    pub stack_slack: usize,
}

impl VmConfig {
    /// 默认布局
    pub const fn new() -> Self {
        VmConfig {
            user_base: DEFAULT_USER_BASE,
            phys_base: DEFAULT_PHYS_BASE,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            stack_slack: DEFAULT_STACK_SLACK,
        }
    }

    /// 地址是否位于用户区间 `[user_base, phys_base)`
    pub fn is_user_vaddr(&self, vaddr: Vaddr) -> bool {
        let v = vaddr.as_usize();
        v >= self.user_base && v < self.phys_base
    }

    /// 用户栈顶（初始栈指针）
    pub fn stack_top(&self) -> Vaddr {
        Vaddr::from_usize(self.phys_base)
    }

    /// 栈区的最低地址
    pub fn stack_limit(&self) -> Vaddr {
        Vaddr::from_usize(self.phys_base.saturating_sub(self.max_stack_size))
    }

    /// 判断一次缺页是否应当视为栈增长
    ///
    /// 地址必须落在栈区内，且不低于 `sp - stack_slack`。
    pub fn is_stack_access(&self, vaddr: Vaddr, sp: Vaddr) -> bool {
        let v = vaddr.as_usize();
        v >= self.stack_limit().as_usize()
            && v < self.phys_base
            && v.saturating_add(self.stack_slack) >= sp.as_usize()
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
