//! 虚拟内存错误类型
//!
//! - [`VmError`]：系统调用路径（mmap/munmap、装载器）返回给调用者的错误，
//!   可通过 [`VmError::to_errno()`] 转换为系统调用错误码。
//! - [`Terminate`]：缺页无法解决，当前进程必须以 [`KILLED_EXIT_STATUS`] 退出。

use crate::address::Vaddr;

/// 被缺页处理杀死的进程的退出码
pub const KILLED_EXIT_STATUS: i32 = -1;

/// 虚拟内存操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 地址为空、位于内核空间或越过用户区间上界 (-EINVAL)
    InvalidAddress,
    /// 地址未页对齐 (-EINVAL)
    Misaligned,
    /// 目标区间与已有页重叠 (-EEXIST)
    Overlap,
    /// 文件长度为 0 (-EINVAL)
    EmptyFile,
    /// 映射号不存在 (-EINVAL)
    NoSuchMapping,
    /// 文件系统操作失败 (-EIO)
    Io,
    /// 页表无法建立映射 (-ENOMEM)
    MapFailed,
    /// 地址空间已经销毁 (-ESRCH)
    AddressSpaceGone,
}

impl VmError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            VmError::Io => -5,
            VmError::MapFailed => -12,
            VmError::Overlap => -17,
            VmError::InvalidAddress
            | VmError::Misaligned
            | VmError::EmptyFile
            | VmError::NoSuchMapping => -22,
            VmError::AddressSpaceGone => -3,
        }
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;

/// 进程被终止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// 访问了用户区间之外的地址
    BadAddress,
    /// 地址没有页描述符，也不满足栈增长条件
    NoDescriptor,
    /// 写只读页
    WriteToReadOnly,
    /// 硬件报告了已映射页上的保护错误
    ProtectionViolation,
    /// 从文件载入页失败
    FileRead,
    /// 从交换区读回页失败
    SwapRead,
    /// 页表无法建立映射
    MapFailed,
    /// 当前任务没有用户地址空间
    NoAddressSpace,
}

/// 缺页处理的致命结果：当前进程应以 [`KILLED_EXIT_STATUS`] 退出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminate {
    /// 触发缺页的地址
    pub addr: Vaddr,
    /// 终止原因
    pub reason: KillReason,
}

impl Terminate {
    /// 构造终止结果
    pub const fn new(addr: Vaddr, reason: KillReason) -> Self {
        Terminate { addr, reason }
    }

    /// 进程退出码
    pub const fn exit_status(&self) -> i32 {
        KILLED_EXIT_STATUS
    }
}

impl From<KillReason> for VmError {
    fn from(reason: KillReason) -> Self {
        match reason {
            KillReason::BadAddress | KillReason::NoDescriptor => VmError::InvalidAddress,
            KillReason::FileRead | KillReason::SwapRead => VmError::Io,
            KillReason::NoAddressSpace => VmError::AddressSpaceGone,
            KillReason::WriteToReadOnly
            | KillReason::ProtectionViolation
            | KillReason::MapFailed => VmError::MapFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VmError::Overlap.to_errno(), -17);
        assert_eq!(VmError::Misaligned.to_errno(), -22);
        assert_eq!(VmError::NoSuchMapping.to_errno(), -22);
        assert_eq!(VmError::Io.to_errno(), -5);
    }

    #[test]
    fn test_terminate_exit_status() {
        let t = Terminate::new(Vaddr(0x1000), KillReason::NoDescriptor);
        assert_eq!(t.exit_status(), KILLED_EXIT_STATUS);
        assert_eq!(VmError::from(t.reason), VmError::InvalidAddress);
        assert_eq!(VmError::from(KillReason::SwapRead), VmError::Io);
    }
}
