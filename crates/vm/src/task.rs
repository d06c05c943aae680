//! 缺页入口
//!
//! 陷入处理程序通过 [`TaskContext`] 找到当前进程的地址空间，
//! 再交给 [`AddressSpace::resolve_fault`]。

use alloc::sync::Arc;

use crate::error::{KillReason, Terminate};
use crate::fault::PageFault;
use crate::space::{AddressSpace, Pid};

/// 当前任务
pub trait TaskContext {
    /// 当前进程号
    fn current_pid(&self) -> Pid;

    /// 当前进程的地址空间，内核线程没有
    fn current_space(&self) -> Option<Arc<AddressSpace>>;
}

/// 缺页异常入口
///
/// 返回 `Err` 时调用者应以 [`Terminate::exit_status`] 结束当前进程。
pub fn handle_page_fault(ctx: &dyn TaskContext, fault: PageFault) -> Result<(), Terminate> {
    match ctx.current_space() {
        Some(space) => space.resolve_fault(fault),
        None => {
            log::error!(
                "vm: page fault at {:#x} in pid {:?} without an address space",
                fault.addr,
                ctx.current_pid()
            );
            Err(Terminate::new(fault.addr, KillReason::NoAddressSpace))
        }
    }
}
