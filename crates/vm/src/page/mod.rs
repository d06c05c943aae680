//! 页描述符与补充页表
//!
//! 每个用户虚拟页由一个 [`PageDescriptor`] 描述：内容从哪里来、当前在哪里。
//! 每个进程用一张 [`SupplementalPageTable`] 按页号索引自己的描述符。

mod descriptor;
mod spt;

pub use descriptor::{FileSource, PageDescriptor, PageKind, PageState, Residency};
pub(crate) use descriptor::PinGuard;
pub use spt::{AlreadyMapped, SupplementalPageTable};
