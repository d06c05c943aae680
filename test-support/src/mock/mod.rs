//! Mock 实现模块
//!
//! 提供虚拟内存子系统各协作者的 Mock 实现，用于测试

pub mod arch;
pub mod block;
pub mod file;
pub mod frame_pool;
pub mod page_table;
pub mod user;

pub use block::MockBlockDevice;
pub use file::MockFile;
pub use frame_pool::MockFramePool;
pub use page_table::{MockPageTable, MockPte};
pub use user::UserMemory;
