//! 测试支持 crate
//!
//! 为虚拟内存子系统的主机端测试提供 Mock 协作者：
//! 物理页池、带 MMU 模拟的页表、文件、交换块设备，以及按用户视角读写内存的 [`mock::UserMemory`]。

#![no_std]

extern crate alloc;

pub mod mock;

pub use mock::arch::init_arch_ops;
