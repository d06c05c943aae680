//! 自旋锁封装
//!
//! 基于 [`lock_api`] 把 [`RawSpinLock`] 包装成带数据的互斥锁。

use crate::raw_spin_lock::RawSpinLock;

/// 提供对数据的互斥访问的自旋锁。
///
/// # 示例
/// ```ignore
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁，禁用中断
///     *guard += 1;
/// } // 离开作用域，释放锁并恢复中断
/// ```
///
/// # 注意
/// SpinLock 不是可重入的。持锁时再次获取同一把锁将导致死锁。
/// 持锁期间中断被禁用，应避免长时间运行的操作。
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// [`SpinLock`] 的 RAII 保护器。
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;
