// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Ctrl-C 中断标志 (进程级)
//!
//! 摄像头推理循环在每一帧之间检查该标志, 收到中断后正常返回.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::{Lazy, OnceCell};

static INTERRUPTED: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));
static INSTALLED: OnceCell<()> = OnceCell::new();

/// 注册 Ctrl-C 处理器, 重复调用无副作用
pub fn install() -> Result<()> {
    INSTALLED.get_or_try_init(|| {
        let flag = Arc::clone(&INTERRUPTED);
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                log::info!("🛑 收到中断信号, 正在停止...");
            }
        })?;
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}

/// 是否收到过中断
pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// 清除中断标志
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// 手动触发中断 (与 Ctrl-C 等效)
pub fn trigger() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// 读写中断标志的测试需要串行执行
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_roundtrip() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        install().unwrap();
        install().unwrap();
        reset();
        assert!(!requested());
        trigger();
        assert!(requested());
        reset();
        assert!(!requested());
    }
}
