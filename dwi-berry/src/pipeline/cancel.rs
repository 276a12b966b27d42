use crate::{AnalysisError, AnalysisResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 取消标志. 可以在任意线程调用 [`CancelToken::cancel`],
/// 流水线会在下一个切片边界处停止, 不返回任何部分结果.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 创建未取消的标志.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// 是否已请求取消.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// 已取消时返回 [`AnalysisError::Cancelled`].
    pub(crate) fn check(&self, completed: usize, total: usize) -> AnalysisResult<()> {
        if self.is_cancelled() {
            log::info!("analysis cancelled at step {completed}/{total}");
            Err(AnalysisError::Cancelled { completed, total })
        } else {
            Ok(())
        }
    }
}
