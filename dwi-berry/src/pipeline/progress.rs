//! 进度汇报.
//!
//! 进度只是旁路信息: 发送失败或无人接收都不会影响分析结果.

use crate::consts::DONE_MESSAGE;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::Sender;

/// 单条进度事件.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Progress {
    /// 完成百分比, 位于 `(0, 100]`.
    Percent(f64),

    /// 分析结束.
    Done,
}

/// 百分比显示为十进制数字, 结束事件显示为 `分析已完成！`.
impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            // `{:?}` 保留 `50.0` 这样的小数点.
            Self::Percent(p) => write!(f, "{p:?}"),
            Self::Done => f.write_str(DONE_MESSAGE),
        }
    }
}

/// 进度接收方. 事件按切片顺序逐条到达, 不会合并.
pub trait ProgressSink {
    /// 接收一条事件. 不能阻塞太久, 也不能失败.
    fn emit(&mut self, event: Progress);
}

/// 丢弃所有事件.
impl ProgressSink for () {
    #[inline]
    fn emit(&mut self, _: Progress) {}
}

/// 收集所有事件.
impl ProgressSink for Vec<Progress> {
    #[inline]
    fn emit(&mut self, event: Progress) {
        self.push(event);
    }
}

/// 转发到通道. 接收端已关闭时静默丢弃.
impl ProgressSink for Sender<Progress> {
    #[inline]
    fn emit(&mut self, event: Progress) {
        let _ = self.send(event);
    }
}

/// 将闭包包装为进度接收方.
pub struct Callback<F>(pub F);

impl<F: FnMut(Progress)> ProgressSink for Callback<F> {
    #[inline]
    fn emit(&mut self, event: Progress) {
        (self.0)(event)
    }
}

/// 以 `info` 级别写入日志.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    #[inline]
    fn emit(&mut self, event: Progress) {
        log::info!("progress: {event}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_display() {
        assert_eq!(Progress::Percent(50.0).to_string(), "50.0");
        assert_eq!(Progress::Percent(12.5).to_string(), "12.5");
        assert_eq!(Progress::Done.to_string(), "分析已完成！");
    }

    #[test]
    fn test_channel_sink_never_fails() {
        let (mut tx, rx) = mpsc::channel();
        tx.emit(Progress::Percent(1.0));
        assert_eq!(rx.recv().unwrap(), Progress::Percent(1.0));
        drop(rx);
        tx.emit(Progress::Done);
    }

    #[test]
    fn test_callback() {
        let mut seen = vec![];
        let mut sink = Callback(|p: Progress| seen.push(p.to_string()));
        sink.emit(Progress::Percent(100.0));
        sink.emit(Progress::Done);
        drop(sink);
        assert_eq!(seen, ["100.0", "分析已完成！"]);
    }
}
