/// 强度窗口, 包含下限和上限. 用于把原始 MRI 强度截断并线性映射到 `[0, 1]`.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f32,
    upper: f32,
}

impl IntensityWindow {
    /// 构建强度窗.
    ///
    /// `lower` 和 `upper` 必须有限且 `lower < upper`, 否则返回 `None`.
    pub fn new(lower: f32, upper: f32) -> Option<IntensityWindow> {
        if lower.is_finite() && upper.is_finite() && lower < upper {
            Some(Self { lower, upper })
        } else {
            None
        }
    }

    /// 第一阶段网络使用的 DWI 窗口, 范围为 \[0, 5000\].
    #[inline]
    pub const fn dwi() -> IntensityWindow {
        Self {
            lower: 0.0,
            upper: 5000.0,
        }
    }

    /// 第一阶段网络使用的 ADC 窗口, 范围为 \[-0.004, 0.008\].
    #[inline]
    pub const fn adc() -> IntensityWindow {
        Self {
            lower: -0.004,
            upper: 0.008,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.lower
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.upper
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.upper - self.lower
    }

    /// 先截断到窗口内, 再平移 `-lower` 并除以窗宽, 结果位于 `[0, 1]`.
    ///
    /// 计算顺序与训练时的预处理保持一致: `(clip(v) - lower) / width`.
    /// NaN 原样传播.
    #[inline]
    pub fn eval(&self, v: f32) -> f32 {
        (v.clamp(self.lower, self.upper) - self.lower) / self.width()
    }
}
