//! 通用常量.
//!
//! 这些数值是模型训练时确定的先验, 修改任何一个都会让预训练模型的输出失去可比性.

/// 阈值.
pub mod thresh {
    /// DWI 候选体素阈值 (原始强度单位). 严格大于该值的体素才会被分类.
    pub const CANDIDATE_DWI: f32 = 1000.0;

    /// 分析时第二阶段分类器的二值化阈值 (两类病灶相同).
    pub const CLASSIFY: f32 = 0.3;

    /// 评测时预测结果的二值化阈值. 与 [`CLASSIFY`] 互不替代.
    pub const EVAL: f32 = 0.15;

    /// 第一阶段分割网络输出的二值化阈值.
    pub const SEGMENT: f32 = 0.5;

    /// 联合模式下计算获益指标时的体素计数阈值 (严格大于),
    /// 同时也是分析结果的展示阈值 (不小于).
    pub const DISPLAY: f32 = 0.2;

    /// 已保存结果在预览时的二值化阈值 (不小于).
    pub const RESULT_PREVIEW: f32 = 0.25;
}

/// 第一阶段网络输入的边长. 网络输入形状为 `(1, 2, 224, 224)`.
pub const UNET_INPUT_SIZE: usize = 224;

/// 第一阶段网络的输入通道数 (DWI, ADC).
pub const UNET_CHANNELS: usize = 2;

/// 3x3x3 邻域的体素个数.
pub const NEIGHBOURHOOD_LEN: usize = 27;

/// 单个候选体素的特征长度: DWI 邻域 27 维 + ADC 邻域 27 维.
pub const FEATURE_LEN: usize = 2 * NEIGHBOURHOOD_LEN;

/// 仅第二阶段 (随机森林) 模式的名称.
pub const MODE_RANDOM_FOREST: &str = "Random Forest";

/// 第一阶段 + 第二阶段 (随机森林 + U-Net) 模式的名称.
pub const MODE_RANDOM_FOREST_UNET: &str = "Random Forest+U-Net";

/// 分析完成时发出的进度消息.
pub const DONE_MESSAGE: &str = "分析已完成！";
