//! 由二叉决策树组成的随机森林, 以 bincode 格式存储.

use super::VoxelClassifier;
use crate::consts::FEATURE_LEN;
use crate::{AnalysisError, AnalysisResult};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// 决策树节点. 节点以数组存储, 子节点以下标引用.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// 内部节点: `x[feature] <= threshold` 时走向 `left`, 否则走向 `right`.
    Split {
        /// 特征下标.
        feature: usize,
        /// 分裂阈值.
        threshold: f32,
        /// 左子节点下标.
        left: usize,
        /// 右子节点下标.
        right: usize,
    },

    /// 叶子节点, 保存正类概率.
    Leaf {
        /// 正类概率, 位于 `[0, 1]`.
        proba: f32,
    },
}

/// 单棵决策树. 根节点下标为 0, 子节点下标严格大于父节点.
type Tree = Vec<TreeNode>;

/// 随机森林二分类器. 输出为所有树叶子概率的平均值.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    /// 由若干棵树创建, 并检查结构合法.
    pub fn new(n_features: usize, trees: Vec<Vec<TreeNode>>) -> AnalysisResult<Self> {
        let ans = Self { n_features, trees };
        ans.validate()?;
        Ok(ans)
    }

    /// 从 bincode 文件加载.
    pub fn open<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let ans: Self = bincode::deserialize_from(reader)
            .map_err(|e| AnalysisError::InvalidArtifact(format!("{}: {e}", path.display())))?;
        ans.validate()?;
        if ans.n_features != FEATURE_LEN {
            return Err(AnalysisError::InvalidArtifact(format!(
                "{}: 特征维度为 {}, 期望 {FEATURE_LEN}",
                path.display(),
                ans.n_features
            )));
        }
        log::debug!(
            "loaded random forest with {} trees from {}",
            ans.trees.len(),
            path.display()
        );
        Ok(ans)
    }

    /// 以 bincode 格式写入 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> AnalysisResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| AnalysisError::InvalidArtifact(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// 特征维度.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// 树的数量.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> AnalysisResult<()> {
        let invalid = |msg: String| Err(AnalysisError::InvalidArtifact(msg));
        if self.trees.is_empty() {
            return invalid("随机森林中没有树".to_owned());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.is_empty() {
                return invalid(format!("第 {t} 棵树为空"));
            }
            for (i, node) in tree.iter().enumerate() {
                match *node {
                    TreeNode::Split {
                        feature,
                        left,
                        right,
                        ..
                    } => {
                        if feature >= self.n_features {
                            return invalid(format!("第 {t} 棵树节点 {i}: 特征下标 {feature} 越界"));
                        }
                        // 子节点下标严格递增, 保证遍历一定终止.
                        if left <= i || right <= i || left >= tree.len() || right >= tree.len() {
                            return invalid(format!("第 {t} 棵树节点 {i}: 子节点下标不合法"));
                        }
                    }
                    TreeNode::Leaf { proba } => {
                        if !(0.0..=1.0).contains(&proba) {
                            return invalid(format!("第 {t} 棵树节点 {i}: 概率 {proba} 越界"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 单个样本的正类概率.
    fn predict_one(&self, x: ArrayView1<f32>) -> f32 {
        let sum: f32 = self
            .trees
            .iter()
            .map(|tree| {
                let mut i = 0;
                loop {
                    match tree[i] {
                        TreeNode::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => i = if x[feature] <= threshold { left } else { right },
                        TreeNode::Leaf { proba } => break proba,
                    }
                }
            })
            .sum();
        sum / self.trees.len() as f32
    }
}

impl VoxelClassifier for RandomForest {
    fn predict_proba(&self, features: ArrayView2<f32>) -> AnalysisResult<Array1<f32>> {
        if features.ncols() != self.n_features {
            return Err(AnalysisError::Inference(format!(
                "特征维度为 {}, 模型期望 {}",
                features.ncols(),
                self.n_features
            )));
        }

        #[cfg(feature = "rayon")]
        let out: Vec<f32> = features
            .outer_iter()
            .into_par_iter()
            .map(|row| self.predict_one(row))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let out: Vec<f32> = features
            .outer_iter()
            .map(|row| self.predict_one(row))
            .collect();

        Ok(Array1::from(out))
    }
}
