//! 运行结果.

use dwi_berry::{AnalysisResult, LesionPair};
use std::io::{self, Write};
use std::path::PathBuf;

/// 单个病例的分析结果.
#[derive(Debug)]
pub struct CaseOutcome {
    /// 展示阈值下两类病灶的体素个数.
    pub lesion_voxels: LesionPair<usize>,

    /// 保留两位小数的获益指标.
    pub benefit: f64,

    /// 写出的文件.
    pub outputs: Vec<PathBuf>,
}

/// 将单个病例的结果写进 `w` 中.
fn describe_into<W: Write>(
    name: &str,
    outcome: &AnalysisResult<CaseOutcome>,
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Case `{name}`:")?;
    let c = match outcome {
        Ok(c) => c,
        Err(e) => return write!(w, "{S4}Failed: {e}"),
    };
    writeln!(w, "{S4}Perfusion lesion voxels: {}", c.lesion_voxels.perfusion)?;
    writeln!(
        w,
        "{S4}Non-perfusion lesion voxels: {}",
        c.lesion_voxels.non_perfusion
    )?;
    writeln!(w, "{S4}Benefit: {:?}", c.benefit)?;
    write!(w, "{S4}Outputs:")?;
    for p in c.outputs.iter() {
        write!(w, "\n{S4}{S4}{}", p.display())?;
    }
    Ok(())
}

/// 所有病例的结果.
pub struct RunReport {
    data: Vec<(PathBuf, AnalysisResult<CaseOutcome>)>,
}

impl RunReport {
    pub fn from_iter<I: IntoIterator<Item = (PathBuf, AnalysisResult<CaseOutcome>)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 失败的病例个数.
    pub fn failures(&self) -> usize {
        self.data.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// 打印运行结果.
    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut w = stdout.lock();
        utils::sep();
        for (case, outcome) in self.data.iter() {
            describe_into(&case.display().to_string(), outcome, &mut w)?;
            writeln!(w)?;
            utils::sep();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwi_berry::AnalysisError;

    #[test]
    fn test_describe() {
        let ok = Ok(CaseOutcome {
            lesion_voxels: LesionPair::new(12, 30),
            benefit: 150.0,
            outputs: vec![PathBuf::from("out/perf_a.nii.gz")],
        });
        let mut buf = vec![];
        describe_into("a", &ok, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Perfusion lesion voxels: 12"));
        assert!(text.contains("Benefit: 150.0"));
        assert!(text.ends_with("out/perf_a.nii.gz"));

        let err = Err(AnalysisError::MissingModel);
        let mut buf = vec![];
        describe_into("b", &err, &mut buf).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("Failed"));

        let report = RunReport::from_iter([(PathBuf::from("a"), ok), (PathBuf::from("b"), err)]);
        assert_eq!(report.failures(), 1);
    }
}
