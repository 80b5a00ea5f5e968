//! 流程阶段与执行记录

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// 流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Vision,
    LightweightText,
    Structure,
    Rubric,
    Scoring,
    Annotation,
    Knowledge,
    Assemble,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Vision => "vision",
            Stage::LightweightText => "lightweight_text",
            Stage::Structure => "structure",
            Stage::Rubric => "rubric",
            Stage::Scoring => "scoring",
            Stage::Annotation => "annotation",
            Stage::Knowledge => "knowledge",
            Stage::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 阶段结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Ran,
    Skipped { reason: String },
    CacheHit,
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped { reason: reason.into() }
    }
}

/// 一个阶段的执行记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub elapsed_ms: u128,
}

/// 阶段执行轨迹
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StageTrace {
    records: Vec<StageRecord>,
}

impl StageTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个阶段并输出日志
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome, elapsed: Duration) {
        let record = StageRecord {
            stage,
            outcome,
            elapsed_ms: elapsed.as_millis(),
        };
        crate::utils::logging::log_stage(&record);
        self.records.push(record);
    }

    pub fn outcome_of(&self, stage: Stage) -> Option<&StageOutcome> {
        self.records.iter().find(|r| r.stage == stage).map(|r| &r.outcome)
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }
}
