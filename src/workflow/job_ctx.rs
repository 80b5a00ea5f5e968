//! 作业上下文
//!
//! 封装"我正在处理哪个作业"这一信息

use std::fmt::Display;
use std::time::Instant;

/// 作业上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 作业ID（时间戳）
    pub job_id: String,

    /// 每批最多题目数
    pub batch_size: usize,

    /// 最大并发数
    pub max_concurrency: usize,

    /// 开始时间
    pub started_at: Instant,
}

impl JobCtx {
    /// 创建新的作业上下文
    pub fn new(batch_size: usize, max_concurrency: usize) -> Self {
        Self {
            job_id: format!("job_{}", chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")),
            batch_size,
            max_concurrency: max_concurrency.max(1),
            started_at: Instant::now(),
        }
    }

    /// 已用时间（秒）
    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[作业 {}]", self.job_id)
    }
}
