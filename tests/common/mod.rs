//! 集成测试共用的假 Oracle 和测试文件

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use batch_grading::config::{Config, OracleConfig};
use batch_grading::error::OracleError;
use batch_grading::infrastructure::{FsIngestor, OracleReply, OracleRequest, OracleTransport};
use batch_grading::GradingEngine;

type Responder = dyn Fn(Option<&str>, &str) -> Result<String, OracleError> + Send + Sync;

/// 按系统消息和提示词回复的假 Oracle
pub struct ScriptedOracle {
    responder: Box<Responder>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    systems: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(responder: impl Fn(Option<&str>, &str) -> Result<String, OracleError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            systems: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls_with_system(&self, system: &str) -> usize {
        self.systems.lock().unwrap().iter().filter(|s| s.as_str() == system).count()
    }
}

#[async_trait]
impl OracleTransport for ScriptedOracle {
    async fn complete(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(system) = request.system_message {
            self.systems.lock().unwrap().push(system.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = (self.responder)(request.system_message, &request.user_text());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(OracleReply::from_text)
    }
}

/// 可以发起调用的配置（重试等待 1 毫秒）
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.oracle = OracleConfig {
        api_key: "sk-test".to_string(),
        retry_base_delay_ms: 1,
        ..OracleConfig::default()
    };
    config
}

pub fn engine(oracle: Arc<ScriptedOracle>, config: Config) -> GradingEngine {
    let ingestor = Arc::new(FsIngestor::from_config(&config.grading));
    GradingEngine::new(oracle, ingestor, config)
}

/// 在临时目录中写入测试文件
pub fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}
