//! 内容缓存
//!
//! 以输入文件原始字节的指纹为键，缓存视觉/文本阶段的输出。
//! 进程内共享，可被多个并发作业同时读写，需要时显式清空。

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{ContentBlock, DocumentKind};

/// 内容指纹（SHA-256）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// 计算一组文件的指纹
    ///
    /// 每个文件以类型和长度作前缀，避免不同切分方式得到相同的字节流。
    pub fn of_documents<'a>(documents: impl IntoIterator<Item = (DocumentKind, &'a [u8])>) -> Self {
        let mut hasher = Sha256::new();
        for (kind, bytes) in documents {
            hasher.update(format!("{:?}", kind).as_bytes());
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self(hasher.finalize().into())
    }

    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
    pub entries: usize,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 内容缓存
#[derive(Default)]
pub struct ContentCache {
    entries: DashMap<Fingerprint, Arc<Vec<ContentBlock>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    writes: AtomicUsize,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Fingerprint) -> Option<Arc<Vec<ContentBlock>>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("缓存命中: {}", key.short());
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: Fingerprint, blocks: Arc<Vec<ContentBlock>>) {
        self.entries.insert(key, blocks);
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("缓存写入: {}", key.short());
    }

    /// 清空缓存条目（统计保留）
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
