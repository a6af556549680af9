use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::types::RoutingDecision;

/// 生成缓存键
///
/// 参数按键名排序后序列化，再做一次非加密哈希。哈希冲突会在TTL内
/// 把另一个请求的决策返回给当前请求，这是可以接受的有界风险。
pub fn fingerprint(request_type: &str, arguments: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(arguments, &mut canonical);

    let mut hasher = DefaultHasher::new();
    request_type.hash(&mut hasher);
    canonical.hash(&mut hasher);

    format!("{}:{:016x}", request_type, hasher.finish())
}

/// 与键顺序无关的序列化
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// 缓存条目
#[derive(Debug)]
struct CacheEntry {
    decision: RoutingDecision,
    created_at: Instant,
    /// 在 `order` 中的位置
    sequence: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// 插入/命中顺序，最小的序号最旧
    order: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl CacheInner {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.sequence);
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// 路由决策缓存
///
/// 有界、按条目TTL过期；满了以后淘汰最旧的条目，命中会把条目移到最新位置
pub struct DecisionCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
    // 统计信息
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(300), // 5分钟TTL
            1000,                     // 最大1000个条目
        )
    }
}

impl DecisionCache {
    /// 创建新的缓存实例
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
            max_entries: max_entries.max(1),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// 从缓存获取决策
    pub fn get(&self, key: &str) -> Option<RoutingDecision> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(self.ttl),
            None => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                trace!("Decision cache miss for key '{}'", key);
                return None;
            }
        };

        if expired {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
            debug!("Decision cache entry expired for key '{}'", key);
            return None;
        }

        // 命中后移到最新位置
        let sequence = inner.next_sequence();
        let CacheInner { entries, order, .. } = &mut *inner;
        let entry = entries.get_mut(key)?;
        order.remove(&entry.sequence);
        order.insert(sequence, key.to_string());
        entry.sequence = sequence;

        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        trace!("Decision cache hit for key '{}'", key);

        Some(entry.decision.clone())
    }

    /// 将决策存入缓存
    pub fn put(&self, key: &str, decision: RoutingDecision) {
        let mut inner = self.inner.lock();

        inner.remove(key);

        while inner.entries.len() >= self.max_entries {
            match inner.pop_oldest() {
                Some(evicted) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted oldest decision cache entry: {}", evicted);
                }
                None => break,
            }
        }

        let sequence = inner.next_sequence();
        inner.order.insert(sequence, key.to_string());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                decision,
                created_at: Instant::now(),
                sequence,
            },
        );

        trace!("Cached routing decision for key '{}'", key);
    }

    /// 清空缓存并释放内存
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        *inner = CacheInner::default();
        debug!("Decision cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取缓存统计信息
    pub fn get_stats(&self) -> CacheStats {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            total_lookups: total,
            cache_hits: hits,
            cache_misses: misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.len(),
            max_entries: self.max_entries,
        }
    }

    /// 重置统计信息
    pub fn reset_stats(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// 0.0 - 1.0
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub max_entries: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache Stats: {} lookups, {} hits ({:.1}%), {} misses, {} evictions, {}/{} entries",
            self.total_lookups,
            self.cache_hits,
            self.hit_rate * 100.0,
            self.cache_misses,
            self.evictions,
            self.size,
            self.max_entries
        )
    }
}
