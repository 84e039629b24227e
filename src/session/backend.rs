use crate::errors::SessionError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 一个会话的全部数据
pub type SessionData = HashMap<String, Value>;

/// 未配置 `session.gc_maxlifetime` 时的空闲过期时间（秒）
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1440;

/// 持久会话的存储后端
pub trait SessionBackend: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;

    fn save(&self, id: &str, data: SessionData) -> Result<(), SessionError>;

    fn delete(&self, id: &str) -> Result<(), SessionError>;
}

struct StoredSession {
    data: SessionData,
    last_seen: Instant,
}

/// 进程内的会话后端
///
/// 空闲超过 `idle_timeout` 的会话视为不存在，写入时按同样的间隔清扫一次。
/// `idle_timeout` 为 `None` 时会话一直保留到进程退出。
pub struct InMemorySessionBackend {
    sessions: DashMap<String, StoredSession>,
    idle_timeout: Option<Duration>,
    last_sweep: Mutex<Instant>,
}

impl InMemorySessionBackend {
    pub fn new() -> Self {
        Self::with_idle_timeout(Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)))
    }

    pub fn with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// 从透传的会话选项读取 `gc_maxlifetime`（秒，0 表示不过期）
    pub fn from_options(options: &toml::Table) -> Self {
        let secs = options
            .get("gc_maxlifetime")
            .and_then(|v| v.as_integer())
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        Self::with_idle_timeout((secs > 0).then(|| Duration::from_secs(secs)))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 删除全部过期会话，返回删除的数量
    pub fn purge_expired(&self) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_seen.elapsed() < timeout);
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            tracing::debug!(purged, "Expired sessions purged");
        }
        purged
    }

    fn is_expired(&self, session: &StoredSession) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| session.last_seen.elapsed() >= timeout)
    }

    fn maybe_sweep(&self) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        // 其他线程正在判断是否清扫时直接跳过
        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if last_sweep.elapsed() < timeout {
            return;
        }
        *last_sweep = Instant::now();
        drop(last_sweep);
        self.purge_expired();
    }
}

impl Default for InMemorySessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for InMemorySessionBackend {
    fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return Ok(None);
        };
        if self.is_expired(&entry) {
            drop(entry);
            self.sessions.remove(id);
            return Ok(None);
        }
        entry.last_seen = Instant::now();
        Ok(Some(entry.data.clone()))
    }

    fn save(&self, id: &str, data: SessionData) -> Result<(), SessionError> {
        self.sessions.insert(
            id.to_string(),
            StoredSession {
                data,
                last_seen: Instant::now(),
            },
        );
        self.maybe_sweep();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_save_load_delete() {
        let backend = InMemorySessionBackend::new();
        assert!(backend.is_empty());

        let mut data = SessionData::new();
        data.insert("k".to_string(), json!(1));
        backend.save("abc", data).unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.load("abc").unwrap().unwrap()["k"], json!(1));

        backend.delete("abc").unwrap();
        assert!(backend.load("abc").unwrap().is_none());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let backend = InMemorySessionBackend::with_idle_timeout(Some(Duration::from_millis(200)));
        backend.save("idle", SessionData::new()).unwrap();
        backend.save("busy", SessionData::new()).unwrap();

        std::thread::sleep(Duration::from_millis(120));
        assert!(backend.load("busy").unwrap().is_some());
        std::thread::sleep(Duration::from_millis(120));

        assert!(backend.load("idle").unwrap().is_none());
        assert!(backend.load("busy").unwrap().is_some());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_sweep_on_save_bounds_growth() {
        let backend = InMemorySessionBackend::with_idle_timeout(Some(Duration::from_millis(20)));
        for i in 0..100 {
            backend.save(&format!("anon-{}", i), SessionData::new()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(40));

        backend.save("fresh", SessionData::new()).unwrap();
        assert_eq!(backend.len(), 1);
        assert!(backend.load("fresh").unwrap().is_some());
    }

    #[test]
    fn test_idle_timeout_from_options() {
        let mut options = toml::Table::new();
        assert_eq!(
            InMemorySessionBackend::from_options(&options).idle_timeout(),
            Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS))
        );

        options.insert("gc_maxlifetime".to_string(), toml::Value::Integer(60));
        assert_eq!(
            InMemorySessionBackend::from_options(&options).idle_timeout(),
            Some(Duration::from_secs(60))
        );

        options.insert("gc_maxlifetime".to_string(), toml::Value::Integer(0));
        let backend = InMemorySessionBackend::from_options(&options);
        assert_eq!(backend.idle_timeout(), None);
        backend.save("kept", SessionData::new()).unwrap();
        assert_eq!(backend.purge_expired(), 0);
    }
}
