//! 会话存储
//!
//! `SessionStore` 是处理逻辑看到的会话；底层由 `SessionAdapter` 承载：
//! - `MemorySessionAdapter`：进程内临时会话，固定 id `cli`，用于 CLI 和测试
//! - `PersistentSessionAdapter`：以 cookie 中的会话 id 为键，数据存放在
//!   进程级 `SessionBackend` 中
//!
//! 两者都满足：同一会话内 `set` 后 `get` 得到写入的值；`destroy` 之后
//! 所有 `get` 返回空，并在下次访问时分配新的 id。

pub mod backend;

pub use backend::{InMemorySessionBackend, SessionBackend, SessionData};

use crate::errors::SessionError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// 内存会话的固定 id
pub const CLI_SESSION_ID: &str = "cli";

/// 未配置 `session.name` 时的 cookie 名
pub const DEFAULT_SESSION_NAME: &str = "app_session";

/// 请求携带的会话 cookie 值，由 HTTP 边缘预置到请求作用域
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookie(pub Option<String>);

/// 会话底层实现
pub trait SessionAdapter: Send + Sync {
    /// 当前会话 id；销毁后首次调用时生成新的 id
    fn id(&self) -> Result<String, SessionError>;

    /// 已分配的会话 id，不会为此分配新 id
    fn current_id(&self) -> Option<String>;

    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError>;

    fn remove(&self, key: &str) -> Result<Option<Value>, SessionError>;

    fn clear(&self) -> Result<(), SessionError>;

    fn destroy(&self) -> Result<(), SessionError>;
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 进程内临时会话
pub struct MemorySessionAdapter {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    id: Option<String>,
    data: SessionData,
}

impl MemorySessionAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                id: Some(CLI_SESSION_ID.to_string()),
                data: SessionData::new(),
            }),
        }
    }
}

impl Default for MemorySessionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAdapter for MemorySessionAdapter {
    fn id(&self) -> Result<String, SessionError> {
        Ok(self.state.lock().id.get_or_insert_with(fresh_id).clone())
    }

    fn current_id(&self) -> Option<String> {
        self.state.lock().id.clone()
    }

    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.state.lock().data.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.id.get_or_insert_with(fresh_id);
        state.data.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.state.lock().data.remove(key))
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.state.lock().data.clear();
        Ok(())
    }

    fn destroy(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.data.clear();
        state.id = None;
        Ok(())
    }
}

/// 以 cookie id 为键、数据写穿到 `SessionBackend` 的会话
pub struct PersistentSessionAdapter {
    backend: std::sync::Arc<dyn SessionBackend>,
    state: Mutex<MemoryState>,
}

impl PersistentSessionAdapter {
    /// 打开 cookie 指向的会话；未知或缺失的 id 视为新会话
    pub fn open(
        backend: std::sync::Arc<dyn SessionBackend>,
        cookie: &SessionCookie,
    ) -> Result<Self, SessionError> {
        let existing = match cookie.0.as_deref() {
            Some(id) => backend.load(id)?.map(|data| (id.to_string(), data)),
            None => None,
        };
        let (id, data) = match existing {
            Some((id, data)) => (Some(id), data),
            None => (None, SessionData::new()),
        };
        Ok(Self {
            backend,
            state: Mutex::new(MemoryState { id, data }),
        })
    }

    /// 写入后端；新 id 只有登记成功后才会生效
    fn persist(&self, state: &mut MemoryState) -> Result<String, SessionError> {
        let id = state.id.clone().unwrap_or_else(fresh_id);
        self.backend.save(&id, state.data.clone())?;
        state.id = Some(id.clone());
        Ok(id)
    }
}

impl SessionAdapter for PersistentSessionAdapter {
    /// 新分配的 id 立即登记到后端，下一个请求的 cookie 才能被识别
    fn id(&self) -> Result<String, SessionError> {
        let mut state = self.state.lock();
        match &state.id {
            Some(id) => Ok(id.clone()),
            None => self.persist(&mut state),
        }
    }

    fn current_id(&self) -> Option<String> {
        self.state.lock().id.clone()
    }

    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.state.lock().data.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.data.insert(key.to_string(), value);
        self.persist(&mut state).map(|_| ())
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        let mut state = self.state.lock();
        let removed = state.data.remove(key);
        if removed.is_some() {
            self.persist(&mut state)?;
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.data.clear();
        self.persist(&mut state).map(|_| ())
    }

    fn destroy(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if let Some(id) = state.id.take() {
            self.backend.delete(&id)?;
        }
        state.data.clear();
        Ok(())
    }
}

/// 会话服务
pub struct SessionStore {
    name: String,
    options: toml::Table,
    adapter: Box<dyn SessionAdapter>,
}

impl SessionStore {
    pub fn new(adapter: Box<dyn SessionAdapter>, options: toml::Table) -> Self {
        let name = options
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_SESSION_NAME)
            .to_string();
        Self {
            name,
            options,
            adapter,
        }
    }

    /// 临时内存会话
    pub fn memory(options: toml::Table) -> Self {
        Self::new(Box::new(MemorySessionAdapter::new()), options)
    }

    /// cookie 名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 透传的会话选项
    pub fn options(&self) -> &toml::Table {
        &self.options
    }

    /// 会话 id；持久会话首次分配时登记失败会返回错误
    pub fn id(&self) -> Result<String, SessionError> {
        self.adapter.id()
    }

    /// 已分配的会话 id；还没有会话时为 `None`
    pub fn current_id(&self) -> Option<String> {
        self.adapter.current_id()
    }

    pub fn get_value(&self, key: &str) -> Result<Option<Value>, SessionError> {
        self.adapter.get(key)
    }

    /// 读取并反序列化
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.adapter.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SessionError::Decode(key.to_string(), e)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Encode(key.to_string(), e))?;
        self.adapter.set(key, value)
    }

    pub fn has(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.adapter.get(key)?.is_some())
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        self.adapter.remove(key)
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        self.adapter.clear()
    }

    pub fn destroy(&self) -> Result<(), SessionError> {
        tracing::debug!(session = %self.name, "Session destroyed");
        self.adapter.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn persistent(backend: &Arc<InMemorySessionBackend>, cookie: Option<&str>) -> SessionStore {
        let backend: Arc<dyn SessionBackend> = backend.clone();
        let adapter =
            PersistentSessionAdapter::open(backend, &SessionCookie(cookie.map(String::from)))
                .unwrap();
        SessionStore::new(Box::new(adapter), toml::Table::new())
    }

    #[test]
    fn test_memory_session_roundtrip_and_destroy() {
        let session = SessionStore::memory(toml::Table::new());
        assert_eq!(session.id().unwrap(), CLI_SESSION_ID);
        assert_eq!(session.name(), DEFAULT_SESSION_NAME);

        session.set("user_id", 42u64).unwrap();
        assert_eq!(session.get::<u64>("user_id").unwrap(), Some(42));
        assert!(session.has("user_id").unwrap());

        session.destroy().unwrap();
        assert_eq!(session.get_value("user_id").unwrap(), None);
        assert_eq!(session.current_id(), None);
        let new_id = session.id().unwrap();
        assert_ne!(new_id, CLI_SESSION_ID);
        assert_eq!(session.id().unwrap(), new_id);
    }

    #[test]
    fn test_remove_and_clear() {
        let session = SessionStore::memory(toml::Table::new());
        session.set("a", "x").unwrap();
        session.set("b", "y").unwrap();

        assert_eq!(session.remove("a").unwrap(), Some(json!("x")));
        assert!(!session.has("a").unwrap());

        session.clear().unwrap();
        assert!(!session.has("b").unwrap());
        assert_eq!(session.id().unwrap(), CLI_SESSION_ID);
    }

    #[test]
    fn test_decode_error_is_reported() {
        let session = SessionStore::memory(toml::Table::new());
        session.set("user_id", "not a number").unwrap();
        assert!(matches!(
            session.get::<u64>("user_id"),
            Err(SessionError::Decode(..))
        ));
    }

    #[test]
    fn test_session_name_from_options() {
        let mut options = toml::Table::new();
        options.insert("name".to_string(), toml::Value::String("webapp".to_string()));
        let session = SessionStore::memory(options);
        assert_eq!(session.name(), "webapp");
        assert!(session.options().contains_key("name"));
    }

    #[test]
    fn test_persistent_session_survives_requests() {
        let backend = Arc::new(InMemorySessionBackend::new());

        let first = persistent(&backend, None);
        first.set("lang", "de_DE").unwrap();
        let id = first.id().unwrap();

        let second = persistent(&backend, Some(&id));
        assert_eq!(second.id().unwrap(), id);
        assert_eq!(second.get::<String>("lang").unwrap(), Some("de_DE".to_string()));
    }

    #[test]
    fn test_empty_session_id_is_recognised_next_time() {
        let backend = Arc::new(InMemorySessionBackend::new());
        let id = persistent(&backend, None).id().unwrap();

        assert_eq!(persistent(&backend, Some(&id)).id().unwrap(), id);
    }

    #[test]
    fn test_untouched_session_is_not_registered() {
        let backend = Arc::new(InMemorySessionBackend::new());
        let session = persistent(&backend, None);

        assert_eq!(session.current_id(), None);
        assert!(!session.has("lang").unwrap());
        assert!(backend.is_empty());
    }

    /// 拒绝写入的后端
    struct FailingBackend;

    impl SessionBackend for FailingBackend {
        fn load(&self, _id: &str) -> Result<Option<SessionData>, SessionError> {
            Ok(None)
        }

        fn save(&self, _id: &str, _data: SessionData) -> Result<(), SessionError> {
            Err(SessionError::Unavailable("read-only store".to_string()))
        }

        fn delete(&self, _id: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[test]
    fn test_registration_failure_is_reported() {
        let adapter =
            PersistentSessionAdapter::open(Arc::new(FailingBackend), &SessionCookie::default()).unwrap();
        let session = SessionStore::new(Box::new(adapter), toml::Table::new());

        assert!(matches!(session.id(), Err(SessionError::Unavailable(_))));
        assert_eq!(session.current_id(), None);
        assert!(session.set("lang", "de_DE").is_err());
        assert_eq!(session.current_id(), None);
    }

    #[test]
    fn test_unknown_cookie_starts_new_session() {
        let backend = Arc::new(InMemorySessionBackend::new());
        let session = persistent(&backend, Some("forged"));
        assert_eq!(session.current_id(), None);
        assert_ne!(session.id().unwrap(), "forged");
        assert!(!session.has("user_id").unwrap());
    }

    #[test]
    fn test_persistent_destroy_rotates_id() {
        let backend = Arc::new(InMemorySessionBackend::new());
        let session = persistent(&backend, None);
        session.set("user_id", 1u64).unwrap();
        let old_id = session.id().unwrap();

        session.destroy().unwrap();
        assert_eq!(session.get_value("user_id").unwrap(), None);
        assert_ne!(session.id().unwrap(), old_id);
        assert!(backend.load(&old_id).unwrap().is_none());
    }
}
