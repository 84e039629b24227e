//! 认证服务
//!
//! 当前用户由会话中的用户 id 加仓储查询得到。仓储找不到用户时视为匿名，
//! 但不会清除会话里的 id；只有显式 `logout` 才会结束会话。

use crate::domain::{User, UserRepository};
use crate::errors::AuthError;
use crate::session::SessionStore;
use std::sync::Arc;

/// 会话中保存用户 id 的键
pub const USER_SESSION_KEY: &str = "user_id";

pub struct AuthService {
    session: Arc<SessionStore>,
    users: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(session: Arc<SessionStore>, users: Arc<dyn UserRepository>) -> Self {
        Self { session, users }
    }

    /// 会话中记录的用户 id
    pub fn user_id(&self) -> Result<Option<u64>, AuthError> {
        Ok(self.session.get::<u64>(USER_SESSION_KEY)?)
    }

    pub fn current_user(&self) -> Result<Option<User>, AuthError> {
        let Some(id) = self.user_id()? else {
            return Ok(None);
        };
        let user = self.users.find_by_id(id)?;
        if user.is_none() {
            tracing::debug!(user_id = id, "Session refers to an unknown user");
        }
        Ok(user)
    }

    pub fn is_authenticated(&self) -> Result<bool, AuthError> {
        Ok(self.current_user()?.is_some())
    }

    pub fn login(&self, user_id: u64) -> Result<(), AuthError> {
        self.session.set(USER_SESSION_KEY, user_id)?;
        tracing::info!(user_id, "User logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.session.destroy()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DatabaseError, RepositoryError};
    use std::collections::HashMap;

    struct FixedUsers(HashMap<u64, User>);

    impl UserRepository for FixedUsers {
        fn find_by_id(&self, id: u64) -> Result<Option<User>, RepositoryError> {
            Ok(self.0.get(&id).cloned())
        }

        fn find_all(&self) -> Result<Vec<User>, RepositoryError> {
            Ok(self.0.values().cloned().collect())
        }
    }

    struct BrokenUsers;

    impl UserRepository for BrokenUsers {
        fn find_by_id(&self, _id: u64) -> Result<Option<User>, RepositoryError> {
            Err(DatabaseError::Unavailable("connection refused".to_string()).into())
        }

        fn find_all(&self) -> Result<Vec<User>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    fn user(id: u64) -> User {
        User {
            id,
            firstname: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            deleted: false,
            updated_at: None,
        }
    }

    fn service(users: Arc<dyn UserRepository>) -> (AuthService, Arc<SessionStore>) {
        let session = Arc::new(SessionStore::memory(toml::Table::new()));
        (AuthService::new(session.clone(), users), session)
    }

    #[test]
    fn test_anonymous_without_session_user() {
        let (auth, _) = service(Arc::new(FixedUsers(HashMap::new())));
        assert!(auth.current_user().unwrap().is_none());
        assert!(!auth.is_authenticated().unwrap());
    }

    #[test]
    fn test_login_resolves_current_user() {
        let (auth, _) = service(Arc::new(FixedUsers(HashMap::from([(1, user(1))]))));
        auth.login(1).unwrap();
        assert_eq!(auth.current_user().unwrap(), Some(user(1)));
    }

    #[test]
    fn test_unknown_user_leaves_session_untouched() {
        let (auth, session) = service(Arc::new(FixedUsers(HashMap::new())));
        auth.login(99).unwrap();

        assert!(auth.current_user().unwrap().is_none());
        assert_eq!(session.get::<u64>(USER_SESSION_KEY).unwrap(), Some(99));
    }

    #[test]
    fn test_repository_failure_keeps_user_logged_in() {
        let (auth, session) = service(Arc::new(BrokenUsers));
        auth.login(1).unwrap();

        assert!(matches!(auth.current_user(), Err(AuthError::Repository(_))));
        assert_eq!(session.get::<u64>(USER_SESSION_KEY).unwrap(), Some(1));
    }

    #[test]
    fn test_logout_destroys_session() {
        let (auth, session) = service(Arc::new(FixedUsers(HashMap::from([(1, user(1))]))));
        auth.login(1).unwrap();
        auth.logout().unwrap();

        assert!(auth.user_id().unwrap().is_none());
        assert!(!session.has(USER_SESSION_KEY).unwrap());
    }
}
