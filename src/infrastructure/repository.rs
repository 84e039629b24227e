//! 用户仓储实现

use crate::domain::{Connection, User, UserRepository};
use crate::errors::RepositoryError;
use serde_json::Value;
use std::sync::Arc;

pub const USERS_TABLE: &str = "users";

/// 基于数据库连接的用户仓储
pub struct DbUserRepository {
    db: Arc<dyn Connection>,
}

impl DbUserRepository {
    pub fn new(db: Arc<dyn Connection>) -> Self {
        Self { db }
    }

    fn map_row(row: crate::domain::Row) -> Result<User, RepositoryError> {
        serde_json::from_value(Value::Object(row))
            .map_err(|e| RepositoryError::Mapping(USERS_TABLE.to_string(), e))
    }
}

impl UserRepository for DbUserRepository {
    fn find_by_id(&self, id: u64) -> Result<Option<User>, RepositoryError> {
        self.db
            .select_by_id(USERS_TABLE, id)?
            .map(Self::map_row)
            .transpose()
    }

    fn find_all(&self) -> Result<Vec<User>, RepositoryError> {
        self.db
            .select_all(USERS_TABLE)?
            .into_iter()
            .map(Self::map_row)
            .collect()
    }
}
