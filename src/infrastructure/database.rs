//! 数据库连接
//!
//! SQL 驱动不在本项目范围内；默认连接把表保存在内存中，
//! 供开发、命令行和测试使用。

use crate::config::DbSettings;
use crate::domain::{Connection, Row};
use crate::errors::DatabaseError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// 内存表连接
pub struct MemoryConnection {
    settings: DbSettings,
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryConnection {
    pub fn connect(settings: &DbSettings) -> Self {
        tracing::debug!(host = %settings.host, database = %settings.database, "Opening connection");
        Self {
            settings: settings.clone(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// 创建空表（已存在时不做任何事）
    pub fn create_table(&self, table: &str) {
        self.tables.write().entry(table.to_string()).or_default();
    }
}

impl Connection for MemoryConnection {
    fn dsn(&self) -> String {
        format!(
            "mysql:host={};dbname={};charset={}",
            self.settings.host, self.settings.database, self.settings.charset
        )
    }

    fn select_by_id(&self, table: &str, id: u64) -> Result<Option<Row>, DatabaseError> {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
        Ok(rows
            .iter()
            .find(|row| row.get("id").and_then(Value::as_u64) == Some(id))
            .cloned())
    }

    fn select_all(&self, table: &str) -> Result<Vec<Row>, DatabaseError> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))
    }

    fn insert(&self, table: &str, row: Row) -> Result<(), DatabaseError> {
        self.tables.write().entry(table.to_string()).or_default().push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_select_by_id() {
        let conn = MemoryConnection::connect(&DbSettings::default());
        conn.insert("users", row(json!({"id": 1, "firstname": "a"}))).unwrap();
        conn.insert("users", row(json!({"id": 2, "firstname": "b"}))).unwrap();

        let found = conn.select_by_id("users", 2).unwrap().unwrap();
        assert_eq!(found.get("firstname"), Some(&json!("b")));
        assert!(conn.select_by_id("users", 9).unwrap().is_none());
        assert_eq!(conn.select_all("users").unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_table() {
        let conn = MemoryConnection::connect(&DbSettings::default());
        assert!(matches!(
            conn.select_all("missing"),
            Err(DatabaseError::UnknownTable(_))
        ));
        conn.create_table("missing");
        assert!(conn.select_all("missing").unwrap().is_empty());
    }

    #[test]
    fn test_dsn_omits_password() {
        let mut settings = DbSettings::default();
        settings.password = "hunter2".to_string();
        let dsn = MemoryConnection::connect(&settings).dsn();
        assert_eq!(dsn, "mysql:host=127.0.0.1;dbname=test;charset=utf8mb4");
    }
}
