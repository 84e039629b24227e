use super::Model;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname).trim().to_string()
    }
}

impl Model for User {
    fn id(&self) -> u64 {
        self.id
    }

    fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_model() {
        let user = User {
            id: 3,
            firstname: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            deleted: false,
            updated_at: None,
        };

        assert_eq!(user.id(), 3);
        assert_eq!(user.full_name(), "Ada Lovelace");
        let map = user.to_map();
        assert_eq!(map.get("firstname"), Some(&Value::from("Ada")));

        let json = user.to_json().unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }
}
