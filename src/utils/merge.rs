use serde_json::Value;

/// 递归合并 JSON 对象
///
/// 两边都是对象的键逐层合并，其余情况以 `overlay` 的值为准。
pub fn merge_recursive(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_recursive(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
