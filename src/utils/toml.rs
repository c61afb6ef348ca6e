use toml_edit::{Item, Table, TableLike, Value};

/// Helpers for reading and rewriting dependency entries in TOML manifests.
pub struct TomlUtils;

impl TomlUtils {
    /// Version requirement of a dependency entry: `"1.0"`, `{ version = "1.0" }`
    /// or a `[dependencies.name]` table.
    pub fn extract_version(item: &Item) -> Option<String> {
        if let Some(str_value) = item.as_str() {
            return Some(str_value.to_string());
        }

        if let Some(inline_table) = item.as_inline_table() {
            return inline_table
                .get("version")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        if let Some(table) = item.as_table() {
            return table
                .get("version")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        None
    }

    /// Points the entry's version at `new_version`, keeping the surrounding
    /// whitespace and comments. Returns true if a change was applied.
    pub fn update_version(item: &mut Item, new_version: &str) -> bool {
        if item.is_str() {
            return item
                .as_value_mut()
                .map(|value| Self::replace_string(value, new_version))
                .unwrap_or(false);
        }

        if let Some(inline_table) = item.as_inline_table_mut() {
            return inline_table
                .get_mut("version")
                .filter(|v| v.is_str())
                .map(|value| Self::replace_string(value, new_version))
                .unwrap_or(false);
        }

        if let Some(table) = item.as_table_mut() {
            return table
                .get_mut("version")
                .and_then(|v| v.as_value_mut())
                .filter(|v| v.is_str())
                .map(|value| Self::replace_string(value, new_version))
                .unwrap_or(false);
        }

        false
    }

    /// Swaps a string value in place, carrying over its decor.
    pub fn replace_string(value: &mut Value, new_value: &str) -> bool {
        if value.as_str() == Some(new_value) {
            return false;
        }
        let decor = value.decor().clone();
        *value = Value::from(new_value);
        *value.decor_mut() = decor;
        true
    }

    /// Walks a dotted key path through nested tables.
    pub fn table_at<'a>(root: &'a Table, path: &[&str]) -> Option<&'a dyn TableLike> {
        let mut current: &dyn TableLike = root;
        for key in path {
            current = current.get(key)?.as_table_like()?;
        }
        Some(current)
    }

    pub fn table_at_mut<'a>(root: &'a mut Table, path: &[&str]) -> Option<&'a mut dyn TableLike> {
        let mut current: &mut dyn TableLike = root;
        for key in path {
            current = current.get_mut(key)?.as_table_like_mut()?;
        }
        Some(current)
    }
}
