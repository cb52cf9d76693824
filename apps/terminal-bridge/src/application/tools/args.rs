//! Typed access to a raw tool argument map.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::ToolError;

/// Borrowed view of the `arguments` object of one call.
pub(super) struct Arguments<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    /// Accepts an object, or `null` for a call without arguments.
    pub(super) fn new(raw: &'a Value) -> Result<Self, ToolError> {
        match raw {
            Value::Object(map) => Ok(Self { map: Some(map) }),
            Value::Null => Ok(Self { map: None }),
            _ => Err(ToolError::invalid("arguments", "expected an object")),
        }
    }

    /// Present and non-null value.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(name))
            .filter(|v| !v.is_null())
    }

    pub(super) fn whole(&self, name: &'static str) -> Result<i64, ToolError> {
        self.optional_whole(name)?
            .ok_or_else(|| ToolError::invalid(name, "required"))
    }

    pub(super) fn optional_whole(&self, name: &'static str) -> Result<Option<i64>, ToolError> {
        self.get(name)
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| ToolError::invalid(name, "expected an integer"))
            })
            .transpose()
    }

    pub(super) fn optional_real(&self, name: &'static str) -> Result<Option<f64>, ToolError> {
        self.get(name)
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| ToolError::invalid(name, "expected a number"))
            })
            .transpose()
    }

    pub(super) fn text(&self, name: &'static str) -> Result<String, ToolError> {
        self.optional_text(name)?
            .ok_or_else(|| ToolError::invalid(name, "required"))
    }

    pub(super) fn optional_text(&self, name: &'static str) -> Result<Option<String>, ToolError> {
        self.get(name)
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ToolError::invalid(name, "expected a string"))
            })
            .transpose()
    }

    pub(super) fn date(&self, name: &'static str) -> Result<NaiveDate, ToolError> {
        let text = self.text(name)?;
        NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map_err(|e| ToolError::invalid(name, format!("expected YYYY-MM-DD: {e}")))
    }

    fn list(&self, name: &'static str) -> Result<Option<&'a Vec<Value>>, ToolError> {
        self.get(name)
            .map(|v| {
                v.as_array()
                    .ok_or_else(|| ToolError::invalid(name, "expected an array"))
            })
            .transpose()
    }

    pub(super) fn whole_list(&self, name: &'static str) -> Result<Option<Vec<i64>>, ToolError> {
        self.list(name)?
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        item.as_i64()
                            .ok_or_else(|| ToolError::invalid(name, "expected integers"))
                    })
                    .collect()
            })
            .transpose()
    }

    pub(super) fn text_list(&self, name: &'static str) -> Result<Option<Vec<String>>, ToolError> {
        self.list(name)?
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| ToolError::invalid(name, "expected strings"))
                    })
                    .collect()
            })
            .transpose()
    }
}
