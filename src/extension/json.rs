//! Structured values shared with the module by handle
//!
//! Nodes are reference counted so a value pulled out of an object or array
//! keeps its identity; the reference table uses that identity to map the
//! value back to the handle the module already holds.

use super::abi::json_type;
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Nesting limit when converting to `serde_json::Value`
pub const MAX_DEPTH: usize = 128;

pub type JsonRef = Rc<RefCell<JsonNode>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonError {
    #[error("value nests deeper than {MAX_DEPTH} levels or is cyclic")]
    TooDeep,
}

#[derive(Debug, Clone)]
pub enum JsonNode {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonRef>),
    Object(Vec<(String, JsonRef)>),
}

impl JsonNode {
    pub fn into_ref(self) -> JsonRef {
        Rc::new(RefCell::new(self))
    }

    /// `sapi_json_typeof` tag
    pub fn type_tag(&self) -> i32 {
        match self {
            JsonNode::Null => json_type::NULL,
            JsonNode::Bool(_) => json_type::BOOLEAN,
            JsonNode::Number(_) => json_type::NUMBER,
            JsonNode::String(_) => json_type::STRING,
            JsonNode::Array(_) => json_type::ARRAY,
            JsonNode::Object(_) => json_type::OBJECT,
        }
    }

    pub fn get(&self, key: &str) -> Option<JsonRef> {
        match self {
            JsonNode::Object(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| Rc::clone(v)),
            _ => None,
        }
    }

    /// Insert or replace `key`; ignored on non-objects
    pub fn set(&mut self, key: &str, value: JsonRef) {
        if let JsonNode::Object(entries) = self {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key.to_string(), value)),
            }
        }
    }

    pub fn at(&self, index: usize) -> Option<JsonRef> {
        match self {
            JsonNode::Array(items) => items.get(index).map(Rc::clone),
            _ => None,
        }
    }

    /// Assign `index`, padding any gap with nulls
    pub fn set_at(&mut self, index: usize, value: JsonRef) -> bool {
        let JsonNode::Array(items) = self else {
            return false;
        };
        if index >= items.len() {
            items.resize_with(index + 1, || JsonNode::Null.into_ref());
        }
        items[index] = value;
        true
    }

    /// Append, returning the new element's index
    pub fn push(&mut self, value: JsonRef) -> Option<usize> {
        match self {
            JsonNode::Array(items) => {
                items.push(value);
                Some(items.len() - 1)
            }
            _ => None,
        }
    }

    pub fn pop(&mut self) -> Option<JsonRef> {
        match self {
            JsonNode::Array(items) => items.pop(),
            _ => None,
        }
    }
}

/// Build a node tree from a parsed value
pub fn from_value(value: &Value) -> JsonRef {
    let node = match value {
        Value::Null => JsonNode::Null,
        Value::Bool(b) => JsonNode::Bool(*b),
        Value::Number(n) => JsonNode::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => JsonNode::String(s.clone()),
        Value::Array(items) => JsonNode::Array(items.iter().map(from_value).collect()),
        Value::Object(map) => JsonNode::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_value(v)))
                .collect(),
        ),
    };
    node.into_ref()
}

/// Snapshot a node tree as a plain value
pub fn to_value(node: &JsonRef) -> Result<Value, JsonError> {
    to_value_at(node, 0)
}

fn to_value_at(node: &JsonRef, depth: usize) -> Result<Value, JsonError> {
    if depth > MAX_DEPTH {
        return Err(JsonError::TooDeep);
    }

    let node = node.borrow();
    Ok(match &*node {
        JsonNode::Null => Value::Null,
        JsonNode::Bool(b) => Value::Bool(*b),
        JsonNode::Number(n) => number_value(*n),
        JsonNode::String(s) => Value::String(s.clone()),
        JsonNode::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_value_at(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        JsonNode::Object(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), to_value_at(v, depth + 1)?);
            }
            Value::Object(map)
        }
    })
}

/// Integral doubles serialize without a fraction; non-finite ones as null
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn stringify(node: &JsonRef) -> Result<String, JsonError> {
    Ok(to_value(node)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_set_and_stringify() {
        let mut object = JsonNode::Object(Vec::new());
        object.set("b", JsonNode::Number(1.0).into_ref());
        object.set("a", JsonNode::String("x".into()).into_ref());
        object.set("b", JsonNode::Number(2.0).into_ref());
        let node = object.into_ref();
        assert_eq!(to_value(&node).unwrap(), json!({"a": "x", "b": 2}));
        assert_eq!(stringify(&node).unwrap(), r#"{"a":"x","b":2}"#);
    }

    #[test]
    fn test_get_preserves_identity() {
        let node = from_value(&json!({"inner": [1, 2]}));
        let first = node.borrow().get("inner").unwrap();
        let second = node.borrow().get("inner").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.borrow().type_tag(), json_type::ARRAY);
    }

    #[test]
    fn test_array_operations() {
        let array = JsonNode::Array(Vec::new()).into_ref();
        let one = JsonNode::Number(1.0).into_ref();
        assert_eq!(array.borrow_mut().push(Rc::clone(&one)), Some(0));
        assert!(array.borrow_mut().set_at(3, JsonNode::Bool(true).into_ref()));
        assert_eq!(to_value(&array).unwrap(), json!([1, null, null, true]));

        let popped = array.borrow_mut().pop().unwrap();
        assert_eq!(popped.borrow().type_tag(), json_type::BOOLEAN);
        assert!(Rc::ptr_eq(&array.borrow().at(0).unwrap(), &one));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let array = JsonNode::Array(Vec::new()).into_ref();
        let alias = Rc::clone(&array);
        array.borrow_mut().push(alias);
        assert_eq!(to_value(&array), Err(JsonError::TooDeep));
        // break the cycle so the test does not leak
        array.borrow_mut().pop();
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(5.0), json!(5));
        assert_eq!(number_value(0.5), json!(0.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }
}
