//! Runtime value types
//!
//! Every value that flows through the parser, the evaluator, and the
//! block engine is one of the four closed variants of [`Value`]. Hosts
//! that need richer data model it as entities with typed fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Reference to a declared entity, carried by type and name.
    Entity { entity_type: String, name: String },
}

impl Value {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Entity { .. } => true,
        }
    }

    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Str(_) => ValueType::Str,
            Value::Num(_) => ValueType::Num,
            Value::Bool(_) => ValueType::Bool,
            Value::Entity { entity_type, .. } => ValueType::Entity(entity_type.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            // Render integral numbers without a trailing ".0"
            Value::Num(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Value::Num(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Entity { name, .. } => write!(f, "{}", name),
        }
    }
}

/// Declared or inferred type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ValueType {
    Str,
    Num,
    Bool,
    /// An entity type, named by its declaration (e.g. `character`).
    Entity(String),
}

impl ValueType {
    /// Parse a type annotation as written in a declaration.
    ///
    /// The three primitive names are reserved; any other identifier is
    /// taken to be an entity type.
    pub fn parse(name: &str) -> ValueType {
        match name {
            "string" => ValueType::Str,
            "number" => ValueType::Num,
            "boolean" => ValueType::Bool,
            other => ValueType::Entity(other.to_string()),
        }
    }

    /// Default value for a declared type with no initializer.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            ValueType::Str => Some(Value::Str(String::new())),
            ValueType::Num => Some(Value::Num(0.0)),
            ValueType::Bool => Some(Value::Bool(false)),
            // Entities have no sensible default
            ValueType::Entity(_) => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Str => write!(f, "string"),
            ValueType::Num => write!(f, "number"),
            ValueType::Bool => write!(f, "boolean"),
            ValueType::Entity(t) => write!(f, "{}", t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_value_shape() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Num(0.0).is_truthy());
        assert!(Value::Num(-1.5).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(Value::Entity {
            entity_type: "character".into(),
            name: "alice".into()
        }
        .is_truthy());
    }

    #[test]
    fn display_drops_integral_fraction() {
        assert_eq!(Value::Num(3.0).to_string(), "3");
        assert_eq!(Value::Num(3.25).to_string(), "3.25");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
    }

    #[test]
    fn type_annotations_parse_to_primitives_or_entities() {
        assert_eq!(ValueType::parse("string"), ValueType::Str);
        assert_eq!(ValueType::parse("number"), ValueType::Num);
        assert_eq!(ValueType::parse("boolean"), ValueType::Bool);
        assert_eq!(
            ValueType::parse("character"),
            ValueType::Entity("character".into())
        );
    }

    #[test]
    fn serde_round_trips_tagged_form() {
        let v = Value::Entity {
            entity_type: "item".into(),
            name: "sword".into(),
        };
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), v);
    }
}
