//! Parameter binding for plugins
//!
//! Declarative `(name, type, value)` parameters are converted into typed
//! [`ParamValue`]s and pushed through a plugin's [`Configurable`] setters.
//! Names are matched case-insensitively: the binder lowercases them before
//! calling the setter.

use crate::definition::ParamDef;
use crate::error::{CombinerError, Result};

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Str(String),
}

impl ParamValue {
    /// Parse a raw value according to a primitive type name
    ///
    /// Supported names: byte, short, ushort, int, uint, long, ulong, bool,
    /// float, double, decimal, char, string.
    pub fn parse(type_name: &str, raw: &str) -> Result<ParamValue> {
        let raw = raw.trim();
        let bad = |e: String| {
            CombinerError::ConfigError(format!(
                "Cannot convert '{}' to {}: {}",
                raw, type_name, e
            ))
        };
        match type_name.to_ascii_lowercase().as_str() {
            "bool" => raw
                .to_ascii_lowercase()
                .parse::<bool>()
                .map(ParamValue::Bool)
                .map_err(|e| bad(e.to_string())),
            "byte" => raw
                .parse::<u8>()
                .map(|v| ParamValue::UInt(v as u64))
                .map_err(|e| bad(e.to_string())),
            "ushort" => raw
                .parse::<u16>()
                .map(|v| ParamValue::UInt(v as u64))
                .map_err(|e| bad(e.to_string())),
            "uint" => raw
                .parse::<u32>()
                .map(|v| ParamValue::UInt(v as u64))
                .map_err(|e| bad(e.to_string())),
            "ulong" => raw
                .parse::<u64>()
                .map(ParamValue::UInt)
                .map_err(|e| bad(e.to_string())),
            "short" => raw
                .parse::<i16>()
                .map(|v| ParamValue::Int(v as i64))
                .map_err(|e| bad(e.to_string())),
            "int" => raw
                .parse::<i32>()
                .map(|v| ParamValue::Int(v as i64))
                .map_err(|e| bad(e.to_string())),
            "long" => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| bad(e.to_string())),
            "float" | "double" | "decimal" => raw
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|e| bad(e.to_string())),
            "char" => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(ParamValue::Char(c)),
                    _ => Err(bad("expected exactly one character".to_string())),
                }
            }
            "string" => Ok(ParamValue::Str(raw.to_string())),
            other => Err(CombinerError::ConfigError(format!(
                "Unknown parameter type '{}'",
                other
            ))),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Something whose fields can be set by name
pub trait Configurable {
    /// Set a simple parameter; `name` is lowercase
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()>;

    /// Nested parameter group; `None` when the plugin has no such group
    fn nested(&mut self, _name: &str) -> Option<&mut dyn Configurable> {
        None
    }
}

/// Applies declarative parameters onto a plugin instance
pub trait ObjectBinder: Send + Sync {
    fn bind(&self, params: &[ParamDef], target: &mut dyn Configurable) -> Result<()>;
}

/// Default binder: typed leaves become setter calls, valueless entries
/// descend into the named nested group
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleObjectBinder;

impl ObjectBinder for SimpleObjectBinder {
    fn bind(&self, params: &[ParamDef], target: &mut dyn Configurable) -> Result<()> {
        for param in params {
            let name = param.name.to_ascii_lowercase();
            match (&param.type_name, &param.value) {
                (Some(type_name), Some(raw)) => {
                    let value = ParamValue::parse(type_name, raw)?;
                    target.set_param(&name, value)?;
                }
                (None, Some(raw)) => {
                    target.set_param(&name, ParamValue::Str(raw.clone()))?;
                }
                (_, None) => {
                    let nested = target.nested(&name).ok_or_else(|| {
                        CombinerError::ConfigError(format!(
                            "Parameter group '{}' is not supported",
                            param.name
                        ))
                    })?;
                    self.bind(&param.params, nested)?;
                }
            }
        }
        Ok(())
    }
}

/// Error for a parameter a plugin does not know
pub fn unknown_param(plugin: &str, name: &str) -> CombinerError {
    CombinerError::ConfigError(format!("{} has no parameter '{}'", plugin, name))
}

/// Error for a parameter of the wrong type
pub fn wrong_type(plugin: &str, name: &str, expected: &str) -> CombinerError {
    CombinerError::ConfigError(format!(
        "{} parameter '{}' must be a {}",
        plugin, name, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Inner {
        level: i64,
    }

    impl Configurable for Inner {
        fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
            match name {
                "level" => {
                    self.level = value.as_i64().ok_or_else(|| wrong_type("Inner", name, "number"))?;
                    Ok(())
                }
                _ => Err(unknown_param("Inner", name)),
            }
        }
    }

    #[derive(Default)]
    struct Target {
        enabled: bool,
        label: String,
        inner: Inner,
    }

    impl Configurable for Target {
        fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
            match name {
                "enabled" => {
                    self.enabled = value.as_bool().ok_or_else(|| wrong_type("Target", name, "bool"))?;
                }
                "label" => {
                    self.label = value.as_str().unwrap_or_default().to_string();
                }
                _ => return Err(unknown_param("Target", name)),
            }
            Ok(())
        }

        fn nested(&mut self, name: &str) -> Option<&mut dyn Configurable> {
            match name {
                "inner" => Some(&mut self.inner),
                _ => None,
            }
        }
    }

    #[test]
    fn test_bind_simple_and_nested() {
        let params = vec![
            ParamDef::simple("Enabled", "bool", "True"),
            ParamDef::simple("label", "string", "hello"),
            ParamDef {
                name: "inner".to_string(),
                type_name: None,
                value: None,
                params: vec![ParamDef::simple("level", "short", "7")],
            },
        ];
        let mut target = Target::default();
        SimpleObjectBinder.bind(&params, &mut target).unwrap();

        assert!(target.enabled);
        assert_eq!(target.label, "hello");
        assert_eq!(target.inner.level, 7);
    }

    #[test]
    fn test_bind_unknown_param_fails() {
        let params = vec![ParamDef::simple("nope", "int", "1")];
        let mut target = Target::default();
        assert!(SimpleObjectBinder.bind(&params, &mut target).is_err());
    }

    #[test]
    fn test_parse_primitive_types() {
        assert_eq!(ParamValue::parse("byte", "255").unwrap(), ParamValue::UInt(255));
        assert!(ParamValue::parse("byte", "256").is_err());
        assert_eq!(ParamValue::parse("long", "-5").unwrap(), ParamValue::Int(-5));
        assert_eq!(ParamValue::parse("double", "1.5").unwrap(), ParamValue::Float(1.5));
        assert_eq!(ParamValue::parse("char", "x").unwrap(), ParamValue::Char('x'));
        assert!(ParamValue::parse("char", "xy").is_err());
        assert!(ParamValue::parse("guid", "x").is_err());
    }
}
