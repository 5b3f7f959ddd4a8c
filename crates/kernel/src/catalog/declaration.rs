//! Declared query interfaces.
//!
//! A query interface is described as data: its name, the entity it queries,
//! the interfaces it extends, and its methods. Each method may carry one of
//! three annotations (`constraint`, `order`, `select`); unannotated methods
//! are ignored by the metadata builder.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::Operator;

/// Names of root interfaces whose methods are never catalogued.
pub const BASE_QUERY_INTERFACES: &[&str] = &["Query", "Any"];

/// A declared query interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDeclaration {
    /// Query class name (`MovieQuery`).
    pub name: String,

    /// Entity the query targets.
    pub entity: String,

    /// Interfaces this one extends, nearest first.
    #[serde(default)]
    pub extends: Vec<String>,

    #[serde(default)]
    pub methods: Vec<MethodDeclaration>,
}

/// A method on a declared query interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodDeclaration {
    pub name: String,

    /// Parameters, excluding the receiver.
    #[serde(default)]
    pub parameters: Vec<ParameterDeclaration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintAnnotation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderAnnotation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectAnnotation>,
}

impl MethodDeclaration {
    /// A constraint method.
    pub fn constraint(
        name: impl Into<String>,
        path: impl Into<String>,
        operator: Operator,
    ) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            constraint: Some(ConstraintAnnotation {
                path: path.into(),
                operator,
            }),
            order: None,
            select: None,
        }
    }

    /// An order method.
    pub fn order(name: impl Into<String>, path: impl Into<String>, asc: bool) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            constraint: None,
            order: Some(OrderAnnotation {
                path: path.into(),
                asc,
            }),
            select: None,
        }
    }

    /// A select method.
    pub fn select(name: impl Into<String>, annotation: SelectAnnotation) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            constraint: None,
            order: None,
            select: Some(annotation),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.parameters.push(ParameterDeclaration {
            name: name.into(),
            param_type,
            vararg: false,
        });
        self
    }

    /// Add a vararg parameter.
    pub fn vararg(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.parameters.push(ParameterDeclaration {
            name: name.into(),
            param_type,
            vararg: true,
        });
        self
    }
}

/// Constraint annotation: filter `path` with `operator`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintAnnotation {
    pub path: String,
    #[serde(default = "default_operator")]
    pub operator: Operator,
}

fn default_operator() -> Operator {
    Operator::Eq
}

/// Order annotation: sort by `path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderAnnotation {
    pub path: String,
    #[serde(default = "default_true")]
    pub asc: bool,
}

fn default_true() -> bool {
    true
}

/// Select annotation: an explicit path, or the projection returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectAnnotation {
    #[serde(default)]
    pub path: String,

    /// Projection type returned by the method, when no path is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionDeclaration>,
}

/// A projection type and the property paths it reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectionDeclaration {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProjectionProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectionProperty {
    pub name: String,
    pub path: String,
}

/// A declared method parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterDeclaration {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub vararg: bool,
}

/// Parameter type of a declared method.
///
/// Written as a string: `String`, `Long`, `Id`, `Session`, `List<Int>`,
/// `Enum<Genre,DRAMA,COMEDY>`, or any other (qualified) type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParamType {
    String,
    Int,
    Long,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Char,
    /// Entity id; rendered as `Long`.
    Id,
    /// The query session; only meaningful on select methods.
    Session,
    Enum { name: String, values: Vec<String> },
    List(Box<ParamType>),
    Named(String),
}

impl ParamType {
    /// Form type name for primitive types.
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            ParamType::String => "String",
            ParamType::Int => "Int",
            ParamType::Long => "Long",
            ParamType::Short => "Short",
            ParamType::Byte => "Byte",
            ParamType::Double => "Double",
            ParamType::Float => "Float",
            ParamType::Boolean => "Boolean",
            ParamType::Char => "Char",
            _ => return None,
        })
    }

    /// Parse the string form.
    pub fn parse(s: &str) -> Result<ParamType, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty parameter type".to_string());
        }
        if let Some(inner) = generic_argument(s, "List") {
            return Ok(ParamType::List(Box::new(ParamType::parse(inner)?)));
        }
        if let Some(inner) = generic_argument(s, "Enum") {
            let mut parts = inner.split(',').map(str::trim);
            let name = parts
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| format!("enum type without a name: {s}"))?
                .to_string();
            let values: Vec<String> = parts.map(str::to_string).collect();
            return Ok(ParamType::Enum { name, values });
        }
        Ok(match s {
            "String" => ParamType::String,
            "Int" => ParamType::Int,
            "Long" => ParamType::Long,
            "Short" => ParamType::Short,
            "Byte" => ParamType::Byte,
            "Double" => ParamType::Double,
            "Float" => ParamType::Float,
            "Boolean" => ParamType::Boolean,
            "Char" => ParamType::Char,
            "Id" => ParamType::Id,
            "Session" => ParamType::Session,
            other => ParamType::Named(other.to_string()),
        })
    }
}

/// `List<Int>` with `outer = "List"` yields `Some("Int")`.
fn generic_argument<'a>(s: &'a str, outer: &str) -> Option<&'a str> {
    s.strip_prefix(outer)?
        .strip_prefix('<')?
        .strip_suffix('>')
        .map(str::trim)
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.primitive_name() {
            return f.write_str(name);
        }
        match self {
            ParamType::Id => f.write_str("Id"),
            ParamType::Session => f.write_str("Session"),
            ParamType::Enum { name, values } => {
                write!(f, "Enum<{name}")?;
                for value in values {
                    write!(f, ",{value}")?;
                }
                f.write_str(">")
            }
            ParamType::List(inner) => write!(f, "List<{inner}>"),
            ParamType::Named(name) => f.write_str(name),
            _ => Ok(()),
        }
    }
}

impl TryFrom<String> for ParamType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ParamType::parse(&value)
    }
}

impl From<ParamType> for String {
    fn from(value: ParamType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn param_type_parses_generics() {
        assert_eq!(
            ParamType::parse("List<Long>").unwrap(),
            ParamType::List(Box::new(ParamType::Long))
        );
        assert_eq!(
            ParamType::parse("Enum<Genre, DRAMA, COMEDY>").unwrap(),
            ParamType::Enum {
                name: "Genre".to_string(),
                values: vec!["DRAMA".to_string(), "COMEDY".to_string()],
            }
        );
        assert_eq!(
            ParamType::parse("com.example.Money").unwrap(),
            ParamType::Named("com.example.Money".to_string())
        );
        assert!(ParamType::parse("").is_err());
        assert!(ParamType::parse("Enum<>").is_err());
    }

    #[test]
    fn param_type_display_round_trips_through_strings() {
        let ty = ParamType::List(Box::new(ParamType::Enum {
            name: "Genre".to_string(),
            values: vec!["DRAMA".to_string()],
        }));
        assert_eq!(ty.to_string(), "List<Enum<Genre,DRAMA>>");
        assert_eq!(ParamType::parse(&ty.to_string()).unwrap(), ty);
    }

    #[test]
    fn method_declaration_from_yaml() {
        let yaml = r#"
name: releasedAfter
parameters:
  - name: year
    type: Int
constraint:
  path: year
  operator: GT
"#;
        let method: MethodDeclaration = serde_yml::from_str(yaml).unwrap();
        assert_eq!(method.name, "releasedAfter");
        assert_eq!(method.parameters[0].param_type, ParamType::Int);
        let constraint = method.constraint.unwrap();
        assert_eq!(constraint.operator, Operator::Gt);
        assert!(method.order.is_none());
    }

    #[test]
    fn annotation_defaults() {
        let order: OrderAnnotation = serde_yml::from_str("path: title").unwrap();
        assert!(order.asc);

        let constraint: ConstraintAnnotation = serde_yml::from_str("path: title").unwrap();
        assert_eq!(constraint.operator, Operator::Eq);
    }
}
