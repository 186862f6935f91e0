use std::fmt;

use ecow::EcoString;
use indexmap::IndexMap;

use crate::evaluated_data::VariableDefinitionId;

/// The closed set of BFF value types. Arrays are homogeneous; an empty array
/// starts out as an `ArrayOfStrings` and is promoted when a struct is first
/// appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    String(EcoString),
    ArrayOfStrings(Vec<EcoString>),
    ArrayOfStructs(Vec<Struct>),
    Struct(Struct),
}

impl Value {
    pub fn empty_array() -> Self {
        Value::ArrayOfStrings(Vec::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::String(_) => "String",
            Value::ArrayOfStrings(_) => "ArrayOfStrings",
            Value::ArrayOfStructs(_) => "ArrayOfStructs",
            Value::Struct(_) => "Struct",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "'{value}'"),
            Value::ArrayOfStrings(items) => {
                if items.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{item}'")?;
                }
                write!(f, " }}")
            }
            Value::ArrayOfStructs(items) => {
                if items.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, " }}")
            }
            Value::Struct(value) => write!(f, "{value}"),
        }
    }
}

/// A struct value: named members in insertion order. Each member remembers
/// the definitions that produced it so `Using` can wire references back to
/// the original fields.
#[derive(Debug, Clone, Default)]
pub struct Struct {
    members: IndexMap<EcoString, StructMember>,
}

#[derive(Debug, Clone)]
pub struct StructMember {
    pub value: Value,
    pub definitions: Vec<VariableDefinitionId>,
}

impl StructMember {
    pub fn new(value: Value, definitions: Vec<VariableDefinitionId>) -> Self {
        Self { value, definitions }
    }
}

// Struct equality is by member name and value; which definitions produced a
// member does not affect the value itself.
impl PartialEq for StructMember {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for StructMember {}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .all(|(name, member)| other.members.get(name) == Some(member))
    }
}

impl Eq for Struct {}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: EcoString, member: StructMember) {
        self.members.insert(name, member);
    }

    pub fn get(&self, name: &str) -> Option<&StructMember> {
        self.members.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EcoString, &StructMember)> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.members.is_empty() {
            return write!(f, "[]");
        }
        write!(f, "[ ")?;
        for (i, (name, member)) in self.members.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, ".{name} = {}", member.value)?;
        }
        write!(f, " ]")
    }
}

#[cfg(test)]
mod tests {
    use super::{Struct, StructMember, Value};

    fn struct_of(fields: &[(&str, Value)]) -> Struct {
        let mut s = Struct::new();
        for (name, value) in fields {
            s.insert((*name).into(), StructMember::new(value.clone(), Vec::new()));
        }
        s
    }

    #[test]
    fn struct_equality_ignores_member_order() {
        let a = struct_of(&[("A", Value::Integer(1)), ("B", Value::String("x".into()))]);
        let b = struct_of(&[("B", Value::String("x".into())), ("A", Value::Integer(1))]);
        assert_eq!(a, b);

        let c = struct_of(&[("A", Value::Integer(2)), ("B", Value::String("x".into()))]);
        assert_ne!(a, c);
    }

    #[test]
    fn display() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::String("hi".into()).to_string(), "'hi'");
        assert_eq!(Value::empty_array().to_string(), "{}");
        assert_eq!(
            Value::ArrayOfStrings(vec!["a".into(), "b".into()]).to_string(),
            "{ 'a', 'b' }"
        );
        assert_eq!(
            Value::Struct(struct_of(&[("A", Value::Integer(1))])).to_string(),
            "[ .A = 1 ]"
        );
    }
}
