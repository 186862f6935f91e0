use ecow::EcoString;
use id_arena::Id;

use crate::evaluated_data::Value;
use crate::file_system::FileRange;

/// A binding created by `=`, a `ForEach` loop variable, a user-function
/// parameter, `Using`, or `#import`. Mutations reuse the definition of the
/// binding they touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    pub name: EcoString,
    pub define_loc: FileRange,
}

pub type VariableDefinitionId = Id<VariableDefinition>;

/// A successful resolution of a variable occurrence to the definitions of
/// the binding it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    pub definitions: Vec<VariableDefinitionId>,
    pub location: FileRange,
}

/// A concrete value observed at a source range: reads, substitutions, and
/// the post-statement value at an assignment's left-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedVariable {
    pub value: Value,
    pub location: FileRange,
}
