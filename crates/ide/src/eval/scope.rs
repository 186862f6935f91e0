use ecow::EcoString;
use indexmap::IndexMap;

use crate::evaluated_data::{Struct, StructMember, Value, VariableDefinitionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Block,
    StructLiteral,
    ForEachIteration,
    /// A user-function body. Acts as a barrier: lookups never continue into
    /// the caller's scopes, and the parent prefix fails at this boundary.
    FunctionBody,
}

#[derive(Debug)]
pub struct ScopeVariable {
    pub value: Value,
    pub definitions: Vec<VariableDefinitionId>,
}

#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    variables: IndexMap<EcoString, ScopeVariable>,
    last_assignment: Option<EcoString>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            variables: IndexMap::new(),
            last_assignment: None,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&ScopeVariable> {
        self.variables.get(name)
    }

    pub fn last_assignment(&self) -> Option<&EcoString> {
        self.last_assignment.as_ref()
    }

    /// Collapses the scope's variables into a struct value, preserving
    /// declaration order.
    pub fn into_struct(self) -> Struct {
        let mut result = Struct::new();
        for (name, variable) in self.variables {
            result.insert(name, StructMember::new(variable.value, variable.definitions));
        }
        result
    }
}

/// Looking up a name with the parent prefix (`^`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLookupError {
    NoParent,
    NotFound,
}

#[derive(Debug)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Root)],
        }
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    pub fn pop(&mut self) -> Scope {
        assert!(self.scopes.len() > 1, "cannot pop the root scope");
        self.scopes.pop().expect("scope stack is empty")
    }

    pub fn current(&self) -> &Scope {
        self.scopes.last().expect("scope stack is empty")
    }

    /// Index of the innermost scope the current chain can reach: the nearest
    /// function-body barrier, or the root.
    fn chain_floor(&self) -> usize {
        self.scopes
            .iter()
            .rposition(|scope| scope.kind == ScopeKind::FunctionBody)
            .unwrap_or(0)
    }

    /// Finds `name` in the current scope or any reachable parent, returning
    /// the scope index.
    pub fn find(&self, name: &str) -> Option<usize> {
        let floor = self.chain_floor();
        (floor..self.scopes.len())
            .rev()
            .find(|&index| self.scopes[index].variables.contains_key(name))
    }

    /// Finds `name` starting at the parent of the current scope.
    pub fn find_from_parent(&self, name: &str) -> Result<usize, ParentLookupError> {
        let floor = self.chain_floor();
        let top = self.scopes.len() - 1;
        if top == floor {
            return Err(ParentLookupError::NoParent);
        }
        (floor..top)
            .rev()
            .find(|&index| self.scopes[index].variables.contains_key(name))
            .ok_or(ParentLookupError::NotFound)
    }

    pub fn get(&self, index: usize, name: &str) -> &ScopeVariable {
        self.scopes[index]
            .variables
            .get(name)
            .expect("scope variable vanished")
    }

    pub fn get_mut(&mut self, index: usize, name: &str) -> &mut ScopeVariable {
        self.scopes[index]
            .variables
            .get_mut(name)
            .expect("scope variable vanished")
    }

    /// Creates or overwrites `name` in the current scope.
    pub fn set_current(
        &mut self,
        name: EcoString,
        value: Value,
        definitions: Vec<VariableDefinitionId>,
    ) {
        let scope = self.scopes.last_mut().expect("scope stack is empty");
        scope
            .variables
            .insert(name, ScopeVariable { value, definitions });
    }

    pub fn set_last_assignment(&mut self, name: EcoString) {
        let scope = self.scopes.last_mut().expect("scope stack is empty");
        scope.last_assignment = Some(name);
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::evaluated_data::Value;

    use super::{ParentLookupError, ScopeKind, Scopes};

    #[test]
    fn shadowing_and_fallthrough() {
        let mut scopes = Scopes::new();
        scopes.set_current("X".into(), Value::Integer(1), Vec::new());

        scopes.push(ScopeKind::Block);
        // Reads fall through to the parent.
        let index = scopes.find("X").unwrap();
        assert_eq!(scopes.get(index, "X").value, Value::Integer(1));

        // A write in the child shadows without touching the parent.
        scopes.set_current("X".into(), Value::Integer(2), Vec::new());
        let index = scopes.find("X").unwrap();
        assert_eq!(scopes.get(index, "X").value, Value::Integer(2));

        scopes.pop();
        let index = scopes.find("X").unwrap();
        assert_eq!(scopes.get(index, "X").value, Value::Integer(1));
    }

    #[test]
    fn parent_lookup_at_root() {
        let scopes = Scopes::new();
        assert_eq!(
            scopes.find_from_parent("X"),
            Err(ParentLookupError::NoParent)
        );
    }

    #[test]
    fn function_body_is_a_barrier() {
        let mut scopes = Scopes::new();
        scopes.set_current("X".into(), Value::Integer(1), Vec::new());

        scopes.push(ScopeKind::FunctionBody);
        assert_eq!(scopes.find("X"), None);
        assert_eq!(
            scopes.find_from_parent("X"),
            Err(ParentLookupError::NoParent)
        );

        scopes.push(ScopeKind::Block);
        // Still unreachable through the barrier, even from a nested block.
        assert_eq!(scopes.find("X"), None);
        assert_eq!(
            scopes.find_from_parent("X"),
            Err(ParentLookupError::NotFound)
        );
    }
}
