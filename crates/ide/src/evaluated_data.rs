//! The side-channel record produced by evaluation: definitions, references,
//! observed values and targets, with position lookup for the editor-facing
//! queries.

use std::collections::HashMap;

use ecow::EcoString;
use id_arena::{Arena, Id};
use iset::IntervalMap;

use syntax::TextSize;

use crate::file_system::{FileId, FilePosition, FileRange};

pub mod target;
pub mod value;
pub mod variable;

pub use target::{TargetDefinition, TargetDefinitionId, TargetReference};
pub use value::{Struct, StructMember, Value};
pub use variable::{
    EvaluatedVariable, VariableDefinition, VariableDefinitionId, VariableReference,
};

#[derive(Debug, Default)]
pub struct EvaluatedData {
    variable_definitions: Arena<VariableDefinition>,
    variable_references: Vec<VariableReference>,
    evaluated_variables: Vec<EvaluatedVariable>,
    target_definitions: Arena<TargetDefinition>,
    target_references: Vec<TargetReference>,
    name_to_target: HashMap<EcoString, TargetDefinitionId>,
    pos_to_definition: HashMap<FileId, IntervalMap<TextSize, VariableDefinitionId>>,
}

impl EvaluatedData {
    pub fn add_variable_definition(
        &mut self,
        name: EcoString,
        define_loc: FileRange,
    ) -> VariableDefinitionId {
        let id = self
            .variable_definitions
            .alloc(VariableDefinition { name, define_loc });
        self.insert_pos(define_loc, id);
        id
    }

    pub fn add_variable_reference(
        &mut self,
        definitions: Vec<VariableDefinitionId>,
        location: FileRange,
    ) {
        for id in &definitions {
            self.insert_pos(location, *id);
        }
        self.variable_references.push(VariableReference {
            definitions,
            location,
        });
    }

    pub fn add_evaluated_variable(&mut self, value: Value, location: FileRange) {
        self.evaluated_variables
            .push(EvaluatedVariable { value, location });
    }

    pub fn add_target_definition(
        &mut self,
        name: EcoString,
        define_loc: FileRange,
    ) -> TargetDefinitionId {
        let id = self.target_definitions.alloc(TargetDefinition {
            name: name.clone(),
            define_loc,
        });
        // The first definition of a name wins for reference resolution.
        self.name_to_target.entry(name).or_insert(id);
        id
    }

    pub fn add_target_reference(&mut self, name: EcoString, location: FileRange) {
        let definition = self.name_to_target.get(&name).copied();
        self.target_references.push(TargetReference {
            name,
            definition,
            location,
        });
    }

    fn insert_pos(&mut self, location: FileRange, id: VariableDefinitionId) {
        // iset rejects empty intervals.
        if location.range.is_empty() {
            return;
        }
        self.pos_to_definition
            .entry(location.file)
            .or_insert_with(IntervalMap::new)
            .insert(location.range.into(), id);
    }

    pub fn variable_definition(&self, id: VariableDefinitionId) -> &VariableDefinition {
        self.variable_definitions
            .get(id)
            .expect("invalid variable definition id")
    }

    pub fn target_definition(&self, id: TargetDefinitionId) -> &TargetDefinition {
        self.target_definitions
            .get(id)
            .expect("invalid target definition id")
    }

    pub fn iter_variable_definitions(
        &self,
    ) -> impl Iterator<Item = (VariableDefinitionId, &VariableDefinition)> {
        self.variable_definitions.iter()
    }

    pub fn variable_references(&self) -> &[VariableReference] {
        &self.variable_references
    }

    pub fn evaluated_variables(&self) -> &[EvaluatedVariable] {
        &self.evaluated_variables
    }

    pub fn iter_target_definitions(
        &self,
    ) -> impl Iterator<Item = (TargetDefinitionId, &TargetDefinition)> {
        self.target_definitions.iter()
    }

    pub fn target_references(&self) -> &[TargetReference] {
        &self.target_references
    }

    pub fn target_definition_by_name(&self, name: &str) -> Option<TargetDefinitionId> {
        self.name_to_target.get(name).copied()
    }

    /// The variable definition whose definition or reference covers `pos`.
    pub fn find_definition_at(
        &self,
        pos: FilePosition,
    ) -> Option<(VariableDefinitionId, &VariableDefinition)> {
        let id = self
            .pos_to_definition
            .get(&pos.file)
            .and_then(|map| map.values_overlap(pos.position).next().copied())?;
        Some((id, self.variable_definition(id)))
    }

    /// All reference locations that resolve to `id`, in evaluation order.
    pub fn references_to(&self, id: VariableDefinitionId) -> Vec<FileRange> {
        self.variable_references
            .iter()
            .filter(|reference| reference.definitions.contains(&id))
            .map(|reference| reference.location)
            .collect()
    }

    /// The innermost value observed at `pos`.
    pub fn evaluated_value_at(&self, pos: FilePosition) -> Option<&EvaluatedVariable> {
        self.evaluated_variables
            .iter()
            .filter(|ev| ev.location.contains(pos))
            .min_by_key(|ev| ev.location.range.len())
    }
}

// id-arena ids remember which arena allocated them, so the derived equality
// never holds across two evaluation passes even when the recorded data is
// identical. Salsa needs value equality to backdate unchanged results, so
// compare arena contents and id indices instead.
impl PartialEq for EvaluatedData {
    fn eq(&self, other: &Self) -> bool {
        arenas_eq(&self.variable_definitions, &other.variable_definitions)
            && arenas_eq(&self.target_definitions, &other.target_definitions)
            && self.evaluated_variables == other.evaluated_variables
            && self.variable_references.len() == other.variable_references.len()
            && self
                .variable_references
                .iter()
                .zip(&other.variable_references)
                .all(|(a, b)| a.location == b.location && ids_eq(&a.definitions, &b.definitions))
            && self.target_references.len() == other.target_references.len()
            && self
                .target_references
                .iter()
                .zip(&other.target_references)
                .all(|(a, b)| {
                    a.name == b.name
                        && a.location == b.location
                        && a.definition.map(|id| id.index()) == b.definition.map(|id| id.index())
                })
            && self.name_to_target.len() == other.name_to_target.len()
            && self.name_to_target.iter().all(|(name, id)| {
                other.name_to_target.get(name).map(|other_id| other_id.index()) == Some(id.index())
            })
            && self.pos_to_definition.len() == other.pos_to_definition.len()
            && self.pos_to_definition.iter().all(|(file, map)| {
                other
                    .pos_to_definition
                    .get(file)
                    .is_some_and(|other_map| interval_maps_eq(map, other_map))
            })
    }
}

impl Eq for EvaluatedData {}

fn arenas_eq<T: PartialEq>(a: &Arena<T>, b: &Arena<T>) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((a_id, a_value), (b_id, b_value))| {
                a_id.index() == b_id.index() && a_value == b_value
            })
}

fn ids_eq<T>(a: &[Id<T>], b: &[Id<T>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.index() == b.index())
}

fn interval_maps_eq(
    a: &IntervalMap<TextSize, VariableDefinitionId>,
    b: &IntervalMap<TextSize, VariableDefinitionId>,
) -> bool {
    a.len() == b.len()
        && a.iter(..)
            .zip(b.iter(..))
            .all(|((a_range, a_id), (b_range, b_id))| {
                a_range == b_range && a_id.index() == b_id.index()
            })
}
