use ecow::EcoString;
use id_arena::Id;

use crate::file_system::FileRange;

/// A build target declared by a build function's name argument, e.g.
/// `Alias( 'all' )`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefinition {
    pub name: EcoString,
    pub define_loc: FileRange,
}

pub type TargetDefinitionId = Id<TargetDefinition>;

/// A use of a target name in a dependency property such as `.Targets`.
/// References are recorded even when no matching definition exists; target
/// resolution happens after the whole tree is seen, so validation is not the
/// evaluator's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
    pub name: EcoString,
    pub definition: Option<TargetDefinitionId>,
    pub location: FileRange,
}
