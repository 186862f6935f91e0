use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ecow::EcoString;

use syntax::{TextRange, ast};

use crate::eval::preprocessor::DefineTable;
use crate::eval::scope::Scopes;
use crate::eval::{EvalDatabase, EvalError, EvalErrorKind, Evaluation};
use crate::evaluated_data::{EvaluatedData, VariableDefinitionId};
use crate::file_system::{FileId, FileRange, SourceUnit};

/// A user function registered by a `function` declaration.
#[derive(Debug, Clone)]
pub(crate) struct UserFunction {
    /// Parameter names paired with the definitions created at the
    /// declaration site. Every call's argument binds to the same definition.
    pub params: Vec<(EcoString, VariableDefinitionId)>,
    pub body: Arc<[ast::Statement]>,
}

/// All mutable state of one evaluation pass.
pub(crate) struct EvalCtx<'a> {
    pub db: &'a dyn EvalDatabase,
    pub source_unit: Arc<SourceUnit>,
    /// The include chain, innermost file last. Used both to locate errors
    /// and to detect include cycles.
    pub file_trace: Vec<FileId>,
    pub data: EvaluatedData,
    pub scopes: Scopes,
    pub defines: DefineTable,
    pub functions: HashMap<EcoString, UserFunction>,
    /// Files that declared `#once` and must not be evaluated again.
    pub once_files: HashSet<FileId>,
    pub call_depth: usize,
}

impl<'a> EvalCtx<'a> {
    pub fn new(db: &'a dyn EvalDatabase) -> Self {
        let source_unit = db.source_unit();
        let root = source_unit.root();
        Self {
            db,
            source_unit,
            file_trace: vec![root],
            data: EvaluatedData::default(),
            scopes: Scopes::new(),
            defines: DefineTable::new(db.host_platform()),
            functions: HashMap::new(),
            once_files: HashSet::new(),
            call_depth: 0,
        }
    }

    pub fn current_file_id(&self) -> FileId {
        *self.file_trace.last().expect("file trace is empty")
    }

    pub fn push_file(&mut self, file_id: FileId) {
        self.file_trace.push(file_id);
    }

    pub fn pop_file(&mut self) {
        assert!(self.file_trace.len() > 1, "cannot pop the root file");
        self.file_trace.pop();
    }

    /// Anchors a range from the currently evaluated file.
    pub fn file_range(&self, range: TextRange) -> FileRange {
        FileRange::new(self.current_file_id(), range)
    }

    pub fn error(&self, range: TextRange, message: impl Into<EcoString>) -> EvalError {
        EvalError {
            kind: EvalErrorKind::Evaluation,
            location: self.file_range(range),
            message: message.into(),
        }
    }

    /// The directory of the currently evaluated file, relative to the root
    /// file's directory. Empty for the root file itself.
    pub fn current_bff_dir(&self) -> EcoString {
        let Some(current_dir) = self
            .source_unit
            .path_for_file(&self.current_file_id())
            .and_then(|path| path.parent())
        else {
            return EcoString::new();
        };
        let Some(root_dir) = self
            .source_unit
            .path_for_file(&self.source_unit.root())
            .and_then(|path| path.parent())
        else {
            return EcoString::new();
        };
        let relative = current_dir
            .0
            .strip_prefix(&root_dir.0)
            .unwrap_or(&current_dir.0);
        relative.to_string_lossy().as_ref().into()
    }

    /// The root file's directory, standing in for the working directory.
    pub fn working_dir(&self) -> EcoString {
        match self
            .source_unit
            .path_for_file(&self.source_unit.root())
            .and_then(|path| path.parent())
        {
            Some(dir) => dir.0.to_string_lossy().as_ref().into(),
            None => EcoString::new(),
        }
    }

    pub fn finish(self, error: Option<EvalError>) -> Evaluation {
        Evaluation::new(self.data, error)
    }
}
