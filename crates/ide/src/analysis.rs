//! The editor-facing API: a mutable [`AnalysisHost`] owning the database,
//! and read-only [`Analysis`] snapshots serving queries.

use std::sync::Arc;

use ecow::EcoString;
use salsa::ParallelDatabase;

use crate::db::{RootDatabase, SourceDatabase};
use crate::environment::{Environment, Platform};
use crate::eval::{EvalDatabase, EvalErrorKind, Evaluation};
use crate::file_system::{FileId, FilePosition, FileRange, FileSystem, collect_sources};
use crate::line_index::LineIndex;

pub struct AnalysisHost {
    db: RootDatabase,
}

impl AnalysisHost {
    pub fn new() -> Self {
        let mut db = RootDatabase::default();
        db.set_environment(Arc::new(Environment::default()));
        db.set_host_platform(Platform::host());
        Self { db }
    }

    pub fn analysis(&self) -> Analysis {
        Analysis {
            db: self.db.snapshot(),
        }
    }

    pub fn set_file_content(&mut self, file_id: FileId, content: &str) {
        self.db.set_file_content(file_id, Arc::from(content));
    }

    /// Re-resolves the include closure starting at `root` and makes it the
    /// unit all queries operate on.
    pub fn set_root_file<FS: FileSystem>(&mut self, fs: &mut FS, root: FileId) {
        let source_unit = collect_sources(&mut self.db, fs, root);
        self.db.set_source_unit(Arc::new(source_unit));
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.db.set_environment(Arc::new(environment));
    }

    pub fn set_host_platform(&mut self, platform: Platform) {
        self.db.set_host_platform(platform);
    }
}

impl Default for AnalysisHost {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: FileRange,
    pub message: EcoString,
}

pub struct Analysis {
    db: salsa::Snapshot<RootDatabase>,
}

impl Analysis {
    pub fn line_index(&self, file_id: FileId) -> Arc<LineIndex> {
        self.db.line_index(file_id)
    }

    pub fn evaluate(&self) -> Arc<Evaluation> {
        self.db.eval()
    }

    /// Parse errors for every file in the unit, plus the evaluation error if
    /// one occurred.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let source_unit = self.db.source_unit();
        let mut files: Vec<FileId> = source_unit.iter_files().collect();
        files.sort();
        for file_id in files {
            for error in self.db.parse(file_id).errors().iter() {
                diagnostics.push(Diagnostic {
                    location: FileRange::new(file_id, error.range),
                    message: error.message.clone(),
                });
            }
        }

        let evaluation = self.db.eval();
        if let Some(error) = evaluation.error() {
            // Parse failures are already reported above.
            if error.kind != EvalErrorKind::Parse {
                diagnostics.push(Diagnostic {
                    location: error.location,
                    message: error.message.clone(),
                });
            }
        }
        diagnostics
    }

    /// Where the variable under the cursor was defined.
    pub fn goto_definition(&self, pos: FilePosition) -> Option<FileRange> {
        let evaluation = self.db.eval();
        let (_, definition) = evaluation.data().find_definition_at(pos)?;
        Some(definition.define_loc)
    }

    /// Every recorded reference to the variable under the cursor, including
    /// its definition site.
    pub fn references(&self, pos: FilePosition) -> Option<Vec<FileRange>> {
        let evaluation = self.db.eval();
        let (id, definition) = evaluation.data().find_definition_at(pos)?;
        let mut locations = vec![definition.define_loc];
        for location in evaluation.data().references_to(id) {
            if !locations.contains(&location) {
                locations.push(location);
            }
        }
        Some(locations)
    }

    /// The evaluated value of the innermost variable occurrence under the
    /// cursor, rendered for a hover popup.
    pub fn hover(&self, pos: FilePosition) -> Option<String> {
        let evaluation = self.db.eval();
        let evaluated = evaluation.data().evaluated_value_at(pos)?;
        Some(evaluated.value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::tests;

    #[test]
    fn goto_definition_and_references() {
        let (host, f) = tests::analysis_fixture(
            "\
@.X@ = 1
.Y = @.X@",
        );
        let analysis = host.analysis();
        assert_eq!(
            analysis.goto_definition(f.marker(2)),
            Some(f.marker_range(0))
        );
        assert_eq!(
            analysis.references(f.marker(2)),
            Some(vec![f.marker_range(0), f.marker_range(2)])
        );
        // The definition site resolves to itself.
        assert_eq!(
            analysis.goto_definition(f.marker(0)),
            Some(f.marker_range(0))
        );
    }

    #[test]
    fn hover_shows_the_evaluated_value() {
        let (host, f) = tests::analysis_fixture(
            "\
.X = { 'a', 'b' }
.Y = .@X",
        );
        let analysis = host.analysis();
        assert_eq!(analysis.hover(f.marker(0)), Some("{ 'a', 'b' }".to_string()));
    }

    #[test]
    fn hover_outside_any_occurrence_is_empty() {
        let (host, f) = tests::analysis_fixture(".X = 1@");
        let analysis = host.analysis();
        assert_eq!(analysis.hover(f.marker(0)), None);
    }

    #[test]
    fn diagnostics_report_parse_errors() {
        let (host, _) = tests::analysis_fixture(".X =");
        let diagnostics = host.analysis().diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Expected a value");
    }

    #[test]
    fn diagnostics_report_evaluation_errors() {
        let (host, _) = tests::analysis_fixture(".Y = .X");
        let diagnostics = host.analysis().diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Referencing variable \"X\" that is not defined in the current scope or any of the parent scopes."
        );
    }
}
