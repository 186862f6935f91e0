use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecow::EcoString;
use syntax::{TextRange, TextSize, ast};

use crate::db::SourceDatabase;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FilePosition {
    pub file: FileId,
    pub position: TextSize,
}

impl FilePosition {
    pub fn new(file: FileId, position: TextSize) -> Self {
        Self { file, position }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FileRange {
    pub file: FileId,
    pub range: TextRange,
}

impl FileRange {
    pub fn new(file: FileId, range: TextRange) -> Self {
        Self { file, range }
    }

    pub fn contains(&self, pos: FilePosition) -> bool {
        self.file == pos.file && self.range.contains(pos.position)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FilePath(pub PathBuf);

impl FilePath {
    pub fn join(&self, path: impl AsRef<Path>) -> FilePath {
        FilePath(self.0.join(path))
    }

    pub fn parent(&self) -> Option<FilePath> {
        self.0.parent().map(FilePath::from)
    }

    pub fn display(&self) -> std::path::Display<'_> {
        self.0.display()
    }
}

impl From<&Path> for FilePath {
    fn from(value: &Path) -> Self {
        Self(value.to_path_buf())
    }
}

#[derive(Debug, Default)]
pub struct FileSet {
    path_to_id: HashMap<FilePath, FileId>,
    id_to_path: HashMap<FileId, FilePath>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: FileId, path: FilePath) {
        self.path_to_id.insert(path.clone(), file_id);
        self.id_to_path.insert(file_id, path);
    }

    pub fn contains(&self, file_id: &FileId) -> bool {
        self.id_to_path.contains_key(file_id)
    }

    pub fn file_for_path(&self, path: &FilePath) -> Option<FileId> {
        self.path_to_id.get(path).copied()
    }

    pub fn path_for_file(&self, file_id: &FileId) -> &FilePath {
        &self.id_to_path[file_id]
    }

    pub fn iter_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.id_to_path.keys().copied()
    }
}

/// An `#include` site, keyed by the directive's range in the including file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct IncludeId(pub TextRange);

pub type IncludeMap = HashMap<IncludeId, FileId>;

/// The closed set of files reachable from the root through `#include`,
/// resolved up front so evaluation never touches the file system.
#[derive(Debug, Eq, PartialEq)]
pub struct SourceUnit {
    root: FileId,
    includes: HashMap<FileId, IncludeMap>,
    paths: HashMap<FileId, FilePath>,
    /// Results of `file_exists(...)` probes, keyed by the raw probe path as
    /// written in each file.
    file_exists: HashMap<FileId, HashMap<EcoString, bool>>,
}

impl SourceUnit {
    pub fn root(&self) -> FileId {
        self.root
    }

    pub fn iter_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.includes.keys().copied()
    }

    pub fn include_map(&self, file_id: &FileId) -> Option<&IncludeMap> {
        self.includes.get(file_id)
    }

    pub fn path_for_file(&self, file_id: &FileId) -> Option<&FilePath> {
        self.paths.get(file_id)
    }

    pub fn file_exists(&self, file_id: &FileId, probe_path: &str) -> bool {
        self.file_exists
            .get(file_id)
            .and_then(|probes| probes.get(probe_path))
            .copied()
            .unwrap_or(false)
    }
}

pub trait FileSystem {
    fn assign_or_get_file_id(&mut self, path: FilePath) -> FileId;

    fn path_for_file(&self, file_id: &FileId) -> &FilePath;

    fn read_content(&self, file_path: &FilePath) -> Option<String>;

    fn file_exists(&self, file_path: &FilePath) -> bool {
        self.read_content(file_path).is_some()
    }
}

pub fn collect_sources<FS: FileSystem>(
    db: &mut dyn SourceDatabase,
    fs: &mut FS,
    root: FileId,
) -> SourceUnit {
    let mut includes = HashMap::new();
    let mut paths = HashMap::new();
    let mut file_exists = HashMap::new();

    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(file_id) = queue.pop_front() {
        if includes.contains_key(&file_id) {
            continue;
        }

        let parse = db.parse(file_id);

        let file_path = fs.path_for_file(&file_id).clone();
        let Some(file_dir) = file_path.parent() else {
            tracing::warn!("file has no parent directory: {}", file_path.display());
            paths.insert(file_id, file_path);
            includes.insert(file_id, HashMap::new());
            file_exists.insert(file_id, HashMap::new());
            continue;
        };
        paths.insert(file_id, file_path);

        let mut include_map = HashMap::new();
        for include in ast::collect_includes(parse.statements()) {
            let candidate = file_dir.join(include.path.as_str());
            let Some(content) = fs.read_content(&candidate) else {
                tracing::warn!("unresolved include: {}", candidate.display());
                continue;
            };

            let resolved_file_id = fs.assign_or_get_file_id(candidate);
            db.set_file_content(resolved_file_id, Arc::from(content.as_str()));
            include_map.insert(IncludeId(include.range), resolved_file_id);
            queue.push_back(resolved_file_id);
        }
        includes.insert(file_id, include_map);

        let mut probes = HashMap::new();
        for probe in ast::collect_file_exists_probes(parse.statements()) {
            let candidate = file_dir.join(probe.path.as_str());
            probes.insert(probe.path.clone(), fs.file_exists(&candidate));
        }
        file_exists.insert(file_id, probes);
    }

    SourceUnit {
        root,
        includes,
        paths,
        file_exists,
    }
}

#[cfg(test)]
mod tests {
    use crate::db::SourceDatabase;
    use crate::tests;

    #[test]
    fn rootless_file_paths_skip_include_resolution() {
        // A file whose path has no parent directory still gets a source
        // unit; its includes just stay unresolved.
        let (db, f) = tests::multiple_files("; /\n#include 'lib.bff'\n.X = 1");
        let unit = db.source_unit();
        assert_eq!(unit.root(), f.root_file());
        assert!(unit.include_map(&f.root_file()).unwrap().is_empty());
    }
}
