//! Integration tests for the refactoring engine
//!
//! Each test builds a small Python workspace in a temp dir, a symbol index
//! describing it, and runs a batch through plan / preview / apply.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use symbol_patcher::{
    summary_line, Batch, CallProblem, Location, MemoryIndex, Operation, Phase, PhaseReport,
    Position, RefactorError, ReferenceKind, Refactorer, Settings, SymbolKind,
};
use tempfile::TempDir;

/// Temp workspace with a canonical root, so index paths match the engine's.
struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    fn engine(&self, index: MemoryIndex) -> Refactorer {
        Refactorer::new(&self.root, index, Settings::default()).unwrap()
    }
}

fn op(value: serde_json::Value) -> Operation {
    serde_json::from_value(value).unwrap()
}

/// 45-line module where `count` is defined on line 10 and used on 22 and 40.
fn counter_module() -> String {
    let mut lines: Vec<String> = (1..=45).map(|n| format!("# line {n}")).collect();
    lines[0] = "def tally(items):".to_string();
    lines[9] = "    count = 0".to_string();
    lines[21] = "    count += 1".to_string();
    lines[39] = "    return count".to_string();
    lines.join("\n") + "\n"
}

fn counter_index(file: &Path, name: &str) -> MemoryIndex {
    let mut index = MemoryIndex::new();
    let id = index.define(name, SymbolKind::Variable, Location::new(file, 10, 5));
    index.add_reference(&id, Location::new(file, 22, 5), ReferenceKind::Usage);
    index.add_reference(&id, Location::new(file, 40, 12), ReferenceKind::Usage);
    index
}

fn rename_op(new_name: &str) -> Operation {
    op(json!({
        "kind": "rename",
        "file": "a.py",
        "line": 10,
        "column": 5,
        "new_name": new_name,
    }))
}

#[test]
fn test_rename_rewrites_every_reference() {
    let ws = Workspace::new();
    let file = ws.write("a.py", &counter_module());
    let engine = ws.engine(counter_index(&file, "count"));
    let batch = Batch::new(vec![rename_op("total")]);

    let preview = engine.run(&batch, Phase::Preview).unwrap();
    let stats = &preview.operations()[0];
    assert_eq!(summary_line(stats), "3 references in 1 file");

    engine.run(&batch, Phase::Apply).unwrap();
    let text = ws.read("a.py");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[9], "    total = 0");
    assert_eq!(lines[21], "    total += 1");
    assert_eq!(lines[39], "    return total");
    assert!(!text.contains("count"));
}

#[test]
fn test_rename_round_trip_restores_bytes() {
    let ws = Workspace::new();
    let original = counter_module();
    let file = ws.write("a.py", &original);

    ws.engine(counter_index(&file, "count"))
        .run(&Batch::new(vec![rename_op("total")]), Phase::Apply)
        .unwrap();
    assert_ne!(ws.read("a.py"), original);

    // The index is re-exported after every apply
    ws.engine(counter_index(&file, "total"))
        .run(&Batch::new(vec![rename_op("count")]), Phase::Apply)
        .unwrap();
    assert_eq!(ws.read("a.py"), original);
}

#[test]
fn test_rename_filter_skips_excluded_lines() {
    let ws = Workspace::new();
    let file = ws.write("a.py", &counter_module());
    let engine = ws.engine(counter_index(&file, "count"));
    let batch = Batch::new(vec![op(json!({
        "kind": "rename",
        "file": "a.py",
        "line": 10,
        "column": 5,
        "new_name": "total",
        "filter": { "exclude_lines": [[30, null]] },
    }))]);

    let report = engine.run(&batch, Phase::Apply).unwrap();
    assert_eq!(
        summary_line(&report.operations()[0]),
        "2 references in 1 file (1 filtered out of 3)"
    );
    let text = ws.read("a.py");
    assert!(text.contains("    total += 1"));
    assert!(text.contains("    return count"));
}

#[test]
fn test_move_class_repoints_imports() {
    let ws = Workspace::new();
    let engine_py = ws.write(
        "engine.py",
        "import os\n\n\nclass Cache:\n    def get(self):\n        return 1\n\n\nclass Engine:\n    pass\n",
    );
    let main_py = ws.write("main.py", "from engine import Cache\n\nc = Cache()\n");

    let mut index = MemoryIndex::new();
    let cache = index.define("Cache", SymbolKind::Class, Location::new(&engine_py, 4, 7));
    index.set_extent(&cache, Position::new(7, 1));
    index.add_reference(&cache, Location::new(&main_py, 1, 20), ReferenceKind::Import);
    index.add_reference(&cache, Location::new(&main_py, 3, 5), ReferenceKind::Usage);
    let engine_class = index.define("Engine", SymbolKind::Class, Location::new(&engine_py, 9, 7));
    index.set_extent(&engine_class, Position::new(11, 1));

    let batch = Batch::new(vec![op(json!({
        "kind": "move",
        "file": "engine.py",
        "name": "Cache",
        "dest": "cache.py",
    }))]);
    let report = ws.engine(index).run(&batch, Phase::Apply).unwrap();

    assert_eq!(
        ws.read("engine.py"),
        "import os\n\n\nclass Engine:\n    pass\n"
    );
    assert_eq!(
        ws.read("cache.py"),
        "class Cache:\n    def get(self):\n        return 1\n"
    );
    assert_eq!(ws.read("main.py"), "from cache import Cache\n\nc = Cache()\n");

    match report {
        PhaseReport::Apply(apply) => {
            assert_eq!(apply.files.len(), 3);
            assert!(apply
                .files
                .iter()
                .any(|f| f.path == ws.path("cache.py")
                    && f.status == symbol_patcher::FileStatus::Created));
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[test]
fn test_move_into_file_defining_the_name_conflicts() {
    let ws = Workspace::new();
    let engine_py = ws.write("engine.py", "class Cache:\n    pass\n");
    let cache_py = ws.write("cache.py", "class Cache:\n    pass\n");

    let mut index = MemoryIndex::new();
    index.define("Cache", SymbolKind::Class, Location::new(&engine_py, 1, 7));
    index.define("Cache", SymbolKind::Class, Location::new(&cache_py, 1, 7));

    let batch = Batch::new(vec![op(json!({
        "kind": "move",
        "file": "engine.py",
        "name": "Cache",
        "dest": "cache.py",
    }))]);
    let err = ws.engine(index).run(&batch, Phase::Apply).unwrap_err();
    assert!(matches!(err, RefactorError::DestinationConflict { op: 0, .. }));
    assert_eq!(ws.read("engine.py"), "class Cache:\n    pass\n");
}

#[test]
fn test_change_signature_reports_every_unsatisfiable_call() {
    let ws = Workspace::new();
    let engine_py = ws.write("engine.py", "def process(data):\n    return data\n");
    let main_py = ws.write("main.py", "process(x)\nprocess(y)\n");

    let mut index = MemoryIndex::new();
    let process = index.define("process", SymbolKind::Function, Location::new(&engine_py, 1, 5));
    index.set_extent(&process, Position::new(3, 1));
    index.add_reference(&process, Location::new(&main_py, 1, 1), ReferenceKind::Usage);
    index.add_reference(&process, Location::new(&main_py, 2, 1), ReferenceKind::Usage);

    let batch = Batch::new(vec![op(json!({
        "kind": "change_signature",
        "file": "engine.py",
        "function": "process",
        "new_params": ["data: dict", "config: Config"],
    }))]);
    let err = ws.engine(index).run(&batch, Phase::Apply).unwrap_err();
    match err {
        RefactorError::SignatureConflict { function, sites, .. } => {
            assert_eq!(function, "process");
            assert_eq!(sites.len(), 2);
            assert!(sites
                .iter()
                .all(|s| s.problem == CallProblem::Missing(vec!["config".to_string()])));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ws.read("engine.py"), "def process(data):\n    return data\n");
}

#[test]
fn test_change_signature_with_default_updates_definition() {
    let ws = Workspace::new();
    let engine_py = ws.write("engine.py", "def process(data):\n    return data\n");
    let main_py = ws.write("main.py", "process(x)\n");

    let mut index = MemoryIndex::new();
    let process = index.define("process", SymbolKind::Function, Location::new(&engine_py, 1, 5));
    index.add_reference(&process, Location::new(&main_py, 1, 1), ReferenceKind::Usage);

    let batch = Batch::new(vec![op(json!({
        "kind": "change_signature",
        "file": "engine.py",
        "function": "process",
        "new_params": ["data: dict", "config: Config = None"],
    }))]);
    ws.engine(index).run(&batch, Phase::Apply).unwrap();
    assert_eq!(
        ws.read("engine.py"),
        "def process(data: dict, config: Config = None):\n    return data\n"
    );
    assert_eq!(ws.read("main.py"), "process(x)\n");
}

#[test]
fn test_change_signature_rewrites_nested_calls() {
    let ws = Workspace::new();
    let api_py = ws.write(
        "api.py",
        "def combine(a, b):\n    return a + b\n\n\nx = combine(combine(1, 2), 3)\n",
    );

    let mut index = MemoryIndex::new();
    let combine = index.define("combine", SymbolKind::Function, Location::new(&api_py, 1, 5));
    index.add_reference(&combine, Location::new(&api_py, 5, 5), ReferenceKind::Usage);
    index.add_reference(&combine, Location::new(&api_py, 5, 13), ReferenceKind::Usage);

    let batch = Batch::new(vec![op(json!({
        "kind": "change_signature",
        "file": "api.py",
        "function": "combine",
        "new_params": ["b", "a"],
    }))]);
    ws.engine(index).run(&batch, Phase::Apply).unwrap();
    assert_eq!(
        ws.read("api.py"),
        "def combine(b, a):\n    return a + b\n\n\nx = combine(3, combine(2, 1))\n"
    );
}

#[test]
fn test_change_signature_rejects_unpacking_calls() {
    let ws = Workspace::new();
    let engine_py = ws.write("engine.py", "def process(data):\n    return data\n");
    let main_py = ws.write("main.py", "process(*args)\nprocess(x)\n");

    let mut index = MemoryIndex::new();
    let process = index.define("process", SymbolKind::Function, Location::new(&engine_py, 1, 5));
    index.add_reference(&process, Location::new(&main_py, 1, 1), ReferenceKind::Usage);
    index.add_reference(&process, Location::new(&main_py, 2, 1), ReferenceKind::Usage);

    let batch = Batch::new(vec![op(json!({
        "kind": "change_signature",
        "file": "engine.py",
        "function": "process",
        "new_params": ["data", "verbose = False"],
    }))]);
    let err = ws.engine(index).run(&batch, Phase::Apply).unwrap_err();
    match err {
        RefactorError::SignatureConflict { sites, .. } => {
            assert_eq!(sites.len(), 1);
            assert_eq!(sites[0].location, Location::new(&main_py, 1, 1));
            assert_eq!(sites[0].problem, CallProblem::Unpacking);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ws.read("engine.py"), "def process(data):\n    return data\n");
    assert_eq!(ws.read("main.py"), "process(*args)\nprocess(x)\n");
}

#[test]
fn test_copy_paste_block_to_top_of_destination() {
    let ws = Workspace::new();
    let source: String = (1..=50).map(|n| format!("s{n}\n")).collect();
    ws.write("src.py", &source);
    ws.write("dest.py", "d1\nd2\n");

    let batch = Batch::new(vec![op(json!({
        "kind": "copy_paste",
        "from_file": "src.py",
        "start_line": 1,
        "start_col": 1,
        "end_line": 50,
        "to_file": "dest.py",
        "to_line": 1,
        "to_col": 1,
    }))]);
    ws.engine(MemoryIndex::new()).run(&batch, Phase::Apply).unwrap();

    assert_eq!(ws.read("src.py"), source);
    assert_eq!(ws.read("dest.py"), format!("{source}d1\nd2\n"));
}

#[test]
fn test_overlapping_operations_leave_files_untouched() {
    let ws = Workspace::new();
    ws.write("a.py", "x = 1\ny = 2\n");

    let batch = Batch::new(vec![
        op(json!({"kind": "find_replace", "paths": "a.py", "find": "x = 1", "replace": "x = 9"})),
        op(json!({"kind": "toggle_comment", "file": "a.py", "start_line": 1, "end_line": 1})),
        op(json!({"kind": "find_replace", "paths": "a.py", "find": "1\ny", "replace": "1\nz"})),
    ]);
    let err = ws
        .engine(MemoryIndex::new())
        .run(&batch, Phase::Apply)
        .unwrap_err();
    match err {
        RefactorError::EditConflict { first, second, .. } => {
            assert_eq!(first.op, 0);
            assert_eq!(second.op, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ws.read("a.py"), "x = 1\ny = 2\n");
}

#[test]
fn test_preview_count_matches_applied_edits() {
    let ws = Workspace::new();
    ws.write("pkg/a.py", "old = 1\nprint(old)\n");
    ws.write("pkg/b.py", "# old\nold()\n");
    ws.write("pkg/notes.txt", "old\n");

    let batch = Batch::new(vec![
        op(json!({"kind": "find_replace", "paths": ["pkg", true], "find": "old", "replace": "new"})),
        op(json!({"kind": "toggle_comment", "file": "pkg/b.py", "start_line": 1})),
    ]);
    let engine = ws.engine(MemoryIndex::new());

    let preview = match engine.run(&batch, Phase::Preview).unwrap() {
        PhaseReport::Preview(report) => report,
        other => panic!("unexpected report: {other:?}"),
    };
    let applied = match engine.run(&batch, Phase::Apply).unwrap() {
        PhaseReport::Apply(report) => report,
        other => panic!("unexpected report: {other:?}"),
    };

    assert_eq!(preview.total_edits, applied.edit_count());
    assert_eq!(preview.total_files, applied.files.len());
    assert_eq!(ws.read("pkg/notes.txt"), "old\n");
}

#[test]
fn test_stale_plan_rolls_back_written_files() {
    let ws = Workspace::new();
    ws.write("a.py", "value = 1\n");
    ws.write("b.py", "value = 2\n");
    ws.write("c.py", "value = 3\n");

    let engine = ws.engine(MemoryIndex::new());
    let batch = Batch::new(vec![op(json!({
        "kind": "find_replace",
        "paths": ["a.py", "b.py", "c.py"],
        "find": "value",
        "replace": "amount",
    }))]);
    let plan = engine.plan(&batch).unwrap();

    // Someone edits c.py between planning and commit
    ws.write("c.py", "value = 30\n");

    let err = engine.commit(&plan).unwrap_err();
    match err {
        RefactorError::PartialWriteFailure {
            file,
            restored,
            unrestored,
            ..
        } => {
            assert_eq!(file, ws.path("c.py"));
            assert_eq!(restored.len(), 2);
            assert!(unrestored.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ws.read("a.py"), "value = 1\n");
    assert_eq!(ws.read("b.py"), "value = 2\n");
    assert_eq!(ws.read("c.py"), "value = 30\n");
}

#[test]
fn test_file_map_short_names() {
    let ws = Workspace::new();
    ws.write("src/service/engine.py", "DEBUG = True\n");

    let mut file_map = symbol_patcher::PathMap::new();
    file_map.insert("eng", "src/service/engine.py");
    let batch = Batch::new(vec![op(json!({
        "kind": "find_replace",
        "paths": "eng",
        "find": "True",
        "replace": "False",
    }))])
    .with_file_map(file_map.clone());
    ws.engine(MemoryIndex::new()).run(&batch, Phase::Apply).unwrap();
    assert_eq!(ws.read("src/service/engine.py"), "DEBUG = False\n");

    let typo = Batch::new(vec![op(json!({
        "kind": "toggle_comment",
        "file": "engn",
        "start_line": 1,
    }))])
    .with_file_map(file_map);
    let err = ws.engine(MemoryIndex::new()).run(&typo, Phase::Preview).unwrap_err();
    assert!(err.to_string().contains("did you mean 'eng'"));
}
