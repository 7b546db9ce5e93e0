//! End-to-end tests over real directory trees.

use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use stratify::{
    ConflictPolicy, DomainConfig, FileSource, Layout, LayoutError, LocalFileSource,
    NearestOptions, Projection, Query, QueryResult, TagValue, WriteSource,
};
use tempfile::TempDir;

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"x").unwrap();
}

fn write_json(root: &Path, rel: &str, value: serde_json::Value) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn main_config() -> DomainConfig {
    DomainConfig::from_value(json!({
        "name": "main",
        "exclude": ["derivatives"],
        "entities": [
            {
                "name": "subject",
                "pattern": "sub-([a-zA-Z0-9]+)",
                "mandatory": true,
                "aliases": ["participant"],
                "directory": "{{root}}/{subject}"
            },
            {"name": "session", "pattern": "ses-([a-zA-Z0-9]+)"},
            {"name": "run", "pattern": "run-(\\d+)"},
            {"name": "kind", "pattern": "\\.([a-z]+)$"}
        ],
        "default_path_patterns": ["sub-{subject}/[ses-{session}/]run-{run}.txt"]
    }))
    .unwrap()
}

fn standard_tree(root: &Path) {
    touch(root, "sub-2/run-01.txt");
    touch(root, "sub-2/run-2.txt");
    touch(root, "sub-10/run-1.txt");
    touch(root, "sub-10/ses-a/run-3.txt");
    touch(root, "derivatives/sub-99/run-1.txt");
    // Has a run but no subject; the mandatory rule must drop it.
    touch(root, "run-7.txt");
}

fn build(tmp: &TempDir) -> Layout {
    Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(main_config())
        .build()
        .unwrap()
}

fn root_str(tmp: &TempDir) -> String {
    fs::canonicalize(tmp.path())
        .unwrap()
        .to_string_lossy()
        .replace('\\', "/")
}

fn file_paths(layout: &Layout) -> Vec<String> {
    layout.files().map(|f| f.path.clone()).collect()
}

fn query_files(layout: &Layout, query: &Query) -> Vec<String> {
    match layout.get(query, Projection::File).unwrap() {
        QueryResult::Files(paths) => paths,
        other => panic!("expected file projection, got {:?}", other),
    }
}

#[test]
fn mandatory_entities_gate_retention() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    assert!(layout.file(&format!("{}/sub-2/run-2.txt", root)).is_some());
    assert!(layout.file(&format!("{}/run-7.txt", root)).is_none());
}

#[test]
fn exclude_rules_drop_matching_subtrees() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    assert!(layout
        .file(&format!("{}/derivatives/sub-99/run-1.txt", root))
        .is_none());
}

/// Wraps the local filesystem and records every directory the indexer reads.
struct RecordingSource {
    inner: LocalFileSource,
    visited: Arc<Mutex<Vec<String>>>,
}

impl FileSource for RecordingSource {
    fn walk(
        &self,
        root: &Path,
        visit: &mut stratify::layout::source::WalkVisitor<'_>,
    ) -> stratify::Result<()> {
        let visited = self.visited.clone();
        self.inner.walk(root, &mut |dir, subdirs, files| {
            visited
                .lock()
                .unwrap()
                .push(dir.to_string_lossy().replace('\\', "/"));
            visit(dir, subdirs, files)
        })
    }
}

#[test]
fn excluded_subtrees_are_never_descended_into() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let visited = Arc::new(Mutex::new(Vec::new()));
    let source = RecordingSource {
        inner: LocalFileSource,
        visited: visited.clone(),
    };

    Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(main_config())
        .source(Arc::new(source))
        .build()
        .unwrap();

    let visited = visited.lock().unwrap();
    assert!(
        !visited.iter().any(|d| d.contains("derivatives")),
        "excluded directory was read: {:?}",
        visited
    );
}

#[test]
fn file_projection_is_natural_sorted() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    let paths = query_files(&layout, &Query::new());
    assert_eq!(
        paths,
        vec![
            format!("{}/sub-2/run-01.txt", root),
            format!("{}/sub-2/run-2.txt", root),
            format!("{}/sub-10/run-1.txt", root),
            format!("{}/sub-10/ses-a/run-3.txt", root),
        ]
    );
}

#[test]
fn numeric_filter_matches_zero_padded_values() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    let paths = query_files(&layout, &Query::new().filter("run", 1i64));
    assert_eq!(
        paths,
        vec![
            format!("{}/sub-2/run-01.txt", root),
            format!("{}/sub-10/run-1.txt", root),
        ]
    );
}

#[test]
fn exact_matching_is_the_default() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);

    // "1" must not substring-match subject "10" unless regex search is on.
    let exact = query_files(&layout, &Query::new().filter("subject", "1"));
    assert!(exact.is_empty());

    let regex = query_files(
        &layout,
        &Query::new().filter("subject", "1").regex_search(true),
    );
    assert_eq!(regex.len(), 2);
}

#[test]
fn id_projection_returns_distinct_sorted_values() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);

    let values = match layout
        .get(&Query::new(), Projection::Id("subject".to_string()))
        .unwrap()
    {
        QueryResult::Ids(values) => values,
        other => panic!("expected ids, got {:?}", other),
    };
    assert_eq!(values, vec!["2".to_string(), "10".to_string()]);
}

#[test]
fn dir_projection_resolves_directory_templates() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    let dirs = match layout
        .get(&Query::new(), Projection::Dir("subject".to_string()))
        .unwrap()
    {
        QueryResult::Dirs(dirs) => dirs,
        other => panic!("expected dirs, got {:?}", other),
    };
    assert_eq!(
        dirs,
        vec![format!("{}/sub-2", root), format!("{}/sub-10", root)]
    );
}

#[test]
fn index_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let mut layout = build(&tmp);

    let before = file_paths(&layout);
    let unique_before = layout.unique("subject").unwrap();
    layout.index().unwrap();
    assert_eq!(file_paths(&layout), before);
    assert_eq!(layout.unique("subject").unwrap(), unique_before);
}

#[test]
fn snapshot_round_trip_preserves_the_index() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let mut layout = build(&tmp);

    let before = file_paths(&layout);
    let query = Query::new().filter("run", 1i64);
    let matched_before = query_files(&layout, &query);

    let snap = tmp.path().join("index.json");
    layout.save_index(&snap).unwrap();
    layout.load_index(&snap, false).unwrap();

    assert_eq!(file_paths(&layout), before);
    assert_eq!(query_files(&layout, &query), matched_before);

    // Re-matching from stored paths must agree with the trusted load.
    layout.load_index(&snap, true).unwrap();
    assert_eq!(file_paths(&layout), before);
    assert_eq!(query_files(&layout, &query), matched_before);
}

#[test]
fn directory_scoped_configs_are_discovered_mid_walk() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");
    write_json(
        tmp.path(),
        "extra/layout.json",
        json!({
            "name": "extra",
            "entities": [
                {"name": "desc", "pattern": "desc-([a-z]+)", "mandatory": true}
            ]
        }),
    );
    touch(tmp.path(), "extra/desc-clean.txt");

    let layout = build(&tmp);
    let root = root_str(&tmp);

    assert!(layout.domain_names().contains(&"extra"));
    // The config file itself is never indexed.
    assert!(layout
        .file(&format!("{}/extra/layout.json", root))
        .is_none());

    let paths = query_files(&layout, &Query::new().filter("desc", "clean"));
    assert_eq!(paths, vec![format!("{}/extra/desc-clean.txt", root)]);
}

#[test]
fn duplicate_domain_name_is_fatal() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");

    let err = Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(main_config())
        .config(main_config())
        .build()
        .unwrap_err();
    assert!(matches!(err, LayoutError::DuplicateDomain(name) if name == "main"));
}

#[test]
fn domain_filters_do_not_prune_sibling_domains() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "anat/sub-1.txt");
    touch(tmp.path(), "func/sub-2.txt");

    let broad = DomainConfig::from_value(json!({
        "name": "broad",
        "entities": [
            {"name": "subject", "pattern": "sub-([0-9]+)", "mandatory": true}
        ]
    }))
    .unwrap();
    let narrow = DomainConfig::from_value(json!({
        "name": "narrow",
        "include": ["/func(/|$)"],
        "entities": [
            {"name": "modality", "pattern": "/(func)/"}
        ]
    }))
    .unwrap();

    let layout = Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(broad)
        .config(narrow)
        .build()
        .unwrap();
    let root = root_str(&tmp);

    // narrow's include rules must not hide anat/ from broad.
    let anat = layout
        .file(&format!("{}/anat/sub-1.txt", root))
        .expect("unfiltered domain lost a subtree to a sibling's rules");
    assert_eq!(anat.domains().into_iter().collect::<Vec<_>>(), vec!["broad"]);

    let func = layout
        .file(&format!("{}/func/sub-2.txt", root))
        .unwrap();
    assert!(func.domains().contains("narrow"));
}

#[test]
fn alias_filters_pin_the_aliased_entity() {
    let tmp = TempDir::new().unwrap();
    standard_tree(tmp.path());
    let layout = build(&tmp);
    let root = root_str(&tmp);

    let by_alias = query_files(&layout, &Query::new().filter("participant", "2"));
    assert_eq!(
        by_alias,
        vec![
            format!("{}/sub-2/run-01.txt", root),
            format!("{}/sub-2/run-2.txt", root),
        ]
    );
    assert_eq!(
        by_alias,
        query_files(&layout, &Query::new().filter("subject", "2"))
    );
    assert_eq!(
        layout.unique("participant").unwrap(),
        layout.unique("subject").unwrap()
    );
}

#[test]
fn alias_collisions_are_config_errors() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");

    let clashing = DomainConfig::from_value(json!({
        "name": "other",
        "entities": [
            {"name": "pid", "pattern": "pid-([0-9]+)", "aliases": ["participant"]}
        ]
    }))
    .unwrap();
    let err = Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(main_config())
        .config(clashing)
        .build()
        .unwrap_err();
    assert!(matches!(err, LayoutError::Config(_)));
}

#[test]
fn ambiguous_unqualified_names_require_qualification() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");

    let alt = DomainConfig::from_value(json!({
        "name": "alt",
        "entities": [{"name": "kind", "pattern": "\\.([a-z]+)$"}]
    }))
    .unwrap();
    let layout = Layout::builder(tmp.path().to_string_lossy().into_owned())
        .config(main_config())
        .config(alt)
        .build()
        .unwrap();

    let err = layout
        .get(&Query::new(), Projection::Id("kind".to_string()))
        .unwrap_err();
    assert!(matches!(err, LayoutError::AmbiguousEntity { .. }));

    // The qualified id always resolves. alt applied last, so it owns the
    // "kind" tag on the file.
    let values = match layout
        .get(&Query::new(), Projection::Id("alt.kind".to_string()))
        .unwrap()
    {
        QueryResult::Ids(values) => values,
        other => panic!("expected ids, got {:?}", other),
    };
    assert_eq!(values, vec!["txt".to_string()]);
}

#[test]
fn multi_root_layouts_merge_with_last_wins() {
    let tmp_a = TempDir::new().unwrap();
    let tmp_b = TempDir::new().unwrap();
    touch(tmp_a.path(), "sub-1/run-1.txt");
    touch(tmp_b.path(), "sub-2/run-1.txt");

    let layout = Layout::from_roots([
        tmp_a.path().to_string_lossy().into_owned(),
        tmp_b.path().to_string_lossy().into_owned(),
    ])
    .unwrap()
    .config(main_config())
    .build()
    .unwrap();

    assert_eq!(layout.domain_names(), vec!["main"]);
    let values = layout.unique("subject").unwrap();
    assert_eq!(values, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(layout.files().count(), 2);
}

#[test]
fn nearest_ignores_named_entities_in_strict_mode() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.nii");
    touch(tmp.path(), "sub-2/run-1.tsv");
    touch(tmp.path(), "sub-2/run-2.tsv");
    let layout = build(&tmp);
    let root = root_str(&tmp);

    let start = format!("{}/sub-2/run-1.nii", root);
    let mut options = NearestOptions::new(Query::new().extension(".tsv"));
    options.ignore_strict_entities = vec!["kind".to_string()];

    let matches = layout.get_nearest(&start, &options).unwrap();
    assert_eq!(matches, vec![format!("{}/sub-2/run-1.tsv", root)]);
}

#[test]
fn nearest_strict_mode_rejects_disagreeing_candidates() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.nii");
    touch(tmp.path(), "sub-2/run-2.tsv");
    let layout = build(&tmp);
    let root = root_str(&tmp);

    // Candidate disagrees on both run and kind; strict mode finds nothing.
    let start = format!("{}/sub-2/run-1.nii", root);
    let options = NearestOptions::new(Query::new().extension(".tsv"));
    assert!(layout.get_nearest(&start, &options).unwrap().is_empty());
}

#[test]
fn build_path_uses_default_patterns() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");
    let layout = build(&tmp);

    let mut entities = BTreeMap::new();
    entities.insert("subject".to_string(), "3".to_string());
    entities.insert("run".to_string(), "9".to_string());
    assert_eq!(
        layout.build_path(&entities, None, false),
        Some("sub-3/run-9.txt".to_string())
    );

    entities.insert("session".to_string(), "b".to_string());
    assert_eq!(
        layout.build_path(&entities, None, false),
        Some("sub-3/ses-b/run-9.txt".to_string())
    );
}

#[test]
fn write_contents_creates_and_indexes_the_file() {
    let tmp = TempDir::new().unwrap();
    touch(tmp.path(), "sub-2/run-1.txt");
    let mut layout = build(&tmp);
    let root = root_str(&tmp);

    let mut entities = BTreeMap::new();
    entities.insert("subject".to_string(), "3".to_string());
    entities.insert("run".to_string(), "9".to_string());

    let written = layout
        .write_contents(&entities, None, WriteSource::Text("hello"), ConflictPolicy::Fail)
        .unwrap()
        .unwrap();

    let expected = format!("{}/sub-3/run-9.txt", root);
    assert_eq!(written.to_string_lossy().replace('\\', "/"), expected);
    assert_eq!(fs::read_to_string(&written).unwrap(), "hello");

    let record = layout.file(&expected).expect("new file must be indexed");
    assert_eq!(record.value("subject"), Some(&TagValue::Str("3".to_string())));
}
