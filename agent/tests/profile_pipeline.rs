//! Integration test: full profile pipeline (record → aggregate → export)
//!
//! Drives a profiler through start/record/stop and checks every export
//! format, using a fixed symbol table instead of real stack unwinding.

use flareprof_agent::{Profiler, ProfilerConfig, ProfilerError, SvgOptions, SymbolTable};
use flareprof_shared::types::events::{ProfilerKind, RawSample};
use flareprof_shared::types::profile::FlamegraphNode;
use std::sync::Arc;

const MAIN: u64 = 0x400000;
const FOO: u64 = 0x400100;
const BAR: u64 = 0x400200;
const BAZ: u64 = 0x400300;

fn profiler() -> Profiler {
    let table = SymbolTable::new()
        .with_function(MAIN, "main")
        .with_function(FOO, "foo")
        .with_function(BAR, "bar")
        .with_function(BAZ, "baz");
    Profiler::new(ProfilerConfig::default(), Arc::new(table))
}

fn record(profiler: &Profiler, kind: ProfilerKind, path: &[u64], weight: u64, times: usize) {
    let recorder = profiler.recorder(kind);
    for _ in 0..times {
        recorder.record(RawSample::from_root_path(path.to_vec(), weight));
    }
}

fn assert_conserved(node: &FlamegraphNode) {
    let children: u64 = node.children.iter().map(|c| c.value).sum();
    assert!(node.value >= children, "{} breaks conservation", node.name);
    node.children.iter().for_each(assert_conserved);
}

#[test]
fn test_single_chain_session() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO, BAR], 1, 100);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Cpu).unwrap();
    assert_eq!(root.name, "root");
    assert_eq!(root.value, 100);

    let main = &root.children[0];
    let foo = &main.children[0];
    let bar = &foo.children[0];
    assert_eq!((main.name.as_str(), main.value), ("main", 100));
    assert_eq!((foo.name.as_str(), foo.value), ("foo", 100));
    assert_eq!((bar.name.as_str(), bar.value), ("bar", 100));
    assert!(bar.children.is_empty());
}

#[test]
fn test_sibling_paths_session() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO], 1, 3);
    record(&profiler, ProfilerKind::Cpu, &[MAIN, BAZ], 1, 2);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Cpu).unwrap();
    assert_eq!(root.value, 5);
    let main = &root.children[0];
    assert_eq!(main.value, 5);
    assert_eq!(main.children.len(), 2);
    assert_eq!((main.children[0].name.as_str(), main.children[0].value), ("foo", 3));
    assert_eq!((main.children[1].name.as_str(), main.children[1].value), ("baz", 2));
    assert_conserved(&root);

    let collapsed = profiler.collapsed(ProfilerKind::Cpu).unwrap();
    assert_eq!(collapsed, "main;foo 3\nmain;baz 2\n");
}

#[test]
fn test_empty_session_exports() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Heap).unwrap();
    profiler.stop(ProfilerKind::Heap).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Heap).unwrap();
    assert_eq!(
        serde_json::to_string(&root).unwrap(),
        r#"{"name":"root","value":0,"children":[]}"#
    );

    let svg = profiler
        .svg(ProfilerKind::Heap, &SvgOptions::for_kind(ProfilerKind::Heap))
        .unwrap();
    assert!(svg.starts_with("<?xml"));
    let document = roxmltree::Document::parse(&svg).unwrap();
    assert_eq!(document.root_element().tag_name().name(), "svg");
    let frames: Vec<_> = document
        .descendants()
        .filter_map(|n| n.attribute("data-name"))
        .collect();
    assert_eq!(frames, vec!["root"]);
}

#[test]
fn test_never_started_profiler_exports_empty_root() {
    let profiler = profiler();
    let root = profiler.flamegraph(ProfilerKind::Cpu).unwrap();
    assert_eq!(root, FlamegraphNode::empty_root());
}

#[test]
fn test_stopped_session_exports_are_identical() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO, BAR], 1, 7);
    record(&profiler, ProfilerKind::Cpu, &[MAIN, BAZ], 1, 3);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    // Late samples must not reach a stopped session.
    record(&profiler, ProfilerKind::Cpu, &[MAIN], 1, 5);

    let first = serde_json::to_string(&profiler.flamegraph(ProfilerKind::Cpu).unwrap()).unwrap();
    let second = serde_json::to_string(&profiler.flamegraph(ProfilerKind::Cpu).unwrap()).unwrap();
    assert_eq!(first, second);

    let options = SvgOptions::for_kind(ProfilerKind::Cpu);
    assert_eq!(
        profiler.svg(ProfilerKind::Cpu, &options).unwrap(),
        profiler.svg(ProfilerKind::Cpu, &options).unwrap()
    );
    assert_eq!(profiler.flamegraph(ProfilerKind::Cpu).unwrap().value, 10);
}

#[test]
fn test_unresolved_frames_use_hex_addresses() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, 0xdeadbeef], 1, 1);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Cpu).unwrap();
    assert_eq!(root.children[0].children[0].name, "0xdeadbeef");
}

#[test]
fn test_svg_escapes_frame_names() {
    let table = SymbolTable::new()
        .with_function(MAIN, "main")
        .with_function(FOO, "<Vec<u8> as Drop>::drop & \"friends\"");
    let profiler = Profiler::new(ProfilerConfig::default(), Arc::new(table));

    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO], 1, 2);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let svg = profiler.svg(ProfilerKind::Cpu, &SvgOptions::default()).unwrap();
    assert!(svg.contains("&lt;Vec&lt;u8&gt; as Drop&gt;::drop &amp; &quot;friends&quot;"));
    assert!(!svg.contains("<Vec<u8>"));

    let document = roxmltree::Document::parse(&svg).unwrap();
    assert!(document
        .descendants()
        .any(|n| n.attribute("data-name") == Some("<Vec<u8> as Drop>::drop & \"friends\"")));
}

#[test]
fn test_heap_weights_are_bytes() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Heap).unwrap();
    record(&profiler, ProfilerKind::Heap, &[MAIN, FOO], 1024, 2);
    record(&profiler, ProfilerKind::Heap, &[MAIN, BAZ], 64, 1);
    profiler.stop(ProfilerKind::Heap).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Heap).unwrap();
    assert_eq!(root.value, 2112);
    assert_eq!(root.children[0].children[0].value, 2048);

    let status = profiler.status();
    assert_eq!(status.heap.samples, 3);
    assert_eq!(status.cpu.samples, 0);
}

#[test]
fn test_state_machine() {
    let profiler = profiler();
    assert!(matches!(
        profiler.stop(ProfilerKind::Cpu),
        Err(ProfilerError::NotRunning(ProfilerKind::Cpu))
    ));

    profiler.start(ProfilerKind::Cpu).unwrap();
    assert!(matches!(
        profiler.start(ProfilerKind::Cpu),
        Err(ProfilerError::AlreadyRunning(ProfilerKind::Cpu))
    ));

    // Heap is unaffected by the running CPU session.
    profiler.start(ProfilerKind::Heap).unwrap();
    profiler.stop(ProfilerKind::Heap).unwrap();
    profiler.stop(ProfilerKind::Cpu).unwrap();
}

#[test]
fn test_restart_discards_previous_session() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO], 1, 4);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, BAZ], 1, 1);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let root = profiler.flamegraph(ProfilerKind::Cpu).unwrap();
    assert_eq!(root.value, 1);
    assert_eq!(root.children[0].children[0].name, "baz");
}

#[test]
fn test_capacity_limit_counts_drops() {
    let table = SymbolTable::new().with_function(MAIN, "main");
    let profiler = Profiler::new(
        ProfilerConfig {
            max_samples: 10,
            ..Default::default()
        },
        Arc::new(table),
    );

    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN], 1, 25);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let counters = profiler.session(ProfilerKind::Cpu).counters();
    assert_eq!(counters.samples, 10);
    assert_eq!(counters.dropped, 15);
    assert_eq!(profiler.flamegraph(ProfilerKind::Cpu).unwrap().value, 10);
}

#[test]
fn test_write_outputs_to_disk() {
    let profiler = profiler();
    profiler.start(ProfilerKind::Cpu).unwrap();
    record(&profiler, ProfilerKind::Cpu, &[MAIN, FOO, BAR], 1, 3);
    profiler.stop(ProfilerKind::Cpu).unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    let tree = profiler.call_tree(ProfilerKind::Cpu).unwrap();

    let svg_path = temp_dir.path().join("profile.svg");
    flareprof_agent::output::write_svg(&tree, &SvgOptions::default(), &svg_path).unwrap();
    assert!(std::fs::read_to_string(&svg_path).unwrap().contains("bar"));

    let json_path = temp_dir.path().join("profile.json");
    flareprof_agent::output::write_json(&flareprof_agent::output::to_document(tree.root()), &json_path)
        .unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(parsed["value"], 3);
}
