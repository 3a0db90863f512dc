//! Flamegraph generation
//!
//! Lays the call tree out as rectangles (root band at the bottom) and renders
//! them as a standalone SVG document. Children are placed left to right in
//! insertion order, so a fixed tree always renders to the same bytes.

use super::{write_text, OutputError};
use crate::calltree::{CallTree, NodeRef};
use flareprof_shared::types::events::ProfilerKind;
use flareprof_shared::types::profile::FlameRect;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

const TITLE_HEIGHT: usize = 40;
const BOTTOM_PAD: usize = 24;
const SIDE_PAD: f64 = 10.0;

/// Approximate advance of one character relative to the font size
const CHAR_WIDTH_RATIO: f64 = 0.59;

/// Flamegraph rendering options
#[derive(Debug, Clone)]
pub struct SvgOptions {
    pub title: String,
    /// Width of the graph area in pixels
    pub width: u32,
    pub frame_height: u32,
    pub font_size: u32,
    /// Rects narrower than this are dropped with their subtree
    pub min_width: f64,
    /// Rects narrower than this get no text label
    pub min_label_width: f64,
    /// Unit printed in tooltips (`samples`, `bytes`)
    pub unit: String,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            title: "Flame Graph".to_string(),
            width: 1200,
            frame_height: 16,
            font_size: 12,
            min_width: 0.1,
            min_label_width: 21.0,
            unit: "samples".to_string(),
        }
    }
}

impl SvgOptions {
    /// Defaults titled and labelled for one profiler kind
    pub fn for_kind(kind: ProfilerKind) -> Self {
        let title = match kind {
            ProfilerKind::Cpu => "CPU Flame Graph",
            ProfilerKind::Heap => "Heap Flame Graph",
        };
        Self::default().with_title(title).with_unit(kind.unit())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Compute one rectangle per visible node, root first.
///
/// A child's width is its share of the root value times the graph width.
/// The root band is always present, even for an empty tree.
pub fn layout(tree: &CallTree, options: &SvgOptions) -> Vec<FlameRect> {
    let root = tree.root();
    let width = options.width as f64;
    let scale = if root.value() == 0 {
        0.0
    } else {
        width / root.value() as f64
    };

    let mut rects = vec![FlameRect {
        name: root.name().to_string(),
        depth: 0,
        x: 0.0,
        width,
        value: root.value(),
    }];
    layout_children(root, 1, 0.0, scale, options.min_width, &mut rects);
    rects
}

fn layout_children(
    parent: NodeRef<'_>,
    depth: usize,
    x: f64,
    scale: f64,
    min_width: f64,
    rects: &mut Vec<FlameRect>,
) {
    // Offsets come from the running integer sum so rounding never drifts.
    let mut offset: u64 = 0;
    for child in parent.children() {
        let child_x = x + offset as f64 * scale;
        let child_width = child.value() as f64 * scale;
        offset += child.value();

        if child_width < min_width {
            continue;
        }
        rects.push(FlameRect {
            name: child.name().to_string(),
            depth,
            x: child_x,
            width: child_width,
            value: child.value(),
        });
        layout_children(child, depth + 1, child_x, scale, min_width, rects);
    }
}

/// Render the tree as an SVG document
pub fn render_svg(tree: &CallTree, options: &SvgOptions) -> String {
    let rects = layout(tree, options);
    let total = tree.total();
    let max_depth = rects.iter().map(|r| r.depth).max().unwrap_or(0);

    let frame_height = options.frame_height as usize;
    let image_width = options.width as f64 + 2.0 * SIDE_PAD;
    let image_height = TITLE_HEIGHT + (max_depth + 1) * frame_height + BOTTOM_PAD;

    let mut svg = String::with_capacity(512 + rects.len() * 256);
    svg.push_str("<?xml version=\"1.0\" standalone=\"no\"?>\n");
    let _ = writeln!(
        svg,
        r#"<svg version="1.1" width="{w:.2}" height="{h}" viewBox="0 0 {w:.2} {h}" xmlns="http://www.w3.org/2000/svg">"#,
        w = image_width,
        h = image_height
    );
    let _ = writeln!(
        svg,
        "<style>text {{ font-family: Verdana, sans-serif; font-size: {}px; fill: rgb(0,0,0); }} g:hover rect {{ stroke: black; stroke-width: 0.5; }}</style>",
        options.font_size
    );
    let _ = writeln!(
        svg,
        r#"<rect x="0" y="0" width="{:.2}" height="{}" fill="rgb(248,248,248)"/>"#,
        image_width, image_height
    );
    let _ = writeln!(
        svg,
        r#"<text x="{:.2}" y="24" text-anchor="middle" font-size="17">{}</text>"#,
        image_width / 2.0,
        escape_xml(&options.title)
    );
    let _ = writeln!(
        svg,
        r#"<text x="{:.2}" y="{}">Total: {} {}</text>"#,
        SIDE_PAD,
        image_height - 6,
        total,
        escape_xml(&options.unit)
    );

    for rect in &rects {
        // Root band at the bottom, callees stacked above their callers.
        let y = TITLE_HEIGHT + (max_depth - rect.depth) * frame_height;
        render_frame(&mut svg, rect, y, total, options);
    }

    svg.push_str("</svg>\n");
    svg
}

fn render_frame(svg: &mut String, rect: &FlameRect, y: usize, total: u64, options: &SvgOptions) {
    let name = escape_xml(&rect.name);
    let percent = if total == 0 {
        0.0
    } else {
        rect.value as f64 * 100.0 / total as f64
    };
    let x = rect.x + SIDE_PAD;
    let fill = if rect.depth == 0 {
        "rgb(200,200,200)".to_string()
    } else {
        frame_color(&rect.name)
    };

    let _ = write!(
        svg,
        r#"<g data-name="{name}"><title>{name} ({value} {unit}, {percent:.2}%)</title><rect x="{x:.2}" y="{y}" width="{width:.2}" height="{height}" fill="{fill}" rx="2" ry="2"/>"#,
        name = name,
        value = rect.value,
        unit = escape_xml(&options.unit),
        percent = percent,
        x = x,
        y = y,
        width = rect.width,
        height = options.frame_height.saturating_sub(1),
        fill = fill,
    );

    if let Some(label) = truncate_label(&rect.name, rect.width, options) {
        let _ = write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}">{}</text>"#,
            x + 3.0,
            y as f64 + options.frame_height as f64 * 0.75,
            escape_xml(&label)
        );
    }
    svg.push_str("</g>\n");
}

/// Fit a frame name into `width` pixels, cutting by characters and ending
/// with `..` when shortened.
pub fn truncate_label(name: &str, width: f64, options: &SvgOptions) -> Option<String> {
    if width < options.min_label_width || name.is_empty() {
        return None;
    }

    let char_width = options.font_size as f64 * CHAR_WIDTH_RATIO;
    let max_chars = ((width - 6.0) / char_width).floor().max(0.0) as usize;
    let length = name.chars().count();

    if length <= max_chars {
        Some(name.to_string())
    } else if max_chars >= 3 {
        let mut label: String = name.chars().take(max_chars - 2).collect();
        label.push_str("..");
        Some(label)
    } else {
        None
    }
}

/// Escape text for use in XML content and attribute values.
///
/// Characters XML 1.0 does not allow at all (C0 controls other than tab,
/// LF and CR, and U+FFFE / U+FFFF) become U+FFFD.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if c < '\u{20}' || c == '\u{fffe}' || c == '\u{ffff}' => {
                escaped.push(char::REPLACEMENT_CHARACTER)
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Warm palette color derived from an FNV-1a hash of the name
fn frame_color(name: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }

    let r = 205 + (hash % 50);
    let g = (hash >> 8) % 230;
    let b = (hash >> 16) % 55;
    format!("rgb({},{},{})", r, g, b)
}

/// Render the tree and write the SVG to disk
pub fn write_svg(
    tree: &CallTree,
    options: &SvgOptions,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Generating flamegraph: {}", output_path.display());

    let svg = render_svg(tree, options);
    write_text(&svg, output_path)?;

    info!(
        "Flamegraph written to {} ({:.2} KB)",
        output_path.display(),
        svg.len() as f64 / 1024.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> CallTree {
        let mut tree = CallTree::new();
        tree.insert(["main", "foo"], 3).unwrap();
        tree.insert(["main", "baz"], 1).unwrap();
        tree
    }

    #[test]
    fn test_layout_widths_and_offsets() {
        let options = SvgOptions::default().with_width(1000);
        let rects = layout(&sample_tree(), &options);

        let names: Vec<_> = rects.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["root", "main", "foo", "baz"]);

        assert_eq!(rects[0].width, 1000.0);
        assert_eq!(rects[1].width, 1000.0);
        assert_eq!(rects[2].x, 0.0);
        assert_eq!(rects[2].width, 750.0);
        assert_eq!(rects[3].x, 750.0);
        assert_eq!(rects[3].width, 250.0);
        assert_eq!(rects[3].depth, 2);
    }

    #[test]
    fn test_narrow_frames_are_pruned() {
        let mut tree = CallTree::new();
        tree.insert(["main"], 10_000).unwrap();
        tree.insert(["tiny", "deeper"], 1).unwrap();

        let options = SvgOptions::default().with_width(100);
        let rects = layout(&tree, &options);
        assert!(rects.iter().all(|r| r.name != "tiny" && r.name != "deeper"));
    }

    #[test]
    fn test_empty_tree_renders_root_band() {
        let tree = CallTree::new();
        let rects = layout(&tree, &SvgOptions::default());
        assert_eq!(rects.len(), 1);

        let svg = render_svg(&tree, &SvgOptions::default());
        assert!(svg.starts_with("<?xml"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Total: 0 samples"));
    }

    #[test]
    fn test_root_band_is_lowest() {
        let svg = render_svg(&sample_tree(), &SvgOptions::default());
        let y_of = |name: &str| -> usize {
            let start = svg.find(&format!("data-name=\"{}\"", name)).unwrap();
            let rest = &svg[start..];
            let y = rest.find(" y=\"").unwrap() + 4;
            let end = rest[y..].find('"').unwrap();
            rest[y..y + end].parse().unwrap()
        };
        assert!(y_of("root") > y_of("main"));
        assert!(y_of("main") > y_of("foo"));
    }

    #[test]
    fn test_names_are_escaped() {
        let mut tree = CallTree::new();
        tree.insert(["<T as Trait>::call&'x\""], 1).unwrap();

        let svg = render_svg(&tree, &SvgOptions::default());
        assert!(svg.contains("&lt;T as Trait&gt;::call&amp;&apos;x&quot;"));
        assert!(!svg.contains("<T as"));
    }

    #[test]
    fn test_escape_replaces_characters_xml_forbids() {
        assert_eq!(escape_xml("run\u{1}42"), "run\u{fffd}42");
        assert_eq!(escape_xml("a\u{0}b\u{1f}c\u{fffe}\u{ffff}"), "a\u{fffd}b\u{fffd}c\u{fffd}\u{fffd}");
        assert_eq!(escape_xml("tab\there\r\n"), "tab\there\r\n");
        assert_eq!(escape_xml("ok é 日本"), "ok é 日本");
    }

    #[test]
    fn test_control_characters_keep_the_document_well_formed() {
        let mut tree = CallTree::new();
        tree.insert(["main", "bell\u{7}frame"], 2).unwrap();
        let options = SvgOptions::default()
            .with_title("run\u{1}42")
            .with_unit("bytes\u{1b}");

        let svg = render_svg(&tree, &options);
        let document = roxmltree::Document::parse(&svg).unwrap();
        let title = document
            .descendants()
            .find(|n| n.has_tag_name("text"))
            .and_then(|n| n.text())
            .unwrap();
        assert_eq!(title, "run\u{fffd}42");
    }

    #[test]
    fn test_escaped_names_parse_back() {
        let name = "<T as Trait>::call&'x\"";
        let mut tree = CallTree::new();
        tree.insert(["main", name], 1).unwrap();

        let svg = render_svg(&tree, &SvgOptions::default());
        let document = roxmltree::Document::parse(&svg).unwrap();
        let names: Vec<_> = document
            .descendants()
            .filter_map(|n| n.attribute("data-name"))
            .collect();
        assert_eq!(names, vec!["root", "main", name]);
    }

    #[test]
    fn test_generated_trees_render_well_formed() {
        let alphabet = ["main", "a<b>", "c&d", "e'f", "g\"h", "plain", "x\u{2}y"];
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for round in 0..20 {
            let mut tree = CallTree::new();
            for _ in 0..(5 + round * 3) {
                let depth = 1 + (next() % 8) as usize;
                let path: Vec<&str> = (0..depth)
                    .map(|_| alphabet[(next() % alphabet.len() as u64) as usize])
                    .collect();
                tree.insert(path, 1 + next() % 1000).unwrap();
            }
            tree.validate().unwrap();

            let svg = render_svg(&tree, &SvgOptions::default().with_width(400));
            let document = roxmltree::Document::parse(&svg).unwrap();
            assert_eq!(document.root_element().tag_name().name(), "svg");
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let tree = sample_tree();
        let options = SvgOptions::default();
        assert_eq!(render_svg(&tree, &options), render_svg(&tree, &options));
    }

    #[test]
    fn test_truncate_label() {
        let options = SvgOptions::default();
        assert_eq!(truncate_label("main", 500.0, &options).as_deref(), Some("main"));
        assert_eq!(truncate_label("main", 5.0, &options), None);

        let label = truncate_label("a_very_long_function_name", 60.0, &options).unwrap();
        assert!(label.ends_with(".."));
        assert!(label.chars().count() < "a_very_long_function_name".len());
    }

    #[test]
    fn test_truncate_label_respects_char_boundaries() {
        let options = SvgOptions::default();
        let label = truncate_label("ÿÿÿÿÿÿÿÿÿÿÿÿÿÿÿÿ", 60.0, &options).unwrap();
        assert!(label.ends_with(".."));
    }

    #[test]
    fn test_frame_color_is_stable() {
        assert_eq!(frame_color("main"), frame_color("main"));
        assert!(frame_color("main").starts_with("rgb("));
    }

    #[test]
    fn test_write_svg() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("test.svg");

        let result = write_svg(&sample_tree(), &SvgOptions::default(), &output_path);
        assert!(result.is_ok());

        let contents = std::fs::read_to_string(output_path).unwrap();
        assert!(contents.contains("<svg"));
        assert!(contents.contains("main"));
    }
}
