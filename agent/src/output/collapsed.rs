//! Collapsed stack output
//!
//! One line per node with self weight: `main;foo;bar 42`. The format is
//! understood by flamegraph.pl, inferno and speedscope.

use super::{write_text, OutputError};
use crate::calltree::{CallTree, NodeRef};
use std::path::Path;
use tracing::info;

/// Render the tree as folded stacks, depth first in insertion order
pub fn to_collapsed(tree: &CallTree) -> String {
    let mut output = String::new();
    let mut path = Vec::new();
    for child in tree.root().children() {
        fold(child, &mut path, &mut output);
    }
    output
}

fn fold<'a>(node: NodeRef<'a>, path: &mut Vec<&'a str>, output: &mut String) {
    path.push(node.name());

    let self_value = node.self_value();
    if self_value > 0 {
        output.push_str(&path.join(";"));
        output.push(' ');
        output.push_str(&self_value.to_string());
        output.push('\n');
    }
    for child in node.children() {
        fold(child, path, output);
    }

    path.pop();
}

/// Write folded stacks to a file
pub fn write_collapsed(tree: &CallTree, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    let folded = to_collapsed(tree);
    write_text(&folded, output_path)?;
    info!(
        "Collapsed stacks written to {} ({} bytes)",
        output_path.display(),
        folded.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folded_lines() {
        let mut tree = CallTree::new();
        tree.insert(["main", "foo"], 3).unwrap();
        tree.insert(["main", "baz"], 2).unwrap();
        tree.insert(["main"], 1).unwrap();

        assert_eq!(to_collapsed(&tree), "main 1\nmain;foo 3\nmain;baz 2\n");
    }

    #[test]
    fn test_empty_tree_is_empty_text() {
        assert!(to_collapsed(&CallTree::new()).is_empty());
    }

    #[test]
    fn test_write_collapsed_creates_parent_dirs() {
        let mut tree = CallTree::new();
        tree.insert(["main", "work"], 5).unwrap();

        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("nested").join("cpu.folded");
        write_collapsed(&tree, &output_path).unwrap();

        let contents = std::fs::read_to_string(output_path).unwrap();
        assert_eq!(contents, "main;work 5\n");
    }
}
