//! JSON output
//!
//! Exports the call tree as a nested `{name, value, children}` document.

use super::OutputError;
use crate::calltree::NodeRef;
use flareprof_shared::types::profile::FlamegraphNode;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Convert a subtree into its JSON document form, children in insertion order
pub fn to_document(node: NodeRef<'_>) -> FlamegraphNode {
    FlamegraphNode {
        name: node.name().to_string(),
        value: node.value(),
        children: node.children().map(to_document).collect(),
    }
}

/// Generate JSON output from a flamegraph document
pub fn write_json(document: &FlamegraphNode, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Generating JSON output: {}", output_path.display());

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.flush()?;

    info!("JSON output written to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calltree::CallTree;

    #[test]
    fn test_empty_tree_document() {
        let tree = CallTree::new();
        let json = serde_json::to_string(&to_document(tree.root())).unwrap();
        assert_eq!(json, r#"{"name":"root","value":0,"children":[]}"#);
    }

    #[test]
    fn test_document_keeps_insertion_order() {
        let mut tree = CallTree::new();
        tree.insert(["main", "zeta"], 1).unwrap();
        tree.insert(["main", "alpha"], 3).unwrap();

        let document = to_document(tree.root());
        let main = &document.children[0];
        assert_eq!(main.value, 4);
        assert_eq!(main.children[0].name, "zeta");
        assert_eq!(main.children[1].name, "alpha");
    }

    #[test]
    fn test_write_json() {
        let mut tree = CallTree::new();
        tree.insert(["main"], 2).unwrap();

        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("test.json");

        let result = write_json(&to_document(tree.root()), &output_path);
        assert!(result.is_ok());

        // Verify file was created
        assert!(output_path.exists());

        // Verify valid JSON
        let contents = std::fs::read_to_string(output_path).unwrap();
        let parsed: FlamegraphNode = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.value, 2);
    }
}
