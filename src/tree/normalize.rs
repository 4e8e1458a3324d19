//! Normalization of provider output into one canonical tree shape.
//!
//! Providers disagree on encoding: `npm ls` prints one document whose
//! `dependencies` is a name-keyed mapping, `pnpm ls` prints a list of roots,
//! and `yarn list` prints a stream of JSON lines where one line carries the
//! tree (`children` lists with `name@version` names). All of them become
//! `Vec<TreeNode>` before traversal.

use serde_json::Value;

use crate::error::DiscoveryError;

/// A node of the declared dependency tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeNode {
    pub name: Option<String>,
    pub version: Option<String>,
    pub path: Option<String>,
    /// Where the package was resolved from (URL, `file:` spec or path)
    pub resolved: Option<String>,
    pub dependencies: Vec<TreeNode>,
}

impl TreeNode {
    /// Convert one JSON node. `key` is the mapping key the node was found
    /// under and fills a missing `name`. Non-object values are not nodes.
    pub fn from_value(value: &Value, key: Option<&str>) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |field: &str| {
            obj.get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let dependencies = match obj.get("dependencies") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| Self::from_value(item, None))
                .collect(),
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(name, item)| Self::from_value(item, Some(name)))
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            name: text("name").or_else(|| key.filter(|k| !k.is_empty()).map(str::to_string)),
            version: text("version"),
            path: text("path"),
            resolved: text("resolved"),
            dependencies,
        })
    }

    /// Convert a yarn `list --json` tree entry (`{"name": "a@1.0.0", "children": [..]}`).
    fn from_yarn(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let spec = obj.get("name").and_then(Value::as_str)?;
        // The version separator is the last '@' that is not the leading group marker
        let (name, version) = match spec.rfind('@') {
            Some(idx) if idx > 0 => (&spec[..idx], Some(spec[idx + 1..].to_string())),
            _ => (spec, None),
        };

        let dependencies = obj
            .get("children")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::from_yarn).collect())
            .unwrap_or_default();

        Some(Self {
            name: Some(name.to_string()),
            version: version.filter(|v| !v.is_empty()),
            path: None,
            resolved: None,
            dependencies,
        })
    }
}

/// Parse raw provider output into a list of root nodes.
pub fn parse_tree_output(output: &str) -> Result<Vec<TreeNode>, DiscoveryError> {
    let document = match serde_json::from_str::<Value>(output.trim()) {
        Ok(value) => value,
        Err(_) => output
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
            .find(is_tree_document)
            .ok_or_else(|| {
                DiscoveryError::MalformedOutput(format!(
                    "no JSON tree document in {} bytes of output",
                    output.len()
                ))
            })?,
    };

    roots_of(&document).ok_or_else(|| {
        DiscoveryError::MalformedOutput("tree document is neither an object nor a list".into())
    })
}

/// A line stream may interleave log events (`{"type":"info",..}`) with the tree.
fn is_tree_document(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some(kind) => kind == "tree",
            None => true,
        },
        _ => false,
    }
}

fn roots_of(document: &Value) -> Option<Vec<TreeNode>> {
    match document {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| TreeNode::from_value(item, None))
                .collect(),
        ),
        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("tree") => {
            let trees = obj
                .get("data")
                .and_then(|data| data.get("trees"))
                .and_then(Value::as_array)?;
            // yarn reports the dependencies of an unnamed project root
            Some(vec![TreeNode {
                dependencies: trees.iter().filter_map(TreeNode::from_yarn).collect(),
                ..Default::default()
            }])
        }
        Value::Object(_) => TreeNode::from_value(document, None).map(|root| vec![root]),
        _ => None,
    }
}
