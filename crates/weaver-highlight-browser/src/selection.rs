//! DOM selection capture.
//!
//! Reads the browser selection and describes both endpoints as child-index
//! paths from the content root, which the engine resolves against its parsed
//! copy of the same markup.

use weaver_highlight::{NodePath, PathSelection, PlatformError, SelectionSource};

/// Selection source bound to one content root.
#[derive(Debug, Clone)]
pub struct DomSelectionSource {
    content_root: web_sys::Element,
}

impl DomSelectionSource {
    pub fn new(content_root: web_sys::Element) -> Self {
        Self { content_root }
    }
}

impl SelectionSource for DomSelectionSource {
    fn read_selection(&self) -> Result<Option<PathSelection>, PlatformError> {
        let window = web_sys::window().ok_or("no window")?;
        let Some(selection) = window
            .get_selection()
            .map_err(|e| PlatformError::from(format!("get_selection failed: {e:?}")))?
        else {
            return Ok(None);
        };
        if selection.range_count() == 0 {
            return Ok(None);
        }

        let (Some(anchor_node), Some(focus_node)) = (selection.anchor_node(), selection.focus_node())
        else {
            return Ok(None);
        };

        let root: &web_sys::Node = self.content_root.as_ref();
        let (Some(anchor_path), Some(focus_path)) = (
            path_from_root(root, &anchor_node),
            path_from_root(root, &focus_node),
        ) else {
            tracing::trace!(
                target: "weaver::highlight::selection",
                anchor = %anchor_node.node_name(),
                focus = %focus_node.node_name(),
                "selection outside content root"
            );
            return Ok(None);
        };

        Ok(Some(PathSelection {
            anchor_path,
            anchor_offset: selection.anchor_offset() as usize,
            focus_path,
            focus_offset: selection.focus_offset() as usize,
        }))
    }
}

/// Child-index path from `root` down to `node`.
///
/// `None` if `node` is not `root` or one of its descendants.
pub fn path_from_root(root: &web_sys::Node, node: &web_sys::Node) -> Option<NodePath> {
    let mut path = Vec::new();
    let mut current = node.clone();
    while !current.is_same_node(Some(root)) {
        let mut index = 0;
        let mut sibling = current.previous_sibling();
        while let Some(s) = sibling {
            index += 1;
            sibling = s.previous_sibling();
        }
        path.push(index);
        current = current.parent_node()?;
    }
    path.reverse();
    Some(path)
}
