use colscope_core::Node;

use crate::ExportError;

pub fn export_json(node: &Node, compact: bool) -> Result<String, ExportError> {
    if compact {
        Ok(serde_json::to_string(node)?)
    } else {
        Ok(serde_json::to_string_pretty(node)?)
    }
}
