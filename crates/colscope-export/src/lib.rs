//! Renderers for colscope lineage graphs.
//!
//! Every renderer walks the graph iteratively, so arbitrarily deep graphs
//! export without growing the stack.

mod error;
mod html;
mod json;
mod mermaid;
mod naming;
mod text;

use std::path::{Path, PathBuf};

use colscope_core::Node;

pub use error::ExportError;
pub use html::render_report;
pub use json::export_json;
pub use mermaid::export_mermaid;
pub use naming::{ExportFormat, ExportNaming};
pub use text::export_text_tree;

/// Renders `node` in `format`. The report title and timestamp come from
/// `naming`.
pub fn export(node: &Node, format: ExportFormat, naming: &ExportNaming) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json { compact } => export_json(node, compact),
        ExportFormat::Mermaid => Ok(export_mermaid(node)),
        ExportFormat::Html => Ok(render_report(node, &node.name, naming.exported_at())),
        ExportFormat::Text => Ok(export_text_tree(node)),
    }
}

/// Renders `node` into a new file in `dir`, named by `naming`, and returns
/// its path.
pub fn write_to_dir(
    node: &Node,
    format: ExportFormat,
    naming: &ExportNaming,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let content = export(node, format, naming)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(naming.filename(format));
    std::fs::write(&path, content)?;
    Ok(path)
}
