use chrono::{DateTime, Utc};

/// Output formats for a lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json { compact: bool },
    Mermaid,
    Html,
    Text,
}

/// File naming for exports written to a directory: the sanitized traced
/// column, the export time, and a format suffix.
#[derive(Debug, Clone)]
pub struct ExportNaming {
    column: String,
    exported_at: DateTime<Utc>,
}

impl ExportNaming {
    pub fn new(column: impl Into<String>) -> Self {
        Self::with_exported_at(column, Utc::now())
    }

    pub fn with_exported_at(column: impl Into<String>, exported_at: DateTime<Utc>) -> Self {
        Self {
            column: sanitize_name(&column.into()),
            exported_at,
        }
    }

    pub fn exported_at(&self) -> DateTime<Utc> {
        self.exported_at
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn filename(&self, format: ExportFormat) -> String {
        let timestamp = self.exported_at.format("%Y%m%d-%H%M%S");
        let (suffix, extension) = format_filename_parts(format);
        format!("{}-{}-{}.{}", self.column, timestamp, suffix, extension)
    }
}

fn format_filename_parts(format: ExportFormat) -> (&'static str, &'static str) {
    match format {
        ExportFormat::Json { .. } => ("lineage", "json"),
        ExportFormat::Mermaid => ("mermaid", "mmd"),
        ExportFormat::Html => ("report", "html"),
        ExportFormat::Text => ("tree", "txt"),
    }
}

fn sanitize_name(name: &str) -> String {
    let mut cleaned = String::new();
    let mut last_dash = false;

    for ch in name.trim().chars() {
        let normalized = ch.to_ascii_lowercase();
        if normalized.is_ascii_alphanumeric() {
            cleaned.push(normalized);
            last_dash = false;
        } else if matches!(normalized, '-' | '_' | ' ' | '.') && !last_dash {
            cleaned.push('-');
            last_dash = true;
        }
    }

    let cleaned = cleaned.trim_matches('-').to_string();
    if cleaned.is_empty() {
        "lineage".to_string()
    } else {
        cleaned
    }
}
