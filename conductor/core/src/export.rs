//! Conversation Export
//!
//! Renders the conversation as Markdown, or as a standalone HTML page meant
//! for printing. The Markdown layout:
//!
//! ```text
//! # Chat Export
//!
//! **File:** minutes.txt
//!
//! **Exported:** 2024-05-01 10:00:00 UTC
//!
//! ---
//!
//! ## You - 2024-05-01 09:59:00 UTC
//!
//! What are the main topics?
//!
//! ---
//!
//! ## Assistant - 2024-05-01 09:59:02 UTC
//! ...
//! ```

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::messages::MessageRole;
use crate::store::Message;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

const PRINT_STYLE: &str = "\
body { font-family: system-ui, -apple-system, sans-serif; margin: 40px; line-height: 1.6; color: #333; }
.header { border-bottom: 2px solid #ddd; padding-bottom: 20px; margin-bottom: 30px; }
.message { margin-bottom: 30px; padding: 15px; }
.message-header { font-weight: bold; color: #666; margin-bottom: 10px; }
.user { background: #f0f9ff; border-left: 4px solid #0ea5e9; }
.assistant { background: #f8fafc; border-left: 4px solid #64748b; }
.raw-data { background: #1e293b; color: #e2e8f0; padding: 15px; border-radius: 8px; overflow-x: auto; margin-top: 15px; }
.raw-data pre { margin: 0; font-size: 12px; }
.timestamp { font-size: 14px; color: #9ca3af; font-weight: normal; }
@media print { body { margin: 0; } }
";

/// Export document format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// Markdown document
    #[default]
    Markdown,
    /// Printable HTML page
    Html,
}

impl ExportFormat {
    /// Pick the format from a file extension; anything but `.html`/`.htm` is Markdown
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => {
                Self::Html
            }
            _ => Self::Markdown,
        }
    }

    /// File extension for this format, without the leading dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }

    /// Render in this format; `None` for an empty conversation
    #[must_use]
    pub fn render(
        self,
        messages: &[Message],
        uploaded_file: Option<&str>,
        exported_at: DateTime<Utc>,
    ) -> Option<String> {
        match self {
            Self::Markdown => render_markdown(messages, uploaded_file, exported_at),
            Self::Html => render_html(messages, uploaded_file, exported_at),
        }
    }
}

/// Render messages as Markdown
///
/// Returns `None` for an empty conversation; there is nothing to export.
#[must_use]
pub fn render_markdown(
    messages: &[Message],
    uploaded_file: Option<&str>,
    exported_at: DateTime<Utc>,
) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let mut markdown = String::from("# Chat Export\n\n");
    if let Some(file) = uploaded_file {
        markdown.push_str(&format!("**File:** {file}\n\n"));
    }
    markdown.push_str(&format!(
        "**Exported:** {}\n\n---\n\n",
        exported_at.format(TIMESTAMP_FORMAT)
    ));

    for (index, message) in messages.iter().enumerate() {
        markdown.push_str(&format!(
            "## {} - {}\n\n",
            message.role.display_name(),
            message.created_at.format(TIMESTAMP_FORMAT)
        ));
        markdown.push_str(&message.content);
        markdown.push_str("\n\n");

        if let Some(ref data) = message.auxiliary_data {
            markdown.push_str("### Raw Data\n\n```json\n");
            markdown.push_str(&data.to_pretty_json());
            markdown.push_str("\n```\n\n");
        }

        if index + 1 < messages.len() {
            markdown.push_str("---\n\n");
        }
    }

    Some(markdown)
}

/// Render messages as a printable HTML page
///
/// Same content as the Markdown export. Message text is escaped and line
/// breaks are kept. Returns `None` for an empty conversation.
#[must_use]
pub fn render_html(
    messages: &[Message],
    uploaded_file: Option<&str>,
    exported_at: DateTime<Utc>,
) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Chat Export</title>\n<style>\n{PRINT_STYLE}</style>\n</head>\n<body>\n"
    );
    html.push_str("<div class=\"header\">\n<h1>Chat Export</h1>\n");
    if let Some(file) = uploaded_file {
        html.push_str(&format!(
            "<p><strong>File:</strong> {}</p>\n",
            escape_html(file)
        ));
    }
    html.push_str(&format!(
        "<p><strong>Exported:</strong> {}</p>\n</div>\n",
        exported_at.format(TIMESTAMP_FORMAT)
    ));

    for message in messages {
        let class = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        html.push_str(&format!(
            "<div class=\"message {class}\">\n<div class=\"message-header\">{} <span class=\"timestamp\">{}</span></div>\n",
            message.role.display_name(),
            message.created_at.format(TIMESTAMP_FORMAT)
        ));
        html.push_str(&format!(
            "<div>{}</div>\n",
            escape_html(&message.content).replace('\n', "<br>")
        ));
        if let Some(ref data) = message.auxiliary_data {
            html.push_str(&format!(
                "<div class=\"raw-data\">\n<strong>Raw Data:</strong>\n<pre>{}</pre>\n</div>\n",
                escape_html(&data.to_pretty_json())
            ));
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    Some(html)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Default export file name, e.g. `chat-export-2024-05-01.md`
#[must_use]
pub fn default_file_name(date: NaiveDate, format: ExportFormat) -> String {
    format!(
        "chat-export-{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Write an export to disk
///
/// Returns `Ok(false)` without touching the filesystem when there is nothing
/// to export.
///
/// # Errors
///
/// Returns the underlying IO error if the file cannot be written.
pub async fn write_export(
    path: &Path,
    format: ExportFormat,
    messages: &[Message],
    uploaded_file: Option<&str>,
) -> std::io::Result<bool> {
    let Some(document) = format.render(messages, uploaded_file, Utc::now()) else {
        return Ok(false);
    };
    tokio::fs::write(path, document).await?;
    tracing::info!(
        path = %path.display(),
        ?format,
        messages = messages.len(),
        "Conversation exported"
    );
    Ok(true)
}
