//! Email body normalization before extraction: HTML renders to text,
//! plain text passes through unchanged.

const RENDER_WIDTH: usize = 80;

/// The text handed to the extractor, or `None` when the email carries no
/// content at all.
pub fn email_content(html_body: &str, text_body: &str) -> Option<String> {
    if !html_body.trim().is_empty() {
        let rendered = html2text::from_read(html_body.as_bytes(), RENDER_WIDTH);
        if !rendered.trim().is_empty() {
            return Some(rendered);
        }
    }
    if !text_body.trim().is_empty() {
        return Some(text_body.to_string());
    }
    None
}
