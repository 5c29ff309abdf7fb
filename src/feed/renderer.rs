use regex::Regex;

use crate::models::{LogLine, RemoteEntry};

const DEFAULT_MAX_SENTENCES: usize = 3;
const DEFAULT_MAX_CHARS: usize = 500;

/// Turns a remote entry into the single-line twtxt record that gets appended.
pub struct EntryRenderer {
    max_sentences: usize,
    max_chars: usize,
    sentence_end: Regex,
    footnote: Regex,
}

impl EntryRenderer {
    pub fn new(max_sentences: usize, max_chars: usize) -> Self {
        Self {
            max_sentences,
            max_chars,
            sentence_end: Regex::new(r"[.!?]+[\)\]\x22']*(\s|$)").expect("valid sentence pattern"),
            footnote: Regex::new(r"(?m)^\[\d+\]: .*$|\[\d+\]").expect("valid footnote pattern"),
        }
    }

    /// Renders `entry`, or returns `None` when it has no publish date and
    /// therefore cannot be ordered.
    ///
    /// `media_uri` is the already-staged location of the entry's image, if any.
    pub fn render(&self, entry: &RemoteEntry, media_uri: Option<&str>) -> Option<LogLine> {
        let published_at = entry.published_at?;

        let mut text = format!("**{}**", collapse_whitespace(&entry.title));

        if let Some(excerpt) = entry.raw_content.as_deref().and_then(|c| self.excerpt(c)) {
            text.push_str(&format!("\n\n> {}", excerpt));
        }

        if let Some(uri) = media_uri {
            let alt = entry
                .image
                .as_ref()
                .and_then(|i| i.title.as_deref())
                .map(collapse_whitespace)
                .unwrap_or_default();
            text.push_str(&format!("\n\n📷 ![{}]({})", alt, uri));
        }

        if !entry.link.is_empty() {
            text.push_str(&format!("\n\n👓 [Read more...]({})", entry.link));
        }

        Some(LogLine::new(published_at, &text))
    }

    /// Plain-text summary of an HTML body: the first few sentences, hard-capped in length.
    pub fn excerpt(&self, html: &str) -> Option<String> {
        let text = match html2text::from_read(html.as_bytes(), 1000) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Failed to convert HTML to text: {}", e);
                return None;
            }
        };
        let text = self.footnote.replace_all(&text, "");
        let text = collapse_whitespace(&text);
        if text.is_empty() {
            return None;
        }

        let cut = self
            .sentence_end
            .find_iter(&text)
            .nth(self.max_sentences.saturating_sub(1))
            .map(|m| m.end())
            .unwrap_or(text.len());
        let summary = text[..cut].trim_end();

        Some(truncate_chars(summary, self.max_chars))
    }
}

impl Default for EntryRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SENTENCES, DEFAULT_MAX_CHARS)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters, ellipsis included.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}
