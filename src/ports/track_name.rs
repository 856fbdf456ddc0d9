use color_eyre::eyre::{Result, WrapErr};
use regex::Regex;

/// Splits a free-form upload title into `(artist, title)`.
pub trait TrackNameParser: Send + Sync {
    fn split_artist_title(&self, name: &str) -> Option<(String, String)>;
}

/// Parser for the common `Artist - Title (Official Video)` layout.
pub struct SeparatorParser {
    noise: Regex,
    separator: Regex,
}

impl SeparatorParser {
    pub fn new() -> Result<Self> {
        let noise = Regex::new(
            r"(?i)\s*[\(\[][^\)\]]*\b(official|video|audio|lyrics?|visuali[sz]er|hd|hq|4k)\b[^\)\]]*[\)\]]",
        )
        .wrap_err("Failed to create regex")?;
        let separator = Regex::new(r"\s+[-–—|]+\s+").wrap_err("Failed to create regex")?;
        Ok(Self { noise, separator })
    }
}

fn unquote(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
}

impl TrackNameParser for SeparatorParser {
    fn split_artist_title(&self, name: &str) -> Option<(String, String)> {
        let cleaned = self.noise.replace_all(name, "");
        let mut parts = self.separator.splitn(&cleaned, 2);
        let artist = unquote(parts.next()?);
        let title = unquote(parts.next()?);
        if artist.is_empty() || title.is_empty() {
            return None;
        }
        Some((artist.to_string(), title.to_string()))
    }
}
