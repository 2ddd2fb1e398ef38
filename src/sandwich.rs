//! HTML sandwich templating (§6 "HTML sandwich", GLOSSARY "Sandwich
//! mode"): wraps a JSON artifact in an HTML template by splitting it at
//! two literal markers and concatenating prefix + meta-description +
//! middle + JSON + suffix.

const META_MARKER: &str = "<!-- libjsongit2:meta-description -->";
const JSON_MARKER: &str = "<!-- libjsongit2:initial-json -->";

/// A template pre-split at its two markers, loaded once per vhost and
/// shared by every context that requests sandwich mode.
#[derive(Clone)]
pub struct SandwichTemplate {
    prefix: String,
    middle: String,
    suffix: String,
}

impl SandwichTemplate {
    pub fn parse(source: &str) -> Option<Self> {
        let meta_pos = source.find(META_MARKER)?;
        let after_meta = meta_pos + META_MARKER.len();
        let json_pos = source[after_meta..].find(JSON_MARKER)? + after_meta;
        let after_json = json_pos + JSON_MARKER.len();

        Some(Self {
            prefix: source[..meta_pos].to_string(),
            middle: source[after_meta..json_pos].to_string(),
            suffix: source[after_json..].to_string(),
        })
    }

    /// Emits `[prefix] <meta description> [middle] <JSON> [suffix]`
    /// (§6). `meta_description` should already be purified.
    pub fn render(&self, meta_description: &str, json_body: &str) -> String {
        let mut out = String::with_capacity(
            self.prefix.len() + meta_description.len() + self.middle.len() + json_body.len() + self.suffix.len(),
        );
        out.push_str(&self.prefix);
        out.push_str(meta_description);
        out.push_str(&self.middle);
        out.push_str(json_body);
        out.push_str(&self.suffix);
        out
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn middle(&self) -> &str {
        &self.middle
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}
