//! Grouped key-value documents
//!
//! The format used by plugin descriptors: `[Group]` headers, `Key=Value`
//! entries, `Key[locale]=Value` translations and `#` comments. Values are
//! stored raw and unescaped on lookup.

use std::collections::HashMap;
use thiserror::Error;

/// Syntax error in a grouped key-value document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct KeyFileError {
    /// 1-based line number
    pub line: usize,
    /// What was wrong with it
    pub message: String,
}

impl KeyFileError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    name: String,
    entries: HashMap<String, String>,
}

/// A parsed grouped key-value document
#[derive(Debug, Default)]
pub struct KeyFile {
    groups: Vec<Group>,
}

impl KeyFile {
    /// Parse a document.
    ///
    /// Repeated groups are merged, and a repeated key keeps its last value.
    pub fn parse(content: &str) -> Result<Self, KeyFileError> {
        let mut file = KeyFile::default();
        let mut current: Option<usize> = None;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim_start();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .trim_end()
                    .strip_suffix(']')
                    .ok_or_else(|| KeyFileError::new(line_no, "unterminated group header"))?;
                if name.is_empty() || name.contains(['[', ']']) {
                    return Err(KeyFileError::new(line_no, "invalid group name"));
                }
                current = Some(file.group_index_or_insert(name));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(KeyFileError::new(
                    line_no,
                    format!("expected key=value, found '{}'", line.trim_end()),
                ));
            };

            let key = key.trim_end();
            if key.is_empty() {
                return Err(KeyFileError::new(line_no, "empty key"));
            }
            if !is_valid_key(key) {
                return Err(KeyFileError::new(line_no, format!("invalid key '{key}'")));
            }

            let Some(group) = current else {
                return Err(KeyFileError::new(line_no, "key outside of any group"));
            };

            file.groups[group]
                .entries
                .insert(key.to_string(), value.trim_start().to_string());
        }

        Ok(file)
    }

    fn group_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(idx) = self.groups.iter().position(|g| g.name == name) {
            return idx;
        }
        self.groups.push(Group {
            name: name.to_string(),
            entries: HashMap::new(),
        });
        self.groups.len() - 1
    }

    fn raw(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .and_then(|g| g.entries.get(key))
            .map(String::as_str)
    }

    /// Check whether a group is present
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.name == group)
    }

    /// Check whether an untranslated key is present in a group
    pub fn has_key(&self, group: &str, key: &str) -> bool {
        self.raw(group, key).is_some()
    }

    /// Get a string value with escapes resolved
    pub fn get_string(&self, group: &str, key: &str) -> Option<String> {
        self.raw(group, key).map(|v| unescape(v, false))
    }

    /// Get a string value, preferring the best translation for `locales`.
    ///
    /// Each locale is expanded into its variants (`lang_COUNTRY@modifier`,
    /// `lang_COUNTRY`, `lang@modifier`, `lang`) before falling back to the
    /// untranslated key.
    pub fn get_locale_string(&self, group: &str, key: &str, locales: &[String]) -> Option<String> {
        locales
            .iter()
            .flat_map(|locale| locale_variants(locale))
            .find_map(|variant| self.raw(group, &format!("{key}[{variant}]")))
            .or_else(|| self.raw(group, key))
            .map(|v| unescape(v, false))
    }

    /// Get a `;`-separated list value. A trailing separator is allowed.
    pub fn get_string_list(&self, group: &str, key: &str) -> Option<Vec<String>> {
        self.raw(group, key).map(split_list)
    }

    /// Get an integer value; `None` if absent or not a valid integer
    pub fn get_integer(&self, group: &str, key: &str) -> Option<i32> {
        self.raw(group, key).and_then(|v| v.trim().parse().ok())
    }
}

fn is_valid_key(key: &str) -> bool {
    match key.split_once('[') {
        Some((base, locale)) => {
            !base.is_empty()
                && locale
                    .strip_suffix(']')
                    .is_some_and(|l| !l.is_empty() && !l.contains(['[', ']']))
        }
        None => !key.contains(']'),
    }
}

fn unescape(value: &str, in_list: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(';') if in_list => out.push(';'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ';' => {
                items.push(unescape(&value[start..idx], true));
                start = idx + 1;
            }
            _ => {}
        }
    }

    if start < value.len() {
        items.push(unescape(&value[start..], true));
    }

    items
}

/// Expand a locale name into the variants tried for a translated key.
///
/// The codeset is ignored: `sr_RS.UTF-8@latin` yields `sr_RS@latin`,
/// `sr_RS`, `sr@latin`, `sr`.
pub fn locale_variants(locale: &str) -> Vec<String> {
    let (rest, modifier) = match locale.split_once('@') {
        Some((rest, modifier)) => (rest, Some(modifier)),
        None => (locale, None),
    };
    let rest = rest.split('.').next().unwrap_or(rest);
    let (lang, territory) = match rest.split_once('_') {
        Some((lang, territory)) => (lang, Some(territory)),
        None => (rest, None),
    };

    if lang.is_empty() {
        return Vec::new();
    }

    let mut variants = Vec::with_capacity(4);
    if let Some(territory) = territory {
        if let Some(modifier) = modifier {
            variants.push(format!("{lang}_{territory}@{modifier}"));
        }
        variants.push(format!("{lang}_{territory}"));
    }
    if let Some(modifier) = modifier {
        variants.push(format!("{lang}@{modifier}"));
    }
    variants.push(lang.to_string());
    variants
}

/// Locales requested by the environment, most preferred first.
///
/// `LANGUAGE` may list several locales separated by `:`; after it the first
/// non-empty of `LC_ALL`, `LC_MESSAGES` and `LANG` is used. `C` and `POSIX`
/// mean "untranslated" and are skipped.
pub fn system_locales() -> Vec<String> {
    let mut locales: Vec<String> = Vec::new();
    let mut push = |value: &str| {
        if !value.is_empty()
            && value != "C"
            && value != "POSIX"
            && !locales.iter().any(|l| l == value)
        {
            locales.push(value.to_string());
        }
    };

    if let Ok(language) = std::env::var("LANGUAGE") {
        language.split(':').for_each(&mut push);
    }

    if let Some(value) = ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty())
    {
        push(&value);
    }

    locales
}
