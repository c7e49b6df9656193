//! Cross-platform path canonicalization and reserved-character codecs.
//!
//! Canonical paths are `/`-joined component lists. Each component is passed
//! through a [`PathCodec`] so names that are legal on one platform but
//! reserved on another (`<>:"/\|?*`) survive the trip into the catalog.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Characters that cannot appear literally in a canonical path component.
pub const RESERVED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Token table for [`PathCodec::LegacyTokens`].
const LEGACY_TOKENS: [(char, &str); 9] = [
    ('<', "_lt_"),
    ('>', "_gt_"),
    (':', "_cln_"),
    ('"', "_qt_"),
    ('/', "_sl_"),
    ('\\', "_bsl_"),
    ('|', "_bar_"),
    ('?', "_qm_"),
    ('*', "_ast_"),
];

/// Reserved-character substitution scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathCodec {
    /// `%XX` escapes for reserved bytes and `%` itself.
    #[default]
    Percent,
    /// Literal `_xx_` tokens written by older indexers.
    LegacyTokens,
}

impl PathCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathCodec::Percent => "percent",
            PathCodec::LegacyTokens => "legacy-tokens",
        }
    }

    /// Encode one path component.
    pub fn encode(&self, name: &str) -> String {
        match self {
            PathCodec::Percent => {
                let mut out = String::with_capacity(name.len());
                for c in name.chars() {
                    if c == '%' || RESERVED.contains(&c) {
                        out.push_str(&format!("%{:02X}", c as u32));
                    } else {
                        out.push(c);
                    }
                }
                out
            }
            PathCodec::LegacyTokens => {
                let mut out = String::with_capacity(name.len());
                for c in name.chars() {
                    match LEGACY_TOKENS.iter().find(|(r, _)| *r == c) {
                        Some((_, token)) => out.push_str(token),
                        None => out.push(c),
                    }
                }
                out
            }
        }
    }

    /// Decode one path component. Sequences that are not escapes are kept verbatim.
    pub fn decode(&self, encoded: &str) -> String {
        match self {
            PathCodec::Percent => decode_percent(encoded),
            PathCodec::LegacyTokens => decode_tokens(encoded),
        }
    }
}

impl FromStr for PathCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(PathCodec::Percent),
            "legacy-tokens" | "legacy" => Ok(PathCodec::LegacyTokens),
            other => Err(format!("unknown path codec: {}", other)),
        }
    }
}

fn decode_percent(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let escaped = tail
            .get(1..3)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .map(char::from)
            .filter(|c| *c == '%' || RESERVED.contains(c));
        match escaped {
            Some(c) => {
                out.push(c);
                rest = &tail[3..];
            }
            None => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_tokens(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    'scan: while !rest.is_empty() {
        if rest.starts_with('_') {
            for (c, token) in LEGACY_TOKENS {
                if let Some(after) = rest.strip_prefix(token) {
                    out.push(c);
                    rest = after;
                    continue 'scan;
                }
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// How native paths are separated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStyle {
    /// `/` only.
    Posix,
    /// `/` or `\`, optional drive-letter prefix.
    Windows,
}

impl PathStyle {
    fn is_separator(self, c: char) -> bool {
        c == '/' || (self == PathStyle::Windows && c == '\\')
    }
}

/// `Some('C')` if the path starts with a drive letter.
pub fn drive_prefix(native: &str) -> Option<char> {
    let mut chars = native.chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some(letter.to_ascii_uppercase())
    } else {
        None
    }
}

/// Split a native path into its parent and final component.
///
/// The parent is `None` for file-system roots (`/`, `C:\`) and for bare
/// names without a separator. A parent at the root keeps its trailing
/// separator, so `/a` splits into `/` and `a`.
pub fn split_native(native: &str, style: PathStyle) -> (Option<&str>, &str) {
    let trimmed = native.trim_end_matches(|c: char| style.is_separator(c));
    let Some(idx) = trimmed.rfind(|c: char| style.is_separator(c)) else {
        let name = if trimmed.is_empty() { native } else { trimmed };
        return (None, name);
    };
    let name = &trimmed[idx + 1..];
    let head = trimmed[..idx].trim_end_matches(|c: char| style.is_separator(c));
    let at_root = head.is_empty()
        || (style == PathStyle::Windows && head.len() == 2 && drive_prefix(head).is_some());
    let parent = if at_root { &trimmed[..=idx] } else { head };
    (Some(parent), name)
}

/// Convert a native path into its canonical catalog form.
///
/// Drive prefixes are upper-cased and kept verbatim, every other component is
/// encoded with `codec`. Empty components (doubled or trailing separators)
/// are dropped. Absolute POSIX paths keep their leading `/`.
pub fn canonicalize(native: &str, style: PathStyle, codec: PathCodec) -> String {
    match style {
        PathStyle::Windows => {
            let (drive, rest) = match drive_prefix(native) {
                Some(letter) => (Some(letter), &native[2..]),
                None => (None, native),
            };
            let mut parts: Vec<String> = Vec::new();
            if let Some(letter) = drive {
                parts.push(format!("{}:", letter));
            }
            parts.extend(
                rest.split(['/', '\\'])
                    .filter(|c| !c.is_empty())
                    .map(|c| codec.encode(c)),
            );
            let joined = parts.join("/");
            if drive.is_none() && (native.starts_with('\\') || native.starts_with('/')) {
                format!("/{}", joined)
            } else {
                joined
            }
        }
        PathStyle::Posix => {
            let joined = native
                .split('/')
                .filter(|c| !c.is_empty())
                .map(|c| codec.encode(c))
                .collect::<Vec<_>>()
                .join("/");
            if native.starts_with('/') {
                format!("/{}", joined)
            } else {
                joined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_percent_encode() {
        let codec = PathCodec::Percent;
        assert_eq!(codec.encode("a:b"), "a%3Ab");
        assert_eq!(codec.encode("100%"), "100%25");
        assert_eq!(codec.encode("plain.txt"), "plain.txt");
        assert_eq!(codec.encode("<>\"|?*"), "%3C%3E%22%7C%3F%2A");
    }

    #[test]
    fn test_percent_decode_leaves_unknown_escapes() {
        let codec = PathCodec::Percent;
        assert_eq!(codec.decode("a%3Ab"), "a:b");
        assert_eq!(codec.decode("a%3ab"), "a:b");
        assert_eq!(codec.decode("%41%"), "%41%");
        assert_eq!(codec.decode("%2"), "%2");
    }

    #[test]
    fn test_legacy_tokens() {
        let codec = PathCodec::LegacyTokens;
        assert_eq!(codec.encode("a:b?"), "a_cln_b_qm_");
        assert_eq!(codec.decode("a_cln_b_qm_"), "a:b?");
        // A name that already contains a token does not round-trip.
        assert_ne!(codec.decode(&codec.encode("x_lt_y")), "x_lt_y");
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("percent".parse::<PathCodec>().unwrap(), PathCodec::Percent);
        assert_eq!(
            "legacy-tokens".parse::<PathCodec>().unwrap(),
            PathCodec::LegacyTokens
        );
        assert!("rot13".parse::<PathCodec>().is_err());
    }

    #[test]
    fn test_canonicalize_windows() {
        let codec = PathCodec::Percent;
        assert_eq!(
            canonicalize(r"c:\Users\me\notes.txt", PathStyle::Windows, codec),
            "C:/Users/me/notes.txt"
        );
        assert_eq!(canonicalize(r"C:\", PathStyle::Windows, codec), "C:");
        assert_eq!(
            canonicalize(r"D:\data\dir\", PathStyle::Windows, codec),
            "D:/data/dir"
        );
    }

    #[test]
    fn test_canonicalize_posix() {
        let codec = PathCodec::Percent;
        assert_eq!(canonicalize("/", PathStyle::Posix, codec), "/");
        assert_eq!(canonicalize("/a//b/", PathStyle::Posix, codec), "/a/b");
        assert_eq!(
            canonicalize("/tmp/a:b", PathStyle::Posix, codec),
            "/tmp/a%3Ab"
        );
        assert_eq!(canonicalize("rel/x", PathStyle::Posix, codec), "rel/x");
    }

    #[test]
    fn test_drive_prefix() {
        assert_eq!(drive_prefix("z:/"), Some('Z'));
        assert_eq!(drive_prefix("/z:"), None);
    }

    #[test]
    fn test_split_native_posix() {
        let style = PathStyle::Posix;
        assert_eq!(split_native("/root/sub/b.txt", style), (Some("/root/sub"), "b.txt"));
        assert_eq!(split_native("/root/sub/", style), (Some("/root"), "sub"));
        assert_eq!(split_native("/root", style), (Some("/"), "root"));
        assert_eq!(split_native("/", style), (None, "/"));
        assert_eq!(split_native("plain", style), (None, "plain"));
        assert_eq!(split_native(r"a\b", style), (None, r"a\b"));
    }

    #[test]
    fn test_split_native_windows() {
        let style = PathStyle::Windows;
        assert_eq!(split_native(r"C:\Users\me", style), (Some(r"C:\Users"), "me"));
        assert_eq!(split_native(r"C:\Users", style), (Some(r"C:\"), "Users"));
        assert_eq!(split_native("D:/data/x.bin", style), (Some("D:/data"), "x.bin"));
        assert_eq!(split_native(r"C:\", style), (None, "C:"));
    }

    proptest! {
        #[test]
        fn percent_round_trips(name in "\\PC*") {
            let codec = PathCodec::Percent;
            let encoded = codec.encode(&name);
            prop_assert!(!encoded.chars().any(|c| RESERVED.contains(&c)));
            prop_assert_eq!(codec.decode(&encoded), name);
        }

        #[test]
        fn legacy_round_trips_without_underscores(name in "[a-zA-Z0-9<>:\"/\\\\|?*. -]{0,24}") {
            let codec = PathCodec::LegacyTokens;
            let encoded = codec.encode(&name);
            prop_assert!(!encoded.chars().any(|c| RESERVED.contains(&c)));
            prop_assert_eq!(codec.decode(&encoded), name);
        }
    }
}
