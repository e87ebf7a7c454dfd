use std::sync::OnceLock;

use regex::Regex;

/// Rewrites a hyphenated identifier into camelCase: `empty-set` → `emptySet`,
/// `a-b-c` → `aBC`.
///
/// Rules:
/// - dotted identifiers canonicalize each dot-segment independently and keep
///   the dots (`my-obj.some-field` → `myObj.someField`);
/// - a `js/` interop prefix strips and the remainder passes through verbatim;
/// - a hyphen run followed by an alphanumeric character (with at least one
///   alphanumeric already seen) is replaced by uppercasing that character;
///   all other hyphens are kept, so operator symbols like `-` and `->`
///   survive untouched.
///
/// The function is idempotent: every hyphen it leaves behind it would leave
/// behind again.
pub fn canonicalize(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("js/") {
        return rest.to_owned();
    }
    if name.contains('.') {
        return name
            .split('.')
            .map(canonicalize_segment)
            .collect::<Vec<_>>()
            .join(".");
    }
    canonicalize_segment(name)
}

fn canonicalize_segment(segment: &str) -> String {
    if !segment.contains('-') {
        return segment.to_owned();
    }
    let mut out = String::with_capacity(segment.len());
    let mut seen_word = false;
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            let mut run = 1usize;
            while chars.peek() == Some(&'-') {
                chars.next();
                run += 1;
            }
            match chars.peek() {
                Some(&next) if next.is_alphanumeric() && seen_word => {
                    chars.next();
                    out.extend(next.to_uppercase());
                }
                _ => {
                    for _ in 0..run {
                        out.push('-');
                    }
                }
            }
        } else {
            if c.is_alphanumeric() {
                seen_word = true;
            }
            out.push(c);
        }
    }
    out
}

/// True when `name` can be written bare in JavaScript property and export
/// positions (`obj.name`, `export { x as name }`).
///
/// Reserved words are fine in those positions, so only the lexical shape is
/// checked.
pub fn is_valid_js_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
    });
    pattern.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphens_become_camel_humps() {
        assert_eq!(canonicalize("empty-set"), "emptySet");
        assert_eq!(canonicalize("a-b-c"), "aBC");
        assert_eq!(canonicalize("already"), "already");
    }

    #[test]
    fn dotted_segments_canonicalize_independently() {
        assert_eq!(canonicalize("my-obj.some-field"), "myObj.someField");
        assert_eq!(canonicalize("console.log"), "console.log");
    }

    #[test]
    fn js_prefix_passes_through_verbatim() {
        assert_eq!(canonicalize("js/weird-name.log"), "weird-name.log");
    }

    #[test]
    fn operator_symbols_survive() {
        assert_eq!(canonicalize("-"), "-");
        assert_eq!(canonicalize("->"), "->");
        assert_eq!(canonicalize("<="), "<=");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for name in [
            "empty-set",
            "a-b-c",
            "a--b",
            "-",
            "->",
            "x-",
            "-foo",
            "my-obj.some-field",
            "js/raw-name",
            "Color",
            "über-maß",
        ] {
            let once = canonicalize(name);
            assert_eq!(canonicalize(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn identifier_shapes() {
        assert!(is_valid_js_identifier("fooBar"));
        assert!(is_valid_js_identifier("_x$1"));
        assert!(!is_valid_js_identifier("dash-key"));
        assert!(!is_valid_js_identifier("1abc"));
        assert!(!is_valid_js_identifier(""));
    }
}
