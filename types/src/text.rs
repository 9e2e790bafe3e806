//! Small pure text helpers for operator-facing strings.

use std::borrow::Cow;

/// Truncate to at most `max` characters (minimum 3), ending in `...` when cut.
///
/// Surrounding whitespace is trimmed first. Counts `char`s, never bytes.
#[must_use]
pub fn truncate_with_ellipsis(raw: &str, max: usize) -> String {
    let max = max.max(3);
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Leading sentence of `text` when its first `.` falls within `within` chars.
///
/// Returns `None` when there is no period, the period is the first character,
/// or it appears too late to be a short sentence.
#[must_use]
pub fn first_sentence(text: &str, within: usize) -> Option<&str> {
    let (char_idx, (byte_idx, _)) = text
        .char_indices()
        .enumerate()
        .find(|(_, (_, ch))| *ch == '.')?;
    if char_idx == 0 || char_idx >= within {
        return None;
    }
    Some(&text[..byte_idx])
}

/// Strip terminal escape sequences and control characters from untrusted text.
///
/// Model output and tool arguments end up in permission prompts; `\n` and
/// `\t` survive, everything else below 0x20 (plus DEL and C1) is dropped.
/// CSI (`ESC [`) and OSC (`ESC ]`) sequences are removed whole.
#[must_use]
pub fn sanitize_display_text(raw: &str) -> Cow<'_, str> {
    if !raw.chars().any(is_unsafe_char) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters and intermediates, up to the final byte.
                    for next in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&next) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC ends at BEL or ST (ESC \).
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            }
            continue;
        }
        if !is_unsafe_char(ch) {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

fn is_unsafe_char(ch: char) -> bool {
    match ch {
        '\n' | '\t' => false,
        '\x7f' | '\u{80}'..='\u{9f}' => true,
        _ => ch < ' ',
    }
}
