/*!
format.rs

Terminal formatting for the human output paths of `mlr-workbench`.

  - StyleOptions::detect() honours NO_COLOR / NO_EMOJI and COLUMNS (clamped 40..=220).
  - color(role, text, &style), emoji(tag, &style)
  - box_header(title, subtitle, &style): one-line boxed banner
  - table(headers, rows, &style): padded columns, widest column shrinks first
  - indent_block(text, prefix): prefixes every line (tool output under a header)

Nothing here prints; callers decide where strings go. `--json` paths never use this module.
*/

use std::borrow::Cow;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);

        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            use_emoji: std::env::var_os("NO_EMOJI").is_none(),
            term_width: width,
        }
    }

    /// No color, no emoji, fixed width. Used by tests.
    pub fn plain(term_width: usize) -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color / Emoji                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Accent,
    Success,
    Warning,
    Error,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",
        Role::Secondary => "38;5;250",
        Role::Accent => "38;5;213",
        Role::Success => "38;5;82",
        Role::Warning => "38;5;214",
        Role::Error => "38;5;196",
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "success" => "✔",
        "error" => "✖",
        "warn" => "⚠",
        "info" => "ℹ",
        "pipeline" => "🧪",
        "clock" => "⏱",
        "save" => "💾",
        _ => "",
    }
}

/* -------------------------------------------------------------------------- */
/* Box Header                                                                 */
/* -------------------------------------------------------------------------- */

/// Boxed banner. Content longer than the terminal is truncated, not wrapped.
pub fn box_header(
    title: impl AsRef<str>,
    subtitle: Option<impl AsRef<str>>,
    style: &StyleOptions,
) -> String {
    let title = color(Role::Primary, title.as_ref().trim(), style);
    let inner = match subtitle {
        Some(sub) => format!("{title}  {}", color(Role::Secondary, sub.as_ref(), style)),
        None => title,
    };

    let max_inner = style.term_width.saturating_sub(4).max(16);
    let inner = if display_width(&inner) > max_inner {
        truncate_ellipsis(&strip_ansi(&inner), max_inner)
    } else {
        inner
    };
    let width = display_width(&inner);
    let hline = "─".repeat(width + 2);

    format!("┌{hline}┐\n│ {inner} │\n└{hline}┘")
}

/* -------------------------------------------------------------------------- */
/* Table Rendering                                                            */
/* -------------------------------------------------------------------------- */

pub fn table(headers: &[&str], rows: &[Vec<String>], style: &StyleOptions) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let cols = headers.len();

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(cols) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    // Shrink the widest columns until the row fits.
    let gap = 2 * (cols - 1);
    let mut total: usize = widths.iter().sum::<usize>() + gap;
    while total > style.term_width {
        let Some((idx, &w)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
            break;
        };
        if w <= 4 {
            break;
        }
        widths[idx] -= 1;
        total -= 1;
    }

    let render_row = |cells: &mut dyn Iterator<Item = &str>| -> String {
        cells
            .enumerate()
            .map(|(i, c)| pad_or_truncate(c, widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(color(
        Role::Accent,
        render_row(&mut headers.iter().copied()),
        style,
    ));
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    lines.push(color(Role::Dim, sep.join("  "), style));
    for row in rows {
        let mut cells = (0..cols).map(|c| row.get(c).map(String::as_str).unwrap_or(""));
        lines.push(render_row(&mut cells));
    }
    lines.join("\n")
}

fn pad_or_truncate(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len <= width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    truncate_ellipsis(&strip_ansi(s), width)
}

/* -------------------------------------------------------------------------- */
/* Text Helpers                                                               */
/* -------------------------------------------------------------------------- */

pub fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

pub fn indent_block(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|l| format!("{prefix}{l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for t in chars.by_ref() {
                if t.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_header_plain() {
        let style = StyleOptions::plain(80);
        let b = box_header("Pipeline", Some("3 verbs"), &style);
        let lines: Vec<&str> = b.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "│ Pipeline  3 verbs │");
        assert_eq!(display_width(lines[0]), display_width(lines[1]));
    }

    #[test]
    fn table_aligns_columns() {
        let style = StyleOptions::plain(80);
        let t = table(
            &["#", "VERB"],
            &[
                vec!["1".into(), "head -n 4".into()],
                vec!["2".into(), "sort -f a".into()],
            ],
            &style,
        );
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines[0], "#  VERB");
        assert_eq!(lines[2], "1  head -n 4");
    }

    #[test]
    fn table_shrinks_to_width() {
        let style = StyleOptions::plain(40);
        let long = "x".repeat(80);
        let t = table(&["A", "B"], &[vec!["1".into(), long]], &style);
        assert!(t.lines().all(|l| display_width(l) <= 40));
        assert!(t.contains('…'));
    }

    #[test]
    fn truncate_and_strip() {
        assert_eq!(truncate_ellipsis("abcdef", 4), "abc…");
        assert_eq!(strip_ansi("\x1b[31mRED\x1b[0m"), "RED");
        assert_eq!(indent_block("a\nb", "  "), "  a\n  b");
    }
}
