use std::time::Duration;

use crate::notify::ChangeNotice;

// ============== HTML ==============

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a notice as Telegram HTML.
///
/// ```text
/// <b>New Follows Detected for @jack</b>
/// Started following 2 new accounts
///
/// 1. @rustlang (1200 followers)
/// 2. ID: 99
/// ```
pub fn render_html(notice: &ChangeNotice) -> String {
    let mut out = format!(
        "<b>{}</b>\n{}\n\n",
        escape_html(&notice.title()),
        escape_html(&notice.summary())
    );

    for (i, entry) in notice.entries.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, escape_html(&entry.label())));
    }
    if let Some(more) = notice.overflow_line() {
        out.push_str(&more);
        out.push('\n');
    }

    out.trim_end().to_string()
}

// ============== Plain text ==============

/// Human-readable duration, coarsest two units: `2d 3h`, `5m 10s`, `42s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, hours, mins, s) = (secs / 86_400, (secs / 3600) % 24, (secs / 60) % 60, secs % 60);

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Thousands separators for counts in terminal output (`1,234,567`).
pub fn group_digits(n: u64) -> String {
    let raw = n.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
