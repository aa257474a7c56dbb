//! Chat emote tokens and player-facing time formatting.

use std::time::Duration;

/// Emote codes in `text`, in order: every whitespace-separated word of the
/// form `:code:` yields `code`.
pub fn emote_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().filter_map(|word| {
        let code = word.strip_prefix(':')?.strip_suffix(':')?;
        (!code.is_empty() && !code.contains(':')).then_some(code)
    })
}

/// Renders a remaining cooldown as `1h 5m`, `29m 59s` or `45s`.
///
/// Partial seconds round up so a running cooldown never reads `0s`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
