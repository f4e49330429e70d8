//! Display helpers for terminal output: color detection, number formatting.

/// Resolve `--color` into a yes/no. `auto` follows whether stdout is a TTY.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Group digits in threes: `35000` -> `"35,000"`.
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Always-signed grouped number: `15` -> `"+15"`, `-1200` -> `"-1,200"`.
pub fn signed(n: i64) -> String {
    if n < 0 {
        thousands(n)
    } else {
        format!("+{}", thousands(n))
    }
}

/// Wrap `text` in an SGR sequence when color is on.
pub fn paint(text: &str, sgr: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{sgr}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}
