use std::panic;

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_MARKERS: [&str; 5] = ["token", "cookie", "session", "password", "secret"];

/// Keeps a cookie's name for diagnostics and hides its value.
pub fn redact_cookie(cookie: &str) -> String {
    match cookie.split_once('=') {
        Some((name, _)) if !name.trim().is_empty() => format!("{}={REDACTED}", name.trim()),
        _ if cookie.trim().is_empty() => String::new(),
        _ => REDACTED.to_owned(),
    }
}

pub fn redact_text(input: &str) -> String {
    input
        .split_whitespace()
        .map(redact_chunk)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn install_panic_redaction_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic payload omitted".to_owned());

        let scrubbed = redact_text(&payload);

        match panic_info.location() {
            Some(location) => eprintln!(
                "dmchat panic: {} at {}:{}",
                scrubbed,
                location.file(),
                location.line()
            ),
            None => eprintln!("dmchat panic: {}", scrubbed),
        }
    }));
}

fn redact_chunk(chunk: &str) -> String {
    let lowered = chunk.to_ascii_lowercase();
    if SENSITIVE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        REDACTED.to_owned()
    } else {
        chunk.to_owned()
    }
}
