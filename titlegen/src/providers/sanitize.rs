//! Sanitize API error strings: scrub secret-like tokens and truncate length.

const MAX_API_ERROR_CHARS: usize = 200;
const MAX_RAW_BODY_CHARS: usize = 1000;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts OpenAI/Anthropic/DeepSeek style `sk-` keys and Google `AIza` keys.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 2] = ["sk-", "AIza"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            // Bare prefixes like "sk-" should not stop future scans.
            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

fn truncate_chars(input: String, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &input[..end]),
        None => input,
    }
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    truncate_chars(scrub_secret_patterns(input), MAX_API_ERROR_CHARS)
}

/// Like [`sanitize_api_error`] but keeps more of the body, for raw response dumps.
pub fn sanitize_raw_body(input: &str) -> String {
    truncate_chars(scrub_secret_patterns(input.trim()), MAX_RAW_BODY_CHARS)
}
