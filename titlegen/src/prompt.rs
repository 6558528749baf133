//! Prompt construction: context clean-up, template rendering, system prompt.

use crate::types::{MIN_CONTEXT_CHARS, TitleConfig};

/// Collapse whitespace runs and cap the result at `max(200, max_chars)` characters.
pub fn normalize_context(text: &str, max_chars: usize) -> String {
    let limit = max_chars.max(MIN_CONTEXT_CHARS);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(limit) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    }
}

/// Replace `{{ name }}` placeholders whose name is in `vars`. Other
/// placeholders and unmatched braces are left as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        // A nearer `{{` before the closing braces owns them.
        if let Some(inner) = rest[start + 1..start + 2 + end].rfind("{{") {
            let restart = start + 1 + inner;
            out.push_str(&rest[start..restart]);
            rest = &rest[restart..];
            continue;
        }
        let name = after[..end].trim();
        match vars.iter().find(|(k, _)| *k == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

pub fn render_prompt(config: &TitleConfig, content: &str) -> String {
    render_template(
        &config.prompt_template,
        &[
            ("content", content),
            ("language", &config.language),
            ("tone", config.tone.instruction()),
        ],
    )
}

pub fn system_prompt(config: &TitleConfig) -> String {
    format!(
        "You are an experienced writing assistant that crafts {} titles in {}. Output only the final title.",
        config.tone.instruction(),
        config.language
    )
}

/// `(prompt, system_prompt)` for `text`, or `None` when nothing is left after clean-up.
pub fn build_prompt(config: &TitleConfig, text: &str) -> Option<(String, String)> {
    let context = normalize_context(text, config.context_max_chars);
    if context.is_empty() {
        return None;
    }
    Some((render_prompt(config, &context), system_prompt(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TonePreset;

    #[test]
    fn context_is_collapsed_and_capped_by_chars() {
        assert_eq!(normalize_context("  a \n\n b\tc  ", 1200), "a b c");
        let long = "标题".repeat(300);
        let capped = normalize_context(&long, 10);
        assert_eq!(capped.chars().count(), 200);
        assert_eq!(normalize_context(" \n ", 1200), "");
    }

    #[test]
    fn template_placeholders() {
        let vars = [("content", "BODY"), ("tone", "calm")];
        assert_eq!(render_template("[{{content}}]", &vars), "[BODY]");
        assert_eq!(render_template("{{  tone }}/{{tone}}", &vars), "calm/calm");
        assert_eq!(render_template("{{unknown}} {{content", &vars), "{{unknown}} {{content");
        assert_eq!(render_template("no placeholders", &vars), "no placeholders");
        assert_eq!(render_template("{{ {{content}}", &vars), "{{ BODY");
        assert_eq!(render_template("{{{{ {{ tone }}!", &vars), "{{{{ calm!");
        assert_eq!(render_template("{{{content}}", &vars), "{BODY");
    }

    #[test]
    fn default_template_renders_all_fields() {
        let mut config = TitleConfig::default();
        config.language = "English".into();
        config.tone = TonePreset::Technical;
        let (prompt, system) = build_prompt(&config, "Retry   loops\nwith backoff").unwrap();
        assert!(prompt.contains("Keep the language as English with a technical and precise tone."));
        assert!(prompt.ends_with("Retry loops with backoff"));
        assert!(!prompt.contains("{{"));
        assert_eq!(
            system,
            "You are an experienced writing assistant that crafts technical and precise titles in English. Output only the final title."
        );
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(build_prompt(&TitleConfig::default(), "\n\t ").is_none());
    }
}
