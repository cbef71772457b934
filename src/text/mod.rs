//! Text normalization, cleaning, and token estimation shared across chunking,
//! embedding, and retrieval.

use unicode_normalization::UnicodeNormalization;

/// NFKC-normalize, strip control characters, and collapse whitespace.
///
/// Mirrors the cleaning pipeline documents go through before chunking:
/// normalize first so downstream regexes see a canonical form, then drop
/// anything that would confuse a tokenizer or pollute an embedding.
pub fn clean(text: &str) -> String {
    let normalized: String = text.nfkc().collect();

    let stripped: String = normalized
        .chars()
        .filter(|&c| !is_stray_control(c))
        .collect();

    let unified_newlines = stripped.replace("\r\n", "\n").replace('\r', "\n");

    let collapsed_blank_lines = collapse_repeated(&unified_newlines, '\n', 3, "\n\n");
    let collapsed_runs = collapse_runs_of_space_or_tab(&collapsed_blank_lines);

    let rstripped_lines: Vec<&str> = collapsed_runs.lines().map(|l| l.trim_end()).collect();
    rstripped_lines.join("\n").trim().to_string()
}

fn is_stray_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}')
}

/// Collapse runs of `threshold` or more consecutive `ch` into `replacement`.
fn collapse_repeated(text: &str, ch: char, threshold: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for c in text.chars() {
        if c == ch {
            run += 1;
        } else {
            if run > 0 {
                if run >= threshold {
                    out.push_str(replacement);
                } else {
                    out.extend(std::iter::repeat(ch).take(run));
                }
                run = 0;
            }
            out.push(c);
        }
    }
    if run > 0 {
        if run >= threshold {
            out.push_str(replacement);
        } else {
            out.extend(std::iter::repeat(ch).take(run));
        }
    }
    out
}

fn collapse_runs_of_space_or_tab(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for c in text.chars() {
        if c == ' ' || c == '\t' {
            run += 1;
        } else {
            if run >= 2 {
                out.push(' ');
            } else if run == 1 {
                out.push(' ');
            }
            run = 0;
            out.push(c);
        }
    }
    if run >= 2 {
        out.push(' ');
    } else if run == 1 {
        out.push(' ');
    }
    out
}

/// Whether a character falls in the CJK Unified Ideographs block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Rough token-count estimate: ~1.5 tokens per CJK character, ~0.75 tokens
/// per whitespace-delimited word, plus one for rounding slack.
pub fn estimate_tokens(text: &str) -> usize {
    let cn_chars = text.chars().filter(|&c| is_cjk(c)).count();
    let words = text.split_whitespace().count();
    ((cn_chars as f64 * 1.5) + (words as f64 * 0.75)) as usize + 1
}

/// Simple tokenizer used for rerank scoring and RSF token-length gating:
/// CJK text is split one character at a time, everything else splits on
/// whitespace and punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !buf.is_empty() {
                tokens.push(std::mem::take(&mut buf));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            buf.push(c);
        } else if !buf.is_empty() {
            tokens.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        tokens.push(buf);
    }
    tokens
}
