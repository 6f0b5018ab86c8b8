/// Placeholder substitution engine for export templates.
///
/// Tokens are written `{{Name}}`. A name may embed `(.*)` to capture an
/// identifier from the token itself (`{{Tale_Npc_Value_(.*)}}` matches
/// `{{Tale_Npc_Value_Health}}`). Block tokens come in start/end pairs.
///
/// Every operation is total: malformed or unmatched tokens are left in the
/// text untouched.
use regex::{Captures, NoExpand, Regex};
use std::ops::Range;

const CAPTURE_MARKER: &str = "(.*)";
const CAPTURE_PATTERN: &str = "([^{}]*?)";

/// The literal token for a placeholder name.
pub fn token(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// Whether the literal placeholder occurs in the code.
pub fn is_present(code: &str, name: &str) -> bool {
    code.contains(&token(name))
}

fn token_regex(name: &str) -> Option<Regex> {
    let escaped = regex::escape(&token(name));
    let source = escaped.replace(&regex::escape(CAPTURE_MARKER), CAPTURE_PATTERN);
    match Regex::new(&source) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::warn!(%name, %err, "placeholder pattern rejected");
            None
        }
    }
}

/// Replace every occurrence of a placeholder with a fixed value.
pub fn replace(code: &str, name: &str, value: &str) -> String {
    match token_regex(name) {
        Some(regex) => regex.replace_all(code, NoExpand(value)).into_owned(),
        None => code.to_string(),
    }
}

/// Replace every occurrence of a placeholder with the output of `value`.
/// The callback only runs when the placeholder is actually present.
pub fn replace_with(code: &str, name: &str, mut value: impl FnMut() -> String) -> String {
    match token_regex(name) {
        Some(regex) => regex.replace_all(code, |_: &Captures<'_>| value()).into_owned(),
        None => code.to_string(),
    }
}

/// Replace a parameterized placeholder. `value` receives the text captured
/// by the `(.*)` part of the pattern.
pub fn replace_captured(code: &str, pattern: &str, mut value: impl FnMut(&str) -> String) -> String {
    match token_regex(pattern) {
        Some(regex) => regex
            .replace_all(code, |caps: &Captures<'_>| {
                value(caps.get(1).map_or("", |m| m.as_str()))
            })
            .into_owned(),
        None => code.to_string(),
    }
}

/// Replace a placeholder with multi-line content, indenting every content
/// line after the first to the placeholder's column. A placeholder alone on
/// its line is removed together with the line when the content is empty.
pub fn replace_indented(code: &str, name: &str, content: &str) -> String {
    replace_indented_all(code, &[(name, content)])
}

/// [`replace_indented`] for several placeholders in a single pass over the
/// code. Inserted content is never scanned for further placeholders.
pub fn replace_indented_all(code: &str, replacements: &[(impl AsRef<str>, impl AsRef<str>)]) -> String {
    let needles: Vec<(String, &str)> = replacements
        .iter()
        .map(|(name, content)| {
            (
                token(name.as_ref()),
                content.as_ref().trim_end_matches(['\n', '\r']),
            )
        })
        .collect();
    let mut code = code.to_string();
    let mut cursor = 0;

    while let Some((start, needle, content)) = needles
        .iter()
        .filter_map(|(needle, content)| {
            code[cursor..]
                .find(needle.as_str())
                .map(|offset| (cursor + offset, needle, *content))
        })
        .min_by_key(|(start, _, _)| *start)
    {
        let end = start + needle.len();
        let line_start = line_start(&code, start);
        let indent = leading_whitespace(&code[line_start..]).to_string();

        if content.trim().is_empty() {
            if let Some(mut line) = whole_line(&code, start..end) {
                // A removed last line takes the preceding line break with it
                if line.end == code.len() && !code[line.clone()].ends_with('\n') && line.start > 0 {
                    line.start -= 1;
                }
                code.replace_range(line.clone(), "");
                cursor = line.start;
                continue;
            }
        }

        let replacement = indent_lines(content, &indent, false);
        code.replace_range(start..end, &replacement);
        cursor = start + replacement.len();
    }
    code
}

/// Keep or drop a `start ... end` block. Kept blocks lose their markers,
/// dropped blocks disappear including markers. Nested pairs are resolved
/// innermost first.
pub fn render_if(code: &str, start: &str, end: &str, keep: bool) -> String {
    render_if_with(code, start, end, || keep)
}

/// Like [`render_if`], with the decision produced by a callback per block.
pub fn render_if_with(code: &str, start: &str, end: &str, mut keep: impl FnMut() -> bool) -> String {
    let end_token = token(end);
    resolve_blocks(code, start, |_| end_token.clone(), |_| keep())
}

/// Parameterized conditional block. `start` and `end` both embed `(.*)`; a
/// start marker pairs with the next end marker carrying the same captured
/// text, and `keep` decides per captured text.
pub fn render_if_captured(
    code: &str,
    start: &str,
    end: &str,
    keep: impl FnMut(&str) -> bool,
) -> String {
    resolve_blocks(code, start, |param| token(&end.replacen(CAPTURE_MARKER, param, 1)), keep)
}

fn resolve_blocks(
    code: &str,
    start: &str,
    end_token_for: impl Fn(&str) -> String,
    mut keep: impl FnMut(&str) -> bool,
) -> String {
    let Some(start_regex) = token_regex(start) else {
        return code.to_string();
    };
    let mut code = code.to_string();
    let mut limit = code.len();

    loop {
        let Some((start_range, param)) = start_regex
            .captures_iter(&code[..limit])
            .last()
            .and_then(|caps| {
                let whole = caps.get(0)?;
                let param = caps.get(1).map_or("", |m| m.as_str()).to_string();
                Some((whole.range(), param))
            })
        else {
            break;
        };

        let end_token = end_token_for(&param);
        if let Some(offset) = code[start_range.end..].find(&end_token) {
            let end_range = start_range.end + offset..start_range.end + offset + end_token.len();
            let start_line = whole_line(&code, start_range.clone()).unwrap_or(start_range.clone());
            let end_line = whole_line(&code, end_range.clone()).unwrap_or(end_range.clone());

            if keep(&param) {
                code.replace_range(end_line, "");
                code.replace_range(start_line.clone(), "");
            } else {
                code.replace_range(start_line.start..end_line.end.max(start_line.end), "");
            }
            limit = start_line.start;
        } else {
            limit = start_range.start;
        }
    }
    code
}

/// Render a list block. `build` receives the block's inner template, with
/// the indentation of the start marker's line removed, and returns the
/// assembled list text. The result is re-indented at the start marker's
/// column and stripped of fully blank lines.
pub fn render_list(code: &str, start: &str, end: &str, mut build: impl FnMut(&str) -> String) -> String {
    let start_token = token(start);
    let end_token = token(end);
    let mut code = code.to_string();
    let mut cursor = 0;

    while let Some(offset) = code[cursor..].find(&start_token) {
        let start_pos = cursor + offset;
        let inner_start = start_pos + start_token.len();
        let Some(end_offset) = code[inner_start..].find(&end_token) else {
            break;
        };
        let inner_end = inner_start + end_offset;
        let block_end = inner_end + end_token.len();

        let line_start = line_start(&code, start_pos);
        let marker_opens_line = code[line_start..start_pos]
            .chars()
            .all(|c| c == ' ' || c == '\t');
        let indent = leading_whitespace(&code[line_start..]).to_string();

        let inner = dedent_block(&code[inner_start..inner_end], &indent);
        let built = build(&inner);
        let rendered = indent_lines(&strip_blank_lines(&built), &indent, marker_opens_line);

        let region_start = if marker_opens_line { line_start } else { start_pos };
        let mut region_end = block_end;
        if rendered.is_empty() && marker_opens_line {
            let rest = &code[block_end..];
            let line_len = rest.find('\n').map_or(rest.len(), |i| i + 1);
            if rest[..line_len].trim().is_empty() {
                region_end = block_end + line_len;
            }
        }

        code.replace_range(region_start..region_end, &rendered);
        cursor = region_start + rendered.len();
    }
    code
}

fn line_start(code: &str, pos: usize) -> usize {
    code[..pos].rfind('\n').map_or(0, |i| i + 1)
}

fn leading_whitespace(line: &str) -> &str {
    let len = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..len]
}

/// The full line (including its line break) when `range` is the only
/// non-whitespace content on it.
fn whole_line(code: &str, range: Range<usize>) -> Option<Range<usize>> {
    let start = line_start(code, range.start);
    if !code[start..range.start].chars().all(|c| c == ' ' || c == '\t') {
        return None;
    }
    let rest = &code[range.end..];
    let line_len = rest.find('\n').map_or(rest.len(), |i| i + 1);
    if !rest[..line_len].trim().is_empty() {
        return None;
    }
    Some(start..range.end + line_len)
}

/// Strip the marker line breaks around a block body and its indentation.
fn dedent_block(inner: &str, indent: &str) -> String {
    let inner = inner
        .strip_prefix("\r\n")
        .or_else(|| inner.strip_prefix('\n'))
        .unwrap_or(inner);
    let mut lines: Vec<&str> = inner.split('\n').collect();
    if lines.len() > 1 && lines.last().is_some_and(|last| last.trim().is_empty()) {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            line.strip_prefix(indent).unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_lines(text: &str, indent: &str, indent_first: bool) -> String {
    if indent.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .enumerate()
        .map(|(i, line)| {
            if (i == 0 && !indent_first) || line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
