//! Static checks over embedded script text and error-to-line localization.
//!
//! Scripts are scanned as text, not parsed. Strings and comments are blanked
//! out first so their contents never count as declarations or braces.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use flowtrace_types::Severity;

/// Default lines of context on each side of a located line.
pub const DEFAULT_CONTEXT_LINES: usize = 5;

/// Variable names that shadow globals the script host injects.
const RESERVED_NAMES: &[&str] = &["source", "input", "output", "data", "items", "node", "workflow"];

/// Words in engine error messages that say nothing about the failing line.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "already", "at", "been", "cannot", "code", "declared", "defined",
    "error", "expected", "failed", "for", "from", "function", "has", "identifier", "in",
    "invalid", "is", "it", "line", "missing", "not", "null", "object", "of", "on", "or",
    "properties", "property", "read", "reading", "referenceerror", "set", "setting",
    "syntaxerror", "the", "to", "token", "type", "typeerror", "undefined", "unexpected",
    "value", "with",
];

/// Minimum overlap score for a line to count as located.
const MIN_SCORE: u32 = 1;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[{}();]|\b(const|let|var)\s+([A-Za-z_$][\w$]*)").expect("Invalid token regex")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*").expect("Invalid identifier regex"));

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"`]([A-Za-z_$][\w$]*)['"`]"#).expect("Invalid quoted identifier regex")
});

static LINE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:<anonymous>:|\bline\s+)(\d+)").expect("Invalid line reference regex")
});

// ─────────────────────────────────────────────────────────────────────────────
// Issues
// ─────────────────────────────────────────────────────────────────────────────

/// Which rule produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    DuplicateDeclaration,
    ReservedVariable,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::DuplicateDeclaration => "duplicate-declaration",
            IssueKind::ReservedVariable => "reserved-variable",
        }
    }
}

/// One finding in a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeIssue {
    /// 1-based line.
    pub line: usize,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub variable: String,
    /// Line of the earlier declaration, for duplicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A `const`/`let`/`var` declaration found in the text.
#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    line: usize,
    is_var: bool,
}

/// Names declared in one brace scope.
#[derive(Default)]
struct Frame {
    declared: HashMap<String, Declaration>,
    /// Open parens since this scope's `{`.
    parens: usize,
}

/// Run every rule over `script`, results ordered by line.
pub fn find_issues(script: &str) -> Vec<CodeIssue> {
    let declarations = scan_declarations(script);

    let mut issues = duplicate_declarations(&declarations);
    issues.extend(reserved_variables(&declarations));
    issues.sort_by_key(|issue| issue.line);
    issues
}

/// Declarations in text order, each tagged with whether it collides with an
/// earlier one in the same scope.
fn scan_declarations(script: &str) -> Vec<(Declaration, Option<Declaration>)> {
    let masked = mask_strings_and_comments(script);
    let mut frames = vec![Frame::default()];
    // Declarations in `for (...)` heads belong to the block that follows.
    let mut pending: Vec<Declaration> = Vec::new();
    let mut found = Vec::new();

    let mut line = 1;
    let mut cursor = 0;

    for caps in TOKEN_RE.captures_iter(&masked) {
        let Some(whole) = caps.get(0) else { continue };
        line += masked[cursor..whole.start()].matches('\n').count();
        cursor = whole.start();

        match whole.as_str() {
            "{" => {
                let mut frame = Frame::default();
                for decl in pending.drain(..) {
                    frame.declared.insert(decl.name.clone(), decl);
                }
                frames.push(frame);
            }
            "}" => {
                if frames.len() > 1 {
                    frames.pop();
                }
            }
            "(" => {
                if let Some(frame) = frames.last_mut() {
                    frame.parens += 1;
                }
            }
            ")" => {
                if let Some(frame) = frames.last_mut() {
                    frame.parens = frame.parens.saturating_sub(1);
                }
            }
            ";" => {
                if frames.last().is_some_and(|f| f.parens == 0) {
                    pending.clear();
                }
            }
            _ => {
                let (Some(keyword), Some(name)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let decl = Declaration {
                    name: name.as_str().to_string(),
                    line,
                    is_var: keyword.as_str() == "var",
                };
                let Some(frame) = frames.last_mut() else { continue };

                if frame.parens > 0 {
                    pending.push(decl.clone());
                    found.push((decl, None));
                    continue;
                }

                let collision = frame
                    .declared
                    .get(&decl.name)
                    .filter(|prev| !(prev.is_var && decl.is_var))
                    .cloned();
                if collision.is_none() {
                    frame.declared.insert(decl.name.clone(), decl.clone());
                }
                found.push((decl, collision));
            }
        }
    }

    found
}

fn duplicate_declarations(declarations: &[(Declaration, Option<Declaration>)]) -> Vec<CodeIssue> {
    declarations
        .iter()
        .filter_map(|(decl, previous)| {
            let previous = previous.as_ref()?;
            Some(CodeIssue {
                line: decl.line,
                severity: Severity::Error,
                kind: IssueKind::DuplicateDeclaration,
                variable: decl.name.clone(),
                previous_line: Some(previous.line),
                suggestion: Some(format!(
                    "'{}' is already declared on line {}; reuse it or pick another name",
                    decl.name, previous.line
                )),
            })
        })
        .collect()
}

/// One warning per reserved name, at its first declaration.
fn reserved_variables(declarations: &[(Declaration, Option<Declaration>)]) -> Vec<CodeIssue> {
    let mut seen = HashSet::new();
    declarations
        .iter()
        .map(|(decl, _)| decl)
        .filter(|decl| RESERVED_NAMES.contains(&decl.name.as_str()))
        .filter(|decl| seen.insert(decl.name.clone()))
        .map(|decl| CodeIssue {
            line: decl.line,
            severity: Severity::Warning,
            kind: IssueKind::ReservedVariable,
            variable: decl.name.clone(),
            previous_line: None,
            suggestion: Some(format!("Rename to {0}Data or _{0}", decl.name)),
        })
        .collect()
}

/// Replace string literal and comment contents with spaces, keeping newlines
/// and byte offsets intact.
fn mask_strings_and_comments(script: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(script.len());
    let mut state = State::Code;
    let mut chars = script.chars().peekable();

    let blank = |c: char, out: &mut String| {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat_n(' ', c.len_utf8()));
        }
    };

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '"' | '\'' | '`' => {
                    out.push(' ');
                    state = State::Str(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
                blank(c, &mut out);
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(c, &mut out);
                }
            }
            State::Str(quote) => {
                if c == '\\' {
                    blank(c, &mut out);
                    if let Some(escaped) = chars.next() {
                        blank(escaped, &mut out);
                    }
                } else if c == quote {
                    out.push(' ');
                    state = State::Code;
                } else if c == '\n' && quote != '`' {
                    // Unterminated literal; resync at end of line.
                    out.push('\n');
                    state = State::Code;
                } else {
                    blank(c, &mut out);
                }
            }
        }
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Error localization
// ─────────────────────────────────────────────────────────────────────────────

/// One line of a context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLine {
    pub number: usize,
    pub text: String,
    pub is_error: bool,
}

/// Where in a script an error most plausibly happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeContext {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_line: Option<usize>,
    /// 1.0 for an explicit line reference, otherwise the share of the
    /// message's identifier weight the chosen line matched.
    pub confidence: f64,
    pub lines: Vec<ContextLine>,
}

impl CodeContext {
    fn not_found() -> Self {
        Self {
            found: false,
            error_line: None,
            confidence: 0.0,
            lines: Vec::new(),
        }
    }
}

/// Locate the line of `script` that `message` most plausibly refers to.
///
/// Returns `found = false` rather than guessing when no line shares an
/// identifier with the message.
pub fn locate_error_context(script: &str, message: &str, context_lines: usize) -> CodeContext {
    locate_error_context_with_stack(script, message, None, context_lines)
}

/// Like [`locate_error_context`], but an explicit line reference in `stack`
/// (e.g. `<anonymous>:12:7`) is honored too.
pub fn locate_error_context_with_stack(
    script: &str,
    message: &str,
    stack: Option<&str>,
    context_lines: usize,
) -> CodeContext {
    let lines: Vec<&str> = script.lines().collect();
    if lines.is_empty() {
        return CodeContext::not_found();
    }

    let explicit = [Some(message), stack]
        .into_iter()
        .flatten()
        .find_map(|text| explicit_line(text, lines.len()));
    if let Some(line) = explicit {
        return window(&lines, line, 1.0, context_lines);
    }

    let tokens = message_tokens(message);
    let total: u32 = tokens.values().sum();
    if total == 0 {
        return CodeContext::not_found();
    }

    match best_line(&lines, &tokens) {
        Some((line, score)) if score >= MIN_SCORE => {
            window(&lines, line, f64::from(score) / f64::from(total), context_lines)
        }
        _ => CodeContext::not_found(),
    }
}

/// An explicit, in-range line number mentioned in `text`.
fn explicit_line(text: &str, line_count: usize) -> Option<usize> {
    LINE_REF_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .find(|line| (1..=line_count).contains(line))
}

/// Identifier tokens of an error message and their weights.
///
/// Quoted identifiers name the failing symbol directly and weigh 2. Bare
/// identifiers weigh 1 when at least two characters long and not a stopword.
pub fn message_tokens(message: &str) -> HashMap<String, u32> {
    let mut tokens = HashMap::new();

    for caps in QUOTED_RE.captures_iter(message) {
        if let Some(ident) = caps.get(1) {
            tokens.insert(ident.as_str().to_string(), 2);
        }
    }

    for ident in IDENT_RE.find_iter(message) {
        let word = ident.as_str();
        if word.len() < 2 || STOPWORDS.contains(&word.to_ascii_lowercase().as_str()) {
            continue;
        }
        tokens.entry(word.to_string()).or_insert(1);
    }

    tokens
}

/// Highest-scoring line (1-based) and its score; the first line wins ties.
fn best_line(lines: &[&str], tokens: &HashMap<String, u32>) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, text) in lines.iter().enumerate() {
        let idents: HashSet<&str> = IDENT_RE.find_iter(text).map(|m| m.as_str()).collect();
        let score: u32 = tokens
            .iter()
            .filter(|(token, _)| idents.contains(token.as_str()))
            .map(|(_, weight)| weight)
            .sum();
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((idx + 1, score));
        }
    }
    best
}

fn window(lines: &[&str], error_line: usize, confidence: f64, context_lines: usize) -> CodeContext {
    let start = error_line.saturating_sub(context_lines).max(1);
    let end = (error_line + context_lines).min(lines.len());

    CodeContext {
        found: true,
        error_line: Some(error_line),
        confidence,
        lines: (start..=end)
            .map(|number| ContextLine {
                number,
                text: lines[number - 1].to_string(),
                is_error: number == error_line,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_let_in_same_scope() {
        let issues = find_issues("let x = 1;\nlet x = 2;");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 2);
        assert_eq!(issues[0].kind, IssueKind::DuplicateDeclaration);
        assert_eq!(issues[0].kind.as_str(), "duplicate-declaration");
        assert_eq!(issues[0].variable, "x");
        assert_eq!(issues[0].previous_line, Some(1));
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_shadowing_in_nested_block_is_fine() {
        let script = "const total = 0;\nif (ok) {\n  const total = 1;\n}\n";
        assert!(find_issues(script).is_empty());
    }

    #[test]
    fn test_sibling_blocks_do_not_collide() {
        let script = "\
for (let i = 0; i < 3; i++) {
  const row = i;
}
for (let i = 0; i < 3; i++) {
  const row = i * 2;
}";
        assert!(find_issues(script).is_empty());
    }

    #[test]
    fn test_var_redeclaration_is_legal() {
        assert!(find_issues("var a = 1;\nvar a = 2;").is_empty());

        let mixed = find_issues("var a = 1;\nlet a = 2;");
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].line, 2);
    }

    #[test]
    fn test_declarations_inside_strings_and_comments_ignored() {
        let script = "\
const msg = 'let msg = 1';
// const msg = 2;
/* let msg = 3; */
const tpl = `const tpl = ${msg}`;";
        assert!(find_issues(script).is_empty());
    }

    #[test]
    fn test_callback_scope() {
        let script = "\
const out = items.map((item) => {
  const out = item.json;
  return out;
});";
        assert!(find_issues(script).is_empty());
    }

    #[test]
    fn test_reserved_variable_warning() {
        let issues = find_issues("const items = $input.all();\nconst data = {};\n");
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == IssueKind::ReservedVariable));
        assert_eq!(issues[0].variable, "items");
        assert_eq!(
            issues[0].suggestion.as_deref(),
            Some("Rename to itemsData or _items")
        );
        assert_eq!(issues[1].line, 2);
    }

    #[test]
    fn test_issues_sorted_by_line() {
        let script = "let a = 1;\nlet a = 2;\nconst node = 3;\nlet b = 1;\nlet b = 2;";
        let lines: Vec<usize> = find_issues(script).iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![2, 3, 5]);
    }

    #[test]
    fn test_clean_script_has_no_issues() {
        assert!(find_issues("return items.map(i => ({ json: i.json }));").is_empty());
        assert!(find_issues("").is_empty());
    }

    // ── localization ──

    const SCRIPT: &str = "\
const rows = $input.all();
const result = [];
for (const row of rows) {
  const customer = row.json.customer;
  result.push({ json: { id: customer.id } });
}
return result;";

    #[test]
    fn test_locate_by_quoted_identifier() {
        let ctx = locate_error_context(SCRIPT, "Cannot read properties of undefined (reading 'id')", 5);
        assert!(ctx.found);
        assert_eq!(ctx.error_line, Some(5));
        assert!(ctx.lines.iter().any(|l| l.is_error && l.number == 5));
        assert_eq!(ctx.lines.first().map(|l| l.number), Some(1));
        assert_eq!(ctx.lines.last().map(|l| l.number), Some(7));
    }

    #[test]
    fn test_locate_first_line_wins_tie() {
        let ctx = locate_error_context(SCRIPT, "customer is not defined", 1);
        assert_eq!(ctx.error_line, Some(4));
        assert_eq!(ctx.lines.len(), 3);
        assert!((ctx.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_locate_not_found_without_shared_tokens() {
        let ctx = locate_error_context(SCRIPT, "Request failed with status code 502", 5);
        assert!(!ctx.found);
        assert!(ctx.lines.is_empty());
        assert_eq!(ctx.error_line, None);
    }

    #[test]
    fn test_locate_stopwords_only_not_found() {
        let ctx = locate_error_context(SCRIPT, "Cannot read properties of undefined", 5);
        assert!(!ctx.found);
    }

    #[test]
    fn test_explicit_line_reference() {
        let ctx = locate_error_context_with_stack(
            SCRIPT,
            "Unexpected token",
            Some("SyntaxError: Unexpected token\n    at evalmachine.<anonymous>:3:12"),
            1,
        );
        assert!(ctx.found);
        assert_eq!(ctx.error_line, Some(3));
        assert_eq!(ctx.confidence, 1.0);
        assert_eq!(ctx.lines.len(), 3);
    }

    #[test]
    fn test_out_of_range_line_reference_ignored() {
        let ctx = locate_error_context(SCRIPT, "error at line 400: 'zzz'", 5);
        assert!(!ctx.found);
    }

    #[test]
    fn test_message_tokens_weights() {
        let tokens = message_tokens("Identifier 'total' has already been declared in totals");
        assert_eq!(tokens.get("total"), Some(&2));
        assert_eq!(tokens.get("totals"), Some(&1));
        assert!(!tokens.contains_key("Identifier"));
        assert!(!tokens.contains_key("declared"));
    }
}
