//! Python source metrics
//!
//! A lightweight tokenizer is enough for the three metrics we report; no
//! parse tree is built, so syntactically broken files still get numbers.
//!
//! - Cyclomatic complexity: per function, 1 + decision points
//!   (`if`, `elif`, `for`, `while`, `except`, `case`, `and`, `or`), summed
//!   over all functions in the file.
//! - Halstead: operators are symbolic operators plus `and or not in is`;
//!   operands are identifiers, numbers and string literals.
//! - Maintainability index: the 0-100 scaled variant that credits comment
//!   and docstring lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        (?P<comment>\#[^\n]*)
        | (?P<string>(?:[rRbBuUfF]{1,2})?(?:"""[\s\S]*?"""|'''[\s\S]*?'''|"(?:\\.|[^"\\\n])*"|'(?:\\.|[^'\\\n])*'))
        | (?P<number>\d[\d_]*(?:\.\d*)?(?:[eE][+-]?\d+)?[jJ]?|\.\d+(?:[eE][+-]?\d+)?[jJ]?)
        | (?P<name>[A-Za-z_][A-Za-z0-9_]*)
        | (?P<op>\*\*=|//=|>>=|<<=|->|:=|==|!=|<=|>=|\*\*|//|<<|>>|\+=|-=|\*=|/=|%=|&=|\|=|\^=|@=|[-+*/%@&|^~<>=])
        "#,
    )
    .expect("valid token regex")
});

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const OPERATOR_KEYWORDS: &[&str] = &["and", "or", "not", "in", "is"];
const DECISION_KEYWORDS: &[&str] = &["if", "elif", "for", "while", "except", "case", "and", "or"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Comment,
    Str,
    Number,
    Name,
    Op,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    /// 0-based line of the token's first character
    line: usize,
    /// Lines spanned, 1 for everything but multi-line strings
    lines: usize,
}

fn tokenize(code: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut line = 0;
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(code) {
        let Some(m) = caps.get(0) else { continue };
        line += code[last..m.start()].matches('\n').count();
        last = m.start();

        let kind = if caps.name("comment").is_some() {
            Kind::Comment
        } else if caps.name("string").is_some() {
            Kind::Str
        } else if caps.name("number").is_some() {
            Kind::Number
        } else if caps.name("name").is_some() {
            Kind::Name
        } else {
            Kind::Op
        };

        tokens.push(Token {
            kind,
            text: m.as_str(),
            line,
            lines: m.as_str().matches('\n').count() + 1,
        });
    }
    tokens
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Line-level classification used by the maintainability index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    /// Lines holding code
    pub sloc: usize,
    /// Comment-only lines plus lines of standalone (doc)strings
    pub comments: usize,
}

pub fn line_counts(code: &str) -> LineCounts {
    let total = code.lines().count();
    let mut code_lines = vec![false; total];
    let mut comment_lines = vec![false; total];

    let tokens = tokenize(code);
    let lines: Vec<&str> = code.lines().collect();

    // Non-comment tokens starting on each line
    let mut starts = vec![0usize; total + 1];
    for token in tokens.iter().filter(|t| t.kind != Kind::Comment) {
        if let Some(count) = starts.get_mut(token.line) {
            *count += 1;
        }
    }

    for token in &tokens {
        match token.kind {
            Kind::Comment => {
                if token.line < total {
                    comment_lines[token.line] = true;
                }
            }
            Kind::Str if is_standalone(&lines, &starts, token) => {
                for l in token.line..(token.line + token.lines).min(total) {
                    comment_lines[l] = true;
                }
            }
            _ => {
                for l in token.line..(token.line + token.lines).min(total) {
                    code_lines[l] = true;
                }
            }
        }
    }

    // Lines with code and a trailing comment count as code
    let sloc = code_lines.iter().filter(|c| **c).count();
    let comments = comment_lines
        .iter()
        .zip(&code_lines)
        .filter(|(comment, code)| **comment && !**code)
        .count();
    LineCounts { sloc, comments }
}

/// A string literal that is the only thing on its lines (docstrings)
fn is_standalone(lines: &[&str], starts: &[usize], token: &Token<'_>) -> bool {
    let starts_line = lines
        .get(token.line)
        .map(|l| l.trim_start().starts_with(|c: char| c == '"' || c == '\'' || c.is_ascii_alphabetic()))
        .unwrap_or(false);
    let others_on = |line: usize| starts.get(line).copied().unwrap_or(0);
    let last_line = token.line + token.lines - 1;
    // The string itself is counted on its first line
    let alone = others_on(token.line) == 1 && (last_line == token.line || others_on(last_line) == 0);
    starts_line && alone
}

/// Sum over functions of 1 + decision points
pub fn cyclomatic_complexity(code: &str) -> u32 {
    let lines: Vec<&str> = code.lines().collect();
    let indent_of = |line: usize| -> usize {
        lines
            .get(line)
            .map(|l| l.len() - l.trim_start().len())
            .unwrap_or(0)
    };

    // (indent, complexity) for each open function, innermost last
    let mut stack: Vec<(usize, u32)> = Vec::new();
    let mut total = 0;
    let mut current_line = usize::MAX;

    for token in tokenize(code) {
        if token.kind != Kind::Name {
            continue;
        }

        if token.line != current_line {
            current_line = token.line;
            let indent = indent_of(token.line);
            while stack.last().is_some_and(|(open, _)| indent <= *open) {
                if let Some((_, cc)) = stack.pop() {
                    total += cc;
                }
            }
        }

        if token.text == "def" {
            stack.push((indent_of(token.line), 1));
        } else if DECISION_KEYWORDS.contains(&token.text) {
            if let Some((_, cc)) = stack.last_mut() {
                *cc += 1;
            }
        }
    }

    total + stack.iter().map(|(_, cc)| cc).sum::<u32>()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HalsteadMetrics {
    /// Distinct operators
    pub h1: usize,
    /// Distinct operands
    pub h2: usize,
    /// Total operators
    pub n1: usize,
    /// Total operands
    pub n2: usize,
    pub vocabulary: usize,
    pub length: usize,
    pub calculated_length: f64,
    pub volume: f64,
    pub difficulty: f64,
    pub effort: f64,
    pub time: f64,
    pub bugs: f64,
}

impl HalsteadMetrics {
    pub fn from_counts(h1: usize, h2: usize, n1: usize, n2: usize) -> Self {
        let log2 = |n: usize| if n == 0 { 0.0 } else { (n as f64).log2() };

        let vocabulary = h1 + h2;
        let length = n1 + n2;
        let calculated_length = h1 as f64 * log2(h1) + h2 as f64 * log2(h2);
        let volume = length as f64 * log2(vocabulary);
        let difficulty = if h2 == 0 {
            0.0
        } else {
            (h1 as f64 / 2.0) * (n2 as f64 / h2 as f64)
        };
        let effort = difficulty * volume;

        Self {
            h1,
            h2,
            n1,
            n2,
            vocabulary,
            length,
            calculated_length,
            volume,
            difficulty,
            effort,
            time: effort / 18.0,
            bugs: volume / 3000.0,
        }
    }
}

pub fn halstead(code: &str) -> HalsteadMetrics {
    let mut operators = HashSet::new();
    let mut operands = HashSet::new();
    let (mut n1, mut n2) = (0, 0);

    for token in tokenize(code) {
        match token.kind {
            Kind::Op => {
                operators.insert(token.text);
                n1 += 1;
            }
            Kind::Name if OPERATOR_KEYWORDS.contains(&token.text) => {
                operators.insert(token.text);
                n1 += 1;
            }
            Kind::Name if is_keyword(token.text) => {}
            Kind::Name | Kind::Number | Kind::Str => {
                operands.insert(token.text);
                n2 += 1;
            }
            Kind::Comment => {}
        }
    }

    HalsteadMetrics::from_counts(operators.len(), operands.len(), n1, n2)
}

/// Maintainability index in [0, 100] from its inputs; `comment_pct` is 0-100
pub fn mi_compute(volume: f64, complexity: u32, sloc: usize, comment_pct: f64) -> f64 {
    if volume <= 0.0 || sloc == 0 {
        return 100.0;
    }
    let raw = 171.0 - 5.2 * volume.ln() - 0.23 * complexity as f64 - 16.2 * (sloc as f64).ln()
        + 50.0 * (2.46 * comment_pct.to_radians()).sqrt().sin();
    (raw * 100.0 / 171.0).clamp(0.0, 100.0)
}

pub fn maintainability_index(code: &str) -> f64 {
    let counts = line_counts(code);
    let comment_pct = if counts.sloc == 0 {
        0.0
    } else {
        counts.comments as f64 / counts.sloc as f64 * 100.0
    };
    mi_compute(
        halstead(code).volume,
        cyclomatic_complexity(code),
        counts.sloc,
        comment_pct,
    )
}
