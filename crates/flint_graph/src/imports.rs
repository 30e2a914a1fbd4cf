//! Static import extraction from Python source text.
//!
//! Only the declarative forms are recognized: `import a.b as c, d`,
//! `from a.b import c`, `from . import x` and parenthesized multi-line
//! `from a import (b, c)`. Dynamic imports (`__import__`, `importlib`) are not
//! dependencies. Comments and string literals are stripped before parsing so
//! that `"import x"` inside a docstring is never mistaken for an import.

/// One static import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    /// Number of leading dots of a relative import (0 for absolute imports).
    pub level: usize,
    /// Dotted module path after the dots (may be empty for `from . import x`).
    pub module: String,
    /// Names imported by a `from` statement; empty for plain `import`.
    pub names: Vec<String>,
    /// 1-based line number where the statement starts.
    pub line: usize,
}

impl std::fmt::Display for ImportStmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dots = ".".repeat(self.level);
        if self.names.is_empty() && self.level == 0 {
            write!(f, "import {}", self.module)
        } else {
            write!(f, "from {dots}{} import {}", self.module, self.names.join(", "))
        }
    }
}

/// Extracts all static import statements from Python source.
pub fn parse_imports(source: &str) -> Vec<ImportStmt> {
    let code = strip_strings_and_comments(source);
    let mut imports = Vec::new();
    for (line, text) in logical_lines(&code) {
        for stmt in text.split(';') {
            parse_statement(stmt.trim(), line, &mut imports);
        }
    }
    imports
}

fn parse_statement(stmt: &str, line: usize, out: &mut Vec<ImportStmt>) {
    if let Some(rest) = strip_keyword(stmt, "import") {
        for item in rest.split(',') {
            let module = item.split(" as ").next().unwrap_or("").trim();
            if is_dotted_name(module) {
                out.push(ImportStmt {
                    level: 0,
                    module: module.to_string(),
                    names: Vec::new(),
                    line,
                });
            }
        }
    } else if let Some(rest) = strip_keyword(stmt, "from") {
        let Some((spec, names)) = rest.split_once(" import") else {
            return;
        };
        let spec = spec.trim();
        let level = spec.chars().take_while(|&c| c == '.').count();
        let module = &spec[level..];
        if !module.is_empty() && !is_dotted_name(module) {
            return;
        }
        if level == 0 && module.is_empty() {
            return;
        }
        let names: Vec<String> = names
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(|n| n.split(" as ").next().unwrap_or("").trim())
            .filter(|n| *n == "*" || is_dotted_name(n))
            .map(str::to_string)
            .collect();
        out.push(ImportStmt {
            level,
            module: module.to_string(),
            names,
            line,
        });
    }
}

/// Returns the text after `keyword` if the statement starts with it as a word.
fn strip_keyword<'a>(stmt: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = stmt.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim_start())
}

fn is_dotted_name(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        })
}

/// Joins physical lines into logical lines (open brackets and trailing
/// backslashes continue a line). Returns `(first line number, text)`.
fn logical_lines(code: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start = 1;
    let mut depth: i32 = 0;
    for (idx, raw) in code.lines().enumerate() {
        if current.is_empty() {
            start = idx + 1;
        }
        let (text, continued) = match raw.strip_suffix('\\') {
            Some(text) => (text, true),
            None => (raw, false),
        };
        for c in text.chars() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = (depth - 1).max(0),
                _ => {}
            }
        }
        current.push_str(text);
        current.push(' ');
        if depth == 0 && !continued {
            lines.push((start, std::mem::take(&mut current)));
        }
    }
    if !current.trim().is_empty() {
        lines.push((start, current));
    }
    lines
}

/// Removes comments and the contents of string literals, keeping newlines so
/// line numbers stay meaningful.
fn strip_strings_and_comments(source: &str) -> String {
    #[derive(Clone, Copy)]
    enum State {
        Code,
        Comment,
        Str { quote: char, triple: bool },
    }

    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match state {
            State::Code => match c {
                '#' => state = State::Comment,
                '"' | '\'' => {
                    let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                    state = State::Str { quote: c, triple };
                    out.push_str("\"\"");
                    if triple {
                        i += 2;
                    }
                }
                _ => out.push(c),
            },
            State::Comment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::Str { quote, triple } => {
                if c == '\\' {
                    if chars.get(i + 1) == Some(&'\n') {
                        out.push('\n');
                    }
                    i += 1;
                } else if c == '\n' {
                    out.push('\n');
                    if !triple {
                        state = State::Code;
                    }
                } else if c == quote
                    && (!triple
                        || (chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote)))
                {
                    if triple {
                        i += 2;
                    }
                    state = State::Code;
                }
            }
        }
        i += 1;
    }
    out
}
