//! Block-structure parser for SCSS and plain CSS.
//!
//! Produces an untyped tree of blocks and statements. Nothing is evaluated
//! here: `$variables`, nesting and `@import` are resolved by the compiler.
//! Statements are classified by how they end: a chunk closed by `{` opens a
//! block, one closed by `;` or `}` is a declaration or at-statement.

use std::path::Path;

use crate::error::{transform_err, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Raw {
    Decl {
        property: String,
        value: String,
        line: usize,
    },
    Var {
        name: String,
        value: String,
        default: bool,
        global: bool,
        line: usize,
    },
    /// `header { children }`; header is a selector list or `@name prelude`.
    Block {
        header: String,
        children: Vec<Raw>,
        line: usize,
    },
    /// `@name prelude;`
    Statement { text: String, line: usize },
    /// `/* ... */` between statements, delimiters included.
    Comment { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Open,
    Semi,
    Close,
    Eof,
}

pub(crate) fn parse(text: &str, path: &Path, stage: &'static str) -> Result<Vec<Raw>, PipelineError> {
    let mut parser = Parser {
        src: text.chars().collect(),
        pos: 0,
        line: 1,
        path,
        stage,
    };
    parser.block(None)
}

struct Parser<'a> {
    src: Vec<char>,
    pos: usize,
    line: usize,
    path: &'a Path,
    stage: &'static str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn err(&self, line: usize, message: impl Into<String>) -> PipelineError {
        transform_err(self.stage, self.path, Some(line), message)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn block_comment(&mut self) -> Result<String, PipelineError> {
        let line = self.line;
        let start = self.pos;
        self.bump();
        self.bump();
        loop {
            match self.bump() {
                None => return Err(self.err(line, "unterminated comment")),
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(self.src[start..self.pos].iter().collect());
                }
                Some(_) => {}
            }
        }
    }

    fn block(&mut self, opened_at: Option<usize>) -> Result<Vec<Raw>, PipelineError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let line = self.line;
            match (self.peek(), self.peek_at(1)) {
                (None, _) => {
                    return match opened_at {
                        Some(open) => Err(self.err(open, "unclosed '{'")),
                        None => Ok(out),
                    }
                }
                (Some('}'), _) => {
                    if opened_at.is_none() {
                        return Err(self.err(line, "unexpected '}'"));
                    }
                    self.bump();
                    return Ok(out);
                }
                (Some('/'), Some('/')) => self.skip_line_comment(),
                (Some('/'), Some('*')) => {
                    let text = self.block_comment()?;
                    out.push(Raw::Comment { text });
                }
                (Some(';'), _) => {
                    self.bump();
                }
                _ => {
                    let (chunk, end) = self.chunk()?;
                    let chunk = chunk.trim().to_string();
                    match end {
                        End::Open => {
                            self.bump();
                            let children = self.block(Some(line))?;
                            out.push(Raw::Block {
                                header: collapse_ws(&chunk),
                                children,
                                line,
                            });
                        }
                        End::Semi | End::Close | End::Eof => {
                            if end == End::Semi {
                                self.bump();
                            }
                            if !chunk.is_empty() {
                                out.push(self.statement(&chunk, line)?);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Read up to the next top-level `;`, `{` or `}` without consuming it.
    fn chunk(&mut self) -> Result<(String, End), PipelineError> {
        let mut text = String::new();
        let mut depth = 0usize;
        let start_line = self.line;
        loop {
            let Some(c) = self.peek() else {
                if depth > 0 {
                    return Err(self.err(start_line, "unbalanced '('"));
                }
                return Ok((text, End::Eof));
            };
            match c {
                '"' | '\'' => self.string(c, &mut text)?,
                '/' if self.peek_at(1) == Some('*') => {
                    self.block_comment()?;
                    text.push(' ');
                }
                '/' if self.peek_at(1) == Some('/') && depth == 0 => self.skip_line_comment(),
                '#' if self.peek_at(1) == Some('{') => self.interpolation(&mut text)?,
                '(' => {
                    depth += 1;
                    text.push(c);
                    self.bump();
                }
                ')' => {
                    if depth == 0 {
                        return Err(self.err(self.line, "unbalanced ')'"));
                    }
                    depth -= 1;
                    text.push(c);
                    self.bump();
                }
                ';' if depth == 0 => return Ok((text, End::Semi)),
                '{' if depth == 0 => return Ok((text, End::Open)),
                '}' if depth == 0 => return Ok((text, End::Close)),
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn string(&mut self, quote: char, text: &mut String) -> Result<(), PipelineError> {
        let line = self.line;
        text.push(quote);
        self.bump();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.err(line, "unterminated string")),
                Some('\\') => {
                    text.push('\\');
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                }
                Some(c) if c == quote => {
                    text.push(c);
                    return Ok(());
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn interpolation(&mut self, text: &mut String) -> Result<(), PipelineError> {
        let line = self.line;
        let mut depth = 0usize;
        loop {
            match self.bump() {
                None => return Err(self.err(line, "unterminated '#{'")),
                Some(c) => {
                    text.push(c);
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn statement(&self, chunk: &str, line: usize) -> Result<Raw, PipelineError> {
        if chunk.starts_with('@') {
            return Ok(Raw::Statement {
                text: collapse_ws(chunk),
                line,
            });
        }
        let Some((left, right)) = chunk.split_once(':') else {
            return Err(self.err(line, format!("expected a declaration, found '{chunk}'")));
        };
        let property = left.trim();
        let mut value = right.trim();

        if let Some(name) = property.strip_prefix('$') {
            let mut default = false;
            let mut global = false;
            loop {
                if let Some(rest) = value.strip_suffix("!default") {
                    default = true;
                    value = rest.trim_end();
                } else if let Some(rest) = value.strip_suffix("!global") {
                    global = true;
                    value = rest.trim_end();
                } else {
                    break;
                }
            }
            return Ok(Raw::Var {
                name: name.to_string(),
                value: value.to_string(),
                default,
                global,
                line,
            });
        }

        if property.is_empty() || property.contains(char::is_whitespace) {
            return Err(self.err(line, format!("invalid property name '{property}'")));
        }
        if value.is_empty() {
            return Err(self.err(line, format!("missing value for '{property}'")));
        }
        Ok(Raw::Decl {
            property: property.to_string(),
            value: value.to_string(),
            line,
        })
    }
}

/// Collapse whitespace runs outside quotes to one space.
pub(crate) fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in text.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Result<Vec<Raw>, PipelineError> {
        parse(text, Path::new("test.scss"), "scss")
    }

    fn line_of(err: PipelineError) -> Option<usize> {
        match err {
            PipelineError::Transform { line, .. } => line,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_blocks_and_declarations() {
        let tree = p("$gap: 4px !default;\n.a {\n  color: red;\n  &:hover { color: blue }\n}\n").unwrap();
        assert_eq!(tree.len(), 2);
        assert!(matches!(&tree[0], Raw::Var { name, default: true, .. } if name == "gap"));
        let Raw::Block { header, children, line } = &tree[1] else {
            panic!("expected block");
        };
        assert_eq!(header, ".a");
        assert_eq!(*line, 2);
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], Raw::Block { header, .. } if header == "&:hover"));
    }

    #[test]
    fn semicolons_inside_parens_and_strings_do_not_split() {
        let tree = p("a { background: url(data:image/png;base64,xx); content: \"a;b\" }").unwrap();
        let Raw::Block { children, .. } = &tree[0] else {
            panic!("expected block");
        };
        assert!(matches!(&children[0], Raw::Decl { value, .. } if value == "url(data:image/png;base64,xx)"));
        assert!(matches!(&children[1], Raw::Decl { value, .. } if value == "\"a;b\""));
    }

    #[test]
    fn line_comments_are_dropped_but_urls_survive() {
        let tree = p("// header\na { b: url(//cdn.example.com/x.png); } // trailing").unwrap();
        let Raw::Block { children, .. } = &tree[0] else {
            panic!("expected block");
        };
        assert!(matches!(&children[0], Raw::Decl { value, .. } if value == "url(//cdn.example.com/x.png)"));
    }

    #[test]
    fn unclosed_block_reports_opening_line() {
        let err = p("a {\n  color: red;\n\n.b {\n  color: blue;\n}\n").unwrap_err();
        assert_eq!(line_of(err), Some(1));
    }

    #[test]
    fn stray_close_brace_is_an_error() {
        let err = p("a { color: red; }\n}\n").unwrap_err();
        assert_eq!(line_of(err), Some(2));
    }

    #[test]
    fn at_statements_and_comments() {
        let tree = p("@import 'base';\n/*! keep */\n@charset \"utf-8\";").unwrap();
        assert!(matches!(&tree[0], Raw::Statement { text, line: 1 } if text == "@import 'base'"));
        assert!(matches!(&tree[1], Raw::Comment { text } if text == "/*! keep */"));
        assert!(matches!(&tree[2], Raw::Statement { .. }));
    }

    #[test]
    fn collapse_ws_keeps_quoted_runs() {
        assert_eq!(collapse_ws("  a   b\n\tc  "), "a b c");
        assert_eq!(collapse_ws("'x   y'   z"), "'x   y' z");
    }
}
