//! Conservative script minifier.
//!
//! Drops comments (except `/*! ... */` banners) and indentation, and
//! squeezes spaces between tokens that do not need them. Line breaks are
//! kept wherever automatic semicolon insertion could depend on them, and
//! code is never reordered. Not a transpiler: output runs wherever the
//! input did.

use crate::error::{transform_err, PipelineError};
use crate::step::{map_text, Asset, Transform};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptMinify;

impl Transform for ScriptMinify {
    fn name(&self) -> &'static str {
        "script-minify"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, PipelineError> {
        map_text("script-minify", assets, |asset, text| {
            minify_script(text).map_err(|(line, message)| {
                transform_err("script-minify", asset.display_path(), Some(line), message)
            })
        })
    }
}

/// Keywords after which `/` starts a regular expression, not a division.
const REGEX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gap {
    None,
    Space,
    Newline,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// Minify `src`. Errors carry the 1-based line of the unterminated token.
pub fn minify_script(src: &str) -> Result<String, (usize, String)> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut line = 1usize;
    let mut gap = Gap::None;
    let mut last: Option<char> = None;
    let mut word = String::new();
    // Last token was a postfix `++`/`--`, which ends an expression.
    let mut postfix = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            gap = Gap::Newline;
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            if gap == Gap::None {
                gap = Gap::Space;
            }
            i += 1;
            continue;
        }
        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && next == Some('*') {
            let start_line = line;
            let start = i;
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err((start_line, "unterminated comment".to_string())),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => line += 1,
                    Some(_) => {}
                }
                i += 1;
            }
            let comment: String = chars[start..i].iter().collect();
            if comment.starts_with("/*!") {
                flush_gap(&mut out, gap, last, '/');
                gap = Gap::Newline;
                out.push_str(&comment);
                last = Some('/');
                word.clear();
            } else if comment.contains('\n') {
                gap = Gap::Newline;
            } else if gap == Gap::None {
                gap = Gap::Space;
            }
            continue;
        }

        flush_gap(&mut out, gap, last, c);
        gap = Gap::None;
        let after_postfix = std::mem::take(&mut postfix);

        match c {
            '"' | '\'' | '`' => {
                let start_line = line;
                out.push(c);
                i += 1;
                loop {
                    let Some(&s) = chars.get(i) else {
                        return Err((start_line, "unterminated string".to_string()));
                    };
                    out.push(s);
                    i += 1;
                    match s {
                        '\\' => {
                            if let Some(&escaped) = chars.get(i) {
                                if escaped == '\n' {
                                    line += 1;
                                }
                                out.push(escaped);
                                i += 1;
                            }
                        }
                        '\n' if c == '`' => line += 1,
                        '\n' => return Err((start_line, "unterminated string".to_string())),
                        _ if s == c => break,
                        _ => {}
                    }
                }
                last = Some(c);
                word.clear();
            }
            '/' if !after_postfix && regex_allowed(last, &word) => {
                let start_line = line;
                let mut in_class = false;
                out.push(c);
                i += 1;
                loop {
                    let Some(&r) = chars.get(i) else {
                        return Err((start_line, "unterminated regular expression".to_string()));
                    };
                    out.push(r);
                    i += 1;
                    match r {
                        '\\' => {
                            if let Some(&escaped) = chars.get(i) {
                                out.push(escaped);
                                i += 1;
                            }
                        }
                        '\n' => return Err((start_line, "unterminated regular expression".to_string())),
                        '[' => in_class = true,
                        ']' => in_class = false,
                        '/' if !in_class => break,
                        _ => {}
                    }
                }
                last = Some('/');
                word.clear();
            }
            '+' | '-' if next == Some(c) => {
                postfix = last.is_some_and(|p| is_word(p) || p == ')' || p == ']');
                out.push(c);
                out.push(c);
                last = Some(c);
                word.clear();
                i += 2;
            }
            _ => {
                if is_word(c) {
                    if !last.is_some_and(is_word) || !out.ends_with(|p: char| is_word(p)) {
                        word.clear();
                    }
                    word.push(c);
                } else {
                    word.clear();
                }
                out.push(c);
                last = Some(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Emit what a whitespace gap between `last` and `next` must become.
fn flush_gap(out: &mut String, gap: Gap, last: Option<char>, next: char) {
    let Some(prev) = last else {
        return;
    };
    match gap {
        Gap::None => {}
        Gap::Newline if !matches!(prev, ';' | ',' | '{' | '(' | '[') => out.push('\n'),
        Gap::Newline | Gap::Space => {
            let glue = (is_word(prev) && is_word(next))
                || (prev == '+' && next == '+')
                || (prev == '-' && next == '-')
                || (prev.is_ascii_digit() && next == '.');
            if glue {
                out.push(' ');
            }
        }
    }
}

fn regex_allowed(last: Option<char>, word: &str) -> bool {
    match last {
        None => true,
        Some(c) if "(,=:[!&|?{};+-*%<>~^".contains(c) => true,
        Some(c) if is_word(c) => REGEX_KEYWORDS.contains(&word),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min(src: &str) -> String {
        minify_script(src).unwrap()
    }

    #[test]
    fn strips_comments_and_indentation() {
        let src = "// header\nfunction add(a, b) {\n    /* sum */\n    return a + b;\n}\n";
        assert_eq!(min(src), "function add(a,b){return a+b;}");
    }

    #[test]
    fn keeps_banner_comments() {
        assert_eq!(min("/*! v1 */\nvar a = 1;"), "/*! v1 */\nvar a=1;");
    }

    #[test]
    fn strings_and_templates_are_verbatim() {
        assert_eq!(min("var s = 'a  // b';"), "var s='a  // b';");
        assert_eq!(min("let t = `x\n  ${ y }`;"), "let t=`x\n  ${ y }`;");
    }

    #[test]
    fn regex_literals_survive() {
        assert_eq!(min("var r = /\\/\\/ [/]x/g;"), "var r=/\\/\\/ [/]x/g;");
        assert_eq!(min("return /a b/.test(s)"), "return/a b/.test(s)");
        assert_eq!(min("x = a / b / c"), "x=a/b/c");
    }

    #[test]
    fn slash_after_postfix_increment_is_division() {
        assert_eq!(min("var x = i++ / 2;"), "var x=i++/2;");
        assert_eq!(min("y = a[0]-- / b / c"), "y=a[0]--/b/c");
        assert_eq!(min("z = f()++ /* n */ / 2"), "z=f()++/2");
        assert_eq!(min("x = ++i / 2"), "x=++i/2");
        assert_eq!(min("s = n++ + 1; t = /re/g"), "s=n++ +1;t=/re/g");
    }

    #[test]
    fn newlines_are_kept_where_asi_needs_them() {
        assert_eq!(min("a = 1\nb = 2\n"), "a=1\nb=2");
        assert_eq!(min("return\nvalue"), "return\nvalue");
    }

    #[test]
    fn operators_that_would_merge_keep_a_space() {
        assert_eq!(min("a + +b; c - -d"), "a+ +b;c- -d");
    }

    #[test]
    fn bundled_files_keep_their_order() {
        assert_eq!(min("A;\nB;"), "A;B;");
    }

    #[test]
    fn unterminated_tokens_report_their_line() {
        assert_eq!(minify_script("var a;\nvar s = 'oops\n").unwrap_err().0, 2);
        assert_eq!(minify_script("a;\n\n/* never closed").unwrap_err().0, 3);
    }
}
