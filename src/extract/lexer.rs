//! # Lexer
//!
//! Splits C-family source text into the few token kinds the declaration scanner needs

use std::collections::{HashMap, VecDeque};
use std::iter::Peekable;
use std::str::Chars;

use super::ScanError;

/// Token of C-family source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// String literal contents, escapes resolved
    Str(String),
    /// Numeric or character literal, verbatim
    Number(String),
    /// `...`
    Ellipsis,
    /// Any other single character
    Punct(char),
}

/// Token together with the line it started on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    /// The token
    pub token: Token,
    /// 1-based line number
    pub line: usize,
}

/// Limit on nested object-like macro expansion
const MAX_EXPANSION_DEPTH: usize = 8;

/// Lexer over a source text
///
/// Comments are dropped. Preprocessor lines are dropped too, except that object-like
/// `#define NAME tokens...` macros are recorded and expanded in the identifiers that follow, so
/// `#define FASTCALL __fastcall` works. Conditionals are not evaluated.
pub struct Lexer<'s> {
    /// Remaining input
    input: Peekable<Chars<'s>>,
    /// Current line, 1-based
    line: usize,
    /// Only whitespace has been seen since the last newline
    at_line_start: bool,
    /// Object-like macros defined so far
    macros: HashMap<String, Vec<Token>>,
    /// Expanded tokens waiting to be returned
    pending: VecDeque<Spanned>,
}

impl<'s> Lexer<'s> {
    /// Creates a lexer for `source`
    pub fn new(source: &'s str) -> Self {
        Self {
            input: source.chars().peekable(),
            line: 1,
            at_line_start: true,
            macros: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Consumes one character, keeping the line count
    fn bump(&mut self) -> Option<char> {
        let c = self.input.next()?;
        if c == '\n' {
            self.line += 1;
            self.at_line_start = true;
        }
        Some(c)
    }

    /// Consumes characters while `pred` holds, appending them to `buf`
    fn take_while(&mut self, buf: &mut String, pred: fn(char) -> bool) {
        while let Some(&c) = self.input.peek() {
            if !pred(c) {
                break;
            }
            buf.push(c);
            self.bump();
        }
    }

    /// Reads a preprocessor directive, honouring backslash continuations
    fn directive(&mut self) -> Result<(), ScanError> {
        let line = self.line;
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\n' => break,
                '\\' if self.input.peek() == Some(&'\n') => {
                    self.bump();
                    text.push(' ');
                }
                '/' if self.input.peek() == Some(&'*') => {
                    self.bump();
                    self.skip_block_comment(line)?;
                    text.push(' ');
                }
                c => text.push(c),
            }
        }
        self.define(&text);
        Ok(())
    }

    /// Records `#define` and `#undef` of object-like macros; other directives are ignored
    fn define(&mut self, directive: &str) {
        let directive = directive.trim_start_matches('#').trim_start();
        let (keyword, rest) = split_word(directive);
        let (name, body) = split_word(rest.trim_start());
        if name.is_empty() {
            return;
        }
        match keyword {
            // `NAME(` immediately after the name is a function-like macro
            "define" if !body.starts_with('(') => {
                let Ok(tokens) = Lexer::new(body)
                    .map(|t| t.map(|s| s.token))
                    .collect::<Result<Vec<_>, _>>()
                else {
                    return;
                };
                self.macros.insert(name.to_owned(), tokens);
            }
            "undef" => {
                self.macros.remove(name);
            }
            _ => {}
        }
    }

    /// Appends `token` to `out`, expanding it if it names a macro
    fn expand_into(&self, token: Token, depth: usize, out: &mut Vec<Token>) {
        if let Token::Ident(name) = &token {
            if depth < MAX_EXPANSION_DEPTH {
                if let Some(body) = self.macros.get(name) {
                    for t in body {
                        self.expand_into(t.clone(), depth + 1, out);
                    }
                    return;
                }
            }
        }
        out.push(token);
    }

    /// Skips the rest of a `/* */` comment whose opening `/*` has been consumed
    fn skip_block_comment(&mut self, line: usize) -> Result<(), ScanError> {
        loop {
            match self.bump() {
                Some('*') if self.input.peek() == Some(&'/') => {
                    self.bump();
                    self.at_line_start = false;
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(ScanError::UnterminatedComment { line }),
            }
        }
    }

    /// Reads a quoted literal whose opening `quote` has been consumed
    fn quoted(&mut self, quote: char) -> Result<String, ScanError> {
        let line = self.line;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    // line continuation
                    Some('\n') => {}
                    Some(c) => text.push(c),
                    None => return Err(ScanError::UnterminatedLiteral { line }),
                },
                Some(c) if c == quote => return Ok(text),
                Some('\n') | None => return Err(ScanError::UnterminatedLiteral { line }),
                Some(c) => text.push(c),
            }
        }
    }

    /// Reads the next token
    fn next_token(&mut self) -> Option<Result<Spanned, ScanError>> {
        loop {
            if let Some(spanned) = self.pending.pop_front() {
                return Some(Ok(spanned));
            }
            let c = *self.input.peek()?;
            let line = self.line;
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            if c == '#' && self.at_line_start {
                if let Err(e) = self.directive() {
                    return Some(Err(e));
                }
                continue;
            }
            self.at_line_start = false;
            self.bump();

            let token = match c {
                '/' if self.input.peek() == Some(&'/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '/' if self.input.peek() == Some(&'*') => {
                    self.bump();
                    if let Err(e) = self.skip_block_comment(line) {
                        return Some(Err(e));
                    }
                    continue;
                }
                '"' => match self.quoted('"') {
                    Ok(text) => Token::Str(text),
                    Err(e) => return Some(Err(e)),
                },
                '\'' => match self.quoted('\'') {
                    Ok(text) => Token::Number(format!("'{}'", text)),
                    Err(e) => return Some(Err(e)),
                },
                '.' if self.input.peek() == Some(&'.') => {
                    self.bump();
                    if self.input.peek() == Some(&'.') {
                        self.bump();
                        Token::Ellipsis
                    } else {
                        // `..` isn't C; hand back the second dot on its own
                        Token::Punct('.')
                    }
                }
                c if c.is_ascii_digit() => {
                    let mut text = c.to_string();
                    self.take_while(&mut text, |c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
                    Token::Number(text)
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    let mut text = c.to_string();
                    self.take_while(&mut text, |c| c.is_alphanumeric() || c == '_' || c == '$');
                    if self.macros.contains_key(&text) {
                        let mut expanded = Vec::new();
                        self.expand_into(Token::Ident(text), 0, &mut expanded);
                        self.pending
                            .extend(expanded.into_iter().map(|token| Spanned { token, line }));
                        continue;
                    }
                    Token::Ident(text)
                }
                c => Token::Punct(c),
            };
            return Some(Ok(Spanned { token, line }));
        }
    }
}

/// Splits off the leading identifier-like word of `text`
fn split_word(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(text.len());
    text.split_at(end)
}

impl<'s> Iterator for Lexer<'s> {
    type Item = Result<Spanned, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexer, Token};
    use crate::extract::ScanError;

    /// Lexes `source`, panicking on errors
    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .map(|t| t.map(|s| s.token))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// Shorthand for an identifier token
    fn ident(s: &str) -> Token {
        Token::Ident(s.to_owned())
    }

    #[test]
    /// A simple prototype
    fn test_prototype() {
        assert_eq!(
            tokens("int f(char *s, ...);"),
            vec![
                ident("int"),
                ident("f"),
                Token::Punct('('),
                ident("char"),
                Token::Punct('*'),
                ident("s"),
                Token::Punct(','),
                Token::Ellipsis,
                Token::Punct(')'),
                Token::Punct(';'),
            ]
        );
    }

    #[test]
    /// Comments and directives are dropped
    fn test_trivia() {
        let source = "#include <stdint.h>\n\
                      #define X \\\n  continued\n\
                      // line comment\n\
                      /* block\n comment */ a /* inline */ b\n\
                      c # d\n";
        assert_eq!(
            tokens(source),
            vec![ident("a"), ident("b"), ident("c"), Token::Punct('#'), ident("d")]
        );
    }

    #[test]
    /// String literal escapes are resolved
    fn test_strings() {
        assert_eq!(
            tokens(r#"section(".text.0x10" "a\"b")"#),
            vec![
                ident("section"),
                Token::Punct('('),
                Token::Str(".text.0x10".into()),
                Token::Str("a\"b".into()),
                Token::Punct(')'),
            ]
        );
    }

    #[test]
    /// Line numbers follow newlines, including those in comments
    fn test_lines() {
        let lines: Vec<_> = Lexer::new("a\n/*\n*/ b\n\nc")
            .map(|t| t.unwrap().line)
            .collect();
        assert_eq!(lines, vec![1, 3, 5]);
    }

    #[test]
    /// Object-like macros expand in later identifiers, nested and empty ones included
    fn test_macros() {
        let source = "#define FASTCALL __fastcall\n\
                      #define API FASTCALL\n\
                      #define EMPTY\n\
                      #define SECTION(a) __attribute__((section(a)))\n\
                      int API EMPTY f SECTION(x);\n\
                      #undef FASTCALL\n\
                      FASTCALL";
        assert_eq!(
            tokens(source),
            vec![
                ident("int"),
                ident("__fastcall"),
                ident("f"),
                ident("SECTION"),
                Token::Punct('('),
                ident("x"),
                Token::Punct(')'),
                Token::Punct(';'),
                ident("FASTCALL"),
            ]
        );
    }

    #[test]
    /// Expanded tokens keep the line of the identifier they replace
    fn test_macro_lines() {
        let lines: Vec<_> = Lexer::new("#define CC __cdecl __fastcall\n\nCC")
            .map(|t| t.unwrap().line)
            .collect();
        assert_eq!(lines, vec![3, 3]);
    }

    #[test]
    /// Unterminated comments and literals are errors
    fn test_unterminated() {
        let err = Lexer::new("a\n/* open").find_map(Result::err).unwrap();
        assert_eq!(err, ScanError::UnterminatedComment { line: 2 });

        let err = Lexer::new("\"open\nx").find_map(Result::err).unwrap();
        assert_eq!(err, ScanError::UnterminatedLiteral { line: 1 });
    }
}
