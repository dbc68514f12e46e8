//! # Scanner
//!
//! Groups tokens into top-level declarations and reads function declarations out of them
//!
//! Only the shape of a declaration matters here: its name, its parameter names, its calling
//! convention keyword and any section annotation. Types are never interpreted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::iter::Peekable;

use lazy_static::lazy_static;

use crate::convention::CallingConvention;

use super::lexer::{Lexer, Spanned, Token};
use super::{Declaration, FunctionDecl, ScanError};

lazy_static! {
    /// Calling-convention keywords written directly in a declaration
    static ref CONVENTION_KEYWORDS: HashMap<&'static str, CallingConvention> = HashMap::from([
        ("__fastcall", CallingConvention::RegisterFast),
        ("_fastcall", CallingConvention::RegisterFast),
        ("__cdecl", CallingConvention::Default),
        ("_cdecl", CallingConvention::Default),
        ("__stdcall", CallingConvention::Default),
        ("_stdcall", CallingConvention::Default),
        ("__thiscall", CallingConvention::Default),
        ("__vectorcall", CallingConvention::Default),
    ]);

    /// Calling-convention names used inside `__attribute__((...))`
    static ref CONVENTION_ATTRIBUTES: HashMap<&'static str, CallingConvention> = HashMap::from([
        ("fastcall", CallingConvention::RegisterFast),
        ("__fastcall__", CallingConvention::RegisterFast),
        ("cdecl", CallingConvention::Default),
        ("__cdecl__", CallingConvention::Default),
        ("stdcall", CallingConvention::Default),
        ("__stdcall__", CallingConvention::Default),
        ("thiscall", CallingConvention::Default),
        ("__thiscall__", CallingConvention::Default),
    ]);

    /// Words that are never a declared name
    static ref KEYWORDS: HashSet<&'static str> = HashSet::from([
        "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
        "_Bool", "bool", "wchar_t", "_Complex", "__int8", "__int16", "__int32", "__int64",
        "const", "volatile", "restrict", "__restrict", "__restrict__", "struct", "union",
        "enum", "static", "extern", "inline", "__inline", "__inline__", "register", "auto",
        "typedef", "sizeof", "typeof", "__typeof__", "decltype", "__ptr32", "__ptr64",
        "__unaligned", "__w64",
    ]);

    /// Qualifiers that don't make up a type on their own
    static ref QUALIFIERS: HashSet<&'static str> = HashSet::from([
        "const", "volatile", "restrict", "__restrict", "__restrict__", "register",
    ]);
}

/// Attribute wrappers whose parenthesised contents are removed from a declaration
const ANNOTATION_WRAPPERS: [&str; 6] = [
    "__attribute__",
    "__attribute",
    "__declspec",
    "__asm__",
    "__asm",
    "asm",
];

/// Leading words of declarations that never declare a function
const NON_FUNCTION_LEADS: [&str; 6] = [
    "typedef",
    "using",
    "namespace",
    "template",
    "static_assert",
    "_Static_assert",
];

/// Pull-based sequence of the top-level declarations of a source text
///
/// A declaration with several declarators (`int f(int), g(int);`) yields one item per
/// declarator. Stops after the first error.
pub struct Declarations<'s> {
    /// Token stream
    tokens: Peekable<Lexer<'s>>,
    /// Number of open `extern "C" {` blocks
    extern_depth: usize,
    /// Line of the most recently consumed token
    line: usize,
    /// Declarators of the last declaration not yet returned
    pending: VecDeque<Declaration>,
    /// Set once the stream has ended or failed
    done: bool,
}

impl<'s> Declarations<'s> {
    /// Creates a declaration scanner over `source`
    pub fn new(source: &'s str) -> Self {
        Self {
            tokens: Lexer::new(source).peekable(),
            extern_depth: 0,
            line: 1,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Consumes the next token
    fn bump(&mut self) -> Result<Option<Spanned>, ScanError> {
        let spanned = self.tokens.next().transpose()?;
        if let Some(spanned) = &spanned {
            self.line = spanned.line;
        }
        Ok(spanned)
    }

    /// Consumes the next token, failing at the end of input
    fn expect(&mut self, start: usize) -> Result<Spanned, ScanError> {
        self.bump()?
            .ok_or(ScanError::UnexpectedEof { line: start })
    }

    /// Looks at the next token without consuming it
    fn peek(&mut self) -> Option<&Token> {
        match self.tokens.peek() {
            Some(Ok(spanned)) => Some(&spanned.token),
            _ => None,
        }
    }

    /// Reads the next declaration
    fn next_declaration(&mut self) -> Result<Option<Declaration>, ScanError> {
        if let Some(declaration) = self.pending.pop_front() {
            return Ok(Some(declaration));
        }
        loop {
            let first = match self.bump()? {
                Some(first) => first,
                None if self.extern_depth > 0 => {
                    return Err(ScanError::UnexpectedEof { line: self.line })
                }
                None => return Ok(None),
            };
            match first.token {
                Token::Punct(';') => continue,
                Token::Punct('}') if self.extern_depth > 0 => {
                    self.extern_depth -= 1;
                    continue;
                }
                Token::Punct(found @ (')' | ']' | '}')) => {
                    return Err(ScanError::Unbalanced {
                        line: first.line,
                        found,
                    })
                }
                _ => {}
            }
            if is_ident(&first.token, "extern") && matches!(self.peek(), Some(Token::Str(_))) {
                // linkage specification
                self.bump()?;
                if self.peek() == Some(&Token::Punct('{')) {
                    self.bump()?;
                    self.extern_depth += 1;
                    continue;
                }
                let first = self.expect(first.line)?;
                return self.declaration(first);
            }
            return self.declaration(first);
        }
    }

    /// Collects the tokens of the declaration starting with `first`, classifies them and returns
    /// the first declarator, queueing the others
    fn declaration(&mut self, first: Spanned) -> Result<Option<Declaration>, ScanError> {
        let line = first.line;
        let mut tokens = Vec::new();
        let mut closers = Vec::new();
        let mut next = Some(first);
        loop {
            let spanned = match next.take() {
                Some(spanned) => spanned,
                None => self.expect(line)?,
            };
            match spanned.token {
                Token::Punct('{') if closers.is_empty() => {
                    let ends = is_function_head(&tokens)
                        || tokens.first().map_or(false, |t| is_ident(t, "namespace"));
                    self.skip_block(spanned.line)?;
                    if ends {
                        break;
                    }
                    continue;
                }
                Token::Punct(open @ ('(' | '[' | '{')) => closers.push(closer(open)),
                Token::Punct(found @ (')' | ']' | '}')) => {
                    if closers.pop() != Some(found) {
                        return Err(ScanError::Unbalanced {
                            line: spanned.line,
                            found,
                        });
                    }
                }
                Token::Punct(';') if closers.is_empty() => break,
                _ => {}
            }
            tokens.push(spanned.token);
        }
        self.pending.extend(classify(&tokens, line));
        Ok(self.pending.pop_front())
    }

    /// Skips a brace-delimited block whose `{` has been consumed
    fn skip_block(&mut self, line: usize) -> Result<(), ScanError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.expect(line)?.token {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

impl<'s> Iterator for Declarations<'s> {
    type Item = Result<Declaration, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_declaration().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

/// Closing bracket for `open`
fn closer(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Whether `token` is the identifier `word`
fn is_ident(token: &Token, word: &str) -> bool {
    matches!(token, Token::Ident(w) if w == word)
}

/// Index of the `)` matching the `(` at `open`, or `tokens.len()` if there is none
fn matching(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Annotations collected from a declaration
#[derive(Debug, Default)]
struct Annotations {
    /// Calling convention, if one was spelled out
    convention: Option<CallingConvention>,
    /// Section name, if one was given
    section: Option<String>,
}

impl Annotations {
    /// Reads the contents of an `__attribute__((...))` or `__declspec(...)` group
    fn read_group(&mut self, inner: &[Token]) {
        for (i, token) in inner.iter().enumerate() {
            let Token::Ident(word) = token else {
                continue;
            };
            if let Some(convention) = CONVENTION_ATTRIBUTES.get(word.as_str()) {
                self.convention = Some(*convention);
            }
            let is_section = matches!(word.as_str(), "section" | "__section__" | "allocate");
            if is_section && inner.get(i + 1) == Some(&Token::Punct('(')) {
                // adjacent string literals concatenate
                let section: String = inner[i + 2..]
                    .iter()
                    .map_while(|t| match t {
                        Token::Str(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .collect();
                self.section = Some(section);
            }
        }
    }
}

/// Removes calling-convention keywords and attribute groups, returning what they said
fn strip_annotations(tokens: &[Token]) -> (Vec<Token>, Annotations) {
    let mut out = Vec::with_capacity(tokens.len());
    let mut annotations = Annotations::default();
    let mut i = 0;
    while i < tokens.len() {
        if let Token::Ident(word) = &tokens[i] {
            if ANNOTATION_WRAPPERS.contains(&word.as_str())
                && tokens.get(i + 1) == Some(&Token::Punct('('))
            {
                let close = matching(tokens, i + 1);
                if !word.contains("asm") {
                    annotations.read_group(&tokens[i + 2..close]);
                }
                i = close + 1;
                continue;
            }
            if let Some(convention) = CONVENTION_KEYWORDS.get(word.as_str()) {
                annotations.convention = Some(*convention);
                i += 1;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    (out, annotations)
}

/// Position of a function declarator within a declaration
struct Declarator {
    /// Index of the function name
    name: usize,
    /// Index of the `(` opening the parameter list
    open: usize,
    /// Index of the matching `)`
    close: usize,
}

/// Finds the function declarator, if the (stripped) tokens declare a function
fn find_declarator(tokens: &[Token]) -> Option<Declarator> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct('(') if depth == 0 && i > 0 => {
                let Token::Ident(name) = &tokens[i - 1] else {
                    // `int (*fp)(void)` and friends
                    return None;
                };
                if KEYWORDS.contains(name.as_str())
                    || matches!(
                        tokens.get(i + 1),
                        Some(Token::Punct('*' | '^' | '&'))
                    )
                {
                    return None;
                }
                return Some(Declarator {
                    name: i - 1,
                    open: i,
                    close: matching(tokens, i),
                });
            }
            Token::Punct('(' | '[') => depth += 1,
            Token::Punct(')' | ']') => depth = depth.saturating_sub(1),
            // initialised variable, `int x = f(1);`
            Token::Punct('=') if depth == 0 => return None,
            _ => {}
        }
    }
    None
}

/// Whether the tokens so far are a function declarator that a body may follow
fn is_function_head(tokens: &[Token]) -> bool {
    let (tokens, _) = strip_annotations(tokens);
    find_declarator(&tokens).map_or(false, |d| d.close + 1 == tokens.len())
}

/// Reads the parameter names of a parameter list (without its parentheses)
fn parameters(list: &[Token]) -> Vec<String> {
    let mut params: Vec<&[Token]> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in list.iter().enumerate() {
        match token {
            Token::Punct('(' | '[' | '{') => depth += 1,
            Token::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
            Token::Punct(',') if depth == 0 => {
                params.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&list[start..]);

    if let [only] = params[..] {
        if only.is_empty() || (only.len() == 1 && is_ident(&only[0], "void")) {
            return Vec::new();
        }
    }
    params
        .into_iter()
        .filter(|param| **param != [Token::Ellipsis])
        .map(parameter_name)
        .collect()
}

/// Reads the declared name of one parameter, or an empty string if it is unnamed
fn parameter_name(param: &[Token]) -> String {
    // parenthesised declarator, `int (*cb)(int)`
    for (i, token) in param.iter().enumerate() {
        if token == &Token::Punct('(')
            && matches!(param.get(i + 1), Some(Token::Punct('*' | '^' | '&')))
        {
            let close = matching(param, i);
            return param[i + 1..close]
                .iter()
                .rev()
                .find_map(|t| match t {
                    Token::Ident(w) if !KEYWORDS.contains(w.as_str()) => Some(w.clone()),
                    _ => None,
                })
                .unwrap_or_default();
        }
    }

    let mut depth = 0usize;
    let mut candidate = None;
    for (i, token) in param.iter().enumerate() {
        match token {
            Token::Punct('(' | '[') => depth += 1,
            Token::Punct(')' | ']') => depth = depth.saturating_sub(1),
            // default argument
            Token::Punct('=') if depth == 0 => break,
            Token::Ident(_) if depth == 0 => candidate = Some(i),
            _ => {}
        }
    }
    let Some(i) = candidate else {
        return String::new();
    };
    let Token::Ident(name) = &param[i] else {
        return String::new();
    };
    let has_type = param[..i]
        .iter()
        .any(|t| !matches!(t, Token::Ident(w) if QUALIFIERS.contains(w.as_str())));
    let tagged = i > 0
        && matches!(&param[i - 1], Token::Ident(w) if matches!(w.as_str(), "struct" | "union" | "enum"));
    if !has_type || tagged || KEYWORDS.contains(name.as_str()) {
        return String::new();
    }
    name.clone()
}

/// Splits a declaration at its top-level commas, one slice per declarator
fn split_declarators(tokens: &[Token]) -> Vec<&[Token]> {
    let mut declarators = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct('(' | '[' | '{') => depth += 1,
            Token::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
            Token::Punct(',') if depth == 0 => {
                declarators.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    declarators.push(&tokens[start..]);
    declarators
}

/// Length of the specifiers shared by every declarator, `int __fastcall` in
/// `int __fastcall f(int), g(int)`
fn specifier_len(tokens: &[Token]) -> usize {
    let mut name = None;
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Ident(word)
                if ANNOTATION_WRAPPERS.contains(&word.as_str())
                    && tokens.get(i + 1) == Some(&Token::Punct('(')) =>
            {
                i = matching(tokens, i + 1) + 1;
                continue;
            }
            Token::Ident(word) if !CONVENTION_KEYWORDS.contains_key(word.as_str()) => {
                name = Some(i)
            }
            Token::Punct('(' | '[' | '=') => break,
            _ => {}
        }
        i += 1;
    }
    // parenthesised declarator, `int (*fp)(void)`
    let parenthesised = tokens.get(i) == Some(&Token::Punct('('))
        && matches!(tokens.get(i + 1), Some(Token::Punct('*' | '^' | '&')));
    let mut end = match name {
        Some(name) if !parenthesised => name,
        _ => i.min(tokens.len()),
    };
    while end > 0 && matches!(tokens[end - 1], Token::Punct('*' | '&')) {
        end -= 1;
    }
    end
}

/// Classifies the tokens of one declaration, one entry per declarator
fn classify(tokens: &[Token], line: usize) -> Vec<Declaration> {
    let leads_elsewhere = tokens.first().map_or(false, |first| {
        NON_FUNCTION_LEADS.iter().any(|lead| is_ident(first, lead))
    });
    if leads_elsewhere {
        return vec![Declaration::Other { line }];
    }
    let declarators = split_declarators(tokens);
    let specifiers = &declarators[0][..specifier_len(declarators[0])];
    declarators
        .iter()
        .enumerate()
        .map(|(i, declarator)| {
            if i == 0 {
                classify_declarator(declarator, line)
            } else {
                classify_declarator(&[specifiers, *declarator].concat(), line)
            }
        })
        .collect()
}

/// Classifies a single declarator together with its specifiers
fn classify_declarator(tokens: &[Token], line: usize) -> Declaration {
    let (tokens, annotations) = strip_annotations(tokens);
    let Some(declarator) = find_declarator(&tokens) else {
        return Declaration::Other { line };
    };
    let Token::Ident(name) = &tokens[declarator.name] else {
        return Declaration::Other { line };
    };
    let list_end = declarator.close.min(tokens.len());
    Declaration::Function(FunctionDecl {
        name: name.clone(),
        parameters: parameters(&tokens[declarator.open + 1..list_end]),
        convention: annotations.convention.unwrap_or_default(),
        section: annotations.section,
        line,
    })
}
