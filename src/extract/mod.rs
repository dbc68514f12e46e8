//! # Extract
//!
//! Turns the declarations of a source file into stub-eligible [`SignatureRecord`]s
//!
//! [`Declarations`] reads top-level declarations out of C-family source text. [`Extractor`] adapts
//! any source of declarations into signature records, skipping declarations that aren't
//! functions or that carry no usable fixed-address section.

pub mod lexer;
pub mod scanner;

use thiserror::Error;

use crate::address::{parse_address, AddressError};
use crate::convention::CallingConvention;
use crate::signature::SignatureRecord;

pub use scanner::Declarations;

/// Errors that stop a declaration scan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// `/*` without a closing `*/`
    #[error("line {line}: unterminated comment")]
    UnterminatedComment {
        /// Line the comment starts on
        line: usize,
    },
    /// String or character literal without its closing quote
    #[error("line {line}: unterminated literal")]
    UnterminatedLiteral {
        /// Line the literal starts on
        line: usize,
    },
    /// Closing bracket that doesn't match the innermost open one
    #[error("line {line}: unexpected '{found}'")]
    Unbalanced {
        /// Line of the bracket
        line: usize,
        /// The bracket found
        found: char,
    },
    /// Input ended inside a declaration or block
    #[error("line {line}: unexpected end of input")]
    UnexpectedEof {
        /// Line the unfinished construct starts on
        line: usize,
    },
}

/// Function declaration as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    /// Function name
    pub name: String,
    /// Parameter names in declaration order, empty for unnamed parameters
    pub parameters: Vec<String>,
    /// Calling convention
    pub convention: CallingConvention,
    /// Section annotation, if any
    pub section: Option<String>,
    /// Line the declaration starts on
    pub line: usize,
}

/// Top-level declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// Function declaration or definition
    Function(FunctionDecl),
    /// Anything else
    Other {
        /// Line the declaration starts on
        line: usize,
    },
}

/// Reason a declaration produced no stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Declaration is not a function
    NotAFunction,
    /// Function has no section annotation
    NoAnnotation {
        /// Function name
        name: String,
    },
    /// Function is placed in a section that isn't a fixed-address section
    ForeignSection {
        /// Function name
        name: String,
        /// Section name
        section: String,
    },
    /// Fixed-address section whose address can't be parsed
    BadAddress {
        /// Function name
        name: String,
        /// Parse failure
        error: AddressError,
    },
}

impl Skip {
    /// Diagnostic to report for this skip, if it is worth reporting
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Skip::BadAddress { error, .. } if error.is_reportable() => Some(error.to_string()),
            _ => None,
        }
    }
}

/// Result of extracting one declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Declaration is eligible for a stub
    Signature(SignatureRecord),
    /// Declaration was skipped
    Skipped(Skip),
}

/// Resolves one declaration into a signature record
pub fn extract(declaration: Declaration) -> Extracted {
    let function = match declaration {
        Declaration::Function(function) => function,
        Declaration::Other { .. } => return Extracted::Skipped(Skip::NotAFunction),
    };
    let FunctionDecl {
        name,
        parameters,
        convention,
        section,
        ..
    } = function;
    let Some(section) = section else {
        return Extracted::Skipped(Skip::NoAnnotation { name });
    };
    match parse_address(&section) {
        Ok(address) => Extracted::Signature(SignatureRecord {
            name,
            parameters,
            convention,
            address,
        }),
        Err(AddressError::MissingPrefix) => {
            Extracted::Skipped(Skip::ForeignSection { name, section })
        }
        Err(error) => Extracted::Skipped(Skip::BadAddress { name, error }),
    }
}

/// Adapts a sequence of declarations into a sequence of [`Extracted`] records
///
/// Errors from the underlying sequence are passed through unchanged.
pub struct Extractor<I> {
    /// Underlying declarations
    declarations: I,
}

impl<I> Extractor<I> {
    /// Creates a new extractor over `declarations`
    pub fn new(declarations: I) -> Self {
        Self { declarations }
    }
}

impl<I, E> Iterator for Extractor<I>
where
    I: Iterator<Item = Result<Declaration, E>>,
{
    type Item = Result<Extracted, E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.declarations.next().map(|d| d.map(extract))
    }
}

#[cfg(test)]
mod tests {
    use super::{extract, Declaration, Declarations, Extracted, Extractor, FunctionDecl, Skip};
    use crate::address::AddressError;
    use crate::convention::CallingConvention;
    use crate::signature::SignatureRecord;

    /// Function declaration with the given section
    fn decl(section: Option<&str>) -> Declaration {
        Declaration::Function(FunctionDecl {
            name: "f".into(),
            parameters: vec!["a".into()],
            convention: CallingConvention::RegisterFast,
            section: section.map(Into::into),
            line: 1,
        })
    }

    #[test]
    /// Fixed-address functions become signature records
    fn test_signature() {
        assert_eq!(
            extract(decl(Some(".text.0x401000"))),
            Extracted::Signature(SignatureRecord::new(
                "f",
                ["a"],
                CallingConvention::RegisterFast,
                0x401000
            ))
        );
    }

    #[test]
    /// Skips and which of them are reported
    fn test_skips() {
        let skip = |d| match extract(d) {
            Extracted::Skipped(skip) => skip,
            other => panic!("expected a skip, got {:?}", other),
        };

        let s = skip(Declaration::Other { line: 3 });
        assert_eq!(s, Skip::NotAFunction);
        assert_eq!(s.diagnostic(), None);

        let s = skip(decl(None));
        assert_eq!(s, Skip::NoAnnotation { name: "f".into() });
        assert_eq!(s.diagnostic(), None);

        let s = skip(decl(Some(".init")));
        assert!(matches!(s, Skip::ForeignSection { ref section, .. } if section == ".init"));
        assert_eq!(s.diagnostic(), None);

        let s = skip(decl(Some(".text.0x12.5")));
        assert_eq!(
            s,
            Skip::BadAddress {
                name: "f".into(),
                error: AddressError::InvalidHex("12.5".into())
            }
        );
        assert_eq!(
            s.diagnostic().as_deref(),
            Some("unable to parse hexadecimal value '12.5'")
        );
    }

    #[test]
    /// A declaration without an annotation doesn't stop the ones after it
    fn test_extractor_continues() {
        let source = r#"
            void a(int x);
            void __fastcall b(int x, int y) __attribute__((section(".text.0x1000")));
        "#;
        let extracted: Vec<_> = Extractor::new(Declarations::new(source))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            extracted,
            [
                Extracted::Skipped(Skip::NoAnnotation { name: "a".into() }),
                Extracted::Signature(SignatureRecord::new(
                    "b",
                    ["x", "y"],
                    CallingConvention::RegisterFast,
                    0x1000
                )),
            ]
        );
    }
}
