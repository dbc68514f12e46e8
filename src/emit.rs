//! # Emit
//!
//! Drives stub generation over a whole sequence of declarations

use std::io::{self, Write};

use thiserror::Error;

use crate::extract::{Declaration, Extracted, Extractor};
use crate::stub::generate;

/// Errors that stop stub emission
#[derive(Debug, Error)]
pub enum EmitError<E> {
    /// The declaration source failed
    #[error("declaration traversal failed: {0}")]
    Traversal(E),
    /// Writing stubs or diagnostics failed
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Counts from a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitSummary {
    /// Stubs written
    pub stubs: usize,
    /// Declarations that produced no stub
    pub skipped: usize,
}

/// Writes one stub per eligible declaration to `out`, in order
///
/// Unparseable addresses are reported on `diagnostics` and skipped. `out` is flushed before
/// returning, so every stub generated before an error has been written.
pub fn emit_stubs<I, E, W, D>(
    declarations: I,
    out: &mut W,
    diagnostics: &mut D,
) -> Result<EmitSummary, EmitError<E>>
where
    I: IntoIterator<Item = Result<Declaration, E>>,
    W: Write,
    D: Write,
{
    let result = emit_unflushed(declarations, out, diagnostics);
    let flushed = out.flush();
    let summary = result?;
    flushed?;
    Ok(summary)
}

/// Body of [`emit_stubs`] without the final flush
fn emit_unflushed<I, E, W, D>(
    declarations: I,
    out: &mut W,
    diagnostics: &mut D,
) -> Result<EmitSummary, EmitError<E>>
where
    I: IntoIterator<Item = Result<Declaration, E>>,
    W: Write,
    D: Write,
{
    let mut summary = EmitSummary::default();
    for extracted in Extractor::new(declarations.into_iter()) {
        match extracted.map_err(EmitError::Traversal)? {
            Extracted::Signature(record) => {
                generate(&record).write_to(out)?;
                summary.stubs += 1;
            }
            Extracted::Skipped(skip) => {
                if let Some(message) = skip.diagnostic() {
                    writeln!(diagnostics, "{}", message)?;
                }
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use super::{emit_stubs, EmitError, EmitSummary};
    use crate::extract::{Declarations, ScanError};

    /// Runs [`emit_stubs`] over `source`, returning the result, output and diagnostics
    fn run(source: &str) -> (Result<EmitSummary, EmitError<ScanError>>, String, String) {
        let mut out = Vec::new();
        let mut diagnostics = Vec::new();
        let result = emit_stubs(Declarations::new(source), &mut out, &mut diagnostics);
        (
            result,
            String::from_utf8(out).unwrap(),
            String::from_utf8(diagnostics).unwrap(),
        )
    }

    #[test]
    /// Stubs come out in declaration order and skips are counted
    fn test_emit() {
        let source = r#"
            #include <stdint.h>

            void foo(void) __attribute__((section(".text.0x1A2B")));
            int __fastcall bar(int a, int b, int c) __attribute__((section(".text.0x400000")));
            int no_address(int a);
            struct s { int x; };
        "#;
        let (result, out, diagnostics) = run(source);
        assert_eq!(result.unwrap(), EmitSummary { stubs: 2, skipped: 2 });
        assert_eq!(diagnostics, "");
        assert_eq!(
            out,
            "; address: 0x001A2B\n\
             foo:\n  \
               push    ebp\n  \
               mov     ebp, esp\n  \
               call    [ia_foo]\n  \
               mov     esp, ebp\n  \
               push    ebp\n  \
               ret     0\n\
             \n\
             ; address: 0x400000\n\
             bar:\n  \
               push    ebp\n  \
               mov     ebp, esp\n  \
               push    DWORD [ebp + 8]    ; arg_3 (c)\n  \
               push    edx                 ; arg_2 (b)\n  \
               push    ecx                 ; arg_1 (a)\n  \
               call    [ia_bar]\n  \
               mov     esp, ebp\n  \
               push    ebp\n  \
               ret     4\n\
             \n"
        );
    }

    #[test]
    /// Bad addresses are reported and skipped without stopping the run
    fn test_bad_address() {
        let source = r#"
            void a(void) __attribute__((section(".text.0xZZ")));
            void b(void) __attribute__((section(".text.0x10")));
        "#;
        let (result, out, diagnostics) = run(source);
        assert_eq!(result.unwrap(), EmitSummary { stubs: 1, skipped: 1 });
        assert_eq!(diagnostics, "unable to parse hexadecimal value 'ZZ'\n");
        assert!(out.starts_with("; address: 0x000010\nb:\n"));
    }

    #[test]
    /// Stubs before a traversal failure have already been written
    fn test_traversal_failure() {
        let source = r#"
            void a(void) __attribute__((section(".text.0x10")));
            void b(int x
        "#;
        let (result, out, _) = run(source);
        assert!(matches!(
            result,
            Err(EmitError::Traversal(ScanError::UnexpectedEof { line: 3 }))
        ));
        assert!(out.contains("a:\n"));
        assert!(out.ends_with("  ret     0\n\n"));
    }

    #[test]
    /// Each declarator keeps its own address and macro conventions resolve
    fn test_declarators_and_macros() {
        let source = r#"
            #define FASTCALL __fastcall
            int f(int a) __attribute__((section(".text.0x10"))), g(int b) __attribute__((section(".text.0x20")));
            int FASTCALL h(int a, int b, int c) __attribute__((section(".text.0x30")));
        "#;
        let (result, out, _) = run(source);
        assert_eq!(result.unwrap(), EmitSummary { stubs: 3, skipped: 0 });
        assert!(out.contains("; address: 0x000010\nf:\n"));
        assert!(out.contains("; address: 0x000020\ng:\n"));
        assert!(out.contains("; address: 0x000030\nh:\n"));
        let h = &out[out.find("h:\n").unwrap()..];
        assert!(h.contains("  push    edx                 ; arg_2 (b)\n"));
        assert!(h.contains("  ret     4\n"));
    }

    #[test]
    /// An empty input emits nothing and succeeds
    fn test_empty() {
        let (result, out, diagnostics) = run("");
        assert_eq!(result.unwrap(), EmitSummary::default());
        assert!(out.is_empty());
        assert!(diagnostics.is_empty());
    }

    /// Sink that refuses every write
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    /// Output failures are reported as io errors
    fn test_output_failure() {
        let source = r#"void a(void) __attribute__((section(".text.0x10")));"#;
        let result = emit_stubs(Declarations::new(source), &mut Broken, &mut io::sink());
        assert!(matches!(result, Err(EmitError::Io(_))));
    }
}
