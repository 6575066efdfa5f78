//! Check builders over the compiler's embedded API
//!
//! Every builder on [`Checks`] returns a [`DeferredCheck`]: nothing touches
//! the compiler until the check is run. Each stage of the pipeline
//! (lex, parse, type-check, pretty-print) feeds its diagnostics through
//! [`compare`] so a failing check reports every mismatching field at once.
//!
//! Module resolution during type checking reads through the
//! [`FileSystem`] the checks were built with, so a [`MockFileSystem`] can
//! stand in for modules that do not exist on disk.
//!
//! [`MockFileSystem`]: crate::mockfs::MockFileSystem

use crate::batch::{BatchAssertion, BatchFailure};
use crate::diagnostics::{DiagnosticRecord, ExpectedDiagnostic, compare};
use crate::mockfs::{FileSystem, RealFileSystem};

/// Options passed to the type checker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCheckOptions {
    pub filename: String,
    /// Report unknown references as notes instead of errors
    pub lax: bool,
}

/// Diagnostics produced by one type-check pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCheckReport {
    pub errors: Vec<DiagnosticRecord>,
    /// Unresolved references, only reported in lax mode
    pub unknowns: Vec<DiagnosticRecord>,
}

/// Diagnostics produced by the full compiler pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub syntax_errors: Vec<DiagnosticRecord>,
    pub type_errors: Vec<DiagnosticRecord>,
    pub warnings: Vec<DiagnosticRecord>,
}

/// The compiler operations the checks drive
///
/// Every file the compiler reads while checking (required modules,
/// declaration files) must go through `fs`.
pub trait CompilerApi {
    type Tokens;
    type Ast;

    fn lex(&self, source: &str) -> Self::Tokens;

    /// Parse `tokens`, appending syntax errors to `syntax_errors`
    fn parse_program(&self, tokens: Self::Tokens, syntax_errors: &mut Vec<DiagnosticRecord>) -> Self::Ast;

    fn type_check(
        &self,
        ast: &Self::Ast,
        options: &TypeCheckOptions,
        fs: &dyn FileSystem,
    ) -> TypeCheckReport;

    fn pretty_print(&self, ast: &Self::Ast) -> String;

    fn process_string(&self, source: &str, fs: &dyn FileSystem) -> ProcessReport;
}

/// Outcome of a deferred check
pub type CheckOutcome = std::result::Result<(), BatchFailure>;

/// A named check that runs when asked to
pub struct DeferredCheck<'a> {
    name: String,
    run: Box<dyn FnOnce() -> CheckOutcome + 'a>,
}

impl<'a> DeferredCheck<'a> {
    pub fn new(name: impl Into<String>, run: impl FnOnce() -> CheckOutcome + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(self) -> CheckOutcome {
        tracing::debug!("running {} check", self.name);
        (self.run)()
    }

    /// Run and panic with the aggregated report on failure
    #[track_caller]
    pub fn assert(self) {
        let name = self.name.clone();
        if let Err(failure) = self.run() {
            panic!("{name} check failed\n{failure}");
        }
    }
}

/// Check builders bound to one compiler
pub struct Checks<'a, C: CompilerApi> {
    api: &'a C,
    fs: &'a dyn FileSystem,
    filename: String,
}

impl<'a, C: CompilerApi> Checks<'a, C> {
    /// Checks reading from the real filesystem
    pub fn new(api: &'a C) -> Self {
        Self {
            api,
            fs: &RealFileSystem,
            filename: "test.tl".to_string(),
        }
    }

    /// Filesystem handed to the compiler for every file it reads
    pub fn with_filesystem(mut self, fs: &'a dyn FileSystem) -> Self {
        self.fs = fs;
        self
    }

    /// Filename reported to the type checker
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Code must parse and type-check cleanly in strict mode
    pub fn strict(&self, code: &str) -> DeferredCheck<'a> {
        self.clean("strict", code, false, None)
    }

    /// Code must parse and type-check cleanly in lax mode; when `unknowns`
    /// is given, the unresolved references must match it
    pub fn lax(&self, code: &str, unknowns: Option<Vec<ExpectedDiagnostic>>) -> DeferredCheck<'a> {
        self.clean("lax", code, true, unknowns)
    }

    fn clean(
        &self,
        name: &str,
        code: &str,
        lax: bool,
        unknowns: Option<Vec<ExpectedDiagnostic>>,
    ) -> DeferredCheck<'a> {
        let (api, fs) = (self.api, self.fs);
        let code = code.to_string();
        let options = TypeCheckOptions {
            filename: self.filename.clone(),
            lax,
        };
        DeferredCheck::new(name, move || {
            let ast = parse_clean(api, &code)?;
            let report = api.type_check(&ast, &options, fs);

            let mut batch = BatchAssertion::new();
            compare("type errors", &[], &report.errors, &mut batch);
            if let Some(unknowns) = &unknowns {
                compare("unknowns", unknowns, &report.unknowns, &mut batch);
            }
            batch.assert_all()
        })
    }

    /// Code must parse cleanly and produce exactly the `expected` type errors
    pub fn type_errors(&self, code: &str, expected: Vec<ExpectedDiagnostic>) -> DeferredCheck<'a> {
        let (api, fs) = (self.api, self.fs);
        let code = code.to_string();
        let options = TypeCheckOptions {
            filename: self.filename.clone(),
            lax: false,
        };
        DeferredCheck::new("type error", move || {
            let ast = parse_clean(api, &code)?;
            let report = api.type_check(&ast, &options, fs);

            let mut batch = BatchAssertion::new();
            compare("type errors", &expected, &report.errors, &mut batch);
            batch.assert_all()
        })
    }

    /// Parsing must produce exactly the `expected` syntax errors
    pub fn syntax_errors(&self, code: &str, expected: Vec<ExpectedDiagnostic>) -> DeferredCheck<'a> {
        let api = self.api;
        let code = code.to_string();
        DeferredCheck::new("syntax error", move || {
            let mut syntax_errors = Vec::new();
            let tokens = api.lex(&code);
            api.parse_program(tokens, &mut syntax_errors);

            let mut batch = BatchAssertion::new();
            compare("syntax errors", &expected, &syntax_errors, &mut batch);
            batch.assert_all()
        })
    }

    /// The full pipeline must produce exactly the `expected` warnings, and
    /// the `errors` too when given
    pub fn warnings(
        &self,
        code: &str,
        expected: Vec<ExpectedDiagnostic>,
        errors: Option<Vec<ExpectedDiagnostic>>,
    ) -> DeferredCheck<'a> {
        let (api, fs) = (self.api, self.fs);
        let code = code.to_string();
        DeferredCheck::new("warning", move || {
            let report = api.process_string(&code, fs);

            let mut batch = BatchAssertion::new();
            compare("warnings", &expected, &report.warnings, &mut batch);
            if let Some(errors) = &errors {
                compare("type errors", errors, &report.type_errors, &mut batch);
            }
            batch.assert_all()
        })
    }

    /// Pretty-printing `code` must give the same text as pretty-printing
    /// `expected`
    pub fn pretty_print(&self, code: &str, expected: &str) -> DeferredCheck<'a> {
        let (api, fs) = (self.api, self.fs);
        let code = code.to_string();
        let expected = expected.to_string();
        let options = TypeCheckOptions {
            filename: self.filename.clone(),
            lax: false,
        };
        DeferredCheck::new("pretty-print", move || {
            let ast = parse_clean(api, &code)?;
            api.type_check(&ast, &options, fs);
            let actual_output = api.pretty_print(&ast);

            let expected_ast = parse_clean(api, &expected)?;
            let expected_output = api.pretty_print(&expected_ast);

            let mut batch = BatchAssertion::new();
            batch.eq("pretty-printed output", expected_output, actual_output);
            batch.assert_all()
        })
    }

    /// Code fails the strict check but is a valid lax program with the
    /// given unresolved references
    pub fn strict_then_lax(&self, code: &str, unknowns: Vec<ExpectedDiagnostic>) -> DeferredCheck<'a> {
        let strict = self.strict(code);
        let lax = self.lax(code, Some(unknowns));
        DeferredCheck::new("strict-then-lax", move || match strict.run() {
            Ok(()) => Ok(()),
            Err(strict_failure) => {
                tracing::debug!(
                    "strict check failed with {} mismatches, retrying in lax mode",
                    strict_failure.failures.len()
                );
                lax.run()
            }
        })
    }
}

/// Lex and parse, failing unless there are no syntax errors
fn parse_clean<C: CompilerApi>(api: &C, code: &str) -> std::result::Result<C::Ast, BatchFailure> {
    let mut syntax_errors = Vec::new();
    let tokens = api.lex(code);
    let ast = api.parse_program(tokens, &mut syntax_errors);

    let mut batch = BatchAssertion::new();
    compare("syntax errors", &[], &syntax_errors, &mut batch);
    batch.assert_all()?;
    Ok(ast)
}
