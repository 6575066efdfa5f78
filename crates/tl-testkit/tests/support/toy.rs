//! A tiny typed language implementing [`CompilerApi`]
//!
//! Programs are sequences of
//!
//! ```text
//! local <name> [: number|string] = <expr>
//! <name>(<expr>)
//! return <expr>
//! ```
//!
//! where `<expr>` is a number, a double-quoted string, a name or
//! `require("<module>")`. `print` is the only global. A required module is
//! read from `<module>.tl` (dots become `/`) through the filesystem given to
//! the type checker, and has the type of its `return` statement.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tl_testkit::{
    CompilerApi, DiagnosticRecord, FileSystem, ProcessReport, TypeCheckOptions, TypeCheckReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    Symbol,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Token {
    kind: TokenKind,
    text: String,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(String),
    Str(String),
    Name(String),
    Require(String),
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    expr: Expr,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Local {
        name: String,
        line: u32,
        column: u32,
        annotation: Option<String>,
        value: ExprNode,
    },
    Call {
        callee: ExprNode,
        arg: ExprNode,
    },
    Return {
        value: ExprNode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Number,
    Str,
    Function,
    Any,
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::Number => "number",
            Ty::Str => "string",
            Ty::Function => "function",
            Ty::Any => "any",
        })
    }
}

fn record(line: u32, column: u32, message: impl Into<String>, filename: &str) -> DiagnosticRecord {
    DiagnosticRecord::new(line, column, message).with_filename(filename)
}

fn lex(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let (mut i, mut line, mut column) = (0usize, 1u32, 1u32);

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            column = 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            column += 1;
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            TokenKind::Name
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            TokenKind::Number
        } else if c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != '"' && chars[i] != '\n' {
                i += 1;
            }
            if i < chars.len() && chars[i] == '"' {
                i += 1;
                TokenKind::Str
            } else {
                TokenKind::Invalid
            }
        } else {
            i += 1;
            if ":=()".contains(c) {
                TokenKind::Symbol
            } else {
                TokenKind::Invalid
            }
        };

        tokens.push(Token {
            kind,
            text: chars[start..i].iter().collect(),
            line,
            column,
        });
        column += (i - start) as u32;
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error_here(&self, message: &str) -> DiagnosticRecord {
        match self.peek().or(self.tokens.last()) {
            Some(token) => DiagnosticRecord::new(token.line, token.column, message),
            None => DiagnosticRecord::new(1, 1, message),
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Symbol && token.text == symbol => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), DiagnosticRecord> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error_here(&format!("syntax error, expected '{symbol}'")))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<Token, DiagnosticRecord> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Name && !is_keyword(&token.text) => {
                Ok(self.advance().expect("peeked token"))
            }
            _ => Err(self.error_here(&format!("syntax error, expected {what}"))),
        }
    }

    fn expr(&mut self) -> Result<ExprNode, DiagnosticRecord> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_here("syntax error, expected an expression"));
        };
        let expr = match token.kind {
            TokenKind::Number => Expr::Number(token.text.clone()),
            TokenKind::Str => Expr::Str(token.text.clone()),
            TokenKind::Name if token.text == "require" => {
                self.pos += 1;
                self.expect_symbol("(")?;
                let module = match self.peek() {
                    Some(arg) if arg.kind == TokenKind::Str => {
                        arg.text.trim_matches('"').to_string()
                    }
                    _ => return Err(self.error_here("syntax error, expected a module name")),
                };
                self.pos += 1;
                self.expect_symbol(")")?;
                return Ok(ExprNode {
                    expr: Expr::Require(module),
                    line: token.line,
                    column: token.column,
                });
            }
            TokenKind::Name if !is_keyword(&token.text) => Expr::Name(token.text.clone()),
            TokenKind::Invalid if token.text.starts_with('"') => {
                return Err(self.error_here("unfinished string"));
            }
            _ => return Err(self.error_here("syntax error, expected an expression")),
        };
        self.pos += 1;
        Ok(ExprNode {
            expr,
            line: token.line,
            column: token.column,
        })
    }

    fn statement(&mut self) -> Result<Stmt, DiagnosticRecord> {
        let first = self.advance().expect("statement starts at a token");
        match first.kind {
            TokenKind::Name if first.text == "local" => {
                let name = self.expect_name("a variable name")?;
                let annotation = if self.eat_symbol(":") {
                    Some(self.expect_name("a type name")?.text)
                } else {
                    None
                };
                self.expect_symbol("=")?;
                let value = self.expr()?;
                Ok(Stmt::Local {
                    name: name.text,
                    line: name.line,
                    column: name.column,
                    annotation,
                    value,
                })
            }
            TokenKind::Name if first.text == "return" => Ok(Stmt::Return { value: self.expr()? }),
            TokenKind::Name => {
                let callee = ExprNode {
                    expr: Expr::Name(first.text.clone()),
                    line: first.line,
                    column: first.column,
                };
                self.expect_symbol("(")?;
                let arg = self.expr()?;
                self.expect_symbol(")")?;
                Ok(Stmt::Call { callee, arg })
            }
            TokenKind::Invalid if first.text.starts_with('"') => Err(DiagnosticRecord::new(
                first.line,
                first.column,
                "unfinished string",
            )),
            _ => Err(DiagnosticRecord::new(
                first.line,
                first.column,
                format!("syntax error, got '{}'", first.text),
            )),
        }
    }

    fn skip_through_line(&mut self, line: u32) {
        while self.peek().is_some_and(|token| token.line <= line) {
            self.pos += 1;
        }
    }
}

fn is_keyword(text: &str) -> bool {
    matches!(text, "local" | "return" | "require")
}

fn print_expr(node: &ExprNode) -> String {
    match &node.expr {
        Expr::Number(text) | Expr::Str(text) | Expr::Name(text) => text.clone(),
        Expr::Require(module) => format!("require(\"{module}\")"),
    }
}

fn module_path(module: &str) -> String {
    format!("{}.tl", module.replace('.', "/"))
}

/// Toy compiler; counts lexer invocations so tests can observe laziness
#[derive(Debug, Default)]
pub struct ToyCompiler {
    pub lex_calls: Cell<usize>,
}

impl ToyCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn expr_type(
        &self,
        node: &ExprNode,
        scope: &HashMap<String, Ty>,
        options: &TypeCheckOptions,
        fs: &dyn FileSystem,
        report: &mut TypeCheckReport,
    ) -> Ty {
        match &node.expr {
            Expr::Number(_) => Ty::Number,
            Expr::Str(_) => Ty::Str,
            Expr::Require(module) => self.module_type(node, module, options, fs, report),
            Expr::Name(name) => {
                if let Some(ty) = scope.get(name) {
                    *ty
                } else if name == "print" {
                    Ty::Function
                } else {
                    if options.lax {
                        report
                            .unknowns
                            .push(record(node.line, node.column, name.clone(), &options.filename));
                    } else {
                        report.errors.push(record(
                            node.line,
                            node.column,
                            format!("unknown variable: {name}"),
                            &options.filename,
                        ));
                    }
                    Ty::Any
                }
            }
        }
    }

    fn module_type(
        &self,
        node: &ExprNode,
        module: &str,
        options: &TypeCheckOptions,
        fs: &dyn FileSystem,
        report: &mut TypeCheckReport,
    ) -> Ty {
        let path = module_path(module);
        let Ok(source) = fs.read_to_string(Path::new(&path)) else {
            report.errors.push(record(
                node.line,
                node.column,
                format!("module not found: {module}"),
                &options.filename,
            ));
            return Ty::Any;
        };

        let mut syntax_errors = Vec::new();
        let ast = self.parse_program(lex(&source), &mut syntax_errors);
        if !syntax_errors.is_empty() {
            report.errors.push(record(
                node.line,
                node.column,
                format!("syntax errors in module {module}"),
                &options.filename,
            ));
            return Ty::Any;
        }

        let module_options = TypeCheckOptions {
            filename: path,
            lax: options.lax,
        };
        let (module_report, ty) = self.check_block(&ast, &module_options, fs);
        report.errors.extend(module_report.errors);
        report.unknowns.extend(module_report.unknowns);
        ty
    }

    /// Type-check a program, returning its diagnostics and the type of its
    /// last `return`
    fn check_block(
        &self,
        ast: &[Stmt],
        options: &TypeCheckOptions,
        fs: &dyn FileSystem,
    ) -> (TypeCheckReport, Ty) {
        let mut report = TypeCheckReport::default();
        let mut scope: HashMap<String, Ty> = HashMap::new();
        let mut returned = Ty::Any;

        for stmt in ast {
            match stmt {
                Stmt::Local {
                    name,
                    line,
                    column,
                    annotation,
                    value,
                } => {
                    let value_ty = self.expr_type(value, &scope, options, fs, &mut report);
                    let declared = match annotation.as_deref() {
                        None => value_ty,
                        Some("number") => Ty::Number,
                        Some("string") => Ty::Str,
                        Some(other) => {
                            report.errors.push(record(
                                *line,
                                *column,
                                format!("unknown type {other}"),
                                &options.filename,
                            ));
                            Ty::Any
                        }
                    };
                    if declared != Ty::Any && value_ty != Ty::Any && declared != value_ty {
                        report.errors.push(record(
                            value.line,
                            value.column,
                            format!(
                                "in local declaration: {name}: got {value_ty}, expected {declared}"
                            ),
                            &options.filename,
                        ));
                    }
                    scope.insert(name.clone(), declared);
                }
                Stmt::Call { callee, arg } => {
                    let callee_ty = self.expr_type(callee, &scope, options, fs, &mut report);
                    if callee_ty != Ty::Function && callee_ty != Ty::Any {
                        report.errors.push(record(
                            callee.line,
                            callee.column,
                            format!("cannot call a value of type {callee_ty}"),
                            &options.filename,
                        ));
                    }
                    self.expr_type(arg, &scope, options, fs, &mut report);
                }
                Stmt::Return { value } => {
                    returned = self.expr_type(value, &scope, options, fs, &mut report);
                }
            }
        }
        (report, returned)
    }
}

impl CompilerApi for ToyCompiler {
    type Tokens = Vec<Token>;
    type Ast = Vec<Stmt>;

    fn lex(&self, source: &str) -> Vec<Token> {
        self.lex_calls.set(self.lex_calls.get() + 1);
        lex(source)
    }

    fn parse_program(&self, tokens: Vec<Token>, syntax_errors: &mut Vec<DiagnosticRecord>) -> Vec<Stmt> {
        let mut parser = Parser { tokens, pos: 0 };
        let mut program = Vec::new();
        while parser.peek().is_some() {
            let start_line = parser.peek().map_or(1, |token| token.line);
            match parser.statement() {
                Ok(stmt) => program.push(stmt),
                Err(err) => {
                    let line = err.line.unwrap_or(start_line).max(start_line);
                    syntax_errors.push(err);
                    parser.skip_through_line(line);
                }
            }
        }
        program
    }

    fn type_check(
        &self,
        ast: &Vec<Stmt>,
        options: &TypeCheckOptions,
        fs: &dyn FileSystem,
    ) -> TypeCheckReport {
        self.check_block(ast, options, fs).0
    }

    fn pretty_print(&self, ast: &Vec<Stmt>) -> String {
        let mut out = String::new();
        for stmt in ast {
            match stmt {
                Stmt::Local {
                    name,
                    annotation,
                    value,
                    ..
                } => {
                    out.push_str("local ");
                    out.push_str(name);
                    if let Some(annotation) = annotation {
                        out.push_str(": ");
                        out.push_str(annotation);
                    }
                    out.push_str(" = ");
                    out.push_str(&print_expr(value));
                }
                Stmt::Call { callee, arg } => {
                    out.push_str(&print_expr(callee));
                    out.push('(');
                    out.push_str(&print_expr(arg));
                    out.push(')');
                }
                Stmt::Return { value } => {
                    out.push_str("return ");
                    out.push_str(&print_expr(value));
                }
            }
            out.push('\n');
        }
        out
    }

    fn process_string(&self, source: &str, fs: &dyn FileSystem) -> ProcessReport {
        let mut report = ProcessReport::default();
        let tokens = self.lex(source);
        let ast = self.parse_program(tokens, &mut report.syntax_errors);
        if !report.syntax_errors.is_empty() {
            return report;
        }

        let options = TypeCheckOptions {
            filename: "string".to_string(),
            lax: false,
        };
        report.type_errors = self.type_check(&ast, &options, fs).errors;

        let used: HashSet<&str> = ast
            .iter()
            .flat_map(|stmt| match stmt {
                Stmt::Local { value, .. } | Stmt::Return { value } => vec![value],
                Stmt::Call { callee, arg } => vec![callee, arg],
            })
            .filter_map(|node| match &node.expr {
                Expr::Name(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for stmt in &ast {
            if let Stmt::Local {
                name, line, column, ..
            } = stmt
            {
                if !name.starts_with('_') && !used.contains(name.as_str()) {
                    report.warnings.push(record(
                        *line,
                        *column,
                        format!("unused variable {name}"),
                        &options.filename,
                    ));
                }
            }
        }
        report
    }
}
