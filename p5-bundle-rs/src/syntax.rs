//! JavaScript parsing and binding-aware queries.
//!
//! Sources are parsed with the swc parser through `deno_ast`, with scope
//! analysis enabled: after parsing, swc's resolver marks every identifier with
//! the syntax context of the binding it refers to. Two identifiers with the
//! same name and context are the same variable, and free (global) references
//! carry the unresolved context. The bundler asks its questions of that tree:
//! which `require` calls a module makes, whether it reads a global, and which
//! identifiers belong to one binding.

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use deno_ast::swc::ast::{
    BreakStmt, CallExpr, Callee, ContinueStmt, Expr, Id, Ident, LabeledStmt, Lit, Module,
    ObjectPatProp, Pat, Program,
};
use deno_ast::swc::common::{BytePos, Span, SyntaxContext};
use deno_ast::swc::ecma_visit::{Visit, VisitWith};
use deno_ast::{MediaType, ModuleSpecifier, ParseParams, ParsedSource, StartSourcePos};

use crate::error::ScanError;

lazy_static! {
    static ref ANONYMOUS_SPECIFIER: ModuleSpecifier =
        ModuleSpecifier::parse("file:///anonymous.js").unwrap();
}

/// A parsed script or module with resolved bindings.
pub struct ParsedScript {
    parsed: ParsedSource,
    program: Arc<Program>,
}

impl ParsedScript {
    /// Parses `text` as a script or module, whichever its syntax makes it.
    /// `path` only labels diagnostics. The text must not start with a byte
    /// order mark.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ScanError> {
        if text.starts_with('\u{FEFF}') {
            return Err(ScanError::ByteOrderMark);
        }
        let specifier = ModuleSpecifier::from_file_path(path)
            .unwrap_or_else(|_| ANONYMOUS_SPECIFIER.clone());
        let parsed = deno_ast::parse_program(ParseParams {
            specifier,
            text: Arc::from(text),
            media_type: MediaType::JavaScript,
            capture_tokens: false,
            scope_analysis: true,
            maybe_syntax: None,
        })
        .map_err(|err| ScanError::Syntax(err.to_string()))?;
        if let Some(diagnostic) = parsed.diagnostics().first() {
            return Err(ScanError::Syntax(diagnostic.to_string()));
        }
        let program = parsed.program();
        Ok(Self { parsed, program })
    }

    pub fn text(&self) -> &str {
        self.parsed.text()
    }

    /// The module body, when the source uses `import` or `export` declarations.
    pub fn module(&self) -> Option<&Module> {
        match self.program.as_ref() {
            Program::Module(module) => Some(module),
            Program::Script(_) => None,
        }
    }

    pub fn visit<V: Visit>(&self, visitor: &mut V) {
        self.program.visit_with(visitor);
    }

    /// Byte range of `span` within [`Self::text`].
    pub fn range(&self, span: Span) -> Range<usize> {
        offset(span.lo)..offset(span.hi)
    }

    pub fn slice(&self, span: Span) -> &str {
        self.text().get(self.range(span)).unwrap_or_default()
    }

    /// True when `ident` refers to no binding in the source, i.e. a global.
    pub fn is_free(&self, ident: &Ident) -> bool {
        ident.ctxt == self.unresolved()
    }

    fn unresolved(&self) -> SyntaxContext {
        self.parsed.unresolved_context()
    }

    /// Every `require('<literal>')` call through the free `require`, in source order.
    pub fn require_calls(&self) -> Vec<RequireCall> {
        let mut finder = RequireFinder {
            unresolved: self.unresolved(),
            calls: Vec::new(),
        };
        self.visit(&mut finder);
        finder
            .calls
            .into_iter()
            .map(|(specifier, span)| RequireCall {
                specifier,
                range: self.range(span),
            })
            .collect()
    }

    /// True when the source reads the global `name` anywhere.
    pub fn references_free(&self, name: &str) -> bool {
        self.identifiers()
            .iter()
            .any(|occurrence| &*occurrence.id.0 == name && occurrence.id.1 == self.unresolved())
    }

    /// Every identifier occurrence in traversal order. Labels and property
    /// names are not identifiers.
    pub fn identifiers(&self) -> Vec<Occurrence> {
        let mut collector = IdentCollector::default();
        self.visit(&mut collector);
        collector
            .idents
            .into_iter()
            .map(|(id, span)| Occurrence {
                id,
                range: self.range(span),
            })
            .collect()
    }

    /// Names of every identifier in the source.
    pub fn identifier_names(&self) -> HashSet<String> {
        self.identifiers()
            .into_iter()
            .map(|occurrence| occurrence.id.0.to_string())
            .collect()
    }
}

fn offset(pos: BytePos) -> usize {
    let start = StartSourcePos::START_SOURCE_POS.as_byte_pos();
    pos.0.saturating_sub(start.0) as usize
}

/// A `require('<literal>')` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    pub specifier: String,
    pub range: Range<usize>,
}

/// One identifier and the binding it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub id: Id,
    pub range: Range<usize>,
}

/// The value of a string literal or a template literal without substitutions.
pub fn static_string(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(Lit::Str(literal)) => literal.value.as_atom().map(|atom| atom.to_string()),
        Expr::Tpl(template) if template.exprs.is_empty() => template
            .quasis
            .first()
            .and_then(|quasi| quasi.cooked.as_ref())
            .and_then(|cooked| cooked.as_atom())
            .map(|atom| atom.to_string()),
        Expr::Paren(paren) => static_string(&paren.expr),
        _ => None,
    }
}

/// The identifiers a binding pattern declares, in source order.
pub fn binding_idents(pat: &Pat) -> Vec<&Ident> {
    let mut idents = Vec::new();
    collect_binding_idents(pat, &mut idents);
    idents
}

fn collect_binding_idents<'a>(pat: &'a Pat, idents: &mut Vec<&'a Ident>) {
    match pat {
        Pat::Ident(binding) => idents.push(&binding.id),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                collect_binding_idents(elem, idents);
            }
        }
        Pat::Rest(rest) => collect_binding_idents(&rest.arg, idents),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(prop) => collect_binding_idents(&prop.value, idents),
                    ObjectPatProp::Assign(prop) => idents.push(&prop.key.id),
                    ObjectPatProp::Rest(rest) => collect_binding_idents(&rest.arg, idents),
                }
            }
        }
        Pat::Assign(assign) => collect_binding_idents(&assign.left, idents),
        _ => {}
    }
}

/// True when `name` is a plain ASCII JavaScript identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct RequireFinder {
    unresolved: SyntaxContext,
    calls: Vec<(String, Span)>,
}

impl Visit for RequireFinder {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if let Callee::Expr(callee) = &call.callee {
            let is_require = matches!(
                callee.as_ref(),
                Expr::Ident(ident) if &*ident.sym == "require" && ident.ctxt == self.unresolved
            );
            let specifier = call
                .args
                .first()
                .filter(|arg| is_require && arg.spread.is_none())
                .and_then(|arg| static_string(&arg.expr));
            if let Some(specifier) = specifier {
                self.calls.push((specifier, call.span));
            }
        }
        call.visit_children_with(self);
    }
}

/// Collects identifiers in traversal order, skipping statement labels.
#[derive(Default)]
struct IdentCollector {
    idents: Vec<(Id, Span)>,
}

impl Visit for IdentCollector {
    fn visit_ident(&mut self, ident: &Ident) {
        self.idents.push((ident.to_id(), ident.span));
    }

    fn visit_labeled_stmt(&mut self, stmt: &LabeledStmt) {
        stmt.body.visit_with(self);
    }

    fn visit_break_stmt(&mut self, _: &BreakStmt) {}

    fn visit_continue_stmt(&mut self, _: &ContinueStmt) {}
}
