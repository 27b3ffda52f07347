//! ES module to CommonJS interop.
//!
//! Modules with top-level `import`/`export` declarations are rewritten in
//! place:
//!
//! - each imported module is bound once, `var _main = require("./main");`
//! - references to imported bindings become member reads on that variable
//!   (`p5` becomes `_mainDefault.default`), so cyclic imports observe later
//!   assignments
//! - exports are defined up front as getters on `exports`, and the module is
//!   flagged `__esModule`
//!
//! References are matched by resolved binding, so a parameter or local that
//! shadows an import keeps its name. Sources without module syntax are
//! returned unchanged.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

use deno_ast::swc::ast::{
    AssignPatProp, BreakStmt, ContinueStmt, Decl, DefaultDecl, ExportSpecifier, Id, Ident,
    ImportDecl, ImportSpecifier, LabeledStmt, ModuleDecl, ModuleExportName, ModuleItem, Prop,
    Str,
};
use deno_ast::swc::common::{Span, Spanned};
use deno_ast::swc::ecma_visit::{Visit, VisitWith};
use serde_json::Value;

use crate::error::TransformError;
use crate::syntax::{binding_idents, is_identifier, ParsedScript};

const INTEROP_DEFAULT: &str = "function __interopDefault(m) { return m && m.__esModule ? m : { default: m }; }\n";

const INTEROP_NAMESPACE: &str = "function __interopNamespace(m) { if (m && m.__esModule) return m; var n = { default: m }; if (m != null) Object.keys(m).forEach(function (k) { if (k !== 'default') n[k] = m[k]; }); return n; }\n";

const EXPORT_STAR: &str = "function __exportStar(m, target) { Object.keys(m).forEach(function (k) { if (k !== 'default' && k !== '__esModule' && !Object.prototype.hasOwnProperty.call(target, k)) Object.defineProperty(target, k, { enumerable: true, get: function () { return m[k]; } }); }); }\n";

/// Rewrites the ES module at `path` into CommonJS.
pub fn to_commonjs(path: &Path, source: &str) -> Result<String, TransformError> {
    let script = ParsedScript::parse(path, source).map_err(|err| TransformError::Parse {
        module: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let Some(module) = script.module() else {
        return Ok(source.to_string());
    };
    let decls: Vec<&ModuleDecl> = module
        .body
        .iter()
        .filter_map(|item| match item {
            ModuleItem::ModuleDecl(decl) => Some(decl),
            ModuleItem::Stmt(_) => None,
        })
        .collect();
    if decls.is_empty() {
        return Ok(source.to_string());
    }

    let mut interop = Interop::new(path, &script);
    for decl in &decls {
        if let ModuleDecl::Import(import) = decl {
            interop.import(import)?;
        }
    }
    for decl in &decls {
        interop.export(decl)?;
    }
    Ok(interop.finish())
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", js_string(name))
    }
}

/// Derives a camel-cased identifier stem from a module specifier.
fn identifier_stem(specifier: &str) -> String {
    let segment = specifier
        .rsplit('/')
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("module");
    let segment = segment
        .strip_suffix(".js")
        .or_else(|| segment.strip_suffix(".json"))
        .unwrap_or(segment);

    let mut stem = String::new();
    let mut upper = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            stem.push(if upper { c.to_ascii_uppercase() } else { c });
            upper = false;
        } else {
            upper = !stem.is_empty();
        }
    }
    if stem.is_empty() {
        stem.push_str("module");
    }
    stem
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Default)]
struct Helpers {
    default: bool,
    namespace: bool,
    star: bool,
}

struct SourceVars {
    module: String,
    default: Option<String>,
}

struct Interop<'a> {
    path: &'a Path,
    script: &'a ParsedScript,
    used: HashSet<String>,
    sources: HashMap<String, SourceVars>,
    /// Imported binding to the expression that reads it.
    bindings: HashMap<Id, String>,
    /// Export name to the expression its getter returns, in declaration order.
    exports: Vec<(String, String)>,
    edits: Vec<Edit>,
    removed: Vec<Range<usize>>,
    helpers: Helpers,
}

impl<'a> Interop<'a> {
    fn new(path: &'a Path, script: &'a ParsedScript) -> Self {
        Self {
            path,
            script,
            used: script.identifier_names(),
            sources: HashMap::new(),
            bindings: HashMap::new(),
            exports: Vec::new(),
            edits: Vec::new(),
            removed: Vec::new(),
            helpers: Helpers::default(),
        }
    }

    fn string_value(&self, literal: &Str) -> Result<String, TransformError> {
        literal
            .value
            .as_atom()
            .map(|atom| atom.to_string())
            .ok_or_else(|| {
                self.unsupported(format!("module specifier {}", self.script.slice(literal.span)))
            })
    }

    fn export_name(&self, name: &ModuleExportName) -> Result<String, TransformError> {
        match name {
            ModuleExportName::Ident(ident) => Ok(ident.sym.to_string()),
            ModuleExportName::Str(literal) => self.string_value(literal),
        }
    }

    fn unsupported(&self, message: String) -> TransformError {
        TransformError::Unsupported {
            module: self.path.to_path_buf(),
            message,
        }
    }

    fn fresh(&mut self, stem: &str) -> String {
        let base = format!("_{stem}");
        let mut name = base.clone();
        let mut counter = 2;
        while self.used.contains(&name) {
            name = format!("{base}{counter}");
            counter += 1;
        }
        self.used.insert(name.clone());
        name
    }

    /// The variable holding `require(specifier)`, declared into `decls` on first use.
    fn module_var(&mut self, specifier: &str, decls: &mut String) -> String {
        if let Some(vars) = self.sources.get(specifier) {
            return vars.module.clone();
        }
        let name = self.fresh(&identifier_stem(specifier));
        decls.push_str(&format!("var {name} = require({});", js_string(specifier)));
        self.sources.insert(
            specifier.to_string(),
            SourceVars {
                module: name.clone(),
                default: None,
            },
        );
        name
    }

    /// The variable whose `default` member is the module's default export.
    fn default_var(&mut self, specifier: &str, decls: &mut String) -> String {
        let module = self.module_var(specifier, decls);
        if let Some(existing) = self
            .sources
            .get(specifier)
            .and_then(|vars| vars.default.clone())
        {
            return existing;
        }
        let name = self.fresh(&format!("{}Default", identifier_stem(specifier)));
        decls.push_str(&format!("var {name} = __interopDefault({module});"));
        self.helpers.default = true;
        if let Some(vars) = self.sources.get_mut(specifier) {
            vars.default = Some(name.clone());
        }
        name
    }

    fn replace_range(&mut self, range: Range<usize>, text: String) {
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            text,
        });
        self.removed.push(range);
    }

    fn replace(&mut self, span: Span, text: String) {
        let range = self.script.range(span);
        self.replace_range(range, text);
    }

    fn insert(&mut self, at: usize, text: String) {
        self.edits.push(Edit {
            start: at,
            end: at,
            text,
        });
    }

    /// Replaces the export keywords from `export` up to the start of `inner`.
    fn replace_keywords(
        &mut self,
        export: Span,
        inner: Span,
        text: String,
    ) -> Result<(), TransformError> {
        let start = self.script.range(export).start;
        let end = self.script.range(inner).start;
        if end < start || !self.script.text()[start..].starts_with("export") {
            return Err(self.unsupported(format!("export declaration at byte {start}")));
        }
        self.replace_range(start..end, text);
        Ok(())
    }

    fn import(&mut self, import: &ImportDecl) -> Result<(), TransformError> {
        let specifier = self.string_value(&import.src)?;
        let mut decls = String::new();
        if import.type_only {
            self.replace(import.span, decls);
            return Ok(());
        }
        if import.specifiers.is_empty() {
            decls.push_str(&format!("require({});", js_string(&specifier)));
        }

        for spec in &import.specifiers {
            match spec {
                ImportSpecifier::Default(default) => {
                    let var = self.default_var(&specifier, &mut decls);
                    self.bindings
                        .insert(default.local.to_id(), format!("{var}.default"));
                }
                ImportSpecifier::Namespace(namespace) => {
                    let module = self.module_var(&specifier, &mut decls);
                    let local = &namespace.local.sym;
                    decls.push_str(&format!("var {local} = __interopNamespace({module});"));
                    self.helpers.namespace = true;
                }
                ImportSpecifier::Named(named) => {
                    if named.is_type_only {
                        continue;
                    }
                    let imported = match &named.imported {
                        Some(name) => self.export_name(name)?,
                        None => named.local.sym.to_string(),
                    };
                    let expr = if imported == "default" {
                        format!("{}.default", self.default_var(&specifier, &mut decls))
                    } else {
                        member(&self.module_var(&specifier, &mut decls), &imported)
                    };
                    self.bindings.insert(named.local.to_id(), expr);
                }
            }
        }
        self.replace(import.span, decls);
        Ok(())
    }

    /// The reading expression for a top-level name listed in `export { .. }`.
    fn local_export(&self, local: String) -> String {
        self.bindings
            .iter()
            .find(|((sym, _), _)| &**sym == local.as_str())
            .map(|(_, expr)| expr.clone())
            .unwrap_or(local)
    }

    fn export(&mut self, decl: &ModuleDecl) -> Result<(), TransformError> {
        match decl {
            ModuleDecl::Import(_) => {}
            ModuleDecl::ExportDecl(export) => {
                let idents: Vec<&Ident> = match &export.decl {
                    Decl::Class(class) => vec![&class.ident],
                    Decl::Fn(function) => vec![&function.ident],
                    Decl::Var(var) => var
                        .decls
                        .iter()
                        .flat_map(|declarator| binding_idents(&declarator.name))
                        .collect(),
                    _ => return Err(self.unsupported("exported declaration".to_string())),
                };
                for ident in idents {
                    self.exports.push((ident.sym.to_string(), ident.sym.to_string()));
                }
                let start = self.script.range(export.span).start;
                if !self.script.text()[start..].starts_with("export") {
                    return Err(self.unsupported(format!("export declaration at byte {start}")));
                }
                self.replace_range(start..start + "export".len(), String::new());
            }
            ModuleDecl::ExportNamed(named) => {
                let mut decls = String::new();
                match &named.src {
                    Some(src) => {
                        let specifier = self.string_value(src)?;
                        for spec in &named.specifiers {
                            self.reexport(&specifier, spec, &mut decls)?;
                        }
                    }
                    None => {
                        for spec in &named.specifiers {
                            if let ExportSpecifier::Named(spec) = spec {
                                if spec.is_type_only {
                                    continue;
                                }
                                let local = self.export_name(&spec.orig)?;
                                let exported = match &spec.exported {
                                    Some(name) => self.export_name(name)?,
                                    None => local.clone(),
                                };
                                let expr = self.local_export(local);
                                self.exports.push((exported, expr));
                            }
                        }
                    }
                }
                self.replace(named.span, decls);
            }
            ModuleDecl::ExportDefaultDecl(default) => match &default.decl {
                DefaultDecl::Class(class) => match &class.ident {
                    Some(ident) => {
                        self.replace_keywords(default.span, default.decl.span(), String::new())?;
                        self.exports.push(("default".to_string(), ident.sym.to_string()));
                    }
                    None => {
                        let name = self.fresh("default");
                        self.replace_keywords(
                            default.span,
                            default.decl.span(),
                            format!("var {name} = "),
                        )?;
                        let end = self.script.range(default.span).end;
                        self.insert(end, ";".to_string());
                        self.exports.push(("default".to_string(), name));
                    }
                },
                DefaultDecl::Fn(function) => {
                    self.replace_keywords(default.span, default.decl.span(), String::new())?;
                    let name = match &function.ident {
                        Some(ident) => ident.sym.to_string(),
                        None => {
                            let name = self.fresh("default");
                            let gap = self.anonymous_name_gap(
                                function.function.span,
                                function.function.is_generator,
                            )?;
                            self.replace_range(gap, format!(" {name}"));
                            name
                        }
                    };
                    self.exports.push(("default".to_string(), name));
                }
                _ => return Err(self.unsupported("default export".to_string())),
            },
            ModuleDecl::ExportDefaultExpr(default) => {
                let name = self.fresh("default");
                self.replace_keywords(
                    default.span,
                    default.expr.span(),
                    format!("var {name} = "),
                )?;
                self.exports.push(("default".to_string(), name));
            }
            ModuleDecl::ExportAll(all) => {
                let mut decls = String::new();
                if !all.type_only {
                    let specifier = self.string_value(&all.src)?;
                    let module = self.module_var(&specifier, &mut decls);
                    decls.push_str(&format!("__exportStar({module}, exports);"));
                    self.helpers.star = true;
                }
                self.replace(all.span, decls);
            }
            _ => return Err(self.unsupported("TypeScript module syntax".to_string())),
        }
        Ok(())
    }

    /// The text between `function` (or `function*`) and the opening paren of
    /// an anonymous function, where its name goes.
    fn anonymous_name_gap(
        &self,
        span: Span,
        generator: bool,
    ) -> Result<Range<usize>, TransformError> {
        let range = self.script.range(span);
        let head = &self.script.text()[range.clone()];
        let keyword = head
            .find("function")
            .map(|index| index + "function".len())
            .ok_or_else(|| self.unsupported(format!("default function at byte {}", range.start)))?;
        let after = if generator {
            head[keyword..]
                .find('*')
                .map(|index| keyword + index + 1)
                .unwrap_or(keyword)
        } else {
            keyword
        };
        let paren = head[after..]
            .find('(')
            .map(|index| after + index)
            .ok_or_else(|| self.unsupported(format!("default function at byte {}", range.start)))?;
        Ok(range.start + after..range.start + paren)
    }

    fn reexport(
        &mut self,
        specifier: &str,
        spec: &ExportSpecifier,
        decls: &mut String,
    ) -> Result<(), TransformError> {
        match spec {
            ExportSpecifier::Named(named) => {
                if named.is_type_only {
                    return Ok(());
                }
                let orig = self.export_name(&named.orig)?;
                let exported = match &named.exported {
                    Some(name) => self.export_name(name)?,
                    None => orig.clone(),
                };
                let expr = if orig == "default" {
                    format!("{}.default", self.default_var(specifier, decls))
                } else {
                    member(&self.module_var(specifier, decls), &orig)
                };
                self.exports.push((exported, expr));
            }
            ExportSpecifier::Namespace(namespace) => {
                let name = self.export_name(&namespace.name)?;
                let module = self.module_var(specifier, decls);
                self.helpers.namespace = true;
                self.exports
                    .push((name, format!("__interopNamespace({module})")));
            }
            ExportSpecifier::Default(default) => {
                let name = default.exported.sym.to_string();
                let var = self.default_var(specifier, decls);
                self.exports.push((name, format!("{var}.default")));
            }
        }
        Ok(())
    }

    fn rewrite_references(&mut self) {
        let mut rewriter = ReferenceRewriter {
            script: self.script,
            bindings: &self.bindings,
            removed: &self.removed,
            edits: Vec::new(),
        };
        self.script.visit(&mut rewriter);
        let edits = rewriter.edits;
        self.edits.extend(edits);
    }

    fn finish(mut self) -> String {
        self.rewrite_references();

        let mut header = String::from(
            "'use strict';\n\nObject.defineProperty(exports, '__esModule', { value: true });\n",
        );
        if self.helpers.default {
            header.push_str(INTEROP_DEFAULT);
        }
        if self.helpers.namespace {
            header.push_str(INTEROP_NAMESPACE);
        }
        if self.helpers.star {
            header.push_str(EXPORT_STAR);
        }
        for (name, expr) in &self.exports {
            header.push_str(&format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {expr}; }} }});\n",
                js_string(name)
            ));
        }

        let src = self.script.text();
        self.edits.sort_by_key(|edit| (edit.start, edit.end));
        let mut last = 0;
        for edit in &self.edits {
            if edit.start < last {
                continue;
            }
            header.push_str(&src[last..edit.start]);
            header.push_str(&edit.text);
            last = edit.end;
        }
        header.push_str(&src[last..]);
        header
    }
}

/// Replaces every reference to an imported binding with its reading expression.
struct ReferenceRewriter<'a> {
    script: &'a ParsedScript,
    bindings: &'a HashMap<Id, String>,
    removed: &'a [Range<usize>],
    edits: Vec<Edit>,
}

impl ReferenceRewriter<'_> {
    fn rewrite(&mut self, ident: &Ident, shorthand: bool) {
        let Some(replacement) = self.bindings.get(&ident.to_id()) else {
            return;
        };
        let range = self.script.range(ident.span);
        if self.removed.iter().any(|removed| removed.contains(&range.start)) {
            return;
        }
        let text = if shorthand {
            format!("{}: {replacement}", ident.sym)
        } else {
            replacement.clone()
        };
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            text,
        });
    }
}

impl Visit for ReferenceRewriter<'_> {
    fn visit_ident(&mut self, ident: &Ident) {
        self.rewrite(ident, false);
    }

    fn visit_prop(&mut self, prop: &Prop) {
        match prop {
            Prop::Shorthand(ident) => self.rewrite(ident, true),
            _ => prop.visit_children_with(self),
        }
    }

    fn visit_assign_pat_prop(&mut self, prop: &AssignPatProp) {
        self.rewrite(&prop.key.id, true);
        prop.value.visit_with(self);
    }

    fn visit_labeled_stmt(&mut self, stmt: &LabeledStmt) {
        stmt.body.visit_with(self);
    }

    fn visit_break_stmt(&mut self, _: &BreakStmt) {}

    fn visit_continue_stmt(&mut self, _: &ContinueStmt) {}
}
