//! The `static-fs` plugin: inlines files read with `fs.readFileSync`.
//!
//! Recognized call shapes, where the path argument is relative to the module's
//! own directory:
//!
//! ```text
//! readFileSync(join(__dirname, '/shaders/basic.vert'), 'utf-8')
//! fs.readFileSync(path.join(__dirname, 'data.txt'), 'utf8')
//! fs.readFileSync(__dirname + '/data.txt', 'utf8')
//! ```
//!
//! Each call is replaced by a string literal holding the file contents. Calls
//! are found in the parsed module, so text in comments and strings is never
//! touched, and a locally bound `__dirname` is not the module directory.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use deno_ast::swc::ast::{BinExpr, BinaryOp, CallExpr, Callee, Expr, ExprOrSpread, MemberProp};
use deno_ast::swc::ecma_visit::{Visit, VisitWith};
use log::debug;

use super::{SourceTransform, TransformContext};
use crate::error::TransformError;
use crate::syntax::{static_string, ParsedScript};

const PLUGIN_NAME: &str = "static-fs";

/// A `readFileSync` call with a static path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadCall {
    range: Range<usize>,
    relative: String,
    encoding: Option<String>,
}

/// Inlines `readFileSync` calls with statically known paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFs;

impl StaticFs {
    fn inline(&self, call: &ReadCall, dir: &Path, module: &Path) -> Result<String, TransformError> {
        let fail = |message: String| TransformError::Plugin {
            plugin: PLUGIN_NAME.to_string(),
            module: module.to_path_buf(),
            message,
        };

        match &call.encoding {
            Some(encoding) if matches!(encoding.to_ascii_lowercase().as_str(), "utf8" | "utf-8") => {}
            Some(encoding) => {
                return Err(fail(format!("unsupported encoding `{encoding}`")));
            }
            None => {
                return Err(fail(format!(
                    "readFileSync of `{}` needs a utf8 encoding argument",
                    call.relative
                )));
            }
        }

        let target = resolve_relative(dir, &call.relative);
        let contents = fs::read_to_string(&target)
            .map_err(|err| fail(format!("cannot read {}: {err}", target.display())))?;
        debug!("Inlined {} into {}", target.display(), module.display());
        serde_json::to_string(&contents).map_err(|err| fail(err.to_string()))
    }
}

impl SourceTransform for StaticFs {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn transform(&self, source: String, cx: &TransformContext<'_>) -> Result<String, TransformError> {
        if !source.contains("readFileSync") {
            return Ok(source);
        }
        let script = ParsedScript::parse(cx.path, &source).map_err(|err| TransformError::Parse {
            module: cx.path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut finder = ReadCallFinder {
            script: &script,
            calls: Vec::new(),
        };
        script.visit(&mut finder);
        if finder.calls.is_empty() {
            return Ok(source);
        }
        let dir = cx.path.parent().unwrap_or_else(|| Path::new(""));

        let mut output = String::with_capacity(source.len());
        let mut last = 0;
        for call in &finder.calls {
            output.push_str(&source[last..call.range.start]);
            output.push_str(&self.inline(call, dir, cx.path)?);
            last = call.range.end;
        }
        output.push_str(&source[last..]);
        Ok(output)
    }
}

struct ReadCallFinder<'a> {
    script: &'a ParsedScript,
    calls: Vec<ReadCall>,
}

impl ReadCallFinder<'_> {
    fn is_dirname(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Ident(ident) if &*ident.sym == "__dirname" && self.script.is_free(ident))
    }

    /// The relative path of `join(__dirname, '<lit>')` or `__dirname + '<lit>'`.
    fn relative_path(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Call(call) if callee_named(&call.callee, "join") => match call.args.as_slice() {
                [dir, path] if plain(dir) && plain(path) && self.is_dirname(&dir.expr) => {
                    static_string(&path.expr)
                }
                _ => None,
            },
            Expr::Bin(BinExpr {
                op: BinaryOp::Add,
                left,
                right,
                ..
            }) if self.is_dirname(left) => static_string(right),
            Expr::Paren(paren) => self.relative_path(&paren.expr),
            _ => None,
        }
    }

    fn read_call(&self, call: &CallExpr) -> Option<ReadCall> {
        if !callee_named(&call.callee, "readFileSync") {
            return None;
        }
        let (path, encoding) = match call.args.as_slice() {
            [path] => (path, None),
            [path, encoding] if plain(encoding) => (path, Some(static_string(&encoding.expr)?)),
            _ => return None,
        };
        if !plain(path) {
            return None;
        }
        Some(ReadCall {
            range: self.script.range(call.span),
            relative: self.relative_path(&path.expr)?,
            encoding,
        })
    }
}

impl Visit for ReadCallFinder<'_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        match self.read_call(call) {
            Some(read) => self.calls.push(read),
            None => call.visit_children_with(self),
        }
    }
}

/// True for `name(..)` and `<object>.name(..)`.
fn callee_named(callee: &Callee, name: &str) -> bool {
    let Callee::Expr(expr) = callee else {
        return false;
    };
    match expr.as_ref() {
        Expr::Ident(ident) => &*ident.sym == name,
        Expr::Member(member) => matches!(&member.prop, MemberProp::Ident(prop) if &*prop.sym == name),
        _ => false,
    }
}

fn plain(arg: &ExprOrSpread) -> bool {
    arg.spread.is_none()
}

/// Joins a `__dirname`-relative path the way `path.join` does: a leading
/// separator does not make it absolute.
fn resolve_relative(dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(dir.to_path_buf(), |mut path, part| {
            if part == ".." {
                path.pop();
            } else {
                path.push(part);
            }
            path
        })
}
