//! Identifier rewriting over a finished bundle.
//!
//! A pack's module functions take a `require` parameter. Tools that bundle the
//! artifact again would mistake calls through it for their own dependencies,
//! so [`Derequire`] renames that parameter, and every reference resolving to
//! it, to `_dereq_`. Global `require` references are left alone.
//!
//! The renamed bundle is parsed again and every identifier must still resolve
//! to the same binding it did before; otherwise the rename is refused.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use deno_ast::swc::ast::{
    ArrowExpr, AssignPatProp, BreakStmt, ContinueStmt, Id, Ident, LabeledStmt, Param, Prop,
    SetterProp,
};
use deno_ast::swc::ecma_visit::{Visit, VisitWith};

use crate::error::RewriteError;
use crate::syntax::{binding_idents, is_identifier, Occurrence, ParsedScript};

/// A whole-bundle source rewrite.
pub trait BundleRewrite: Send + Sync {
    fn rewrite(&self, code: &str) -> Result<String, RewriteError>;
}

/// Renames function parameters called `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derequire {
    pub from: String,
    pub to: String,
}

impl Default for Derequire {
    fn default() -> Self {
        Self {
            from: "require".to_string(),
            to: "_dereq_".to_string(),
        }
    }
}

impl Derequire {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn parse(&self, code: &str) -> Result<ParsedScript, RewriteError> {
        Ok(ParsedScript::parse(Path::new("/bundle.js"), code)?)
    }

    /// Fails unless `renamed` groups identifiers into the same bindings as `original`.
    fn check_bindings(
        &self,
        original: &[Occurrence],
        renamed: &[Occurrence],
    ) -> Result<(), RewriteError> {
        let collision = |offset: usize| RewriteError::Collision {
            from: self.from.clone(),
            to: self.to.clone(),
            offset,
        };
        if original.len() != renamed.len() {
            return Err(collision(0));
        }
        let mut forward: HashMap<&Id, &Id> = HashMap::new();
        let mut backward: HashMap<&Id, &Id> = HashMap::new();
        for (old, new) in original.iter().zip(renamed) {
            let pairs = [
                (&mut forward, &old.id, &new.id),
                (&mut backward, &new.id, &old.id),
            ];
            for (map, key, value) in pairs {
                match map.entry(key) {
                    Entry::Occupied(entry) if *entry.get() != value => {
                        return Err(collision(old.range.start));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(entry) => {
                        entry.insert(value);
                    }
                }
            }
        }
        Ok(())
    }
}

impl BundleRewrite for Derequire {
    fn rewrite(&self, code: &str) -> Result<String, RewriteError> {
        for name in [&self.from, &self.to] {
            if !is_identifier(name) {
                return Err(RewriteError::InvalidIdentifier(name.clone()));
            }
        }
        if !code.contains(self.from.as_str()) {
            return Ok(code.to_string());
        }

        let script = self.parse(code)?;
        let mut params = ParamCollector {
            name: &self.from,
            ids: HashSet::new(),
        };
        script.visit(&mut params);
        if params.ids.is_empty() {
            return Ok(code.to_string());
        }

        let mut renamer = Renamer {
            script: &script,
            targets: &params.ids,
            from: &self.from,
            to: &self.to,
            edits: Vec::new(),
        };
        script.visit(&mut renamer);
        let mut edits = renamer.edits;
        edits.sort_by_key(|(start, _, _)| *start);

        let mut output = String::with_capacity(code.len());
        let mut last = 0;
        for (start, end, text) in edits {
            output.push_str(&code[last..start]);
            output.push_str(&text);
            last = end;
        }
        output.push_str(&code[last..]);

        let renamed = self.parse(&output)?;
        self.check_bindings(&script.identifiers(), &renamed.identifiers())?;
        Ok(output)
    }
}

/// Collects the bindings of parameters called `name`.
struct ParamCollector<'a> {
    name: &'a str,
    ids: HashSet<Id>,
}

impl ParamCollector<'_> {
    fn collect<'p>(&mut self, idents: impl IntoIterator<Item = &'p Ident>) {
        self.ids.extend(
            idents
                .into_iter()
                .filter(|ident| &*ident.sym == self.name)
                .map(Ident::to_id),
        );
    }
}

impl Visit for ParamCollector<'_> {
    fn visit_param(&mut self, param: &Param) {
        self.collect(binding_idents(&param.pat));
        param.visit_children_with(self);
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        for pat in &arrow.params {
            self.collect(binding_idents(pat));
        }
        arrow.visit_children_with(self);
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        self.collect(binding_idents(&setter.param));
        setter.visit_children_with(self);
    }
}

/// Produces `(start, end, text)` edits renaming every identifier bound to a target.
struct Renamer<'a> {
    script: &'a ParsedScript,
    targets: &'a HashSet<Id>,
    from: &'a str,
    to: &'a str,
    edits: Vec<(usize, usize, String)>,
}

impl Renamer<'_> {
    fn rename(&mut self, ident: &Ident, shorthand: bool) {
        if !self.targets.contains(&ident.to_id()) {
            return;
        }
        let range = self.script.range(ident.span);
        let text = if shorthand {
            format!("{}: {}", self.from, self.to)
        } else {
            self.to.to_string()
        };
        self.edits.push((range.start, range.end, text));
    }
}

impl Visit for Renamer<'_> {
    fn visit_ident(&mut self, ident: &Ident) {
        self.rename(ident, false);
    }

    fn visit_prop(&mut self, prop: &Prop) {
        match prop {
            Prop::Shorthand(ident) => self.rename(ident, true),
            _ => prop.visit_children_with(self),
        }
    }

    fn visit_assign_pat_prop(&mut self, prop: &AssignPatProp) {
        self.rename(&prop.key.id, true);
        prop.value.visit_with(self);
    }

    fn visit_labeled_stmt(&mut self, stmt: &LabeledStmt) {
        stmt.body.visit_with(self);
    }

    fn visit_break_stmt(&mut self, _: &BreakStmt) {}

    fn visit_continue_stmt(&mut self, _: &ContinueStmt) {}
}
