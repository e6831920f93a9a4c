//! Substitution pipeline.
//!
//! One call to [`Pipeline::replace_all`] performs a full expansion of a
//! source string against a scope. The passes run in a fixed order and each
//! one rewrites the whole string:
//!
//! ```text
//! flatten ─ comments ─ conditions ─ each ─ partials ─ with ─ eval ─ helpers ─ variables ─ attributes
//!              │           │          │        │        │
//!              │           └──────────┴────────┴────────┴── recurse into block content / partial
//!              │                                            source with a child scope
//!              └── pure text passes never recurse
//! ```
//!
//! Block passes only expand the blocks they own at this level: an `if` inside
//! an `each` is left for the recursive call on the each body, where the scope
//! carries the element. Replacement is positional (offsets from the block
//! matcher), so identical blocks never interfere with each other.
//!
//! The pipeline also owns the per-render partial arena: every expanded
//! partial is recorded with its id, parent, children, context and events.

use super::blocks::{BlockKind, BlockMatch, block_ranges, find_blocks, find_each_blocks, inside, split_else};
use super::metrics::{Pass, RenderMetrics};
use super::patterns;
use super::resolve::resolve_path;
use super::scope::Scope;
use super::trigger::{MarkupMask, TriggerInfo};
use super::value_parser::{parse_helper_arguments, parse_helper_params, substitute_paths};
use crate::api::Engine;
use crate::error::{Error, Result};
use crate::instance::PartialInstance;
use crate::value::{Object, Value, format_number};
use log::{debug, trace};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

/// Partials expanded during one render, in expansion order.
#[derive(Debug, Default)]
struct PartialArena {
    entries: Vec<PartialInstance>,
    root_children: Vec<String>,
}

/// What a finished render leaves behind besides the HTML.
#[derive(Debug)]
pub(crate) struct PipelineOutput {
    pub partials: Vec<PartialInstance>,
    /// Ids of the partials included directly by the root template.
    pub children: Vec<String>,
    pub metrics: RenderMetrics,
}

pub(crate) struct Pipeline<'e> {
    engine: &'e Engine,
    /// Helper overrides of the template being expanded.
    helpers: Object,
    root_id: String,
    /// Arena index of the partial being expanded, `None` for the root.
    owner: Option<usize>,
    arena: PartialArena,
    metrics: RenderMetrics,
    depth: usize,
}

impl<'e> Pipeline<'e> {
    pub fn new(engine: &'e Engine, helpers: Object, root_id: &str) -> Self {
        Pipeline {
            engine,
            helpers,
            root_id: root_id.to_string(),
            owner: None,
            arena: PartialArena::default(),
            metrics: RenderMetrics::default(),
            depth: 0,
        }
    }

    pub fn finish(self) -> PipelineOutput {
        PipelineOutput { partials: self.arena.entries, children: self.arena.root_children, metrics: self.metrics }
    }

    /// Expand `source` against `scope`, recursing into blocks and partials.
    pub fn replace_all(&mut self, source: &str, scope: &Scope<'_>) -> Result<String> {
        self.depth += 1;
        let result = self.run(source, scope);
        self.depth -= 1;
        result
    }

    fn run(&mut self, source: &str, scope: &Scope<'_>) -> Result<String> {
        let limit = self.engine.config().max_depth;
        if self.depth > limit {
            return Err(Error::RecursionLimit(limit));
        }
        self.metrics.invocations += 1;
        self.metrics.max_depth = self.metrics.max_depth.max(self.depth);

        let trigger = TriggerInfo::scan(source);
        trace!("[pipeline] depth={} len={} mask={:?}", self.depth, source.len(), trigger.mask);

        let mut src = source.to_string();
        if trigger.has(MarkupMask::MUSTACHE) {
            let flat = self.timed(Pass::Flatten, |_| flatten(scope.data))?;
            let scope = match &flat {
                Some(snapshot) => scope.with_data(snapshot),
                None => *scope,
            };

            if trigger.has(MarkupMask::COMMENT) {
                src = self.timed(Pass::Comments, |_| Ok(replace_comments(&src)))?;
            }
            if trigger.has(MarkupMask::CONDITION) {
                src = self.timed(Pass::Conditions, |p| p.replace_conditions(&src, &scope))?;
            }
            if trigger.has(MarkupMask::EACH) {
                src = self.timed(Pass::Each, |p| p.replace_blocks(&src, &scope))?;
            }
            if trigger.has(MarkupMask::PARTIAL) {
                src = self.timed(Pass::Partials, |p| p.replace_partials(&src, &scope))?;
            }
            if trigger.has(MarkupMask::WITH) {
                src = self.timed(Pass::With, |p| p.replace_with(&src, &scope))?;
            }

            // Block output is fully expanded, but it may have removed the
            // last inline marker.
            let inline = TriggerInfo::scan(&src);
            if inline.has(MarkupMask::EVAL) {
                src = self.timed(Pass::Eval, |p| p.replace_evals(&src, &scope))?;
            }
            if inline.has(MarkupMask::MUSTACHE) {
                src = self.timed(Pass::Helpers, |p| p.replace_helpers(&src, &scope))?;
                src = self.timed(Pass::Variables, |_| replace_vars(&src, &scope))?;
            }
        }

        // Spliced values can carry attributes of their own.
        if TriggerInfo::scan(&src).has(MarkupMask::BOOL_ATTR) {
            src = self.timed(Pass::Attributes, |_| Ok(replace_attributes(&src)))?;
        }
        Ok(src)
    }

    fn timed<T>(&mut self, pass: Pass, f: impl FnOnce(&mut Self) -> Result<(T, usize)>) -> Result<T> {
        let started = Instant::now();
        let (out, replaced) = f(self)?;
        self.metrics.record(pass, started.elapsed(), replaced);
        Ok(out)
    }

    // --- Conditions ------------------------------------------------------------

    /// Expand the `if` blocks that are not inside an `each` or `with` block.
    pub fn replace_conditions(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let blocks = find_blocks(src, BlockKind::If)?;
        if blocks.is_empty() {
            return Ok((src.to_string(), 0));
        }
        let mut shadowed = block_ranges(src, BlockKind::Each)?;
        shadowed.extend(block_ranges(src, BlockKind::With)?);
        let owned = blocks.into_iter().filter(|b| !inside(b.from, &shadowed)).map(|b| (b.range(), b));
        splice(src, owned, |block| self.expand_condition(&block, scope))
    }

    fn expand_condition(&mut self, block: &BlockMatch<'_>, scope: &Scope<'_>) -> Result<String> {
        let (when_true, when_false) = split_else(block.content);
        let expr = substitute_paths(block.arguments, scope)?;
        let test = self.engine.evaluator().evaluate(&expr, scope)?;
        trace!("[pass:conditions] expr=\"{}\" substituted=\"{}\" result={}", block.arguments, expr, test.truthy());

        // Branches expand in the enclosing scope.
        match if test.truthy() { Some(when_true) } else { when_false } {
            Some(branch) => self.replace_all(branch, scope),
            None => Ok(String::new()),
        }
    }

    // --- Each ------------------------------------------------------------------

    /// Expand the `each` blocks that are not inside a `with` block.
    pub fn replace_blocks(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let blocks = find_each_blocks(src)?;
        if blocks.is_empty() {
            return Ok((src.to_string(), 0));
        }
        let shadowed = block_ranges(src, BlockKind::With)?;
        let owned = blocks.into_iter().filter(|b| !inside(b.from, &shadowed)).map(|b| (b.range(), b));
        splice(src, owned, |block| self.expand_each(&block, scope))
    }

    fn expand_each(&mut self, block: &BlockMatch<'_>, scope: &Scope<'_>) -> Result<String> {
        let collection = resolve_path(block.arguments, scope)?;
        let mut out = String::new();
        match &collection {
            Value::Array(items) => {
                trace!("[pass:each] path=\"{}\" items={}", block.arguments, items.len());
                for (i, item) in items.iter().enumerate() {
                    let index = i.to_string();
                    out.push_str(&self.expand_iteration(block.content, item, "@index", Value::from(i), &index, scope)?);
                }
            }
            Value::Object(map) => {
                trace!("[pass:each] path=\"{}\" keys={}", block.arguments, map.len());
                // `@`-keys are specials injected by an enclosing iteration.
                for (key, item) in map.iter().filter(|(key, _)| !key.starts_with('@')) {
                    out.push_str(&self.expand_iteration(block.content, item, "@key", Value::from(key.as_str()), key, scope)?);
                }
            }
            other => trace!("[pass:each] path=\"{}\" skipped kind={}", block.arguments, other.kind()),
        }
        Ok(out)
    }

    fn expand_iteration(
        &mut self,
        content: &str,
        item: &Value,
        special: &str,
        value: Value,
        text: &str,
        scope: &Scope<'_>,
    ) -> Result<String> {
        let element = match item {
            Value::Object(fields) => {
                let mut fields = fields.clone();
                fields.insert(special.to_string(), value.clone());
                Value::Object(fields)
            }
            other => other.clone(),
        };
        let mut specials = Object::new();
        specials.insert(special.to_string(), value);

        let body = presubstitute(content, special, text)?;
        let child = scope.child(&element, Some(&specials));
        self.replace_all(&body, &child)
    }

    // --- Partials --------------------------------------------------------------

    /// Expand `{{> name params}}` tags that are not inside a `with` block.
    pub fn replace_partials(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let shadowed = block_ranges(src, BlockKind::With)?;
        let tags: Vec<_> = patterns::partial()
            .captures_iter(src)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str();
                let params = caps.get(2).map_or("", |p| p.as_str());
                (!inside(whole.start(), &shadowed)).then(|| (whole.range(), (name, params)))
            })
            .collect();
        splice(src, tags, |(name, params)| self.expand_partial(name, params, scope))
    }

    fn expand_partial(&mut self, name: &str, params: &str, scope: &Scope<'_>) -> Result<String> {
        let engine = self.engine;
        let template = engine.template(name).ok_or_else(|| Error::UnknownPartial(name.to_string()))?;

        let mut context = match scope.data {
            Value::Object(fields) => fields.clone(),
            _ => Object::new(),
        };
        context.extend(template.helper_map().iter().map(|(k, v)| (k.clone(), v.clone())));
        context.extend(parse_helper_params(params, scope)?);
        let context = Value::Object(context);

        let id = format!("{}_{}", self.root_id, self.arena.entries.len());
        let parent = match self.owner {
            Some(i) => {
                self.arena.entries[i].children.push(id.clone());
                self.arena.entries[i].id().to_string()
            }
            None => {
                self.arena.root_children.push(id.clone());
                self.root_id.clone()
            }
        };
        debug!("[partial] name=\"{}\" id={} parent={}", name, id, parent);
        self.arena.entries.push(PartialInstance::new(
            &id,
            name,
            &parent,
            Arc::new(context.clone()),
            template.event_map().clone(),
        ));
        self.metrics.partials += 1;

        let saved_owner = self.owner.replace(self.arena.entries.len() - 1);
        let saved_helpers = std::mem::replace(&mut self.helpers, template.helper_map().clone());
        let child = scope.child(&context, None);
        let html = self.replace_all(template.source(), &child);
        self.owner = saved_owner;
        self.helpers = saved_helpers;

        Ok(annotate(&html?, &engine.config().partial_attribute, &id))
    }

    // --- With ------------------------------------------------------------------

    pub fn replace_with(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let blocks = find_blocks(src, BlockKind::With)?;
        splice(src, blocks.into_iter().map(|b| (b.range(), b)), |block| {
            let target = resolve_path(block.arguments, scope)?;
            match target {
                Value::Object(_) | Value::Array(_) => {
                    let child = scope.child(&target, None);
                    self.replace_all(block.content, &child)
                }
                other => {
                    trace!("[pass:with] path=\"{}\" skipped kind={}", block.arguments, other.kind());
                    Ok(String::new())
                }
            }
        })
    }

    // --- Inline ----------------------------------------------------------------

    pub fn replace_evals(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let tags: Vec<_> = patterns::eval()
            .captures_iter(src)
            .filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str())))
            .collect();
        let evaluator = self.engine.evaluator();
        splice(src, tags, |expr| {
            let substituted = substitute_paths(expr, scope)?;
            Ok(evaluator.evaluate(&substituted, scope)?.to_text())
        })
    }

    pub fn replace_helpers(&mut self, src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
        let tags: Vec<_> = patterns::helper()
            .captures_iter(src)
            .filter_map(|caps| Some((caps.get(0)?.range(), (caps.get(1)?.as_str(), caps.get(2)?.as_str()))))
            .collect();
        let engine = self.engine;
        let helpers = &self.helpers;
        splice(src, tags, |(name, args)| {
            let helper =
                helpers.get(name).or_else(|| engine.helper(name)).ok_or_else(|| Error::UnknownHelper(name.to_string()))?;
            let args = parse_helper_arguments(args, scope)?;
            trace!("[pass:helpers] name=\"{}\" args={}", name, args.len());
            let result = match helper {
                Value::Func(f) => f.call(scope.data, &args)?,
                value => value.clone(),
            };
            Ok(result.to_text())
        })
    }
}

/// Snapshot of `data` with every callable field replaced by its result.
/// `None` when there is nothing to call.
fn flatten(data: &Value) -> Result<(Option<Value>, usize)> {
    let Value::Object(fields) = data else {
        return Ok((None, 0));
    };
    let computed = fields.values().filter(|v| matches!(v, Value::Func(_))).count();
    if computed == 0 {
        return Ok((None, 0));
    }
    let mut snapshot = Object::with_capacity(fields.len());
    for (key, value) in fields {
        let value = match value {
            Value::Func(f) => f.call(data, &[])?,
            other => other.clone(),
        };
        snapshot.insert(key.clone(), value);
    }
    Ok((Some(Value::Object(snapshot)), computed))
}

fn replace_comments(src: &str) -> (String, usize) {
    let re = patterns::comment();
    let count = re.find_iter(src).count();
    if count == 0 {
        return (src.to_string(), 0);
    }
    (re.replace_all(src, "").into_owned(), count)
}

fn replace_vars(src: &str, scope: &Scope<'_>) -> Result<(String, usize)> {
    let tags: Vec<_> = patterns::variable()
        .captures_iter(src)
        .filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str())))
        .collect();
    splice(src, tags, |path| variable_text(path, scope))
}

fn variable_text(path: &str, scope: &Scope<'_>) -> Result<String> {
    Ok(match resolve_path(path, scope)? {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_number(f),
        Value::Str(s) => s,
        array @ Value::Array(_) => array.to_text(),
        Value::Func(f) => {
            let parent = scope.parent_data().cloned().unwrap_or_default();
            f.call(scope.data, &[parent])?.to_text()
        }
        object @ Value::Object(_) => match object.get("toString") {
            Some(Value::Func(f)) => f.call(&object, &[])?.to_text(),
            Some(text) => text.to_text(),
            None => return Err(Error::InvalidVariableType { path: path.to_string(), kind: "object" }),
        },
    })
}

fn replace_attributes(src: &str) -> (String, usize) {
    let re = patterns::boolean_attribute();
    let count = re.find_iter(src).count();
    (re.replace_all(src, "").into_owned(), count)
}

/// Replace `{{@index}}` and bare `@index` (or `@key`) with `text`, outside
/// nested `each` blocks and other mustache tags. Tags keep the name so it
/// resolves through the specials table.
fn presubstitute(content: &str, name: &str, text: &str) -> Result<String> {
    let nested = block_ranges(content, BlockKind::Each)?;
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for range in nested {
        out.push_str(&substitute_special(&content[last..range.start], name, text));
        out.push_str(&content[range.clone()]);
        last = range.end;
    }
    out.push_str(&substitute_special(&content[last..], name, text));
    Ok(out)
}

fn substitute_special(segment: &str, name: &str, text: &str) -> String {
    let tag = format!("{{{{{name}}}}}");
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;
    while let Some(rel) = segment[i..].find(['{', '@']) {
        let at = i + rel;
        out.push_str(&segment[i..at]);
        let rest = &segment[at..];
        if rest.starts_with(&tag) {
            out.push_str(text);
            i = at + tag.len();
        } else if rest.starts_with("{{") {
            let end = rest.find("}}").map_or(rest.len(), |e| e + 2);
            out.push_str(&rest[..end]);
            i = at + end;
        } else if rest.starts_with(name)
            && !rest[name.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        {
            out.push_str(text);
            i = at + name.len();
        } else {
            out.push_str(&rest[..1]);
            i = at + 1;
        }
    }
    out.push_str(&segment[i..]);
    out
}

/// Tag the first element of a partial's output with its id, or wrap the
/// output in a `div` when it has no element. Comments and doctypes are not
/// elements.
pub(crate) fn annotate(html: &str, attribute: &str, id: &str) -> String {
    let marker = format!(" {attribute}=\"{id}\"");
    let element = html
        .match_indices('<')
        .map(|(at, _)| at)
        .find(|&at| html[at + 1..].starts_with(|c: char| c.is_ascii_alphabetic()));
    if let Some(start) = element {
        if let Some(rel) = html[start..].find('>') {
            let mut close = start + rel;
            if html[..close].ends_with('/') {
                close -= 1;
            }
            return format!("{}{}{}", &html[..close], marker, &html[close..]);
        }
    }
    format!("<div{marker}>{html}</div>")
}

/// Rebuild `source` with each range replaced by its expansion.
fn splice<T>(
    source: &str,
    items: impl IntoIterator<Item = (Range<usize>, T)>,
    mut expand: impl FnMut(T) -> Result<String>,
) -> Result<(String, usize)> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut count = 0;
    for (range, item) in items {
        out.push_str(&source[last..range.start]);
        out.push_str(&expand(item)?);
        last = range.end;
        count += 1;
    }
    out.push_str(&source[last..]);
    Ok((out, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_first_tag() {
        assert_eq!(annotate("<p>x</p><p>y</p>", "data-partial-id", "a_0"), "<p data-partial-id=\"a_0\">x</p><p>y</p>");
        assert_eq!(annotate("  <br/>", "data-partial-id", "a_1"), "  <br data-partial-id=\"a_1\"/>");
        assert_eq!(annotate("text", "data-partial-id", "a_2"), "<div data-partial-id=\"a_2\">text</div>");
    }

    #[test]
    fn annotate_skips_comments_and_doctype() {
        assert_eq!(
            annotate("<!-- card -> x --><section>y</section>", "data-partial-id", "a_0"),
            "<!-- card -> x --><section data-partial-id=\"a_0\">y</section>"
        );
        assert_eq!(annotate("<!DOCTYPE html><html>", "data-partial-id", "a_1"), "<!DOCTYPE html><html data-partial-id=\"a_1\">");
        assert_eq!(annotate("<!-- only -->", "data-partial-id", "a_2"), "<div data-partial-id=\"a_2\"><!-- only --></div>");
    }

    #[test]
    fn presubstitution_skips_nested_blocks_and_tags() {
        let out = presubstitute("@index {{@index}} {{#if @index}}{{#each x}}@index{{/each}}", "@index", "3").unwrap();
        assert_eq!(out, "3 3 {{#if @index}}{{#each x}}@index{{/each}}");
    }

    #[test]
    fn bare_name_needs_a_word_boundary() {
        assert_eq!(substitute_special("@keys @key.", "@key", "k"), "@keys k.");
    }

    #[test]
    fn splice_is_positional() {
        let src = "aXbXc";
        let (out, n) = splice(src, [(1..2, "1"), (3..4, "2")], |s| Ok(s.to_string())).unwrap();
        assert_eq!((out.as_str(), n), ("a1b2c", 2));
    }

    #[test]
    fn flatten_calls_top_level_functions_only() {
        let mut fields = Object::new();
        fields.insert("n".into(), Value::Int(2));
        fields.insert("double".into(), Value::func(|this, _| Ok(Value::Int(this.get("n").map_or(0, |n| n.to_number() as i64) * 2))));
        let data = Value::Object(fields);
        let (snapshot, computed) = flatten(&data).unwrap();
        assert_eq!(computed, 1);
        assert_eq!(snapshot.unwrap().get("double"), Some(&Value::Int(4)));
        assert!(matches!(data.get("double"), Some(Value::Func(_))));
        assert_eq!(flatten(&Value::Int(1)).unwrap().1, 0);
    }
}
