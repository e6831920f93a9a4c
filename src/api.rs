use crate::engine::expr::{ExpressionEvaluator, SafeEvaluator};
use crate::engine::patterns;
use crate::error::{Error, Result};
use crate::instance::{InstanceOptions, RenderOptions, Rendered, RenderedFn, TemplateInstance};
use crate::loader::SourceLoader;
use crate::template::Template;
use crate::value::{Callable, Object, Value};
use chrono::Utc;
use indexmap::IndexMap;
use log::debug;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deepest pipeline recursion (blocks, partials) before
    /// [`Error::RecursionLimit`].
    pub max_depth: usize,
    /// Attribute carrying the partial id on a partial's first element.
    pub partial_attribute: String,
    /// Prefix of instance ids.
    pub partial_id_prefix: String,
    /// Extensions [`Engine::load`] parses as markup.
    pub template_extensions: Vec<String>,
    /// Extensions [`Engine::load`] hands back as companion logic.
    pub script_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_depth: 64,
            partial_attribute: "data-partial-id".to_string(),
            partial_id_prefix: "kbti_".to_string(),
            template_extensions: ["html", "hbml", "kbml", "tpl"].map(String::from).to_vec(),
            script_extensions: vec!["js".to_string()],
        }
    }
}

/// Outcome of [`Engine::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
    /// Markup file: names of the templates it registered.
    Templates(Vec<String>),
    /// Companion logic, returned unexecuted.
    Companion(String),
    /// Unknown extension, nothing loaded.
    Skipped,
}

/// Template registry and render entry point.
///
/// # Example
/// ```
/// use kandybars::Engine;
/// use serde_json::json;
///
/// let mut engine = Engine::new();
/// engine.register_template("hello", "<p>Hello {{name}}</p>").unwrap();
/// let html = engine.render("hello", json!({"name": "Karl"})).unwrap();
/// assert_eq!(html, "<p>Hello Karl</p>");
/// ```
pub struct Engine {
    templates: IndexMap<String, Template>,
    helpers: Object,
    evaluator: Box<dyn ExpressionEvaluator>,
    config: Config,
    instances: AtomicUsize,
    ephemeral: AtomicUsize,
    observers: Vec<RenderedFn>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Engine {
            templates: IndexMap::new(),
            helpers: Object::new(),
            evaluator: Box::new(SafeEvaluator),
            config,
            instances: AtomicUsize::new(0),
            ephemeral: AtomicUsize::new(0),
            observers: Vec::new(),
        }
    }

    /// Replace the evaluator used for `{{#if}}` and `{{eval}}`.
    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }

    // --- Templates ---------------------------------------------------------------

    /// Register (or replace) a template.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<&mut Template> {
        let template = Template::new(name, source)?;
        debug!("[registry] template=\"{}\" len={}", name, source.len());
        self.templates.insert(name.to_string(), template);
        self.templates.get_mut(name).ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    pub fn is_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn template_mut(&mut self, name: &str) -> Option<&mut Template> {
        self.templates.get_mut(name)
    }

    pub fn remove_template(&mut self, name: &str) -> Option<Template> {
        self.templates.shift_remove(name)
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Register every `<template name="…">…</template>` block of `raw` and
    /// return the names, in document order.
    pub fn parse_templates(&mut self, raw: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for caps in patterns::template_block().captures_iter(raw) {
            let attributes = caps.get(1).map_or("", |m| m.as_str());
            let source = caps.get(2).map_or("", |m| m.as_str());
            let name = patterns::template_name()
                .captures(attributes)
                .and_then(|c| c.get(1))
                .ok_or_else(|| Error::MalformedTemplateTag(format!("<template{attributes}> has no name")))?
                .as_str();
            self.register_template(name, source)?;
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// Load `id` through `loader`, dispatching on its extension.
    pub fn load(&mut self, loader: &dyn SourceLoader, id: &str) -> Result<Loaded> {
        let extension = Path::new(id).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        if self.config.template_extensions.iter().any(|e| *e == extension) {
            let raw = loader.load(id)?;
            let names = self.parse_templates(&raw)?;
            debug!("[registry] loaded \"{}\" templates={:?}", id, names);
            Ok(Loaded::Templates(names))
        } else if self.config.script_extensions.iter().any(|e| *e == extension) {
            Ok(Loaded::Companion(loader.load(id)?))
        } else {
            debug!("[registry] skipped \"{}\"", id);
            Ok(Loaded::Skipped)
        }
    }

    pub fn load_all<S: AsRef<str>>(&mut self, loader: &dyn SourceLoader, ids: &[S]) -> Result<Vec<Loaded>> {
        ids.iter().map(|id| self.load(loader, id.as_ref())).collect()
    }

    // --- Helpers -----------------------------------------------------------------

    /// Register a global helper function.
    pub fn register_helper<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.register_helper_value(name, Value::Func(Callable::new(f)))
    }

    /// Register a global helper. Non-function values are spliced as-is.
    pub fn register_helper_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if !patterns::helper_identifier().is_match(name) {
            return Err(Error::InvalidHelperName(name.to_string()));
        }
        self.helpers.insert(name.to_string(), value.into());
        Ok(())
    }

    pub(crate) fn helper(&self, name: &str) -> Option<&Value> {
        self.helpers.get(name)
    }

    // --- Rendering ---------------------------------------------------------------

    /// Called after every render that has neither an instance nor a template
    /// callback.
    pub fn on_rendered(&mut self, observer: RenderedFn) {
        self.observers.push(observer);
    }

    pub(crate) fn observers(&self) -> &[RenderedFn] {
        &self.observers
    }

    pub fn create_instance(
        &self,
        name: &str,
        data: impl Into<Value>,
        options: InstanceOptions,
    ) -> Result<TemplateInstance<'_>> {
        let template = self.template(name).ok_or_else(|| Error::UnknownTemplate(name.to_string()))?;
        let id = format!("{}{}", self.config.partial_id_prefix, self.instances.fetch_add(1, Ordering::Relaxed));
        Ok(TemplateInstance::new(self, template, id, data.into(), options))
    }

    /// Render `name` and return the HTML.
    pub fn render(&self, name: &str, data: impl Into<Value>) -> Result<String> {
        Ok(self.render_with(name, data, InstanceOptions::default(), RenderOptions::default())?.html)
    }

    pub fn render_with(
        &self,
        name: &str,
        data: impl Into<Value>,
        instance: InstanceOptions,
        options: RenderOptions,
    ) -> Result<Rendered> {
        self.create_instance(name, data, instance)?.render(options)
    }

    /// Render a source string that is not registered. A throwaway template
    /// is registered for the duration of the call.
    pub fn render_html(&mut self, source: &str, data: impl Into<Value>) -> Result<String> {
        let name = format!(
            "tpl_{}_{}",
            Utc::now().timestamp_millis(),
            self.ephemeral.fetch_add(1, Ordering::Relaxed)
        );
        self.register_template(&name, source)?;
        let result = self.render_with(&name, data, InstanceOptions::default(), RenderOptions::html());
        self.remove_template(&name);
        Ok(result?.html)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_templates_registers_in_document_order() {
        let mut engine = Engine::new();
        let names = engine
            .parse_templates("<template name=\"a\"><b>{{x}}</b></template>\n<template name=\"b\">\n  <i></i>\n</template>")
            .unwrap();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(engine.template("a").unwrap().source(), "<b>{{x}}</b>");
        assert_eq!(engine.template("b").unwrap().source(), "\n  <i></i>\n");
        assert!(engine.parse_templates("<p>none</p>").unwrap().is_empty());
    }

    #[test]
    fn template_tag_without_name_is_malformed() {
        let mut engine = Engine::new();
        assert!(matches!(engine.parse_templates("<template id=\"x\"></template>"), Err(Error::MalformedTemplateTag(_))));
    }

    #[test]
    fn helper_names_are_validated() {
        let mut engine = Engine::new();
        assert!(engine.register_helper_value("ok_1", "x").is_ok());
        for bad in ["", "a-b", "a b"] {
            assert!(matches!(engine.register_helper_value(bad, 1), Err(Error::InvalidHelperName(_))), "{bad}");
        }
    }

    #[test]
    fn instance_ids_are_unique() {
        let mut engine = Engine::new();
        engine.register_template("t", "x").unwrap();
        let a = engine.create_instance("t", Value::Null, InstanceOptions::default()).unwrap();
        let b = engine.create_instance("t", Value::Null, InstanceOptions::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("kbti_"));
    }

    #[test]
    fn unknown_template() {
        let engine = Engine::new();
        assert!(matches!(engine.render("nope", json!({})), Err(Error::UnknownTemplate(name)) if name == "nope"));
    }

    #[test]
    fn render_html_leaves_no_template_behind() {
        let mut engine = Engine::new();
        let html = engine.render_html("<p>{{a}}</p>", json!({"a": 1})).unwrap();
        assert_eq!(html, "<p>1</p>");
        assert_eq!(engine.template_names().count(), 0);
    }

    #[test]
    fn removed_template_is_gone() {
        let mut engine = Engine::new();
        engine.register_template("t", "x").unwrap();
        assert!(engine.is_template("t"));
        assert!(engine.remove_template("t").is_some());
        assert!(!engine.is_template("t"));
    }
}
