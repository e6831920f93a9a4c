//! Template instances.
//!
//! An instance binds a template to data for one render. It owns the render
//! context (`data ⊕ template helpers ⊕ instance helpers`), a unique id and,
//! once rendered, the partials it expanded.
//!
//! ```text
//! Engine::create_instance ─> TemplateInstance ─ render ──────> Rendered (html, partials, metrics)
//!                                             └ render_into ─> Dom::insert
//!                                                              partial events + callbacks
//!                                                              root events
//!                                                              rendered notification
//! ```

use crate::api::Engine;
use crate::dom::{Dom, EventMap, attach_events};
use crate::engine::metrics::RenderMetrics;
use crate::engine::pipeline::{Pipeline, PipelineOutput, annotate};
use crate::engine::scope::Scope;
use crate::error::Result;
use crate::template::Template;
use crate::value::{Object, Value};
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// What a rendered callback or observer receives.
#[derive(Debug)]
pub struct RenderEvent<'a> {
    /// Instance id (`kbti_3`, or `kbti_3_0` for a partial).
    pub id: &'a str,
    pub template: &'a str,
    pub html: &'a str,
    pub context: &'a Value,
    pub partial: bool,
}

pub type RenderedFn = Arc<dyn Fn(&RenderEvent<'_>) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`RenderedFn`].
pub fn on_rendered<F>(f: F) -> RenderedFn
where
    F: Fn(&RenderEvent<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-instance overrides.
#[derive(Clone, Default)]
pub struct InstanceOptions {
    /// Merged over the template's events.
    pub events: EventMap,
    /// Merged over the template's helpers.
    pub helpers: Object,
    /// Replaces the template's rendered callback for this instance.
    pub rendered: Option<RenderedFn>,
    /// Id of the instance this one is a partial of.
    pub parent: Option<String>,
}

impl fmt::Debug for InstanceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceOptions")
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers)
            .field("rendered", &self.rendered.is_some())
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Produce the string only: no DOM hand-off and no rendered notification.
    pub html: bool,
    /// Selector the fragment is inserted into by [`TemplateInstance::render_into`].
    pub target: Option<String>,
}

impl RenderOptions {
    pub fn html() -> Self {
        RenderOptions { html: true, target: None }
    }
}

/// A partial expanded during a render.
#[derive(Clone)]
pub struct PartialInstance {
    id: String,
    template: String,
    parent: String,
    pub(crate) children: Vec<String>,
    context: Arc<Value>,
    events: EventMap,
}

impl PartialInstance {
    pub(crate) fn new(id: &str, template: &str, parent: &str, context: Arc<Value>, events: EventMap) -> Self {
        PartialInstance {
            id: id.to_string(),
            template: template.to_string(),
            parent: parent.to_string(),
            children: Vec::new(),
            context,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Id of the including instance (root or partial).
    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn events(&self) -> &EventMap {
        &self.events
    }

    pub fn is_partial(&self) -> bool {
        true
    }
}

impl fmt::Debug for PartialInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialInstance")
            .field("id", &self.id)
            .field("template", &self.template)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Result of a render.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub html: String,
    pub id: String,
    pub partials: Vec<PartialInstance>,
    /// Ids of the partials included directly by this instance.
    pub children: Vec<String>,
    pub context: Value,
    pub metrics: RenderMetrics,
}

impl Rendered {
    pub fn partial(&self, id: &str) -> Option<&PartialInstance> {
        self.partials.iter().find(|p| p.id == id)
    }
}

pub struct TemplateInstance<'e> {
    engine: &'e Engine,
    template: &'e Template,
    id: String,
    context: Arc<Value>,
    options: InstanceOptions,
    children: Vec<String>,
}

impl<'e> TemplateInstance<'e> {
    pub(crate) fn new(engine: &'e Engine, template: &'e Template, id: String, data: Value, options: InstanceOptions) -> Self {
        let mut context = match data {
            Value::Object(fields) => fields,
            _ => Object::new(),
        };
        context.extend(template.helper_map().iter().map(|(k, v)| (k.clone(), v.clone())));
        context.extend(options.helpers.iter().map(|(k, v)| (k.clone(), v.clone())));
        TemplateInstance { engine, template, id, context: Arc::new(Value::Object(context)), options, children: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template(&self) -> &Template {
        self.template
    }

    /// `data ⊕ template helpers ⊕ instance helpers`.
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Template events with the instance overrides merged in.
    pub fn events(&self) -> EventMap {
        let mut events = self.template.event_map().clone();
        events.extend(self.options.events.iter().map(|(k, h)| (k.clone(), h.clone())));
        events
    }

    /// Template helpers with the instance overrides merged in.
    pub fn helpers(&self) -> Object {
        let mut helpers = self.template.helper_map().clone();
        helpers.extend(self.options.helpers.iter().map(|(k, v)| (k.clone(), v.clone())));
        helpers
    }

    pub fn is_partial(&self) -> bool {
        self.options.parent.is_some()
    }

    pub fn parent(&self) -> Option<&str> {
        self.options.parent.as_deref()
    }

    /// Partials included directly by the last render.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Run the pipeline once. Unless `options.html` is set, the rendered
    /// notification fires afterwards.
    pub fn render(&mut self, options: RenderOptions) -> Result<Rendered> {
        let rendered = self.expand()?;
        if !options.html {
            self.notify(&rendered.html)?;
        }
        Ok(rendered)
    }

    /// Render, insert the fragment through `dom` and bind events: partial
    /// events first (each partial's callback fires once bound), then the
    /// instance's own events, then the rendered notification.
    pub fn render_into<D: Dom>(&mut self, dom: &mut D, options: RenderOptions) -> Result<(Rendered, D::Node)> {
        let rendered = self.expand()?;
        let node = dom.insert(&rendered.html, options.target.as_deref())?;
        let attribute = &self.engine.config().partial_attribute;

        for partial in &rendered.partials {
            let nodes = dom.find_by_attribute(&node, attribute, &partial.id);
            for found in &nodes {
                attach_events(dom, found, &partial.events, &partial.id, &partial.template, &partial.context)?;
            }
            if nodes.is_empty() {
                continue;
            }
            if let Some(callback) = self.engine.template(&partial.template).and_then(Template::rendered) {
                callback(&RenderEvent {
                    id: &partial.id,
                    template: &partial.template,
                    html: &rendered.html,
                    context: &partial.context,
                    partial: true,
                })?;
            }
        }

        let bound = attach_events(dom, &node, &self.events(), &self.id, self.template.name(), &self.context)?;
        debug!("[instance] id={} inserted partials={} events={}", self.id, rendered.partials.len(), bound);
        self.notify(&rendered.html)?;
        Ok((rendered, node))
    }

    fn expand(&mut self) -> Result<Rendered> {
        let started = Instant::now();
        let mut pipeline = Pipeline::new(self.engine, self.helpers(), &self.id);
        let html = pipeline.replace_all(self.template.source(), &Scope::root(&self.context))?;
        let html = match self.options.parent {
            Some(_) => annotate(&html, &self.engine.config().partial_attribute, &self.id),
            None => html,
        };
        let PipelineOutput { partials, children, mut metrics } = pipeline.finish();
        metrics.total = started.elapsed();
        debug!(
            "[instance] id={} template=\"{}\" partials={} invocations={} elapsed={:?}",
            self.id,
            self.template.name(),
            partials.len(),
            metrics.invocations,
            metrics.total
        );

        self.children = children.clone();
        Ok(Rendered { html, id: self.id.clone(), partials, children, context: (*self.context).clone(), metrics })
    }

    /// Instance callback, else template callback, else engine observers.
    fn notify(&self, html: &str) -> Result<()> {
        let event = RenderEvent {
            id: &self.id,
            template: self.template.name(),
            html,
            context: &self.context,
            partial: self.is_partial(),
        };
        match self.options.rendered.as_ref().or_else(|| self.template.rendered()) {
            Some(callback) => callback(&event),
            None => self.engine.observers().iter().try_for_each(|observer| observer(&event)),
        }
    }
}

impl fmt::Debug for TemplateInstance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateInstance")
            .field("id", &self.id)
            .field("template", &self.template.name())
            .field("options", &self.options)
            .field("children", &self.children)
            .finish()
    }
}
