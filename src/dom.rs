//! DOM collaborator and event bindings.
//!
//! The engine produces HTML text; putting it into a document and wiring
//! events is the job of a [`Dom`] implementation supplied by the caller.
//! Templates declare their events as a map from an *event spec* to a handler:
//!
//! ```text
//! "click .save, submit form"  ->  [click on ".save"], [submit on "form"]
//! "load"                      ->  [load on the fragment itself]
//! ```

use crate::error::Result;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// What a handler receives when the DOM fires an event.
#[derive(Debug)]
pub struct EventInvocation<'a> {
    /// DOM event name, e.g. `click`.
    pub event: &'a str,
    /// Selector the binding was declared with, if any.
    pub selector: Option<&'a str>,
    /// Id of the instance (root or partial) owning the binding.
    pub instance: &'a str,
    pub template: &'a str,
    /// Render context of the owning instance.
    pub context: &'a Value,
}

pub type EventHandler = Arc<dyn Fn(&EventInvocation<'_>) -> Result<()> + Send + Sync>;

/// Event spec string to handler, in declaration order.
pub type EventMap = IndexMap<String, EventHandler>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&EventInvocation<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One `event[ selector]` entry of an event spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub event: String,
    pub selector: Option<String>,
}

impl EventSpec {
    /// Split a comma separated spec. Empty entries are ignored.
    pub fn parse(spec: &str) -> Vec<EventSpec> {
        spec.split(',')
            .filter_map(|part| {
                let part = part.trim();
                let (event, selector) = match part.split_once(char::is_whitespace) {
                    Some((event, selector)) => (event, Some(selector.trim().to_string())),
                    None => (part, None),
                };
                (!event.is_empty()).then(|| EventSpec { event: event.to_string(), selector })
            })
            .collect()
    }
}

/// A handler bound to the instance that declared it.
#[derive(Clone)]
pub struct Listener {
    handler: EventHandler,
    spec: EventSpec,
    instance: String,
    template: String,
    context: Arc<Value>,
}

impl Listener {
    pub(crate) fn new(handler: EventHandler, spec: EventSpec, instance: &str, template: &str, context: Arc<Value>) -> Self {
        Listener { handler, spec, instance: instance.to_string(), template: template.to_string(), context }
    }

    pub fn spec(&self) -> &EventSpec {
        &self.spec
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Run the handler. Called by the [`Dom`] when the event fires.
    pub fn dispatch(&self) -> Result<()> {
        (self.handler)(&EventInvocation {
            event: &self.spec.event,
            selector: self.spec.selector.as_deref(),
            instance: &self.instance,
            template: &self.template,
            context: &self.context,
        })
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("spec", &self.spec)
            .field("instance", &self.instance)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Document the rendered fragments go into.
pub trait Dom {
    type Node: Clone;

    /// Parse `html` into a fragment and insert it into `target` (a selector)
    /// when one is given.
    fn insert(&mut self, html: &str, target: Option<&str>) -> Result<Self::Node>;

    /// `root` itself and its descendants carrying `attribute="value"`.
    fn find_by_attribute(&self, root: &Self::Node, attribute: &str, value: &str) -> Vec<Self::Node>;

    /// Bind `listener` on `node` for `spec` (the listener carries the same spec).
    fn attach_event(&mut self, node: &Self::Node, spec: &EventSpec, listener: Listener) -> Result<()>;
}

/// Bind every entry of `events` on `node`.
pub(crate) fn attach_events<D: Dom>(
    dom: &mut D,
    node: &D::Node,
    events: &EventMap,
    instance: &str,
    template: &str,
    context: &Arc<Value>,
) -> Result<usize> {
    let mut bound = 0;
    for (spec, handler) in events {
        for entry in EventSpec::parse(spec) {
            let listener = Listener::new(handler.clone(), entry.clone(), instance, template, context.clone());
            dom.attach_event(node, &entry, listener)?;
            bound += 1;
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parses_comma_separated_specs() {
        let specs = EventSpec::parse("click .save , submit  form#main,, load");
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0], EventSpec { event: "click".into(), selector: Some(".save".into()) });
        assert_eq!(specs[1].selector.as_deref(), Some("form#main"));
        assert_eq!(specs[2], EventSpec { event: "load".into(), selector: None });
    }

    #[test]
    fn listener_dispatch_passes_binding_details() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let h = handler(move |e| {
            sink.lock().unwrap().push(format!("{} {:?} {} {}", e.event, e.selector, e.instance, e.template));
            Ok(())
        });
        let spec = EventSpec::parse("click a").remove(0);
        let listener = Listener::new(h, spec, "kbti_0", "menu", Arc::new(Value::Null));
        listener.dispatch().unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["click Some(\"a\") kbti_0 menu"]);
    }
}
