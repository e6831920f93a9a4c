use crate::dom::{EventHandler, EventMap};
use crate::engine::patterns;
use crate::error::{Error, Result};
use crate::instance::RenderedFn;
use crate::value::{Object, Value};

/// A named template source plus the bindings attached to it.
///
/// The name and source never change after registration. Events, helpers and
/// the rendered callback can be added at any time and apply to every later
/// render.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    events: EventMap,
    helpers: Object,
    rendered: Option<RenderedFn>,
}

impl Template {
    pub(crate) fn new(name: &str, source: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Template {
            name: name.to_string(),
            source: source.to_string(),
            events: EventMap::new(),
            helpers: Object::new(),
            rendered: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Merge event bindings. A spec declared twice keeps the last handler.
    pub fn events<I, K>(&mut self, events: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, EventHandler)>,
        K: Into<String>,
    {
        self.events.extend(events.into_iter().map(|(k, h)| (k.into(), h)));
        self
    }

    /// Merge helper overrides. They shadow global helpers for this template
    /// and are visible as context fields.
    pub fn helpers<I, K>(&mut self, helpers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.helpers.extend(helpers.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn set_rendered(&mut self, callback: RenderedFn) -> &mut Self {
        self.rendered = Some(callback);
        self
    }

    pub fn event_map(&self) -> &EventMap {
        &self.events
    }

    pub fn helper_map(&self) -> &Object {
        &self.helpers
    }

    pub fn rendered(&self) -> Option<&RenderedFn> {
        self.rendered.as_ref()
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("rendered", &self.rendered.is_some())
            .finish()
    }
}

/// `length` is refused because it would shadow the length of collections
/// in paths.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if !patterns::template_identifier().is_match(name) {
        return Err(Error::InvalidTemplateName {
            name: name.to_string(),
            reason: "names must match [a-zA-Z_][a-zA-Z0-9_]*",
        });
    }
    if name == "length" {
        return Err(Error::InvalidTemplateName { name: name.to_string(), reason: "\"length\" is reserved" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::handler;

    #[test]
    fn name_validation() {
        assert!(Template::new("card_2", "").is_ok());
        assert!(Template::new("_x", "").is_ok());
        for bad in ["", "2card", "my-card", "length", "a b"] {
            assert!(matches!(Template::new(bad, ""), Err(Error::InvalidTemplateName { .. })), "{bad}");
        }
    }

    #[test]
    fn later_bindings_merge() {
        let mut t = Template::new("menu", "<ul></ul>").unwrap();
        t.events([("click a", handler(|_| Ok(())))]).events([("click b", handler(|_| Ok(())))]);
        t.helpers([("title", Value::from("A"))]).helpers([("title", Value::from("B")), ("x", Value::Int(1))]);
        assert_eq!(t.event_map().len(), 2);
        assert_eq!(t.helper_map().get("title"), Some(&Value::from("B")));
        assert_eq!(t.helper_map().len(), 2);
        assert!(t.rendered().is_none());
    }
}
