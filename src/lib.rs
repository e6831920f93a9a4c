//! Mustache-like HTML templating.
//!
//! `kandybars` expands a small markup language against a data context:
//!
//! ```text
//! {{! comment }}                         stripped
//! {{path}} {{{path}}} {{../up}}          variables
//! {{#if a < b}} … {{else}} … {{/if}}     conditions
//! {{#each items}} {{@index}} {{/each}}   loops (arrays and objects, @key)
//! {{#with user}} … {{/with}}             scoped blocks
//! {{> card title='x' this=user}}         partials
//! {{eval price * qty}}                   inline expressions
//! {{helper arg 'quoted arg'}}            helpers
//! <template name="x"> … </template>      template declarations
//! ```
//!
//! Templates live in an [`Engine`]. Rendering goes through a
//! [`TemplateInstance`], which runs the substitution pipeline once and,
//! optionally, hands the result to a [`Dom`] collaborator for insertion and
//! event binding.
//!
//! ```
//! use kandybars::Engine;
//! use serde_json::json;
//!
//! let mut engine = Engine::new();
//! engine
//!     .parse_templates(r#"<template name="list"><ul>{{#each items}}<li>{{this}}</li>{{/each}}</ul></template>"#)
//!     .unwrap();
//! let html = engine.render("list", json!({"items": ["a", "b"]})).unwrap();
//! assert_eq!(html, "<ul><li>a</li><li>b</li></ul>");
//! ```

#[macro_use]
mod macros;
mod api;
mod dom;
mod engine;
mod error;
mod instance;
mod loader;
mod template;
mod value;

pub use api::{Config, Engine, Loaded};
pub use dom::{Dom, EventHandler, EventInvocation, EventMap, EventSpec, Listener, handler};
pub use engine::{
    BlockKind, BlockMatch, ExpressionEvaluator, Pass, PassMetrics, RenderMetrics, SafeEvaluator, Scope,
    find_blocks, find_each_blocks, parse_helper_arguments, parse_helper_params, parse_value, resolve_path,
};
pub use error::{Error, Result, Unbalanced};
pub use instance::{
    InstanceOptions, PartialInstance, RenderEvent, RenderOptions, Rendered, RenderedFn, TemplateInstance,
    on_rendered,
};
pub use loader::{FsLoader, SourceLoader};
pub use template::Template;
pub use value::{Callable, Object, Value, format_number};
