//! Substitution engine.
//!
//! This module is the core of the crate: everything that turns template
//! markup plus data into HTML text. It is a text rewriter, not a compiler:
//! there is no parse tree. Each pass locates its markers in the current
//! string and splices replacements in, recursing into block bodies with a new
//! scope.
//!
//! ## How the parts work together
//!
//! ```text
//! template source ── TriggerInfo::scan ──┐  (trigger.rs)
//!                                        │  skip passes whose markers are absent
//!                                        v
//!                          Pipeline::replace_all (pipeline.rs)
//!                            - flatten computed fields
//!                            - comments
//!                            - conditions ─┐
//!                            - each ───────┤ find_blocks (blocks.rs)
//!                            - partials    │ recurse with Scope::child (scope.rs)
//!                            - with ───────┘
//!                            - eval, helpers, variables
//!                            - attribute cleanup
//!                                        │
//!              resolve_path (resolve.rs) │ parse_value / substitute_paths (value_parser.rs)
//!              ExpressionEvaluator (expr.rs)
//!                                        v
//!                                   HTML string + RenderMetrics (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `patterns.rs`: every markup regex, compiled once.
//! - `trigger.rs`: cheap substring scan producing a `MarkupMask`.
//! - `scope.rs`: the scope chain (data, `@index`/`@key` specials, parent).
//! - `resolve.rs`: context paths to values; missing data is `Null`, never an
//!   error.
//! - `value_parser.rs`: tokens to values for helper arguments, partial params
//!   and expressions.
//! - `blocks.rs`: balanced matching of `each` / `if` / `with` blocks.
//! - `expr.rs`: the `ExpressionEvaluator` seam and the default
//!   `SafeEvaluator`.
//! - `pipeline.rs`: the passes, the partial arena and the depth guard.
//! - `metrics.rs`: per-pass timings and counters.
//!
//! ## Debugging
//!
//! The engine logs through the `log` facade: `debug` for registry, partial and
//! instance events, `trace` for every pass decision. The CLI enables them with
//! `KANDYBARS_LOG=trace`.

#[path = "engine/blocks.rs"]
pub(crate) mod blocks;
#[path = "engine/expr.rs"]
pub(crate) mod expr;
#[path = "engine/metrics.rs"]
pub(crate) mod metrics;
#[path = "engine/patterns.rs"]
pub(crate) mod patterns;
#[path = "engine/pipeline.rs"]
pub(crate) mod pipeline;
#[path = "engine/resolve.rs"]
pub(crate) mod resolve;
#[path = "engine/scope.rs"]
pub(crate) mod scope;
#[path = "engine/trigger.rs"]
mod trigger;
#[path = "engine/value_parser.rs"]
pub(crate) mod value_parser;


pub use blocks::{BlockKind, BlockMatch, find_blocks, find_each_blocks};
pub use expr::{ExpressionEvaluator, SafeEvaluator};
pub use metrics::{Pass, PassMetrics, RenderMetrics};
pub use resolve::resolve_path;
pub use scope::Scope;
pub use value_parser::{parse_helper_arguments, parse_helper_params, parse_value};
