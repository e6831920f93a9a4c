//! Markup patterns.
//!
//! Every pattern the passes use lives here so the markup surface can be read
//! in one place. Each accessor returns a process-wide regex compiled on first
//! use (see the `regex!` macro).
//!
//! ```text
//! {{! comment }}                     comment()
//! {{#if expr}} … {{else}} … {{/if}}  block tags (blocks.rs)
//! {{#each path}} … {{/each}}         block tags (blocks.rs)
//! {{#with path}} … {{/with}}         block tags (blocks.rs)
//! {{> name a=b}}                     partial()
//! {{eval expr}}                      eval()
//! {{helper a b}}                     helper()
//! {{path}} / {{{path}}}              variable()
//! <template name="x"> … </template>  template_block() + template_name()
//! ```

use regex::Regex;

pub(crate) fn comment() -> &'static Regex {
    crate::regex!(r"\{\{![^}]+?\}\}")
}

pub(crate) fn eval() -> &'static Regex {
    crate::regex!(r"\{\{eval ([^}]+)\}\}")
}

pub(crate) fn helper() -> &'static Regex {
    crate::regex!(r"\{\{([a-zA-Z0-9_]+) ([^}]+)\}\}")
}

pub(crate) fn partial() -> &'static Regex {
    crate::regex!(r"\{\{>\s*([^\s}]+)([^}]*)\}\}")
}

pub(crate) fn variable() -> &'static Regex {
    crate::regex!(
        r"\{\{\{?((?:this\.|\.\./)?[a-zA-Z0-9_@]+(?:\[[^\[\]\s{}]+\])*(?:\.[a-zA-Z0-9_]+(?:\[[^\[\]\s{}]+\])*)*)\}\}\}?"
    )
}

/// Context path grammar: identifier segments joined by dots, each optionally
/// followed by bracket indices, with an optional `this.` or `../` prefix.
pub(crate) fn context_path() -> &'static Regex {
    crate::regex!(r"^(?:this\.|\.\./)?[a-zA-Z_][a-zA-Z0-9_]*(?:\[[^\[\]]+\])*(?:\.[a-zA-Z0-9_]+(?:\[[^\[\]]+\])*)*$")
}

pub(crate) fn boolean_attribute() -> &'static Regex {
    crate::regex!(r#"(?i)(?:disabled|checked|selected)=["'](?:false)?["']"#)
}

pub(crate) fn template_block() -> &'static Regex {
    crate::regex!(r"(?s)<template([^>]*)>(.*?)</template>")
}

pub(crate) fn template_name() -> &'static Regex {
    crate::regex!(r#"name="([^"]+)""#)
}

pub(crate) fn template_identifier() -> &'static Regex {
    crate::regex!(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
}

pub(crate) fn helper_identifier() -> &'static Regex {
    crate::regex!(r"^[a-zA-Z0-9_]+$")
}

pub(crate) fn float_literal() -> &'static Regex {
    crate::regex!(r"^[+-]?[0-9]+[.,][0-9]+$")
}

pub(crate) fn int_literal() -> &'static Regex {
    crate::regex!(r"^[+-]?(?:[0-9]+|Infinity)$")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_path_grammar() {
        for ok in ["name", "this.name", "../name", "user.phones[0].array[a]", "_x", "a.b.c"] {
            assert!(context_path().is_match(ok), "{ok}");
        }
        for bad in ["", "1abc", "a..b", "a b", "\"str\"", "a.", "@index", "../../a"] {
            assert!(!context_path().is_match(bad), "{bad}");
        }
    }

    #[test]
    fn variable_accepts_triple_braces_and_indices() {
        let caps = variable().captures("{{{ user.phones[0] }}}");
        assert!(caps.is_none());
        let caps = variable().captures("<b>{{{user.phones[0]}}}</b>").unwrap();
        assert_eq!(&caps[1], "user.phones[0]");
        assert_eq!(&variable().captures("{{@index}}").unwrap()[1], "@index");
    }

    #[test]
    fn partial_captures_name_and_params() {
        let caps = partial().captures("{{> card title='Hi' this=user}}").unwrap();
        assert_eq!(&caps[1], "card");
        assert_eq!(caps[2].trim(), "title='Hi' this=user");
        let caps = partial().captures("{{>card}}").unwrap();
        assert_eq!(&caps[1], "card");
        assert_eq!(&caps[2], "");
    }
}
