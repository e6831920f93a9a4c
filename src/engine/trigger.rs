//! Trigger scanning (source pre-classification).
//!
//! Before the passes run, the pipeline inspects the raw source once and
//! records which markup families appear in it. A pass whose marker is absent
//! is skipped entirely, so a plain HTML fragment only pays for the scan and
//! the attribute cleanup.
//!
//! ## Design notes
//!
//! - This is a *heuristic* scan. False positives are fine because the pass
//!   still has to match its full pattern; false negatives are not, so every
//!   marker check is a plain substring test on the tag prefix.
//! - Close tags count as markers too: a stray `{{/each}}` must still reach the
//!   block matcher so it can be reported as unbalanced.
//! - Block passes are gated on the scan of the raw source. Their output can
//!   drop inline markers or splice in values carrying attributes, so the
//!   pipeline rescans before the inline passes and again before the
//!   attribute cleanup.

bitflags::bitflags! {
    /// Markup families present in a source string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MarkupMask: u16 {
        const MUSTACHE   = 1 << 0;
        const COMMENT    = 1 << 1;
        const CONDITION  = 1 << 2;
        const EACH       = 1 << 3;
        const PARTIAL    = 1 << 4;
        const WITH       = 1 << 5;
        const EVAL       = 1 << 6;
        const BOOL_ATTR  = 1 << 7;
    }
}

/// Source characteristics detected from the raw markup.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInfo {
    pub mask: MarkupMask,
}

impl TriggerInfo {
    /// Scan `source` for markup families.
    pub fn scan(source: &str) -> Self {
        let mut mask = MarkupMask::empty();

        if source.contains("{{") {
            mask |= MarkupMask::MUSTACHE;

            if source.contains("{{!") {
                mask |= MarkupMask::COMMENT;
            }
            if source.contains("{{#if") || source.contains("{{/if}}") {
                mask |= MarkupMask::CONDITION;
            }
            if source.contains("{{#each") || source.contains("{{/each}}") {
                mask |= MarkupMask::EACH;
            }
            if source.contains("{{>") {
                mask |= MarkupMask::PARTIAL;
            }
            if source.contains("{{#with") || source.contains("{{/with}}") {
                mask |= MarkupMask::WITH;
            }
            if source.contains("{{eval ") {
                mask |= MarkupMask::EVAL;
            }
        }

        // Attribute names are case-insensitive in HTML.
        let lower = source.to_ascii_lowercase();
        if ["disabled=", "checked=", "selected="].iter().any(|attr| lower.contains(attr)) {
            mask |= MarkupMask::BOOL_ATTR;
        }

        TriggerInfo { mask }
    }

    pub fn has(&self, flag: MarkupMask) -> bool {
        self.mask.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_html_has_no_markup() {
        let info = TriggerInfo::scan("<p class=\"x\">hello</p>");
        assert!(info.mask.is_empty());
    }

    #[test]
    fn detects_each_family() {
        let info = TriggerInfo::scan("<ul>{{#each items}}<li>{{this}}</li>{{/each}}</ul>");
        assert!(info.has(MarkupMask::MUSTACHE | MarkupMask::EACH));
        assert!(!info.has(MarkupMask::CONDITION));
    }

    #[test]
    fn stray_close_tag_still_triggers() {
        assert!(TriggerInfo::scan("a{{/if}}").has(MarkupMask::CONDITION));
    }

    #[test]
    fn boolean_attributes_any_case() {
        assert!(TriggerInfo::scan("<input CHECKED=\"false\">").has(MarkupMask::BOOL_ATTR));
    }
}
