//! # Legacy Flag Shim
//!
//! Translates the historical ``pretrained`` / ``pretrained_backbone`` flags
//! into registry selections.
//!
//! The shim is pure: it never mutates the caller's request, and returns the
//! [`DeprecationNotice`]s it would have warned about alongside the
//! translated value. The caller decides where the notices go.

use crate::weights::{Selection, Weights};
use std::fmt::{Display, Formatter};

/// A legacy flag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyFlag {
    /// ``pretrained=true/false``.
    Bool(bool),

    /// ``pretrained="<variant>"``.
    Named(String),
}

impl LegacyFlag {
    /// Flag truthiness; a named flag is truthy unless empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Named(name) => !name.is_empty(),
        }
    }
}

impl From<bool> for LegacyFlag {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<&str> for LegacyFlag {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// A (legacy key, current key) parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyPair {
    /// The deprecated parameter name.
    pub legacy_key: &'static str,

    /// The replacement parameter name.
    pub current_key: &'static str,
}

/// ``pretrained`` -> ``weights``.
pub const PRETRAINED: LegacyPair = LegacyPair {
    legacy_key: "pretrained",
    current_key: "weights",
};

/// ``pretrained_backbone`` -> ``weights_backbone``.
pub const PRETRAINED_BACKBONE: LegacyPair = LegacyPair {
    legacy_key: "pretrained_backbone",
    current_key: "weights_backbone",
};

/// A named legacy flag value selecting an older registry entry.
#[derive(Debug)]
pub struct LegacyVariant {
    /// The flag value, e.g. ``"legacy"``.
    pub flag: &'static str,

    /// The entry it selects.
    pub weights: &'static Weights,
}

/// The kind of deprecated usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// A boolean passed positionally in the current parameter's slot.
    Positional,

    /// The legacy keyword was used.
    Keyword,

    /// The legacy keyword replaced an explicitly supplied current value.
    Overridden,
}

/// A deprecation notice produced by the shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationNotice {
    /// What kind of usage was seen.
    pub kind: NoticeKind,

    /// The parameter pair.
    pub pair: LegacyPair,
}

impl Display for DeprecationNotice {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        let LegacyPair {
            legacy_key,
            current_key,
        } = self.pair;
        match self.kind {
            NoticeKind::Positional => write!(
                f,
                "The positional parameter '{legacy_key}' is deprecated, \
                 please use keyword parameter '{current_key}' instead."
            ),
            NoticeKind::Keyword => write!(
                f,
                "The parameter '{legacy_key}' is deprecated, please use '{current_key}' instead."
            ),
            NoticeKind::Overridden => write!(
                f,
                "Both '{legacy_key}' and '{current_key}' were given; \
                 '{legacy_key}' takes precedence."
            ),
        }
    }
}

/// A shim result: the translated value and the notices raised.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    /// The translated value.
    pub value: T,

    /// Deprecation notices, in the order raised.
    pub notices: Vec<DeprecationNotice>,
}

impl<T> Normalized<T> {
    /// A result with no notices.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            notices: Vec::new(),
        }
    }
}

/// Handle a boolean passed positionally in the current parameter's slot.
///
/// If `current` is ``Selection::Flag(true)``, the legacy flag becomes
/// ``Bool(true)``; otherwise `legacy` is returned unchanged.
pub fn handle_deprecated_positional(
    pair: LegacyPair,
    legacy: Option<LegacyFlag>,
    current: Option<&Selection>,
) -> Normalized<Option<LegacyFlag>> {
    match current {
        Some(Selection::Flag(true)) => Normalized {
            value: Some(LegacyFlag::Bool(true)),
            notices: vec![DeprecationNotice {
                kind: NoticeKind::Positional,
                pair,
            }],
        },
        _ => Normalized::clean(legacy),
    }
}

/// Resolve a named legacy flag against the declared variants.
///
/// A flag matching a variant selects the variant's entry as the fallback
/// and is itself normalized to ``Bool(true)``. Anything else passes
/// through with the given fallback.
pub fn handle_legacy_variant(
    legacy: Option<LegacyFlag>,
    variants: &[LegacyVariant],
    fallback: &'static Weights,
) -> (Option<LegacyFlag>, &'static Weights) {
    if let Some(LegacyFlag::Named(name)) = &legacy {
        if let Some(variant) = variants.iter().find(|v| v.flag == name.as_str()) {
            return (Some(LegacyFlag::Bool(true)), variant.weights);
        }
    }
    (legacy, fallback)
}

/// Translate a legacy keyword flag into a selection.
///
/// - legacy present and truthy: selects `fallback`.
/// - legacy present and falsy: selects nothing.
/// - legacy absent: `current` unchanged.
///
/// A present legacy flag always takes precedence over `current`; a
/// non-flag `current` value being replaced raises an extra
/// [`NoticeKind::Overridden`] notice.
pub fn handle_deprecated_param(
    pair: LegacyPair,
    legacy: Option<LegacyFlag>,
    current: Option<Selection>,
    fallback: &'static Weights,
) -> Normalized<Option<Selection>> {
    let Some(legacy) = legacy else {
        return Normalized::clean(current);
    };

    let mut notices = vec![DeprecationNotice {
        kind: NoticeKind::Keyword,
        pair,
    }];
    if matches!(current, Some(Selection::Entry(_)) | Some(Selection::Name(_))) {
        notices.push(DeprecationNotice {
            kind: NoticeKind::Overridden,
            pair,
        });
    }

    let value = if legacy.is_truthy() {
        Some(Selection::Entry(fallback))
    } else {
        None
    };

    Normalized { value, notices }
}

/// Apply the full shim to one (legacy, current) pair.
///
/// Positional flags are folded in first, then named variants, then the
/// keyword translation.
pub fn normalize_selection(
    pair: LegacyPair,
    legacy: Option<LegacyFlag>,
    current: Option<Selection>,
    variants: &[LegacyVariant],
    fallback: &'static Weights,
) -> Normalized<Option<Selection>> {
    let positional = handle_deprecated_positional(pair, legacy, current.as_ref());
    let mut notices = positional.notices;

    let current = match current {
        Some(Selection::Flag(true)) => None,
        other => other,
    };

    let (legacy, fallback) = handle_legacy_variant(positional.value, variants, fallback);

    let param = handle_deprecated_param(pair, legacy, current, fallback);
    notices.extend(param.notices);

    Normalized {
        value: param.value,
        notices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{Categories, EvalTransform, WeightsMeta};
    use hamcrest::prelude::*;

    const META: WeightsMeta = WeightsMeta {
        categories: Categories::Count(2),
        keypoint_names: None,
        recipe: None,
        metrics: &[],
    };

    static OLD: Weights = Weights {
        name: "Old",
        registry: "Test_Weights",
        url: "https://example.com/old.pth",
        transforms: EvalTransform::CocoEval,
        meta: META,
    };

    static NEW: Weights = Weights {
        name: "New",
        registry: "Test_Weights",
        url: "https://example.com/new.pth",
        transforms: EvalTransform::CocoEval,
        meta: META,
    };

    static VARIANTS: &[LegacyVariant] = &[LegacyVariant {
        flag: "legacy",
        weights: &OLD,
    }];

    fn selected(selection: &Option<Selection>) -> Option<&'static Weights> {
        match selection {
            Some(Selection::Entry(w)) => Some(*w),
            None => None,
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    fn kinds(notices: &[DeprecationNotice]) -> Vec<NoticeKind> {
        notices.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn test_truthiness() {
        assert!(LegacyFlag::Bool(true).is_truthy());
        assert!(!LegacyFlag::Bool(false).is_truthy());
        assert!(LegacyFlag::from("legacy").is_truthy());
        assert!(!LegacyFlag::from("").is_truthy());
    }

    #[test]
    fn test_notice_messages() {
        let notice = DeprecationNotice {
            kind: NoticeKind::Keyword,
            pair: PRETRAINED,
        };
        assert_eq!(
            notice.to_string(),
            "The parameter 'pretrained' is deprecated, please use 'weights' instead."
        );

        let notice = DeprecationNotice {
            kind: NoticeKind::Positional,
            pair: PRETRAINED_BACKBONE,
        };
        assert_eq!(
            notice.to_string(),
            "The positional parameter 'pretrained_backbone' is deprecated, \
             please use keyword parameter 'weights_backbone' instead."
        );
    }

    #[test]
    fn test_positional() {
        let result = handle_deprecated_positional(PRETRAINED, None, Some(&Selection::Flag(true)));
        assert_eq!(result.value, Some(LegacyFlag::Bool(true)));
        assert_eq!(kinds(&result.notices), vec![NoticeKind::Positional]);

        // A positional `true` replaces a named legacy flag.
        let result = handle_deprecated_positional(
            PRETRAINED,
            Some("legacy".into()),
            Some(&Selection::Flag(true)),
        );
        assert_eq!(result.value, Some(LegacyFlag::Bool(true)));

        for current in [None, Some(Selection::Flag(false)), Some(Selection::Entry(&NEW))] {
            let result = handle_deprecated_positional(PRETRAINED, None, current.as_ref());
            assert_eq!(result.value, None);
            assert!(result.notices.is_empty());
        }
    }

    #[test]
    fn test_legacy_variant() {
        let (flag, fallback) = handle_legacy_variant(Some("legacy".into()), VARIANTS, &NEW);
        assert_eq!(flag, Some(LegacyFlag::Bool(true)));
        assert!(fallback.is(&OLD));

        let (flag, fallback) = handle_legacy_variant(Some(true.into()), VARIANTS, &NEW);
        assert_eq!(flag, Some(LegacyFlag::Bool(true)));
        assert!(fallback.is(&NEW));

        let (flag, fallback) = handle_legacy_variant(Some("other".into()), VARIANTS, &NEW);
        assert_eq!(flag, Some(LegacyFlag::Named("other".to_string())));
        assert!(fallback.is(&NEW));
    }

    #[test]
    fn test_deprecated_param_absent() {
        let result = handle_deprecated_param(PRETRAINED, None, Some("Old".into()), &NEW);
        assert!(matches!(result.value, Some(Selection::Name(ref n)) if n == "Old"));
        assert!(result.notices.is_empty());
    }

    #[test]
    fn test_deprecated_param_present() {
        let result = handle_deprecated_param(PRETRAINED, Some(true.into()), None, &NEW);
        assert!(selected(&result.value).unwrap().is(&NEW));
        assert_eq!(kinds(&result.notices), vec![NoticeKind::Keyword]);

        // Falsy flags still warn.
        let result = handle_deprecated_param(PRETRAINED, Some(false.into()), None, &NEW);
        assert!(result.value.is_none());
        assert_eq!(kinds(&result.notices), vec![NoticeKind::Keyword]);
    }

    #[test]
    fn test_legacy_overrides_current() {
        let result = handle_deprecated_param(
            PRETRAINED,
            Some(false.into()),
            Some(Selection::Entry(&OLD)),
            &NEW,
        );
        assert!(result.value.is_none());
        assert_eq!(
            kinds(&result.notices),
            vec![NoticeKind::Keyword, NoticeKind::Overridden]
        );

        let result = normalize_selection(
            PRETRAINED,
            Some(true.into()),
            Some("Old".into()),
            VARIANTS,
            &NEW,
        );
        assert!(selected(&result.value).unwrap().is(&NEW));
        assert_eq!(
            kinds(&result.notices),
            vec![NoticeKind::Keyword, NoticeKind::Overridden]
        );
    }

    #[test]
    fn test_normalize_selection() {
        // Positional true -> fallback.
        let result = normalize_selection(
            PRETRAINED,
            None,
            Some(Selection::Flag(true)),
            VARIANTS,
            &NEW,
        );
        assert!(selected(&result.value).unwrap().is(&NEW));
        assert_eq!(
            kinds(&result.notices),
            vec![NoticeKind::Positional, NoticeKind::Keyword]
        );

        // Named variant -> older entry.
        let result = normalize_selection(PRETRAINED, Some("legacy".into()), None, VARIANTS, &NEW);
        assert!(selected(&result.value).unwrap().is(&OLD));
        assert_that!(result.notices.len(), is(equal_to(1)));

        // Named variant without declared variants -> truthy -> fallback.
        let result = normalize_selection(PRETRAINED, Some("legacy".into()), None, &[], &NEW);
        assert!(selected(&result.value).unwrap().is(&NEW));

        // Nothing legacy -> untouched.
        let result = normalize_selection(
            PRETRAINED,
            None,
            Some(Selection::Flag(false)),
            VARIANTS,
            &NEW,
        );
        assert!(matches!(result.value, Some(Selection::Flag(false))));
        assert!(result.notices.is_empty());
    }
}
