//! Read-only classification of error and warning codes.
//!
//! Lookup order is exact code, then alias, then the first matching prefix rule, then a
//! default "unknown" spec. Any non-empty code resolves; an empty one does not. The
//! registry never decides control flow, it only describes a code to the caller.

mod codes;
mod fallback;
mod registry;
mod spec;

pub use codes::{ErrorCode, UnknownCode};
pub use spec::{BlockSeverity, ErrorClass, ErrorSpec, MatchKind, RecommendedAction};

use registry::ENTRIES;

/// Operator-facing description of a registered code.
pub fn resolve(code: ErrorCode) -> ErrorSpec {
    ENTRIES
        .iter()
        .find(|entry| entry.code == code)
        .map(|entry| entry.to_spec())
        .unwrap_or_else(|| fallback::unknown(code.as_str()))
}

/// Looks up an external code string. Returns `None` only for blank input.
pub fn resolve_error_spec(code: &str) -> Option<ErrorSpec> {
    resolve_error_spec_with_match(code).map(|(spec, _)| spec)
}

/// [`resolve_error_spec`] plus the lookup stage that produced the spec.
pub fn resolve_error_spec_with_match(code: &str) -> Option<(ErrorSpec, MatchKind)> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    if let Some(entry) = ENTRIES.iter().find(|entry| entry.code.as_str() == code) {
        return Some((entry.to_spec(), MatchKind::Exact));
    }

    if let Some(entry) = ENTRIES
        .iter()
        .find(|entry| entry.aliases.iter().any(|alias| *alias == code))
    {
        return Some((entry.to_spec(), MatchKind::Alias));
    }

    if let Some(spec) = fallback::synthesize(code) {
        return Some((spec, MatchKind::Fallback));
    }

    Some((fallback::unknown(code), MatchKind::Default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_code_has_its_own_entry() {
        for code in ErrorCode::ALL {
            let (spec, kind) = resolve_error_spec_with_match(code.as_str()).unwrap();
            assert_eq!(kind, MatchKind::Exact, "{code}");
            assert_eq!(spec.code, code.as_str());
            assert_eq!(resolve(*code), spec);
        }
        assert_eq!(ENTRIES.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn unknown_code_defaults_to_unsafe_spec() {
        let (spec, kind) = resolve_error_spec_with_match("E_TOTALLY_NEW").unwrap();
        assert_eq!(kind, MatchKind::Default);
        assert_eq!(spec.code, "E_TOTALLY_NEW");
        assert_eq!(spec.block, BlockSeverity::UnknownBlock);
        assert_eq!(spec.class, ErrorClass::Internal);
        assert!(!spec.safe_to_auto_retry);
        assert_eq!(
            spec.recommended,
            &[RecommendedAction::RunExplain, RecommendedAction::AbortSafe]
        );
    }

    #[test]
    fn blank_codes_resolve_to_nothing() {
        assert!(resolve_error_spec("").is_none());
        assert!(resolve_error_spec("   ").is_none());
    }

    #[test]
    fn aliases_resolve_to_canonical_spec() {
        let (spec, kind) = resolve_error_spec_with_match("E_CHAT_MISMATCH").unwrap();
        assert_eq!(kind, MatchKind::Alias);
        assert_eq!(spec.code, "E_ROUTE_MISMATCH");

        let spec = resolve_error_spec("E_MESSAGE_NOT_ECHOED").unwrap();
        assert_eq!(spec.code, "E_PROMPT_NOT_CONFIRMED_NO_RESEND");

        let spec = resolve_error_spec("E_STALE_STOP_ASSUME_IDLE").unwrap();
        assert_eq!(spec.code, "W_STALE_INDICATOR_IDLE");
    }

    #[test]
    fn shared_alias_resolves_to_first_definition() {
        // Listed under both the timeout budget and the stuck assistant entries.
        let spec = resolve_error_spec("E_REPLY_WAIT_TIMEOUT_STOP_VISIBLE").unwrap();
        assert_eq!(spec.code, "E_TIMEOUT_BUDGET");
    }

    #[test]
    fn fallback_rules_apply_in_order() {
        let cases = [
            ("E_ROUTE_SOMETHING", ErrorClass::Routing, BlockSeverity::HardBlockUser),
            ("E_ARG_BAD", ErrorClass::Input, BlockSeverity::HardBlockUser),
            ("E_LOGIN_REQUIRED", ErrorClass::Env, BlockSeverity::HardBlockEnv),
            ("E_SLOT_LEAK", ErrorClass::Concurrency, BlockSeverity::SoftBlockRecover),
            ("E_COMPOSER_GONE", ErrorClass::UiState, BlockSeverity::SoftBlockRetryable),
            ("E_WAIT_FOREVER", ErrorClass::Timeout, BlockSeverity::SoftBlockRecover),
            ("E_EVIDENCE_BROKEN", ErrorClass::Protocol, BlockSeverity::SoftBlockRecover),
            ("W_SOFT_RESET_SLOW", ErrorClass::Recovery, BlockSeverity::NoBlock),
        ];
        for (code, class, block) in cases {
            let (spec, kind) = resolve_error_spec_with_match(code).unwrap();
            assert_eq!(kind, MatchKind::Fallback, "{code}");
            assert_eq!(spec.code, code);
            assert_eq!((spec.class, spec.block), (class, block), "{code}");
            assert!(spec.aliases.is_empty());
        }

        // Prefix must be followed by an underscore.
        let (_, kind) = resolve_error_spec_with_match("E_ROUTED").unwrap();
        assert_eq!(kind, MatchKind::Default);
    }

    #[test]
    fn lookup_trims_surrounding_whitespace() {
        let spec = resolve_error_spec("  E_CDP_DOWN\n").unwrap();
        assert_eq!(spec.code, "E_CDP_DOWN");
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_value(resolve(ErrorCode::AssistantStuck)).unwrap();
        assert_eq!(json["class"], "TIMEOUT");
        assert_eq!(json["block"], "SOFT_BLOCK_WAIT");
        assert_eq!(json["safeToAutoRetry"], true);
        assert_eq!(json["recommended"][0], "STEP_WAIT_FINISHED");
    }
}
