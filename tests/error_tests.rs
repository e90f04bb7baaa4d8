//! Tests for the error taxonomy and its retry and recovery mapping.

use pretty_assertions::assert_eq;

use syncline::client::classify::{classify_response, CallContext, RawResponse};
use syncline::client::ApiErrorDetail;
use syncline::error::{ClassifiedError, ErrorKind, RecoverySuggestion, SynclineError};

fn classify(status: u16, context: CallContext, detail: ApiErrorDetail) -> ClassifiedError {
    let raw = RawResponse {
        status,
        retry_after: None,
        body: "",
    };
    classify_response(&raw, context, detail, 60).expect("non-2xx should classify")
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: SynclineError,
        expected_kind: Option<ErrorKind>,
        expected_retryable: bool,
        expected_recovery: RecoverySuggestion,
    }

    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: classify(400, CallContext::Resource, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::Validation),
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::FixRequest,
        },
        Case {
            error: classify(401, CallContext::Resource, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::Auth),
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckPermissions,
        },
        Case {
            error: classify(400, CallContext::TokenExchange, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::Auth),
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::Reauthorize,
        },
        Case {
            error: classify(404, CallContext::Resource, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::NotFound),
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckResource,
        },
        Case {
            error: classify(429, CallContext::Resource, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::RateLimit),
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryLater,
        },
        Case {
            error: classify(502, CallContext::Resource, ApiErrorDetail::default()).into(),
            expected_kind: Some(ErrorKind::Server),
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryLater,
        },
        Case {
            error: ClassifiedError::transport("connection failed").into(),
            expected_kind: Some(ErrorKind::Transport),
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryLater,
        },
        Case {
            error: SynclineError::Configuration("bad-config".to_string()),
            expected_kind: None,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckConfiguration,
        },
        Case {
            error: SynclineError::Serialization(serde_error),
            expected_kind: None,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: SynclineError::InvalidResponse("missing id".to_string()),
            expected_kind: None,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
    ];

    for case in cases {
        assert_eq!(case.error.kind(), case.expected_kind, "{}", case.error);
        assert_eq!(case.error.is_retryable(), case.expected_retryable, "{}", case.error);
        assert_eq!(case.error.recovery_suggestion(), case.expected_recovery, "{}", case.error);
    }
}

#[test]
fn rate_limit_reads_retry_after_or_falls_back() {
    let with_header = RawResponse {
        status: 429,
        retry_after: Some("17"),
        body: "",
    };
    let error = classify_response(&with_header, CallContext::Resource, ApiErrorDetail::default(), 60).unwrap();
    assert_eq!(error.retry_after_secs, Some(17));

    // HTTP-date form is not understood; the default applies.
    let dated = RawResponse {
        status: 429,
        retry_after: Some("Wed, 21 Oct 2015 07:28:00 GMT"),
        body: "",
    };
    let error = classify_response(&dated, CallContext::Resource, ApiErrorDetail::default(), 60).unwrap();
    assert_eq!(error.retry_after_secs, Some(60));
}

#[test]
fn provider_hint_reclassifies_ambiguous_statuses() {
    let auth_400 = classify(
        400,
        CallContext::Resource,
        ApiErrorDetail {
            message: Some("token expired".to_string()),
            code: Some("AUTHORIZATION_INVALID_TOKEN".to_string()),
            kind_hint: Some(ErrorKind::Auth),
        },
    );
    assert_eq!(auth_400.kind, ErrorKind::Auth);
    assert!(!auth_400.requires_reauthorization);
    assert_eq!(auth_400.provider_code.as_deref(), Some("AUTHORIZATION_INVALID_TOKEN"));

    let not_found_410 = classify(
        410,
        CallContext::Resource,
        ApiErrorDetail {
            kind_hint: Some(ErrorKind::NotFound),
            ..ApiErrorDetail::default()
        },
    );
    assert_eq!(not_found_410.kind, ErrorKind::NotFound);
}

#[test]
fn display_includes_kind_status_and_message() {
    let error = ClassifiedError::server("upstream unavailable").with_status(503);
    assert_eq!(error.to_string(), "server error (status 503): upstream unavailable");

    let wrapped: SynclineError = error.into();
    assert_eq!(wrapped.to_string(), "server error (status 503): upstream unavailable");
}

#[test]
fn classified_errors_round_trip_through_json() {
    let error = ClassifiedError::rate_limited(30).with_status(429);
    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["kind"], "rate_limit");
    assert_eq!(json["retry_after_secs"], 30);

    let back: ClassifiedError = serde_json::from_value(json).unwrap();
    assert_eq!(back, error);
}

#[test]
fn persistence_wrapping_keeps_the_hook_message() {
    let wrapped = SynclineError::Configuration("vault sealed".to_string()).into_persistence();
    assert!(matches!(&wrapped, SynclineError::Persistence(msg) if msg.contains("vault sealed")));
    assert_eq!(wrapped.recovery_suggestion(), RecoverySuggestion::ContactSupport);

    let already = SynclineError::Persistence("disk full".to_string()).into_persistence();
    assert_eq!(already.to_string(), SynclineError::Persistence("disk full".to_string()).to_string());
}
