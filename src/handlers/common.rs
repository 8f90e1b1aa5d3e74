use crate::{entities::WorkOrderStatus, errors::ServiceError, ApiResponse};
use axum::Json;
use serde::Serialize;

/// Standard success envelope
pub fn success_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// Trims a query value; blank values count as absent.
pub fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `all` (or nothing) means no status filter.
pub fn parse_status_filter(value: &Option<String>) -> Result<Option<WorkOrderStatus>, ServiceError> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) if raw.eq_ignore_ascii_case("all") => Ok(None),
        Some(raw) => raw
            .parse::<WorkOrderStatus>()
            .map(Some)
            .map_err(|_| ServiceError::BadRequest(format!("Unknown status '{}'", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_filter_accepts_all_and_blank() {
        assert_eq!(parse_status_filter(&None).unwrap(), None);
        assert_eq!(parse_status_filter(&Some("  ".into())).unwrap(), None);
        assert_eq!(parse_status_filter(&Some("ALL".into())).unwrap(), None);
        assert_eq!(
            parse_status_filter(&Some("flagged_followup".into())).unwrap(),
            Some(WorkOrderStatus::FlaggedFollowup)
        );
        assert_matches!(
            parse_status_filter(&Some("done".into())),
            Err(ServiceError::BadRequest(_))
        );
    }
}
