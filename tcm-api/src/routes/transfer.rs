/// Spreadsheet import and export
///
/// # Endpoints
///
/// - `POST /v1/suites/:id/import?format=xlsx|csv` - body is the raw file
/// - `GET /v1/suites/:id/export?format=xlsx|csv`
/// - `GET /v1/modules/:id/export?format=xlsx|csv`
///
/// Without `?format=` the import format comes from `Content-Type`, falling
/// back to XLSX; export defaults to XLSX.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::BytesRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tcm_shared::{
    auth::{
        authorization::{require_module_access, require_permission, require_suite_access, Permission},
        middleware::AuthContext,
    },
    models::{test_case::TestCase, test_module::TestModule, test_suite::TestSuite},
    transfer::{
        import::{import_into_suite, ImportReport},
        writer::export_cases,
        Format,
    },
};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Headers and body of a file download
type Download = ([(header::HeaderName, String); 2], Vec<u8>);

fn requested_format(query: &FormatQuery, headers: &HeaderMap) -> ApiResult<Format> {
    if let Some(format) = query.format.as_deref() {
        return Ok(Format::parse(format)?);
    }

    Ok(headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(Format::from_content_type)
        .unwrap_or_default())
}

/// Turns a display name into a safe download file name
fn file_name(name: &str, format: Format) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');

    let stem = if stem.is_empty() { "test-cases" } else { stem };
    format!("{}.{}", stem, format.extension())
}

fn download(name: &str, format: Format, bytes: Vec<u8>) -> Download {
    (
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name(name, format)),
            ),
        ],
        bytes,
    )
}

/// Imports test cases from a spreadsheet into a suite
///
/// Rejected cases are listed row by row in the report; the rest are created
/// in one transaction.
///
/// # Errors
///
/// - `400 Bad Request`: Empty body, unreadable file or missing columns
/// - `413 Payload Too Large`: Body over `API_MAX_UPLOAD_BYTES`
pub async fn import_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
    Query(query): Query<FormatQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<ImportReport>> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    let scope = require_suite_access(&state.db, &auth, suite_id).await?;

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!(
                "Import files are limited to {} bytes",
                state.config.api.max_upload_bytes
            ))
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("Import file is empty".to_string()));
    }

    let format = requested_format(&query, &headers)?;
    let report = import_into_suite(&state.db, suite_id, scope.module_id, format, &body).await?;

    tracing::info!(
        suite_id = %suite_id,
        user_id = %auth.user_id,
        format = format.extension(),
        imported = report.imported,
        skipped = report.skipped,
        "Suite import finished"
    );

    Ok(Json(report))
}

pub async fn export_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
    Query(query): Query<FormatQuery>,
) -> ApiResult<Download> {
    require_permission(&auth, Permission::ViewReports)?;
    require_suite_access(&state.db, &auth, suite_id).await?;

    let format = query.format.as_deref().map(Format::parse).transpose()?.unwrap_or_default();

    let suite = TestSuite::find_by_id(&state.db, suite_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Suite not found".to_string()))?;
    let cases = TestCase::list_by_suite_with_steps(&state.db, suite.id).await?;

    let bytes = export_cases(format, &cases)?;
    Ok(download(&suite.name, format, bytes))
}

pub async fn export_module(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
    Query(query): Query<FormatQuery>,
) -> ApiResult<Download> {
    require_permission(&auth, Permission::ViewReports)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    let format = query.format.as_deref().map(Format::parse).transpose()?.unwrap_or_default();

    let module = TestModule::find_by_id(&state.db, scope.module_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Module not found".to_string()))?;
    let cases = TestCase::list_by_module_with_steps(&state.db, module.id).await?;

    let bytes = export_cases(format, &cases)?;
    Ok(download(&module.name, format, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_file_name_is_sanitized() {
        assert_eq!(file_name("Checkout Flow", Format::Xlsx), "Checkout_Flow.xlsx");
        assert_eq!(file_name("../etc/\"passwd\"", Format::Csv), "etc__passwd.csv");
        assert_eq!(file_name("   ", Format::Csv), "test-cases.csv");
    }

    #[test]
    fn test_format_from_query_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let query = FormatQuery {
            format: Some("xlsx".to_string()),
        };
        assert_eq!(requested_format(&query, &headers).unwrap(), Format::Xlsx);
        assert_eq!(requested_format(&FormatQuery::default(), &headers).unwrap(), Format::Csv);
        assert_eq!(
            requested_format(&FormatQuery::default(), &HeaderMap::new()).unwrap(),
            Format::Xlsx
        );
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let query = FormatQuery {
            format: Some("pdf".to_string()),
        };
        assert!(requested_format(&query, &HeaderMap::new()).is_err());
    }
}
