/// Booking confirmation PDF
///
/// # Endpoint
///
/// ```text
/// POST /v1/bookings/pdf
/// ```
///
/// Answers `application/pdf` as an attachment named after the client and date.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use leadbook_shared::{
    auth::authorization::AuthContext,
    booking::{render_pdf, BookingRequest},
    models::app_settings::AppSettings,
};

/// Heading used when the owner has not set a company name
pub const DEFAULT_COMPANY_NAME: &str = "Leadbook";

fn content_disposition(file_name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"booking.pdf\""))
}

/// Render a booking confirmation as a PDF download
///
/// The page is headed with the owner's company name from settings.
///
/// # Response
///
/// `application/pdf` with `Content-Disposition: attachment`.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Missing client name or service, bad email,
///   or a duration outside 15-480 minutes
pub async fn booking_pdf(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(booking): Json<BookingRequest>,
) -> ApiResult<Response> {
    booking.validate()?;

    let settings = AppSettings::get_or_default(&state.db, auth.user_id).await?;
    let company_name = settings
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_COMPANY_NAME);

    let pdf = render_pdf(&booking, company_name)?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, content_disposition(&booking.file_name())),
        ],
        pdf,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        let value = content_disposition("booking-ada-2026-03-14.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"booking-ada-2026-03-14.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_falls_back_on_invalid_bytes() {
        let value = content_disposition("bad\nname.pdf");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"booking.pdf\"");
    }
}
