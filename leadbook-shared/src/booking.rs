/// Booking confirmation PDFs
///
/// A booking form is checked with [`BookingRequest::validate`] and rendered
/// to A4 by [`render_pdf`], headed with the owner's company name. Notes that
/// run past the bottom margin continue on further pages. Only the built-in
/// Helvetica faces are used so the output needs no font files.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use serde::{Deserialize, Serialize};

/// Shortest bookable slot in minutes
pub const MIN_DURATION_MINUTES: u32 = 15;

/// Longest bookable slot in minutes
pub const MAX_DURATION_MINUTES: u32 = 480;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const WRAP_COLUMNS: usize = 90;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid booking: {0}")]
    Invalid(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),
}

/// Booking form as submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub client_name: String,
    pub client_email: Option<String>,
    pub service: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Checks required fields and the duration range
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.client_name.trim().is_empty() {
            return Err(BookingError::Invalid("client_name is required".to_string()));
        }
        if self.service.trim().is_empty() {
            return Err(BookingError::Invalid("service is required".to_string()));
        }
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(BookingError::Invalid(format!(
                "duration_minutes must be between {} and {}",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }
        if let Some(email) = self.client_email.as_deref().map(str::trim) {
            if !email.is_empty() && !email.contains('@') {
                return Err(BookingError::Invalid("client_email is not an email address".to_string()));
            }
        }
        Ok(())
    }

    /// Wall-clock end time (may wrap past midnight)
    pub fn end_time(&self) -> NaiveTime {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// End as a date and time, so a slot crossing midnight lands on the next day
    pub fn end(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time) + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// `HH:MM - HH:MM (N min)`, with the end date spelled out when it differs
    fn time_range(&self) -> String {
        let end = self.end();
        let end_label = if end.date() == self.date {
            end.format("%H:%M").to_string()
        } else {
            end.format("%a %d %b %Y %H:%M").to_string()
        };

        format!(
            "{} - {} ({} min)",
            self.start_time.format("%H:%M"),
            end_label,
            self.duration_minutes
        )
    }

    /// Suggested download file name
    pub fn file_name(&self) -> String {
        let slug: String = self
            .client_name
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if slug.is_empty() {
            format!("booking-{}.pdf", self.date.format("%Y-%m-%d"))
        } else {
            format!("booking-{}-{}.pdf", self.date.format("%Y-%m-%d"), slug)
        }
    }

    /// Label/value rows printed on the page
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Client", self.client_name.trim().to_string()),
            ("Service", self.service.trim().to_string()),
            ("Date", self.date.format("%A, %d %B %Y").to_string()),
            ("Time", self.time_range()),
        ];

        if let Some(email) = self.client_email.as_deref().filter(|e| !e.trim().is_empty()) {
            rows.push(("Email", email.trim().to_string()));
        }
        if let Some(location) = self.location.as_deref().filter(|l| !l.trim().is_empty()) {
            rows.push(("Location", location.trim().to_string()));
        }

        rows
    }
}

/// Greedy word wrap at `columns` characters
pub fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > columns {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }

    lines
}

const LAYER_NAME: &str = "Layer 1";

/// Text position on the current page; adds pages as lines run out
struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl Cursor<'_> {
    fn line(&mut self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn advance(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Starts a new page when fewer than `mm` remain above the bottom margin
    fn ensure_room(&mut self, mm: f32) {
        if self.y - mm >= MARGIN_MM {
            return;
        }

        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT_MM - MARGIN_MM;
        self.pages += 1;
    }
}

/// Renders a booking as PDF bytes
pub fn render_pdf(booking: &BookingRequest, company_name: &str) -> Result<Vec<u8>, BookingError> {
    render_document(booking, company_name).map(|(bytes, _)| bytes)
}

/// PDF bytes and the number of pages written
fn render_document(
    booking: &BookingRequest,
    company_name: &str,
) -> Result<(Vec<u8>, usize), BookingError> {
    booking.validate()?;

    let company = match company_name.trim() {
        "" => "Leadbook",
        name => name,
    };

    let (doc, page, layer) = PdfDocument::new(
        format!("Booking - {}", booking.client_name.trim()),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        LAYER_NAME,
    );

    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| BookingError::Render(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| BookingError::Render(e.to_string()))?;

    let mut cursor = Cursor {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT_MM - MARGIN_MM - 5.0,
        pages: 1,
    };

    cursor.line(company, 20.0, MARGIN_MM, &bold);
    cursor.advance(10.0);
    cursor.line("Booking confirmation", 14.0, MARGIN_MM, &regular);
    cursor.advance(14.0);

    for (label, value) in booking.rows() {
        cursor.ensure_room(0.0);
        cursor.line(label, 11.0, MARGIN_MM, &bold);
        cursor.line(&value, 11.0, MARGIN_MM + 30.0, &regular);
        cursor.advance(7.0);
    }

    if let Some(notes) = booking.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        cursor.advance(5.0);
        cursor.ensure_room(7.0);
        cursor.line("Notes", 11.0, MARGIN_MM, &bold);
        cursor.advance(7.0);
        for line in wrap_text(notes, WRAP_COLUMNS) {
            cursor.ensure_room(0.0);
            cursor.line(&line, 10.0, MARGIN_MM, &regular);
            cursor.advance(5.5);
        }
    }

    let pages = cursor.pages;
    drop(cursor);

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| BookingError::Render(e.to_string()))?;

    Ok((bytes, pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> BookingRequest {
        BookingRequest {
            client_name: "Ada Lovelace".to_string(),
            client_email: Some("ada@example.com".to_string()),
            service: "Consultation".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            duration_minutes: 90,
            location: Some("Studio 2".to_string()),
            notes: Some("Bring the engine schematics.".to_string()),
        }
    }

    #[test]
    fn test_duration_bounds() {
        let mut b = booking();
        b.duration_minutes = 14;
        assert!(b.validate().is_err());
        b.duration_minutes = 15;
        assert!(b.validate().is_ok());
        b.duration_minutes = 480;
        assert!(b.validate().is_ok());
        b.duration_minutes = 481;
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_required_fields() {
        let mut b = booking();
        b.client_name = "  ".to_string();
        assert!(b.validate().is_err());

        let mut b = booking();
        b.service.clear();
        assert!(b.validate().is_err());

        let mut b = booking();
        b.client_email = Some("nope".to_string());
        assert!(b.validate().is_err());
    }

    #[test]
    fn test_end_time_and_rows() {
        let b = booking();
        assert_eq!(b.end_time(), NaiveTime::from_hms_opt(11, 0, 0).unwrap());

        let rows = b.rows();
        assert_eq!(rows[3], ("Time", "09:30 - 11:00 (90 min)".to_string()));
        assert!(rows.iter().any(|(label, _)| *label == "Location"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(booking().file_name(), "booking-2025-03-14-ada-lovelace.pdf");

        let mut b = booking();
        b.client_name = "***".to_string();
        assert_eq!(b.file_name(), "booking-2025-03-14.pdf");
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
    }

    #[test]
    fn test_render_pdf_produces_pdf() {
        let bytes = render_pdf(&booking(), "Analytical Engines Ltd").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn test_render_pdf_rejects_invalid() {
        let mut b = booking();
        b.duration_minutes = 5;
        assert!(matches!(render_pdf(&b, "Acme"), Err(BookingError::Invalid(_))));
    }

    #[test]
    fn test_long_notes_continue_on_new_pages() {
        let mut b = booking();
        b.notes = Some(
            (1..=120)
                .map(|n| format!("Line {} of the lesson plan.", n))
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let (bytes, pages) = render_document(&b, "Acme").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        // 32 note lines fit under the header, 47 on each continuation page
        assert_eq!(pages, 3);

        let (_, pages) = render_document(&booking(), "Acme").unwrap();
        assert_eq!(pages, 1);
    }

    #[test]
    fn test_end_past_midnight_shows_date() {
        let mut b = booking();
        b.start_time = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        b.duration_minutes = 90;

        assert_eq!(
            b.end(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap().and_hms_opt(1, 0, 0).unwrap()
        );
        assert_eq!(b.rows()[3].1, "23:30 - Sat 15 Mar 2025 01:00 (90 min)");
    }
}
