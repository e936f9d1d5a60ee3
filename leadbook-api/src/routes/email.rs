/// Email templates, preview and sends
///
/// Sends are queued in `email_sends` and delivered by the worker through the
/// owner's configured transport, so the send endpoints answer `202 Accepted`.
///
/// # Endpoints
///
/// - `GET /v1/email/templates` - List templates
/// - `POST /v1/email/templates` - Create template
/// - `GET /v1/email/templates/:id` - Fetch template
/// - `PUT /v1/email/templates/:id` - Update template
/// - `DELETE /v1/email/templates/:id` - Delete template
/// - `POST /v1/email/preview` - Render without sending
/// - `POST /v1/email/send` - Queue one message
/// - `POST /v1/email/newsletter` - Queue a BCC newsletter
/// - `GET /v1/email/sends?status=&limit=&offset=` - Send history
///
/// Message content is either a stored template (`template_id`) or an inline
/// `subject` + `body_html` (+ optional `body_text`). `variables` override the
/// values derived from the client and the owner's settings.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, Pagination},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use leadbook_shared::{
    auth::authorization::AuthContext,
    email::{
        compose::{chunk_recipients, dedupe_addresses, Sender, BCC_CHUNK_SIZE},
        template::{client_variables, render_email, RenderedEmail, Variables},
    },
    models::{
        app_settings::AppSettings,
        client::{Client, ClientStatus},
        email_send::{EmailSend, NewEmailSend, SendKind, SendStatus},
        email_template::{CreateEmailTemplate, EmailTemplate, UpdateEmailTemplate},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

/// New email template
///
/// Subject and bodies may contain `{{ variable }}` placeholders.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    /// Unique per owner
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 255, message = "Subject must be 1-255 characters"))]
    pub subject: String,

    #[validate(length(min = 1, message = "Body is required"))]
    pub body_html: String,

    /// Plain-text alternative
    pub body_text: Option<String>,
}

/// Partial template update; `body_text: null` removes the text part
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Subject must be 1-255 characters"))]
    pub subject: Option<String>,

    #[validate(length(min = 1, message = "Body is required"))]
    pub body_html: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub body_text: Option<Option<String>>,
}

/// Template reference or inline content, plus variable overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageContent {
    /// Saved template; inline fields override its parts
    pub template_id: Option<Uuid>,

    pub subject: Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,

    /// Values that win over client and settings variables
    #[serde(default)]
    pub variables: Variables,
}

/// Unrendered content after resolving a template reference
#[derive(Debug, Clone)]
struct ResolvedContent {
    template_id: Option<Uuid>,
    subject: String,
    body_html: String,
    body_text: Option<String>,
}

impl ResolvedContent {
    fn render(&self, vars: &Variables) -> RenderedEmail {
        render_email(&self.subject, &self.body_html, self.body_text.as_deref(), vars)
    }
}

/// Render without sending
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(flatten)]
    pub content: MessageContent,

    /// Client whose fields fill the variables
    pub client_id: Option<Uuid>,
}

/// Single message to one recipient
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(flatten)]
    pub content: MessageContent,

    /// Recipient client; its email is used unless `to` is given
    pub client_id: Option<Uuid>,

    /// Explicit recipient address
    pub to: Option<String>,
}

/// Bulk message to the caller's clients
///
/// Filters combine; with none every client with an email is included.
#[derive(Debug, Deserialize)]
pub struct NewsletterRequest {
    #[serde(flatten)]
    pub content: MessageContent,

    pub status: Option<ClientStatus>,

    /// Case-insensitive tag match
    pub tag: Option<String>,

    /// Restrict to these clients
    pub client_ids: Option<Vec<Uuid>>,
}

/// Queued single send
#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// Row the delivery worker will pick up
    pub send: EmailSend,

    /// Placeholders that had no value and rendered empty
    pub missing: Vec<String>,
}

/// Queued newsletter
#[derive(Debug, Serialize)]
pub struct NewsletterResponse {
    pub send_ids: Vec<Uuid>,

    /// Distinct recipient addresses
    pub recipients: usize,

    /// Queued messages (BCC groups)
    pub chunks: usize,

    /// Placeholders left empty (rendered without a client)
    pub missing: Vec<String>,
}

/// Send history filters
#[derive(Debug, Deserialize)]
pub struct SendsQuery {
    pub status: Option<SendStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Page of sends, newest first
#[derive(Debug, Serialize)]
pub struct SendListResponse {
    pub sends: Vec<EmailSend>,
    pub limit: i64,
    pub offset: i64,
}

fn template_not_found() -> ApiError {
    ApiError::NotFound("Template not found".to_string())
}

fn client_not_found() -> ApiError {
    ApiError::NotFound("Client not found".to_string())
}

async fn resolve_content(
    state: &AppState,
    owner_id: Uuid,
    content: &MessageContent,
) -> ApiResult<ResolvedContent> {
    if let Some(template_id) = content.template_id {
        let template = EmailTemplate::find(&state.db, owner_id, template_id)
            .await?
            .ok_or_else(template_not_found)?;

        return Ok(ResolvedContent {
            template_id: Some(template.id),
            subject: template.subject,
            body_html: template.body_html,
            body_text: template.body_text,
        });
    }

    let subject = content
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::invalid("subject", "Subject or template_id is required"))?;

    let body_html = content
        .body_html
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| ApiError::invalid("body_html", "Body or template_id is required"))?;

    Ok(ResolvedContent {
        template_id: None,
        subject: subject.to_string(),
        body_html: body_html.to_string(),
        body_text: content.body_text.clone().filter(|t| !t.trim().is_empty()),
    })
}

/// Settings and sender for an owner about to queue mail
///
/// # Errors
///
/// `400 Bad Request` when no SMTP host or from address is configured.
pub(crate) async fn sending_identity(
    state: &AppState,
    owner_id: Uuid,
) -> ApiResult<(AppSettings, Sender)> {
    let settings = AppSettings::get_or_default(&state.db, owner_id).await?;

    if !settings.has_transport() {
        return Err(ApiError::BadRequest(
            "Email transport is not configured".to_string(),
        ));
    }

    let sender = Sender::from_settings(&settings)
        .ok_or_else(|| ApiError::BadRequest("Sender email is not configured".to_string()))?;

    Ok((settings, sender))
}

fn recipient_address(to: Option<&str>, client: Option<&Client>) -> ApiResult<String> {
    let address = to
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .or_else(|| client.and_then(|c| c.email.clone()))
        .ok_or_else(|| ApiError::invalid("to", "A recipient address or a client with an email is required"))?;

    if !address.validate_email() {
        return Err(ApiError::invalid("to", "Invalid email format"));
    }

    Ok(address)
}

/// List the caller's templates by name
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<EmailTemplate>>> {
    let templates = EmailTemplate::list(&state.db, auth.user_id).await?;
    Ok(Json(templates))
}

/// Create a template
///
/// # Errors
///
/// - `409 Conflict`: Name already used by this owner
pub async fn create_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTemplateRequest>,
) -> ApiResult<(StatusCode, Json<EmailTemplate>)> {
    req.validate()?;

    let template = EmailTemplate::create(
        &state.db,
        CreateEmailTemplate {
            owner_id: auth.user_id,
            name: req.name,
            subject: req.subject,
            body_html: req.body_html,
            body_text: req.body_text.filter(|t| !t.trim().is_empty()),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(template)))
}

/// Fetch one template
///
/// # Errors
///
/// - `404 Not Found`: Unknown id or another owner's template
pub async fn get_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EmailTemplate>> {
    let template = EmailTemplate::find(&state.db, auth.user_id, id)
        .await?
        .ok_or_else(template_not_found)?;

    Ok(Json(template))
}

/// Partially update a template
///
/// # Errors
///
/// - `404 Not Found`: Unknown template
/// - `409 Conflict`: New name already used by this owner
pub async fn update_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplateRequest>,
) -> ApiResult<Json<EmailTemplate>> {
    req.validate()?;

    let template = EmailTemplate::update(
        &state.db,
        auth.user_id,
        id,
        UpdateEmailTemplate {
            name: req.name,
            subject: req.subject,
            body_html: req.body_html,
            body_text: req
                .body_text
                .map(|t| t.filter(|t| !t.trim().is_empty())),
        },
    )
    .await?
    .ok_or_else(template_not_found)?;

    Ok(Json(template))
}

/// Delete a template; sends made from it keep their rendered copy
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !EmailTemplate::delete(&state.db, auth.user_id, id).await? {
        return Err(template_not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Render a message without queueing it
pub async fn preview_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Json<RenderedEmail>> {
    let content = resolve_content(&state, auth.user_id, &req.content).await?;

    let client = match req.client_id {
        Some(id) => Some(
            Client::find(&state.db, auth.user_id, id)
                .await?
                .ok_or_else(client_not_found)?,
        ),
        None => None,
    };

    let settings = AppSettings::get_or_default(&state.db, auth.user_id).await?;
    let vars = client_variables(client.as_ref(), Some(&settings), &req.content.variables);

    Ok(Json(content.render(&vars)))
}

/// Queue one message
///
/// # Errors
///
/// - `400 Bad Request`: Transport or sender not configured
/// - `404 Not Found`: Unknown template or client
/// - `422 Unprocessable Entity`: No content or no valid recipient
pub async fn send_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SendRequest>,
) -> ApiResult<(StatusCode, Json<SendResponse>)> {
    let (settings, _sender) = sending_identity(&state, auth.user_id).await?;
    let content = resolve_content(&state, auth.user_id, &req.content).await?;

    let client = match req.client_id {
        Some(id) => Some(
            Client::find(&state.db, auth.user_id, id)
                .await?
                .ok_or_else(client_not_found)?,
        ),
        None => None,
    };

    let to = recipient_address(req.to.as_deref(), client.as_ref())?;

    let vars = client_variables(client.as_ref(), Some(&settings), &req.content.variables);
    let rendered = content.render(&vars);

    let send = EmailSend::enqueue(
        &state.db,
        NewEmailSend {
            owner_id: Some(auth.user_id),
            template_id: content.template_id,
            client_id: client.as_ref().map(|c| c.id),
            kind: SendKind::Single,
            to_addresses: vec![to],
            bcc_addresses: Vec::new(),
            subject: rendered.subject,
            body_html: rendered.body_html,
            body_text: rendered.body_text,
        },
    )
    .await?;

    tracing::info!(send_id = %send.id, owner_id = %auth.user_id, "Email queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            send,
            missing: rendered.missing,
        }),
    ))
}

/// Queue a newsletter to the owner's clients
///
/// Recipients are the matching clients with an email, deduplicated
/// case-insensitively and split into BCC groups of at most
/// [`BCC_CHUNK_SIZE`]. Each group is one message addressed To the sender.
/// Client-specific variables are not available; settings and request
/// variables are.
///
/// # Errors
///
/// - `400 Bad Request`: Transport or sender not configured
/// - `422 Unprocessable Entity`: No content or no matching recipients
pub async fn send_newsletter(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<NewsletterRequest>,
) -> ApiResult<(StatusCode, Json<NewsletterResponse>)> {
    let (settings, sender) = sending_identity(&state, auth.user_id).await?;
    let content = resolve_content(&state, auth.user_id, &req.content).await?;

    let rows = Client::list_recipients(
        &state.db,
        auth.user_id,
        req.status,
        req.tag.as_deref(),
        req.client_ids.as_deref(),
    )
    .await?;

    let recipients = dedupe_addresses(rows.iter().map(|r| r.email.as_str()));
    if recipients.is_empty() {
        return Err(ApiError::invalid(
            "recipients",
            "No clients with an email match the selection",
        ));
    }

    let vars = client_variables(None, Some(&settings), &req.content.variables);
    let rendered = content.render(&vars);

    let batch: Vec<NewEmailSend> = chunk_recipients(&recipients, BCC_CHUNK_SIZE)
        .into_iter()
        .map(|bcc| NewEmailSend {
            owner_id: Some(auth.user_id),
            template_id: content.template_id,
            client_id: None,
            kind: SendKind::Newsletter,
            to_addresses: vec![sender.email.clone()],
            bcc_addresses: bcc,
            subject: rendered.subject.clone(),
            body_html: rendered.body_html.clone(),
            body_text: rendered.body_text.clone(),
        })
        .collect();

    let sends = EmailSend::enqueue_batch(&state.db, batch).await?;

    tracing::info!(
        owner_id = %auth.user_id,
        recipients = recipients.len(),
        chunks = sends.len(),
        "Newsletter queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(NewsletterResponse {
            send_ids: sends.iter().map(|s| s.id).collect(),
            recipients: recipients.len(),
            chunks: sends.len(),
            missing: rendered.missing,
        }),
    ))
}

/// Send history, newest first, optionally filtered by status
pub async fn list_sends(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SendsQuery>,
) -> ApiResult<Json<SendListResponse>> {
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let limit = page.limit_or(50, 200);
    let offset = page.offset();

    let sends = EmailSend::list_by_owner(&state.db, auth.user_id, query.status, limit, offset).await?;

    Ok(Json(SendListResponse {
        sends,
        limit,
        offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_flattens_content() {
        let req: SendRequest = serde_json::from_str(
            r#"{
                "subject": "Hi {{first_name}}",
                "body_html": "<p>Hello</p>",
                "variables": {"promo": "SPRING"},
                "to": "ada@example.com"
            }"#,
        )
        .unwrap();

        assert_eq!(req.content.subject.as_deref(), Some("Hi {{first_name}}"));
        assert_eq!(req.content.variables.get("promo").map(String::as_str), Some("SPRING"));
        assert_eq!(req.to.as_deref(), Some("ada@example.com"));
        assert!(req.client_id.is_none());
    }

    #[test]
    fn test_recipient_prefers_explicit_address() {
        let to = recipient_address(Some(" bob@example.com "), None).unwrap();
        assert_eq!(to, "bob@example.com");
    }

    #[test]
    fn test_recipient_required() {
        let err = recipient_address(None, None).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = recipient_address(Some("nope"), None).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[test]
    fn test_resolved_content_reports_missing() {
        let content = ResolvedContent {
            template_id: None,
            subject: "Hello {{ first_name }}".to_string(),
            body_html: "<p>{{ promo }}</p>".to_string(),
            body_text: None,
        };

        let mut vars = Variables::new();
        vars.insert("first_name".to_string(), "Ada".to_string());

        let rendered = content.render(&vars);
        assert_eq!(rendered.subject, "Hello Ada");
        assert_eq!(rendered.body_html, "<p></p>");
        assert_eq!(rendered.missing, vec!["promo".to_string()]);
    }
}
