/// Database models for Leadbook
///
/// Each model owns its SQL. Tenant-owned tables (`clients`,
/// `email_templates`, `email_sends`, `app_settings`) take the owner's user ID
/// on every query.
///
/// # Models
///
/// - `user`: User accounts
/// - `session`: Bearer sessions with refresh tokens
/// - `password_reset`: Single-use password reset tokens
/// - `audit_log`: Append-only account event log
/// - `license`: License history and the access gate
/// - `client`: Contacts, tags and coordinates
/// - `geocode_cache`: Cached geocoding results
/// - `email_template`: Reusable email templates
/// - `email_send`: Send history and delivery queue
/// - `app_settings`: Branding, SMTP and lead key settings
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::db::pool::{create_pool, DatabaseConfig};
/// use leadbook_shared::models::client::{Client, ClientFilter};
/// use uuid::Uuid;
///
/// # async fn example(owner_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let clients = Client::list(&pool, owner_id, &ClientFilter::default()).await?;
/// println!("{} clients", clients.len());
/// # Ok(())
/// # }
/// ```

pub mod app_settings;
pub mod audit_log;
pub mod client;
pub mod email_send;
pub mod email_template;
pub mod geocode_cache;
pub mod license;
pub mod password_reset;
pub mod session;
pub mod user;
