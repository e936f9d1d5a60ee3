/// Email rendering, composition and transport
///
/// - [`template`]: `{{ variable }}` substitution and client variable sets
/// - [`transport`]: the [`transport::Mailer`] trait with SMTP and HTTP API implementations
/// - [`compose`]: splitting newsletters into BCC chunks and assembling outbound messages

pub mod compose;
pub mod template;
pub mod transport;
