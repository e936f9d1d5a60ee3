/// `{{ variable }}` substitution for email subjects and bodies
///
/// Placeholders are `{{`, optional whitespace, a name made of letters,
/// digits, `_` and `.`, optional whitespace, `}}`. Known names are replaced
/// by their value. Unknown names render as an empty string and are reported
/// in [`Rendered::missing`] so the preview can warn about them.
///
/// In HTML bodies ([`render_email`]) values are HTML-escaped, so client data
/// such as a name containing `<script>` reaches the recipient as text.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use leadbook_shared::email::template::render;
///
/// let mut vars = BTreeMap::new();
/// vars.insert("first_name".to_string(), "Ada".to_string());
///
/// let out = render("Hi {{ first_name }}, from {{company_name}}", &vars);
/// assert_eq!(out.text, "Hi Ada, from ");
/// assert_eq!(out.missing, vec!["company_name".to_string()]);
/// ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::models::app_settings::AppSettings;
use crate::models::client::Client;

/// Template variables by name
pub type Variables = BTreeMap<String, String>;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}")
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

/// Rendered text plus the placeholders that had no value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub text: String,

    /// Distinct unknown names in order of first appearance
    pub missing: Vec<String>,
}

/// Substitutes every placeholder in `text`
pub fn render(text: &str, vars: &Variables) -> Rendered {
    substitute(text, vars, false)
}

/// Substitutes every placeholder in HTML `text`, escaping the values
pub fn render_html(text: &str, vars: &Variables) -> Rendered {
    substitute(text, vars, true)
}

/// Escapes `&`, `<`, `>`, `"` and `'` for HTML text and attribute values
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn substitute(text: &str, vars: &Variables, html: bool) -> Rendered {
    let mut missing: Vec<String> = Vec::new();

    let rendered = placeholder().replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) if html => escape_html(value),
            Some(value) => value.clone(),
            None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    Rendered {
        text: rendered.into_owned(),
        missing,
    }
}

/// Names of all placeholders in `text`, deduplicated in order
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder().captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Variables available when mailing a client
///
/// Settings provide `company_name` and `from_name`; `overrides` (from the
/// request) win over everything else.
pub fn client_variables(
    client: Option<&Client>,
    settings: Option<&AppSettings>,
    overrides: &Variables,
) -> Variables {
    let mut vars = Variables::new();

    if let Some(settings) = settings {
        vars.insert(
            "company_name".to_string(),
            settings.company_name.clone().unwrap_or_default(),
        );
        vars.insert(
            "from_name".to_string(),
            settings.from_name.clone().unwrap_or_default(),
        );
    }

    if let Some(client) = client {
        let fields = [
            ("first_name", Some(client.first_name.clone())),
            ("last_name", Some(client.last_name.clone())),
            ("full_name", Some(client.full_name())),
            ("email", client.email.clone()),
            ("company", client.company.clone()),
            ("phone", client.phone.clone()),
            ("city", client.city.clone()),
            ("region", client.region.clone()),
            ("country", client.country.clone()),
        ];

        for (name, value) in fields {
            vars.insert(name.to_string(), value.unwrap_or_default());
        }
    }

    for (name, value) in overrides {
        vars.insert(name.clone(), value.clone());
    }

    vars
}

/// Subject and bodies after substitution
#[derive(Debug, Clone, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub missing: Vec<String>,
}

/// Renders subject, HTML body and optional text body with one variable set
///
/// Only the HTML body escapes values; subject and text body are plain text.
pub fn render_email(
    subject: &str,
    body_html: &str,
    body_text: Option<&str>,
    vars: &Variables,
) -> RenderedEmail {
    let subject = render(subject, vars);
    let html = render_html(body_html, vars);
    let text = body_text.map(|t| render(t, vars));

    let mut missing = subject.missing;
    let extra = html
        .missing
        .into_iter()
        .chain(text.as_ref().map(|t| t.missing.clone()).unwrap_or_default());
    for name in extra {
        if !missing.contains(&name) {
            missing.push(name);
        }
    }

    RenderedEmail {
        subject: subject.text,
        body_html: html.text,
        body_text: text.map(|t| t.text),
        missing,
    }
}
