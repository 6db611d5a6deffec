use super::handlers::{auth, courses, health, me, profiles};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Handlers sharing a path go in the same `routes!` call.
/// `OPTIONS /health` is wired in `api::new` and stays undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(profiles::lookup))
        .routes(routes!(auth::otp::request_code))
        .routes(routes!(auth::otp::verify_code))
        .routes(routes!(auth::credentials::login))
        .routes(routes!(auth::credentials::set_password))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(me::put_profile))
        .routes(routes!(me::get_progress))
        .routes(routes!(courses::course::list, courses::course::create))
        .routes(routes!(courses::course::update, courses::course::remove))
        .routes(routes!(courses::lesson::list, courses::lesson::create))
        .routes(routes!(
            courses::lesson::detail,
            courses::lesson::update,
            courses::lesson::remove
        ))
        .routes(routes!(courses::entitlements::purchase))
        .routes(routes!(courses::entitlements::subscription));

    router.get_openapi_mut().tags = Some(vec![
        tag("health", "Service health"),
        tag("auth", "One-time codes, passwords and sessions"),
        tag("profiles", "Profile existence lookup"),
        tag("me", "Caller profile and progress"),
        tag("courses", "Course catalog"),
        tag("lessons", "Lessons and gated access"),
        tag("admin", "Purchases and subscriptions"),
    ]);

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, rest)) => (
            optional_str(name),
            optional_str(rest.trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Coursegate"));
            assert_eq!(contact.email.as_deref(), Some("team@coursegate.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/profiles/lookup",
            "/v1/auth/otp",
            "/v1/auth/otp/verify",
            "/v1/auth/login",
            "/v1/auth/password",
            "/v1/auth/session",
            "/v1/auth/logout",
            "/v1/me/profile",
            "/v1/me/progress",
            "/v1/courses",
            "/v1/courses/{id}",
            "/v1/courses/{id}/lessons",
            "/v1/lessons/{id}",
            "/v1/admin/purchases",
            "/v1/admin/users/{id}/subscription",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn openapi_tags() {
        let tags = openapi().tags.unwrap_or_default();
        for name in ["auth", "courses", "lessons", "admin"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Ada Lovelace <ada@example.com>"),
            (Some("Ada Lovelace"), Some("ada@example.com"))
        );
        assert_eq!(parse_author("Ada"), (Some("Ada"), None));
        assert_eq!(parse_author("<ada@example.com>"), (None, Some("ada@example.com")));
    }
}
