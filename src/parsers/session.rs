use crate::parsers::document::{Document, Pattern, query_param};
use std::sync::LazyLock;

static PASSWORD_INPUT: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::parse(r#"input[type="password"], input[name="fdsa"]"#)
        .expect("invalid pattern: password input")
});

static LOGIN_STATUS: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::parse("div.divloginstatus").expect("invalid pattern: login status")
});

static LINKS: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::parse("a[href]").expect("invalid pattern: links"));

/// Text of the navigation link that carries the `asi` parameter.
const SCORECARD_MENU_LINK: &str = "Notenspiegel / Studienverlauf";

/// Messages the portal prints when a sign-in attempt is refused.
const LOGIN_FAILED_MARKERS: [&str; 3] = [
    "Anmeldung fehlgeschlagen",
    "Login fehlgeschlagen",
    "Benutzername oder Passwort falsch",
];

/// Whether the page is the portal's login form, i.e. no session is active.
pub fn is_login_page(html: &str) -> bool {
    Document::parse(html).exists(&PASSWORD_INPUT)
}

/// Whether the response to a login submission means the credentials were refused.
pub fn is_login_rejected(html: &str) -> bool {
    let document = Document::parse(html);
    if document.exists(&PASSWORD_INPUT) {
        return true;
    }
    let text = document.text();
    LOGIN_FAILED_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

/// Extracts the `asi` navigation parameter from the study menu page.
pub fn parse_asi_parameter(html: &str) -> Option<String> {
    let document = Document::parse(html);
    document
        .find_all(&LINKS)
        .into_iter()
        .filter(|link| link.text() == SCORECARD_MENU_LINK)
        .find_map(|link| link.attr("href").and_then(|href| query_param(href, "asi")))
        .filter(|asi| !asi.is_empty())
}

/// Extracts the user's display name from the login status box.
///
/// The name is the last bare text node of the box; everything else in there is
/// wrapped in child elements. Returns an empty string when the box is missing.
pub fn parse_user_display_name(html: &str) -> String {
    let document = Document::parse(html);
    document
        .find_first(&LOGIN_STATUS)
        .and_then(|status| status.own_text().pop())
        .unwrap_or_default()
}
