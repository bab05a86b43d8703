pub mod books;
pub mod categories;

use reqwest::Url;
use scraper::ElementRef;

use crate::error::ParseError;

pub use books::{extract_books, extract_next_page};
pub use categories::extract_categories;

/// Resolve a relative `href`/`src` the way a browser would.
fn resolve(base: &Url, href: &str) -> Result<Url, ParseError> {
    base.join(href.trim()).map_err(|e| ParseError::InvalidUrl {
        href: href.to_string(),
        reason: e.to_string(),
    })
}

fn required_attr<'a>(
    el: ElementRef<'a>,
    element: &'static str,
    attr: &'static str,
) -> Result<&'a str, ParseError> {
    el.value()
        .attr(attr)
        .ok_or(ParseError::MissingAttribute { element, attr })
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
pub(crate) fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
}
