//! License banner prepended to every bundle.

use chrono::{Local, NaiveDate};

/// Renders `/*! <name>.js v<version> <Month DD, YYYY> */`.
pub fn render_banner(name: &str, version: &str, date: NaiveDate) -> String {
    format!(
        "/*! {name}.js v{version} {} */",
        date.format("%B %d, %Y")
    )
}

/// The local calendar date, used when no build date is pinned.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
