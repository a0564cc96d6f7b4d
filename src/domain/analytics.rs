/// Web analytics rows and the filtering applied before they are published
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Path fragments of listing pages that never count as posts
const NON_POST_FRAGMENTS: [&str; 3] = ["/tag", "/page", "/author"];

/// Reporting period accepted by the analytics provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "12mo")]
    TwelveMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[default]
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "day")]
    Day,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::TwelveMonths => "12mo",
            TimePeriod::SixMonths => "6mo",
            TimePeriod::Month => "month",
            TimePeriod::ThirtyDays => "30d",
            TimePeriod::SevenDays => "7d",
            TimePeriod::Day => "day",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "12mo" => Ok(TimePeriod::TwelveMonths),
            "6mo" => Ok(TimePeriod::SixMonths),
            "month" => Ok(TimePeriod::Month),
            "30d" => Ok(TimePeriod::ThirtyDays),
            "7d" => Ok(TimePeriod::SevenDays),
            "day" => Ok(TimePeriod::Day),
            other => Err(format!(
                "unknown period `{other}` (expected 12mo, 6mo, month, 30d, 7d or day)"
            )),
        }
    }
}

/// One row of the page breakdown, optionally enriched with post metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageVisit {
    /// Visited path, e.g. `/my-post/`
    pub page: String,
    #[serde(default)]
    pub visitors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PageVisit {
    /// Slug of the post the page belongs to (last non-empty path segment)
    pub fn slug_from_page(&self) -> &str {
        self.page
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Attach post metadata
    ///
    /// `post_url` may be absolute or relative to `site_url`.
    pub fn enrich(mut self, title: &str, site_url: &str, post_url: &str) -> Self {
        self.slug = Some(self.slug_from_page().to_string());
        self.title = Some(title.to_string());
        self.url = Some(if post_url.starts_with("http://") || post_url.starts_with("https://") {
            post_url.to_string()
        } else {
            format!(
                "{}/{}",
                site_url.trim_end_matches('/'),
                post_url.trim_start_matches('/')
            )
        });
        self
    }
}

/// Drop listing pages and static CMS pages from the breakdown
///
/// `page_slugs` are the slugs of the CMS's static pages.
pub fn filter_post_visits(visits: Vec<PageVisit>, page_slugs: &[String]) -> Vec<PageVisit> {
    let static_pages: Vec<String> = page_slugs.iter().map(|s| format!("/{s}/")).collect();
    visits
        .into_iter()
        .filter(|v| !NON_POST_FRAGMENTS.iter().any(|f| v.page.contains(f)))
        .filter(|v| !static_pages.contains(&v.page))
        .collect()
}
