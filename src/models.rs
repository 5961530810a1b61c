use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// Raw provider answer for one (movie, language) request. Mapped into a
/// [`MovieView`] or an import record, never persisted as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalMovie {
    pub external_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Date,
    pub trailer_url: Option<String>,
}

impl ExternalMovie {
    /// Project the provider payload into the response view for `lang`.
    pub fn into_view(self, lang: &str) -> MovieView {
        MovieView {
            id: self.external_id,
            year: i32::from(self.release_date.year()),
            poster_path: self.poster_path.unwrap_or_default(),
            backdrop_path: self.backdrop_path,
            trailer_url: self.trailer_url,
            localization: LocalizationView {
                language_code: lang.to_string(),
                title: self.title,
                overview: self.overview,
            },
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationView {
    pub language_code: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieView {
    pub id: i64,
    pub year: i32,
    pub poster_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer_url: Option<String>,
    pub localization: LocalizationView,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Subscription,
    Rent,
    Buy,
    Free,
}

impl SourceKind {
    pub fn from_watchmode_code(code: &str) -> Option<Self> {
        match code {
            "sub" => Some(SourceKind::Subscription),
            "rent" => Some(SourceKind::Rent),
            "buy" => Some(SourceKind::Buy),
            "free" => Some(SourceKind::Free),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSource {
    pub provider_name: String,
    pub kind: SourceKind,
    pub url: String,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesResponse {
    pub sources: Vec<MovieSource>,
}
