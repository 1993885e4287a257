use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "deserialize_availability")]
    pub availability: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_rating")]
    pub rating: u8,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub category: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Listing,
    Detail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: String,
    pub kind: PageKind,
    pub status: Option<u16>,
    pub retrieved_at: String,
}

pub const MAX_RATING: u8 = 5;

/// Ratings outside `0..=5`, missing, or of an unusable shape collapse to 0.
/// Whole floats (`3.0`), digit strings and rating words are accepted.
fn deserialize_rating<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Integer(i64),
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    let value = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Integer(n)) => Some(n),
        Some(Raw::Float(f)) if f.fract() == 0.0 => Some(f as i64),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| Some(i64::from(crate::extract::rating_from_word(text))))
        }
        Some(Raw::Float(_) | Raw::Other(_)) | None => None,
    };
    Ok(value
        .and_then(|v| u8::try_from(v).ok())
        .filter(|v| *v <= MAX_RATING)
        .unwrap_or(0))
}

/// Non-string values blank the field instead of failing the whole record.
fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => Some(text),
        Some(Raw::Other(_)) | None => None,
    })
}

// Older datasets stored availability as the raw digit string.
fn deserialize_availability<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
        Other(IgnoredAny),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Raw::Number(n)) => u32::try_from(n).ok(),
        Some(Raw::Text(text)) => crate::extract::parse_availability(&text),
        Some(Raw::Other(_)) | None => None,
    })
}
