use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("text content cannot be empty")]
    EmptyText,

    #[error("cloze answer cannot be empty")]
    EmptyClozeAnswer,

    #[error("invalid media URL: {0}")]
    InvalidMediaUrl(String),

    #[error("unsupported media scheme: {0}")]
    UnsupportedScheme(String),
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

/// One side of a card.
///
/// The catalog serves several shapes of content; each is its own variant so
/// callers match on what they render instead of probing optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        url: Url,
        alt: Option<String>,
    },
    Audio {
        url: Url,
        transcript: Option<String>,
    },
    /// Sentence with a blanked-out segment the learner has to fill in.
    Cloze {
        text: String,
        answer: String,
    },
}

impl Content {
    /// Plain text content.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::EmptyText` if the text is blank.
    pub fn text(text: impl Into<String>) -> Result<Self, ContentError> {
        Ok(Self::Text {
            text: non_blank(text.into())?,
        })
    }

    /// Image content referenced by URL.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the URL does not parse or is not http(s)/file.
    pub fn image(url: &str, alt: Option<String>) -> Result<Self, ContentError> {
        Ok(Self::Image {
            url: parse_media_url(url)?,
            alt: normalize_optional(alt),
        })
    }

    /// Audio content referenced by URL.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the URL does not parse or is not http(s)/file.
    pub fn audio(url: &str, transcript: Option<String>) -> Result<Self, ContentError> {
        Ok(Self::Audio {
            url: parse_media_url(url)?,
            transcript: normalize_optional(transcript),
        })
    }

    /// Cloze deletion content.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if either the sentence or the answer is blank.
    pub fn cloze(text: impl Into<String>, answer: impl Into<String>) -> Result<Self, ContentError> {
        let text = non_blank(text.into())?;
        let answer = answer.into().trim().to_owned();
        if answer.is_empty() {
            return Err(ContentError::EmptyClozeAnswer);
        }
        Ok(Self::Cloze { text, answer })
    }

    /// Short textual rendering used in logs and the command-line driver.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Content::Text { text } | Content::Cloze { text, .. } => text,
            Content::Image { alt, url } => alt.as_deref().unwrap_or(url.as_str()),
            Content::Audio { transcript, url } => transcript.as_deref().unwrap_or(url.as_str()),
        }
    }

    #[must_use]
    pub fn has_media(&self) -> bool {
        matches!(self, Content::Image { .. } | Content::Audio { .. })
    }
}

fn non_blank(text: String) -> Result<String, ContentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ContentError::EmptyText);
    }
    Ok(trimmed.to_owned())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_media_url(raw: &str) -> Result<Url, ContentError> {
    let url = Url::parse(raw.trim()).map_err(|e| ContentError::InvalidMediaUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" | "file" => Ok(url),
        other => Err(ContentError::UnsupportedScheme(other.to_owned())),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
