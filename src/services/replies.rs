//! Chat replies sent to field workers.

use serde::Serialize;

use crate::models::photo::{CheckProfile, PhotoType};

/// A chat message: text plus zero or more media URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub body: String,
    pub media_urls: Vec<String>,
}

impl Reply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            media_urls: Vec::new(),
        }
    }

    pub fn with_media(body: impl Into<String>, media_url: Option<&str>) -> Self {
        Self {
            body: body.into(),
            media_urls: media_url.map(|u| vec![u.to_string()]).unwrap_or_default(),
        }
    }
}

/// Per-type instructions and example images.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    pub example_url_label: Option<String>,
    pub example_url_azimuth: Option<String>,
}

impl PromptCatalog {
    pub fn prompt(&self, photo_type: &PhotoType) -> String {
        match photo_type.profile() {
            CheckProfile::Label => {
                "Please send the *Label Photo* with MAC & RSN clearly visible (flat, sharp, no glare).".to_string()
            }
            CheckProfile::Azimuth => {
                "Please send the *Azimuth Photo* showing a clear compass reading (e.g., 123° NE).".to_string()
            }
            CheckProfile::Plain => format!("Please send the *{}*.", photo_type.display_name()),
        }
    }

    pub fn example_url(&self, photo_type: &PhotoType) -> Option<&str> {
        match photo_type.profile() {
            CheckProfile::Label => self.example_url_label.as_deref(),
            CheckProfile::Azimuth => self.example_url_azimuth.as_deref(),
            CheckProfile::Plain => None,
        }
    }

    fn prompt_reply(&self, photo_type: &PhotoType, body: String) -> Reply {
        Reply::with_media(body, self.example_url(photo_type))
    }

    pub fn no_active_job(&self) -> Reply {
        Reply::text("No active job assigned yet. Please contact your supervisor.")
    }

    /// Infrastructure trouble before the expected type is known.
    pub fn unavailable(&self) -> Reply {
        Reply::text("⚠️ We're having trouble right now. Please try again in a few minutes.")
    }

    pub fn all_done(&self) -> Reply {
        Reply::text("✅ All photos for this job are already complete. Thank you!")
    }

    /// Text-only message: restate what is expected.
    pub fn expect(&self, expected: &PhotoType) -> Reply {
        self.prompt_reply(
            expected,
            format!("{}\nSend 1 image at a time.", self.prompt(expected)),
        )
    }

    pub fn invalid_media(&self, expected: &PhotoType) -> Reply {
        Reply::text(format!("Please send a valid image. {}", self.prompt(expected)))
    }

    pub fn received(&self, expected: &PhotoType) -> Reply {
        Reply::text(format!(
            "📥 Got your {}. Checking it now, you'll get the result in a moment.",
            expected.display_name()
        ))
    }

    pub fn retry_later(&self, expected: &PhotoType) -> Reply {
        Reply::text(format!(
            "⚠️ We couldn't process that photo right now. Please resend it. {}",
            self.prompt(expected)
        ))
    }

    pub fn verified(&self, verified: &PhotoType, next: &PhotoType, duplicate: bool) -> Reply {
        self.prompt_reply(
            next,
            format!(
                "✅ {} verified.{}\nNext: {}",
                verified,
                duplicate_note(duplicate),
                self.prompt(next)
            ),
        )
    }

    pub fn completed(&self, duplicate: bool) -> Reply {
        Reply::text(format!(
            "✅ Received and verified.{} All photos complete. Thank you!",
            duplicate_note(duplicate)
        ))
    }

    pub fn failed(&self, resolved: &PhotoType, expected: &PhotoType, reasons: &[String]) -> Reply {
        let reasons = if reasons.is_empty() {
            "needs retake".to_string()
        } else {
            reasons.join("; ")
        };
        self.prompt_reply(
            expected,
            format!("❌ {} failed: {}. Please retake and resend.", resolved, reasons),
        )
    }

    pub fn out_of_turn(&self, received: &PhotoType, expected: &PhotoType) -> Reply {
        self.prompt_reply(
            expected,
            format!(
                "Got a {} but we still need the {}. {}",
                received.display_name(),
                expected.display_name(),
                self.prompt(expected)
            ),
        )
    }
}

fn duplicate_note(duplicate: bool) -> &'static str {
    if duplicate {
        " (This looks like a photo you already sent.)"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PromptCatalog {
        PromptCatalog {
            example_url_label: Some("https://example.test/label.jpg".to_string()),
            example_url_azimuth: None,
        }
    }

    #[test]
    fn test_expect_attaches_example() {
        let reply = catalog().expect(&PhotoType::label());
        assert!(reply.body.contains("Label Photo"));
        assert!(reply.body.ends_with("Send 1 image at a time."));
        assert_eq!(reply.media_urls, vec!["https://example.test/label.jpg"]);
    }

    #[test]
    fn test_failed_lists_reasons() {
        let reply = catalog().failed(
            &PhotoType::label(),
            &PhotoType::label(),
            &["Image is blurry".to_string(), "Could not read MAC/RSN from label".to_string()],
        );
        assert!(reply
            .body
            .starts_with("❌ LABEL failed: Image is blurry; Could not read MAC/RSN from label."));
    }

    #[test]
    fn test_plain_type_prompt() {
        let reply = catalog().expect(&PhotoType::new("tower"));
        assert!(reply.body.contains("*Tower Photo*"));
        assert!(reply.media_urls.is_empty());
    }

    #[test]
    fn test_duplicate_note_is_informational() {
        let reply = catalog().verified(&PhotoType::label(), &PhotoType::azimuth(), true);
        assert!(reply.body.contains("already sent"));
        assert!(reply.body.contains("Next:"));
    }
}
