use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Form;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::services::pipeline::{self, InboundMessage};
use crate::services::replies::Reply;

/// Form fields Twilio posts for an inbound WhatsApp message.
#[derive(Debug, Default, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "WaId", default)]
    pub wa_id: Option<String>,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url0: Option<String>,
    #[serde(rename = "MediaContentType0", default)]
    pub media_content_type0: Option<String>,
}

impl From<TwilioInbound> for InboundMessage {
    fn from(form: TwilioInbound) -> Self {
        let from = form
            .from
            .filter(|f| !f.trim().is_empty())
            .or(form.wa_id)
            .unwrap_or_default();
        let num_media = form
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0);

        Self {
            from,
            num_media,
            media_url: form.media_url0,
            media_content_type: form.media_content_type0,
        }
    }
}

/// POST /api/v1/whatsapp/webhook: Answer within Twilio's deadline; photo
/// verdicts follow as separate messages.
pub async fn webhook(
    State(state): State<AppState>,
    Form(form): Form<TwilioInbound>,
) -> impl IntoResponse {
    let message = InboundMessage::from(form);
    tracing::info!(
        from = %message.from,
        num_media = message.num_media,
        "Inbound WhatsApp message"
    );

    let reply = pipeline::handle_inbound(&state.executor, message).await;
    ([(header::CONTENT_TYPE, "application/xml")], render_twiml(&reply))
}

/// TwiML `<Response>` carrying a single message.
pub fn render_twiml(reply: &Reply) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>"#);
    xml.push_str("<Body>");
    xml.push_str(&xml_escape(&reply.body));
    xml.push_str("</Body>");
    for url in &reply.media_urls {
        xml.push_str("<Media>");
        xml.push_str(&xml_escape(url));
        xml.push_str("</Media>");
    }
    xml.push_str("</Message></Response>");
    xml
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_escapes_body_and_media() {
        let reply = Reply {
            body: "MAC & RSN <clearly> visible".to_string(),
            media_urls: vec!["https://example.test/a.jpg?x=1&y=2".to_string()],
        };
        assert_eq!(
            render_twiml(&reply),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>\
             <Body>MAC &amp; RSN &lt;clearly&gt; visible</Body>\
             <Media>https://example.test/a.jpg?x=1&amp;y=2</Media>\
             </Message></Response>"
        );
    }

    #[test]
    fn test_inbound_falls_back_to_wa_id() {
        let message = InboundMessage::from(TwilioInbound {
            from: Some(" ".to_string()),
            wa_id: Some("919876543210".to_string()),
            num_media: Some("1".to_string()),
            media_url0: Some("https://api.twilio.test/media/1".to_string()),
            media_content_type0: Some("image/jpeg".to_string()),
        });
        assert_eq!(message.from, "919876543210");
        assert_eq!(message.num_media, 1);
    }

    #[test]
    fn test_inbound_tolerates_missing_counts() {
        let message = InboundMessage::from(TwilioInbound {
            from: Some("whatsapp:+14155550100".to_string()),
            num_media: Some("".to_string()),
            ..Default::default()
        });
        assert_eq!(message.num_media, 0);
        assert!(message.media_url.is_none());
    }
}
