//! WhatsApp transport over the Twilio Messaging API.

use async_trait::async_trait;
use reqwest::Client;

use crate::services::replies::Reply;

/// Downloads inbound media attachments.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Pushes replies composed after background processing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, reply: &Reply) -> Result<(), TransportError>;
}

/// Twilio REST client for media download and outbound WhatsApp messages.
pub struct TwilioClient {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    pub fn new(
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            http,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: whatsapp_address(from_number),
        })
    }
}

/// Twilio addresses WhatsApp users as `whatsapp:+<E.164>`.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

#[async_trait]
impl MediaFetcher for TwilioClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(TransportError::Http)?
            .error_for_status()
            .map_err(TransportError::Http)?;
        let bytes = response.bytes().await.map_err(TransportError::Http)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Notifier for TwilioClient {
    async fn send(&self, to: &str, reply: &Reply) -> Result<(), TransportError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let mut form: Vec<(&str, String)> = vec![
            ("From", self.from_number.clone()),
            ("To", whatsapp_address(to)),
            ("Body", reply.body.clone()),
        ];
        for media in &reply.media_urls {
            form.push(("MediaUrl", media.clone()));
        }

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twilio rejected the message ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}
