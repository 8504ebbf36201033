use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::db::FileDescriptor;
use crate::error::AwardsError;
use crate::scoring::ScoreCard;

const POSTMARK_URL: &str = "https://api.postmarkapp.com/email";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text_body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkError {
    message: Option<String>,
}

pub struct PostmarkNotifier {
    client: Client,
    server_token: String,
    address: String,
}

impl PostmarkNotifier {
    pub fn new(server_token: String, address: String) -> Result<Self, AwardsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AwardsError::Notify(e.to_string()))?;

        Ok(Self {
            client,
            server_token,
            address,
        })
    }

    /// Sends the submission summary to the awards office. The sender must be a
    /// verified Postmark sender signature, so the same address is used for both ends.
    pub async fn notify_submission(
        &self,
        name: &str,
        card: &ScoreCard,
        files: &[FileDescriptor],
        folder_url: Option<&str>,
    ) -> Result<(), AwardsError> {
        let email = PostmarkEmail {
            from: &self.address,
            to: &self.address,
            subject: format!("New Award Submission: {}", name),
            text_body: render_email_body(name, card, files, folder_url),
        };

        let response = self
            .client
            .post(POSTMARK_URL)
            .header("X-Postmark-Server-Token", &self.server_token)
            .header("Accept", "application/json")
            .json(&email)
            .send()
            .await
            .map_err(|e| AwardsError::Notify(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("Submission email sent for {}", name);
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PostmarkError>(&text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(text);
        Err(AwardsError::Notify(format!("Postmark returned {}: {}", status, message)))
    }
}

pub fn render_email_body(
    name: &str,
    card: &ScoreCard,
    files: &[FileDescriptor],
    folder_url: Option<&str>,
) -> String {
    let mut body = String::from("MD'S QUALITY AWARDS SUBMISSION\n");
    body.push_str(&format!("Submitted by: {}\n", name));
    body.push_str(&"=".repeat(40));
    body.push_str("\n\n");

    for entry in &card.perspectives {
        let key = entry.perspective.key();
        body.push_str(&format!("PERSPECTIVE: {}\n", entry.perspective.label()));
        body.push_str(&format!("Action Taken: {}\n", entry.action));
        body.push_str(&format!("AI Rating: {}\n", entry.rating.label()));
        body.push_str(&format!("Confidence Score: {}%\n", entry.score));
        body.push_str(&format!("Evidence: {} files provided\n", entry.evidence_count));
        for file in files.iter().filter(|f| f.perspective == key) {
            match &file.url {
                Some(url) => body.push_str(&format!("  - {} ({})\n", file.name, url)),
                None => body.push_str(&format!("  - {}\n", file.name)),
            }
        }
        body.push_str(&"-".repeat(20));
        body.push_str("\n\n");
    }

    body.push_str(&format!("Total Score: {}\n", card.total));
    if let Some(url) = folder_url {
        body.push_str(&format!("Evidence folder: {}\n", url));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{score_submission, Perspective};

    #[test]
    fn body_lists_each_perspective_and_its_files() {
        let card = score_submission(&[(Perspective::Financial, "Saved 10% on fuel".into(), 2)]);
        let files = vec![
            FileDescriptor {
                name: "fuel.xlsx".into(),
                url: Some("https://x/fuel.xlsx".into()),
                content_type: "application/vnd.ms-excel".into(),
                size: 10,
                perspective: "financial".into(),
            },
            FileDescriptor {
                name: "memo.pdf".into(),
                url: None,
                content_type: "application/pdf".into(),
                size: 10,
                perspective: "financial".into(),
            },
        ];

        let body = render_email_body("Tariro Moyo", &card, &files, Some("https://x/folder"));
        assert!(body.starts_with("MD'S QUALITY AWARDS SUBMISSION\nSubmitted by: Tariro Moyo\n"));
        assert!(body.contains("PERSPECTIVE: Financial\nAction Taken: Saved 10% on fuel\nAI Rating: Extra Mile (Verified)\nConfidence Score: 60%\n"));
        assert!(body.contains("  - fuel.xlsx (https://x/fuel.xlsx)\n  - memo.pdf\n"));
        assert!(body.contains("PERSPECTIVE: Learning & Growth\n"));
        assert!(body.contains("AI Rating: No Data"));
        assert!(body.contains("Total Score: 15\n"));
        assert!(body.ends_with("Evidence folder: https://x/folder\n"));
    }
}
