//! Discourse upload API client.
//!
//! Posts the recording to `/uploads.json` as multipart form data, authenticated
//! with a user API key.

use serde::Deserialize;

use super::{UploadReceipt, UploadSink};
use crate::config::{Credentials, UploadConfig};
use crate::session::RecordingArtifact;

/// Error body Discourse returns for rejected uploads.
#[derive(Debug, Deserialize)]
struct DiscourseErrors {
    errors: Vec<String>,
}

pub struct DiscourseUploader {
    client: reqwest::Client,
    site_url: String,
    upload_type: String,
    credentials: Credentials,
}

impl DiscourseUploader {
    pub fn new(config: &UploadConfig, credentials: Credentials) -> anyhow::Result<Self> {
        let site_url = config.site_url.trim().trim_end_matches('/').to_string();
        if site_url.is_empty() {
            return Err(anyhow::anyhow!(
                "No forum configured. Run 'composer-audio auth' to set the site URL."
            ));
        }
        if !site_url.starts_with("https://") && !site_url.starts_with("http://") {
            return Err(anyhow::anyhow!(
                "Invalid site URL '{site_url}': it must start with https:// or http://"
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            site_url,
            upload_type: config.upload_type.clone(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/uploads.json", self.site_url)
    }
}

impl UploadSink for DiscourseUploader {
    async fn upload(&self, artifact: &RecordingArtifact) -> anyhow::Result<UploadReceipt> {
        let file_part = reqwest::multipart::Part::bytes(artifact.bytes().to_vec())
            .file_name(artifact.file_name().to_string())
            .mime_str(artifact.mime_type())
            .map_err(|e| anyhow::anyhow!("Failed to create file part for upload: {e}"))?;

        let form = reqwest::multipart::Form::new()
            .text("type", self.upload_type.clone())
            .text("synchronous", "true")
            .part("file", file_part);

        let url = self.endpoint();
        tracing::debug!(
            "Discourse API Call:\n  URL: {}\n  Method: POST\n  Headers:\n    Api-Key: <redacted>\n    Api-Username: {}\n  Body parameters: type={}, synchronous=true, file={} ({} bytes, {})",
            url,
            self.credentials.api_username,
            self.upload_type,
            artifact.file_name(),
            artifact.len(),
            artifact.mime_type()
        );

        let response = match self
            .client
            .post(&url)
            .header("Api-Key", &self.credentials.api_key)
            .header("Api-Username", &self.credentials.api_username)
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let error_msg = if e.is_connect() {
                    format!("Failed to connect to {}. Check your internet connection.", self.site_url)
                } else if e.is_timeout() {
                    format!("Upload to {} timed out. The forum is not responding.", self.site_url)
                } else if e.is_builder() {
                    format!("Failed to build upload request: {e}. Check the site URL in your config.")
                } else {
                    format!("Upload network error: {e}")
                };
                return Err(anyhow::anyhow!(error_msg));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(describe_failure(status.as_u16(), &error_body)));
        }

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse upload response: {e}"))?;

        tracing::debug!("Discourse API Response:\n  Status: Success\n  Upload: {:#?}", receipt);
        tracing::info!(
            "Uploaded {} as {} (id {})",
            receipt.original_filename,
            receipt.short_url,
            receipt.id
        );
        Ok(receipt)
    }
}

fn describe_failure(status: u16, body: &str) -> String {
    match status {
        401 => "The forum rejected the API key. Please run 'composer-audio auth' to update it.".to_string(),
        403 => "This API key is not allowed to upload files. Check the key's scopes and the user's trust level.".to_string(),
        413 => "The recording is larger than the forum's maximum attachment size.".to_string(),
        422 => match serde_json::from_str::<DiscourseErrors>(body) {
            Ok(parsed) if !parsed.errors.is_empty() => {
                format!("The forum rejected the upload: {}", parsed.errors.join(" "))
            }
            _ => format!("The forum rejected the upload: {body}"),
        },
        429 => "Too many requests to the forum. Please wait and try again.".to_string(),
        500 | 502 | 503 | 504 => "The forum is experiencing issues. Please try again later.".to_string(),
        _ => format!("Upload failed (status {status}): {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            api_username: "alice".to_string(),
            api_key: "secret".to_string(),
        }
    }

    fn config(site_url: &str) -> UploadConfig {
        UploadConfig {
            site_url: site_url.to_string(),
            ..UploadConfig::default()
        }
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let uploader = DiscourseUploader::new(&config("https://forum.example.com/"), credentials()).unwrap();
        assert_eq!(uploader.endpoint(), "https://forum.example.com/uploads.json");
    }

    #[test]
    fn test_rejects_missing_or_bad_site_url() {
        assert!(DiscourseUploader::new(&config(""), credentials()).is_err());
        assert!(DiscourseUploader::new(&config("forum.example.com"), credentials()).is_err());
    }

    #[test]
    fn test_describe_validation_errors() {
        let body = r#"{"errors":["Sorry, the file you are trying to upload is not authorized (authorized extensions: jpg, png)."]}"#;
        let message = describe_failure(422, body);
        assert!(message.contains("not authorized"));
        assert!(describe_failure(401, "").contains("composer-audio auth"));
        assert!(describe_failure(418, "teapot").contains("status 418"));
    }

    #[test]
    fn test_receipt_parses_forum_response() {
        let body = r#"{
            "id": 321,
            "url": "/uploads/default/original/1X/61fdf6fac415541560e2d86e495f94d4dd201a18.mp3",
            "original_filename": "recording.mp3",
            "filesize": 36864,
            "width": null,
            "height": null,
            "extension": "mp3",
            "short_url": "upload://dYSqLbGQHdjJFT40TIVt56uSIOs.mp3",
            "short_path": "/uploads/short-url/dYSqLbGQHdjJFT40TIVt56uSIOs.mp3",
            "retain_hours": null,
            "human_filesize": "36 KB"
        }"#;
        let receipt: UploadReceipt = serde_json::from_str(body).unwrap();
        assert_eq!(receipt.id, 321);
        assert_eq!(receipt.original_filename, "recording.mp3");
        assert_eq!(receipt.short_url, "upload://dYSqLbGQHdjJFT40TIVt56uSIOs.mp3");
        assert_eq!(receipt.filesize, Some(36864));
        assert_eq!(receipt.human_filesize.as_deref(), Some("36 KB"));
    }
}
