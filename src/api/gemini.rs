use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::ImageGenerator;
use crate::error::{ReelError, Result};
use crate::scene::ImageRef;

const GEMINI_API: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const IMAGE_MODEL: &str = "imagen-3.0-generate-002";
const IMAGE_MIME_TYPE: &str = "image/jpeg";
const ASPECT_RATIO: &str = "9:16";
const STYLE_PREAMBLE: &str =
    "High-quality, vibrant, professional photo conveying success and financial empowerment.";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ReelError::Config(
                "Gemini API key not provided. Set it with --gemini-api-key or GEMINI_API_KEY."
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: GEMINI_API.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_image(&self, prompt: &str) -> Result<ImageRef> {
        let request_body = json!({
            "instances": [
                { "prompt": format!("{} {}", STYLE_PREAMBLE, prompt) }
            ],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": ASPECT_RATIO,
                "outputMimeType": IMAGE_MIME_TYPE
            }
        });

        let url = format!("{}/{}:predict", self.base_url, IMAGE_MODEL);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            warn!("Image generation failed (HTTP {}): {}", status, error_text);
            return Err(ReelError::Provider(api_error_message(&error_text)));
        }

        let predict: PredictResponse = response.json().await?;
        image_from_response(predict)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<ImageRef> {
        info!("Generating image for prompt: {}", prompt);

        match self.request_image(prompt).await {
            Ok(image) => {
                info!("Image generated ({})", image.mime_type());
                Ok(image)
            }
            Err(e) => Err(ReelError::Provider(user_facing_message(&e))),
        }
    }
}

fn image_from_response(response: PredictResponse) -> Result<ImageRef> {
    let prediction = response
        .predictions
        .into_iter()
        .find(|p| p.bytes_base64_encoded.is_some())
        .ok_or_else(|| {
            ReelError::Provider("Image generation failed: No images returned from API.".to_string())
        })?;

    let mime_type = prediction
        .mime_type
        .unwrap_or_else(|| IMAGE_MIME_TYPE.to_string());
    let payload = prediction.bytes_base64_encoded.unwrap_or_default();
    Ok(ImageRef::from_base64(&mime_type, &payload))
}

/// Pulls `error.message` out of a Google API error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn user_facing_message(error: &ReelError) -> String {
    let message = error.to_string();
    if message.contains("API key not valid") {
        return "Your Gemini API Key is not valid. Please check and try again.".to_string();
    }
    format!("Failed to generate image. API Error: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one HTTP request with `status` and `body`, handing back the
    /// raw request it received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length || n == 0 {
                        break;
                    }
                } else if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, server)
    }

    #[tokio::test]
    async fn predict_request_carries_key_prompt_and_portrait_format() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"predictions":[{"bytesBase64Encoded":"/9j/AA==","mimeType":"image/jpeg"}]}"#,
        )
        .await;
        let client = GeminiClient::new("test-key".into())
            .unwrap()
            .with_base_url(base_url);

        let image = client.generate_image("a lighthouse at dusk").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(image.as_str(), "data:image/jpeg;base64,/9j/AA==");
        assert!(request.starts_with("POST /imagen-3.0-generate-002:predict "));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains(&format!("{} a lighthouse at dusk", STYLE_PREAMBLE)));
        assert!(request.contains(r#""aspectRatio":"9:16""#));
    }

    #[tokio::test]
    async fn rejected_key_surfaces_friendly_provider_error() {
        let (base_url, server) = serve_once(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key."}}"#,
        )
        .await;
        let client = GeminiClient::new("bad-key".into())
            .unwrap()
            .with_base_url(base_url);

        let err = client.generate_image("anything").await.unwrap_err();
        server.await.unwrap();

        match err {
            ReelError::Provider(msg) => assert_eq!(
                msg,
                "Your Gemini API Key is not valid. Please check and try again."
            ),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn builds_data_url_from_first_prediction() {
        let response: PredictResponse = serde_json::from_str(
            r#"{"predictions":[{"bytesBase64Encoded":"/9j/AA==","mimeType":"image/jpeg"}]}"#,
        )
        .unwrap();

        let image = image_from_response(response).unwrap();
        assert_eq!(image.as_str(), "data:image/jpeg;base64,/9j/AA==");
    }

    #[test]
    fn empty_predictions_is_a_provider_error() {
        let response: PredictResponse = serde_json::from_str("{}").unwrap();
        match image_from_response(response) {
            Err(ReelError::Provider(msg)) => assert!(msg.contains("No images returned")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            api_error_message(body),
            "API key not valid. Please pass a valid API key."
        );
        assert_eq!(api_error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn invalid_key_gets_friendly_message() {
        let err = ReelError::Provider("API key not valid. Please pass a valid API key.".into());
        assert_eq!(
            user_facing_message(&err),
            "Your Gemini API Key is not valid. Please check and try again."
        );

        let err = ReelError::Provider("quota exceeded".into());
        assert_eq!(
            user_facing_message(&err),
            "Failed to generate image. API Error: quota exceeded"
        );
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(matches!(
            GeminiClient::new("  ".into()),
            Err(ReelError::Config(_))
        ));
    }
}
