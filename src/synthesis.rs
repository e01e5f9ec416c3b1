use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Anything that turns text into audio bytes
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

// =============================================================================
// HttpSynthesizer - serverless TTS endpoint
// =============================================================================

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    input: SynthesisInput<'a>,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

/// Worker payload. Some gateways wrap it in `output`.
#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    audio: Option<String>,
    error: Option<String>,
    output: Option<Box<SynthesisResponse>>,
}

/// Calls a remote synthesis endpoint over HTTP. One attempt per call.
pub struct HttpSynthesizer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Upstream(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

impl Synthesizer for HttpSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = SynthesisRequest {
            input: SynthesisInput { text },
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let chars = text.chars().count();
        info!(endpoint = %self.endpoint, chars, "Calling synthesis endpoint");
        let resp = req
            .send()
            .map_err(|e| Error::Upstream(format!("request failed: {}", e)))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let detail = resp.text().unwrap_or_default();
            warn!(%status, body = %detail, "Synthesis endpoint error");
            return Err(Error::Upstream(format!(
                "synthesis endpoint returned {}",
                status
            )));
        }

        let payload: SynthesisResponse = resp
            .json()
            .map_err(|e| Error::Upstream(format!("invalid response: {}", e)))?;

        decode_audio(payload)
    }
}

fn decode_audio(payload: SynthesisResponse) -> Result<Vec<u8>> {
    if let Some(error) = payload.error {
        return Err(Error::Upstream(error));
    }

    if let Some(audio) = payload.audio {
        return STANDARD
            .decode(audio.trim())
            .map_err(|e| Error::Upstream(format!("invalid audio encoding: {}", e)));
    }

    match payload.output {
        Some(output) => decode_audio(*output),
        None => Err(Error::Upstream("response contained no audio".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    fn parse(json: &str) -> SynthesisResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let body = SynthesisRequest {
            input: SynthesisInput { text: "hi" },
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"input":{"text":"hi"}}"#
        );
    }

    #[test]
    fn test_decode_audio() {
        let audio = decode_audio(parse(r#"{"audio": "UklGRg==", "format": "wav"}"#)).unwrap();
        assert_eq!(audio, b"RIFF");
    }

    #[test]
    fn test_decode_wrapped_output() {
        let payload = parse(r#"{"status": "COMPLETED", "output": {"audio": "UklGRg=="}}"#);
        let audio = decode_audio(payload).unwrap();
        assert_eq!(audio, b"RIFF");
    }

    #[test]
    fn test_error_field_is_upstream_error() {
        let err = decode_audio(parse(r#"{"error": "Audio generation failed: OOM"}"#)).unwrap_err();
        assert!(matches!(err, Error::Upstream(ref m) if m.contains("OOM")));

        let payload = parse(r#"{"output": {"error": "Missing text field in input"}}"#);
        let err = decode_audio(payload).unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn test_missing_or_bad_audio() {
        assert!(matches!(decode_audio(parse("{}")), Err(Error::Upstream(_))));
        assert!(matches!(
            decode_audio(parse(r#"{"audio": "%%%not base64"}"#)),
            Err(Error::Upstream(_))
        ));
    }

    #[test]
    fn test_unreachable_endpoint() {
        let synth =
            HttpSynthesizer::new("http://127.0.0.1:9/run", None, Duration::from_secs(2)).unwrap();
        assert!(matches!(synth.synthesize("hello"), Err(Error::Upstream(_))));
    }

    /// Serve one HTTP response on a local port. The joined handle yields the raw request.
    fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/run", listener.local_addr().unwrap());
        let response = format!(
            concat!(
                "HTTP/1.1 {}\r\n",
                "Content-Type: application/json\r\n",
                "Content-Length: {}\r\n",
                "Connection: close\r\n\r\n{}",
            ),
            status,
            body.len(),
            body
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
            request
        });

        (url, handle)
    }

    // Headers plus a Content-Length body
    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&raw).into_owned()
    }

    #[test]
    fn test_synthesize_ok_response() {
        let (url, server) = serve_once("200 OK", r#"{"audio": "UklGRg=="}"#);
        let synth = HttpSynthesizer::new(&url, None, Duration::from_secs(5)).unwrap();

        assert_eq!(synth.synthesize("hello").unwrap(), b"RIFF");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /run "));
        assert!(request.ends_with(r#"{"input":{"text":"hello"}}"#));
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
    }

    #[test]
    fn test_synthesize_sends_bearer_key() {
        let (url, server) = serve_once("200 OK", r#"{"output": {"audio": "UklGRg=="}}"#);
        let synth =
            HttpSynthesizer::new(&url, Some("secret".to_string()), Duration::from_secs(5))
                .unwrap();

        synth.synthesize("hello").unwrap();

        let request = server.join().unwrap();
        assert!(request
            .lines()
            .any(|line| line.eq_ignore_ascii_case("authorization: Bearer secret")));
    }

    #[test]
    fn test_synthesize_error_status() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#);
        let synth = HttpSynthesizer::new(&url, None, Duration::from_secs(5)).unwrap();

        let err = synth.synthesize("hello").unwrap_err();
        assert!(matches!(
            err,
            Error::Upstream(ref m) if m == "synthesis endpoint returned 500 Internal Server Error"
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_synthesize_error_field_on_ok_status() {
        let (url, server) = serve_once("200 OK", r#"{"error": "Audio generation failed"}"#);
        let synth = HttpSynthesizer::new(&url, None, Duration::from_secs(5)).unwrap();

        let err = synth.synthesize("hello").unwrap_err();
        assert!(matches!(err, Error::Upstream(ref m) if m.contains("Audio generation failed")));
        server.join().unwrap();
    }
}
