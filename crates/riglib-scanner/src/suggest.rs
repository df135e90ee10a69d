//! AI-assisted grouping of newly discovered rig files.
//!
//! Only the request shaping and response parsing live here. The HTTP call
//! itself goes through [`Categorizer`], which the embedding application
//! implements with whatever client it already has.

use std::fmt;
use std::str::FromStr;

use riglib_db::{RigDatabase, RigMap};
use serde_json::{json, Value};
use thiserror::Error;

/// Upper bound on the number of paths sent in a single request.
pub const MAX_SUGGESTION_PATHS: usize = 50;

const INSTRUCTIONS: &str = r#"You organize file paths of 3D Maya character rigs into a JSON dictionary.

Rules:
1. Group files that belong to the same character or rig. Pick the cleanest
   name as the main file (for example 'Artemis.ma'). Variations such as
   'Artemis_game.ma', 'ArtemisMod.ma' or 'Artemis_v2.mb' go into the
   "alternatives" list of the main entry. When unsure, pick the shortest
   name as the main file.
2. Top-level keys are character names, for example "Apollo" or "Artemis".
3. Each entry holds:
   - "path": absolute path of the main rig file.
   - "image": null.
   - "tags": tags inferred from the name or folders ('human', 'male',
     'female', 'creature', ...).
   - "collection": a short title-cased name grouping related rigs, or null.
     Broad themes such as animals or props are tags, not collections.
   - "author": the author when the path reveals it, otherwise null.
   - "link": a store page (gumroad or similar) when known, otherwise null.
   - "alternatives": full paths of every variation of this rig.
4. Answer with valid JSON only.

Example:
{
    "Apollo": {
        "path": "D:\\Rigs\\Apollo.ma",
        "image": null,
        "tags": ["human", "male"],
        "collection": "Apollo&Artemis",
        "author": "Ramon Arango",
        "link": "https://ramonarango.gumroad.com/l/ArtemisApolloRig",
        "alternatives": []
    }
}"#;

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("no API key configured for {0}")]
    MissingApiKey(Provider),
    #[error("no paths to categorize")]
    NoPaths,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{provider} returned HTTP {status}: {message}")]
    Provider {
        provider: Provider,
        status: u16,
        message: String,
    },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("response contained no JSON object")]
    NoJson,
    #[error("failed to parse suggestions: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    #[default]
    Gemini,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn endpoint(self, model: &str) -> String {
        match self {
            Provider::Gemini => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions".to_owned(),
            Provider::Anthropic => "https://api.anthropic.com/v1/messages".to_owned(),
        }
    }

    /// Request headers, including the authentication header for `api_key`.
    pub fn headers(self, api_key: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Content-Type", "application/json".to_owned())];
        match self {
            Provider::Gemini => headers.push(("x-goog-api-key", api_key.to_owned())),
            Provider::OpenAi => headers.push(("Authorization", format!("Bearer {api_key}"))),
            Provider::Anthropic => {
                headers.push(("x-api-key", api_key.to_owned()));
                headers.push(("anthropic-version", "2023-06-01".to_owned()));
            }
        }
        headers
    }

    /// Pulls the generated text out of a provider response body.
    pub fn extract_text(self, response: &Value) -> Option<String> {
        let text = match self {
            Provider::Gemini => response
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str),
            Provider::OpenAi => response
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str),
            Provider::Anthropic => response.get("content").and_then(Value::as_array).and_then(
                |blocks| {
                    blocks
                        .iter()
                        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                        .and_then(|block| block.get("text"))
                        .and_then(Value::as_str)
                },
            ),
        };
        text.filter(|text| !text.trim().is_empty())
            .map(str::to_owned)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" | "chatgpt" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(format!("unknown AI provider: {other}")),
        }
    }
}

/// Fully shaped request handed to a [`Categorizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestRequest {
    pub provider: Provider,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Performs the HTTP round trip for a [`SuggestRequest`]. Implementations
/// return the decoded JSON body, or [`SuggestError::Provider`] for a non-2xx
/// status.
pub trait Categorizer {
    fn send(&self, request: &SuggestRequest) -> Result<Value, SuggestError>;
}

pub fn build_prompt(paths: &[String]) -> String {
    let listed = &paths[..paths.len().min(MAX_SUGGESTION_PATHS)];
    format!(
        "{INSTRUCTIONS}\n\nNew file paths to categorize (at most {MAX_SUGGESTION_PATHS}):\n\n{}\n\nGenerate JSON.",
        listed.join("\n")
    )
}

pub fn build_payload(provider: Provider, model: &str, prompt: &str) -> Value {
    match provider {
        Provider::Gemini => json!({
            "contents": [{"parts": [{"text": prompt}]}]
        }),
        Provider::OpenAi => json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"}
        }),
        Provider::Anthropic => json!({
            "model": model,
            "max_tokens": 8192,
            "messages": [{"role": "user", "content": prompt}]
        }),
    }
}

pub fn build_request(
    provider: Provider,
    model: Option<&str>,
    api_key: &str,
    paths: &[String],
) -> Result<SuggestRequest, SuggestError> {
    if api_key.trim().is_empty() {
        return Err(SuggestError::MissingApiKey(provider));
    }
    if paths.is_empty() {
        return Err(SuggestError::NoPaths);
    }
    let model = model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| provider.default_model());
    Ok(SuggestRequest {
        provider,
        url: provider.endpoint(model),
        headers: provider.headers(api_key),
        body: build_payload(provider, model, &build_prompt(paths)),
    })
}

/// The slice from the first `{` to the last `}`, dropping any prose or code
/// fences around it.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn parse_suggestions(text: &str) -> Result<RigMap, SuggestError> {
    let block = extract_json_block(text).ok_or(SuggestError::NoJson)?;
    let value: Value = serde_json::from_str(block)?;
    let database = RigDatabase::from_value(value)?;
    for name in database.opaque.keys() {
        log::warn!("ignoring suggestion '{name}' that is not a rig record");
    }
    Ok(database.records)
}

/// Builds the request, sends it through `categorizer` and parses the answer.
pub fn suggest(
    categorizer: &dyn Categorizer,
    provider: Provider,
    model: Option<&str>,
    api_key: &str,
    paths: &[String],
) -> Result<RigMap, SuggestError> {
    let request = build_request(provider, model, api_key, paths)?;
    log::info!(
        "asking {provider} to categorize {} paths",
        paths.len().min(MAX_SUGGESTION_PATHS)
    );
    let response = categorizer.send(&request)?;
    let text = provider
        .extract_text(&response)
        .ok_or(SuggestError::EmptyResponse)?;
    parse_suggestions(&text)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Canned(Value);

    impl Categorizer for Canned {
        fn send(&self, request: &SuggestRequest) -> Result<Value, SuggestError> {
            assert!(request.url.contains("gemini-2.5-flash"));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn prompt_caps_path_count() {
        let paths: Vec<String> = (0..80).map(|i| format!("/rigs/rig_{i:02}.ma")).collect();
        let prompt = build_prompt(&paths);
        assert!(prompt.contains("/rigs/rig_49.ma"));
        assert!(!prompt.contains("/rigs/rig_50.ma"));
    }

    #[test]
    fn json_block_ignores_fences() {
        let text = "```json\n{\"Apollo\": {\"path\": \"/rigs/Apollo.ma\"}}\n```";
        assert_eq!(
            extract_json_block(text),
            Some("{\"Apollo\": {\"path\": \"/rigs/Apollo.ma\"}}")
        );
        assert_eq!(extract_json_block("no json here"), None);
        assert!(matches!(parse_suggestions("}{"), Err(SuggestError::NoJson)));
    }

    #[test]
    fn extracts_text_per_provider() {
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "{}"}]}}]});
        let openai = json!({"choices": [{"message": {"content": "{}"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "{}"}]});
        assert_eq!(Provider::Gemini.extract_text(&gemini).as_deref(), Some("{}"));
        assert_eq!(Provider::OpenAi.extract_text(&openai).as_deref(), Some("{}"));
        assert_eq!(Provider::Anthropic.extract_text(&anthropic).as_deref(), Some("{}"));
        assert_eq!(Provider::Gemini.extract_text(&openai), None);
    }

    #[test]
    fn missing_key_is_rejected() {
        let paths = vec!["/rigs/a.ma".to_string()];
        assert!(matches!(
            build_request(Provider::OpenAi, None, " ", &paths),
            Err(SuggestError::MissingApiKey(Provider::OpenAi))
        ));
        assert!(matches!(
            build_request(Provider::OpenAi, None, "key", &[]),
            Err(SuggestError::NoPaths)
        ));
    }

    #[test]
    fn suggestions_decode_into_records() {
        let answer = r#"Here you go:
{
    "Artemis": {
        "path": "D:\\Rigs\\Artemis.ma",
        "image": null,
        "tags": ["human", "female"],
        "collection": "Apollo&Artemis",
        "author": null,
        "link": null,
        "exists": true,
        "alternatives": ["D:\\Rigs\\Artemis_game.ma"]
    }
}"#;
        let categorizer = Canned(json!({
            "candidates": [{"content": {"parts": [{"text": answer}]}}]
        }));
        let records = suggest(
            &categorizer,
            Provider::Gemini,
            None,
            "key",
            &["D:\\Rigs\\Artemis.ma".to_string()],
        )
        .unwrap();
        let artemis = &records["Artemis"];
        assert_eq!(artemis.path, r"D:\Rigs\Artemis.ma");
        assert_eq!(artemis.collection(), Some("Apollo&Artemis"));
        assert_eq!(artemis.author(), None);
        assert_eq!(artemis.alternatives.len(), 1);
        assert!("claude".parse::<Provider>().is_ok());
    }
}
