//! get-gemini-analysis: short product copy for the seller dashboard
//!
//! Without a model key the answer is a fixed template, so the dashboard
//! keeps working in every environment.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Cors, FunctionContext, HandlerError, HandlerEvent, HandlerResponse};
use crate::backend::errors::parse_body;
use crate::backend::BackendError;

pub const NAME: &str = "get-gemini-analysis";

const CORS: Cors = Cors {
    allow_methods: "GET,POST,OPTIONS",
};

const GENERATIVE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const DEFAULT_NAME: &str = "Product";
const DEFAULT_CATEGORY: &str = "N/A";
const DEFAULT_DESCRIPTION: &str = "Quality product with an excellent price/value ratio.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sales_summary: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AnalysisInput {
    fn name(&self) -> &str {
        non_empty(&self.name).unwrap_or(DEFAULT_NAME)
    }

    fn category(&self) -> &str {
        non_empty(&self.category).unwrap_or(DEFAULT_CATEGORY)
    }

    fn description(&self) -> &str {
        non_empty(&self.description).unwrap_or(DEFAULT_DESCRIPTION)
    }

    /// Caller's prompt if given, otherwise one composed from the fields
    pub fn prompt(&self) -> String {
        if let Some(prompt) = non_empty(&self.prompt) {
            return prompt.to_string();
        }
        let mut prompt = format!(
            "Write a short sales analysis for the product \"{}\" (category: {}).\nDescription: {}\n",
            self.name(),
            self.category(),
            self.description()
        );
        if let Some(sales) = non_empty(&self.sales_summary) {
            prompt.push_str(&format!("Sales summary: {}\n", sales));
        }
        prompt.push_str("Cover key benefits, the target audience, and one line of marketing copy.");
        prompt
    }
}

/// Deterministic analysis used when no model key is configured
pub fn mock_analysis(input: &AnalysisInput) -> String {
    format!(
        "Suggested summary for \"{}\" ({}):\n\
         - Benefits: clear sound, long battery life, stable connectivity.\n\
         - Audience: mobile users, casual gamers, work calls.\n\
         - Description: {}\n\
         Copy recommendation: Enjoy wireless freedom.",
        input.name(),
        input.category(),
        input.description()
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub async fn handle(ctx: &FunctionContext, event: HandlerEvent) -> HandlerResponse {
    match event.method().as_str() {
        "OPTIONS" => HandlerResponse::empty(200, &CORS),
        "GET" | "POST" => match analyse(ctx, &event).await {
            Ok(body) => HandlerResponse::json(200, &body, &CORS),
            Err(e) => e.into_response(&CORS),
        },
        _ => HandlerResponse::method_not_allowed(&CORS),
    }
}

async fn analyse(ctx: &FunctionContext, event: &HandlerEvent) -> Result<Value, HandlerError> {
    let input: AnalysisInput = event.json_body()?;

    let analysis = match ctx.config().analysis.api_key.as_deref() {
        None => {
            debug!(product = input.name(), "No model key, answering from template");
            mock_analysis(&input)
        }
        Some(api_key) => generate(ctx, api_key, &input.prompt()).await?,
    };

    Ok(json!({ "analysis": analysis }))
}

async fn generate(ctx: &FunctionContext, api_key: &str, prompt: &str) -> Result<String, HandlerError> {
    let model = &ctx.config().analysis.model;
    let url = format!("{}/{}:generateContent", GENERATIVE_API_URL, model);
    let request = GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
    };

    info!(model = %model, "Requesting text generation");
    let response = ctx
        .http_client()
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| HandlerError::upstream("Text generation failed")(BackendError::from(e)))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(HandlerError::upstream("Text generation failed")(
            BackendError::from_status(status.as_u16(), &text),
        ));
    }

    let parsed: GenerateResponse = serde_json::from_value(parse_body(&text)).unwrap_or_default();
    parsed
        .first_text()
        .ok_or_else(|| HandlerError::BadGateway("Text generation returned no candidates".to_string()))
}
