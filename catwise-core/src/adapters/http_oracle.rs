//! HTTP ranking oracle
//!
//! Talks to an OpenAI-compatible chat completions endpoint. Each call sends
//! one prompt listing the offered categories and one sample transaction per
//! merchant, and asks for a JSON object with rankings per merchant id.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::OracleConfig;
use crate::domain::result::{Error, Result};
use crate::domain::{Category, CategoryRanking, CategoryRankings};
use crate::ports::{RankingOracle, RankingRequest};

const SYSTEM_PROMPT: &str = "You classify personal finance transactions into budget categories. \
Reply with JSON only.";

// =============================================================================
// Wire models
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RankingReply {
    merchants: Vec<MerchantReply>,
}

#[derive(Debug, Deserialize)]
struct MerchantReply {
    id: String,
    #[serde(default)]
    rankings: Vec<RankingEntry>,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    category: String,
    score: f64,
    #[serde(default)]
    is_new: bool,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionReply {
    description: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct MerchantPrompt<'a> {
    id: &'a str,
    merchant: &'a str,
    raw_name: &'a str,
    amount: String,
    date: String,
    transaction_type: &'a str,
    direction: &'a str,
    transactions: usize,
}

// =============================================================================
// Client
// =============================================================================

/// Ranking oracle backed by a chat completions API
#[derive(Debug)]
pub struct HttpRankingOracle {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl HttpRankingOracle {
    /// Build a client from config; the API key comes from the configured env var
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            Error::config(format!("Ranking oracle API key not set (expected in ${})", config.api_key_env))
        })?;
        Self::new(&config.endpoint, &config.model, &api_key, Duration::from_secs(config.timeout_secs))
    }

    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::config("Ranking oracle API key cannot be empty"));
        }
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid oracle endpoint {}: {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Send one chat prompt and return the assistant's message text
    async fn complete(&self, prompt: String) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        check_response_status(response.status().as_u16())?;

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::oracle("Empty completion"))
    }
}

#[async_trait]
impl RankingOracle for HttpRankingOracle {
    async fn rank_batch(
        &self,
        requests: &[RankingRequest],
        categories: &[Category],
    ) -> Result<HashMap<String, CategoryRankings>> {
        let prompt = build_ranking_prompt(requests, categories)?;
        debug!(merchants = requests.len(), categories = categories.len(), "Requesting rankings");
        let content = self.complete(prompt).await?;
        parse_rankings(&content)
    }

    async fn generate_description(&self, category_name: &str) -> Result<(String, f64)> {
        let content = self.complete(build_description_prompt(category_name)).await?;
        parse_description(&content)
    }
}

fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::oracle("Ranking request timed out")
    } else if error.is_connect() {
        Error::oracle("Unable to connect to the ranking service")
    } else {
        Error::oracle(format!("Ranking request failed: {}", error))
    }
}

fn check_response_status(status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(Error::oracle("Ranking service rejected the API key")),
        429 => Err(Error::oracle("Ranking service rate limit exceeded")),
        status => Err(Error::oracle(format!("Ranking service error: HTTP {}", status))),
    }
}

// =============================================================================
// Prompts and parsing
// =============================================================================

fn build_ranking_prompt(requests: &[RankingRequest], categories: &[Category]) -> Result<String> {
    let mut prompt = String::from("Categories:\n");
    for category in categories {
        if category.description.is_empty() {
            let _ = writeln!(prompt, "- {}", category.name);
        } else {
            let _ = writeln!(prompt, "- {}: {}", category.name, category.description);
        }
    }

    let merchants: Vec<MerchantPrompt> = requests
        .iter()
        .map(|r| MerchantPrompt {
            id: &r.merchant_id,
            merchant: r.sample.display_merchant(),
            raw_name: &r.sample.raw_name,
            amount: r.sample.amount.to_string(),
            date: r.sample.date.to_string(),
            transaction_type: &r.sample.transaction_type,
            direction: r.sample.direction.as_str(),
            transactions: r.transaction_count,
        })
        .collect();

    let _ = write!(
        prompt,
        "\nMerchants:\n{}\n\n\
         For every merchant, rank up to 3 of the categories above by how well they fit, \
         with a score between 0 and 1. If none fits, propose one new category with \
         \"is_new\": true and a one-line description. Reply as \
         {{\"merchants\": [{{\"id\": \"<id>\", \"rankings\": \
         [{{\"category\": \"<name>\", \"score\": 0.0, \"is_new\": false, \"description\": \"\"}}]}}]}}",
        serde_json::to_string_pretty(&merchants)?
    );
    Ok(prompt)
}

fn build_description_prompt(category_name: &str) -> String {
    format!(
        "Write a one-sentence description of the personal finance category \"{}\". \
         Reply as {{\"description\": \"<text>\", \"confidence\": <0..1>}}",
        category_name
    )
}

/// Strip a Markdown code fence around a JSON reply
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_rankings(content: &str) -> Result<HashMap<String, CategoryRankings>> {
    let reply: RankingReply = serde_json::from_str(extract_json(content))
        .map_err(|e| Error::oracle(format!("Malformed ranking reply: {}", e)))?;

    Ok(reply
        .merchants
        .into_iter()
        .map(|m| {
            let rankings = m
                .rankings
                .into_iter()
                .filter(|r| !r.category.trim().is_empty())
                .map(|r| {
                    if r.is_new {
                        CategoryRanking::new_category(r.category.trim(), r.score, r.description)
                    } else {
                        let mut ranking = CategoryRanking::new(r.category.trim(), r.score);
                        ranking.description = r.description;
                        ranking
                    }
                })
                .collect::<Vec<_>>();
            (m.id, CategoryRankings::new(rankings))
        })
        .collect())
}

fn parse_description(content: &str) -> Result<(String, f64)> {
    let reply: DescriptionReply = serde_json::from_str(extract_json(content))
        .map_err(|e| Error::oracle(format!("Malformed description reply: {}", e)))?;
    let description = reply.description.trim().to_string();
    if description.is_empty() {
        return Err(Error::oracle("Empty description"));
    }
    Ok((description, reply.confidence.clamp(0.0, 1.0)))
}
