// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reply drafting through an OpenAI-compatible chat completions API.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest review text accepted for drafting, in characters.
pub const MAX_REVIEW_CHARS: usize = 5000;

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You write short, warm and professional replies from a business \
owner to customer reviews. Answer in the language of the review. Thank the reviewer, address \
concrete points they raised, and for critical reviews apologize and offer to follow up. \
Never invent facts about the business. Reply with the text only.";

/// What to draft a reply for.
#[derive(Debug, Clone)]
pub struct ReplyPrompt<'a> {
    pub review_text: &'a str,
    pub rating: u8,
    pub reviewer_name: Option<&'a str>,
    pub business_name: Option<&'a str>,
}

impl ReplyPrompt<'_> {
    fn user_message(&self) -> String {
        let mut message = format!("Rating: {}/5\n", self.rating);
        if let Some(name) = self.reviewer_name.filter(|n| !n.trim().is_empty()) {
            message.push_str(&format!("Reviewer: {}\n", name.trim()));
        }
        if let Some(name) = self.business_name.filter(|n| !n.trim().is_empty()) {
            message.push_str(&format!("Business: {}\n", name.trim()));
        }
        message.push_str("Review:\n");
        message.push_str(self.review_text.trim());
        message
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat completions client.
#[derive(Clone)]
pub struct AiReplyService {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AiReplyService {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    /// Draft a reply. Inputs are validated before any network call.
    pub async fn generate_reply(&self, prompt: &ReplyPrompt<'_>) -> Result<String, AppError> {
        if prompt.review_text.chars().count() > MAX_REVIEW_CHARS {
            return Err(AppError::Validation(format!(
                "Review text exceeds {} characters",
                MAX_REVIEW_CHARS
            )));
        }
        if !(1..=5).contains(&prompt.rating) {
            return Err(AppError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user_message(),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamUnavailable("LLM request timed out".to_string())
                } else {
                    AppError::UpstreamUnavailable(format!("LLM request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "LLM provider returned an error");
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                AppError::UpstreamUnavailable(format!("LLM HTTP {}", status.as_u16()))
            } else {
                AppError::Upstream {
                    status: status.as_u16(),
                    message: body,
                }
            });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse LLM response: {}", e))
        })?;

        extract_reply(completion)
    }
}

fn extract_reply(completion: ChatCompletionResponse) -> Result<String, AppError> {
    completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::UpstreamUnavailable("Empty completion".to_string()))
}
