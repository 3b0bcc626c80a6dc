//! services/api/src/adapters/llm.rs
//!
//! Adapter for the OpenAI-compatible chat endpoint served by Ollama (locally
//! or through a remote tunnel). Implements both `ProjectGenerationService`
//! and `CodeFeedbackService` from the core crate.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use classroom_core::domain::{
    CodeFeedback, CodeReviewRequest, ProjectGenerationRequest, ProjectRecommendation,
};
use classroom_core::ports::{
    CodeFeedbackService, PortError, PortResult, ProjectGenerationService,
};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LlmConfig;

const PROJECT_SYSTEM_PROMPT: &str = r#"You design small weekly coding projects for students.
Reply with ONLY a JSON array. Each element is an object with the keys
"title", "description", "requirements", "sample_output" and "rubric".
All values are plain strings. Do not wrap the array in prose."#;

const REVIEW_SYSTEM_PROMPT: &str = r#"You review student code for a small coding project.
Give short, constructive feedback: what works, what is missing, and one
concrete improvement. End your reply with a final line of the form
SCORE: <0-100>"#;

//=========================================================================================
// Reply Parsing
//=========================================================================================

/// Accepts either a string or a list of strings (models sometimes return
/// requirements as bullet arrays).
fn text_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrList {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<TextOrList>::deserialize(deserializer)? {
        Some(TextOrList::Text(text)) => text,
        Some(TextOrList::List(items)) => items.join("\n"),
        None => String::new(),
    })
}

#[derive(Debug, Deserialize)]
struct GeneratedProject {
    title: String,
    #[serde(default, deserialize_with = "text_or_list")]
    description: String,
    #[serde(default, deserialize_with = "text_or_list")]
    requirements: String,
    #[serde(default, deserialize_with = "text_or_list")]
    sample_output: String,
    #[serde(default, deserialize_with = "text_or_list")]
    rubric: String,
}

fn parse_projects(
    reply: &str,
    request: &ProjectGenerationRequest,
) -> PortResult<Vec<ProjectRecommendation>> {
    let (start, end) = match (reply.find('['), reply.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(PortError::ExternalService(
                "LLM reply did not contain a JSON array".to_string(),
            ))
        }
    };

    let parsed: Vec<GeneratedProject> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| PortError::ExternalService(format!("Unreadable project list: {}", e)))?;

    let now = Utc::now();
    Ok(parsed
        .into_iter()
        .filter(|p| !p.title.trim().is_empty())
        .take(request.count)
        .map(|p| ProjectRecommendation {
            title: p.title.trim().to_string(),
            description: p.description,
            language: request.language,
            requirements: p.requirements,
            sample_output: p.sample_output,
            rubric: p.rubric,
            is_ai_generated: true,
            generated_at: now,
            week_number: None,
            created_at: now,
        })
        .collect())
}

fn parse_feedback(score_line: &Regex, reply: &str) -> PortResult<CodeFeedback> {
    let captures = score_line
        .captures_iter(reply)
        .last()
        .ok_or_else(|| PortError::ExternalService("LLM reply had no SCORE line".to_string()))?;

    let score = captures[1].parse::<u32>().unwrap_or(0).min(100) as u8;
    let whole = captures.get(0).map_or(reply.len(), |m| m.start());
    let feedback = reply[..whole].trim().to_string();

    Ok(CodeFeedback { score, feedback })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Talks to the configured chat-completions endpoint.
#[derive(Clone)]
pub struct OllamaAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    score_line: Regex,
}

impl OllamaAdapter {
    pub fn new(config: &LlmConfig) -> PortResult<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(config.endpoint())
            .with_api_key(config.api_key.clone().unwrap_or_else(|| "ollama".to_string()));
        let score_line = Regex::new(r"(?im)^\s*\**SCORE\**\s*:\s*(\d{1,3})")
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        // Rate limits and server errors are retried by the client itself.
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        info!(endpoint = config.endpoint(), model = %config.model, "Configured LLM endpoint");
        Ok(Self {
            client: Client::with_config(openai_config).with_backoff(backoff),
            model: config.model.clone(),
            score_line,
        })
    }

    async fn complete(&self, system: &str, user: String) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PortError::ExternalService(format!("LLM request failed: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| PortError::ExternalService("LLM returned an empty reply".to_string()))
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl ProjectGenerationService for OllamaAdapter {
    async fn generate_projects(
        &self,
        request: &ProjectGenerationRequest,
    ) -> PortResult<Vec<ProjectRecommendation>> {
        let mut prompt = format!(
            "Suggest {} {} projects for a {} programmer.",
            request.count,
            request.language,
            request.experience.as_str()
        );
        if !request.interests.is_empty() {
            prompt.push_str(&format!(" Their interests: {}.", request.interests.join(", ")));
        }
        if !request.avoid_titles.is_empty() {
            prompt.push_str(&format!(
                " Do not reuse these titles: {}.",
                request.avoid_titles.join("; ")
            ));
        }

        let reply = self.complete(PROJECT_SYSTEM_PROMPT, prompt).await?;
        let projects = parse_projects(&reply, request)?;
        debug!(language = %request.language, count = projects.len(), "Parsed generated projects");
        Ok(projects)
    }
}

#[async_trait]
impl CodeFeedbackService for OllamaAdapter {
    async fn review_code(&self, request: &CodeReviewRequest) -> PortResult<CodeFeedback> {
        let mut prompt = format!("Project: {}\n", request.title);
        if let Some(language) = request.language {
            prompt.push_str(&format!("Language: {}\n", language));
        }
        if let Some(requirements) = &request.requirements {
            prompt.push_str(&format!("Requirements:\n{}\n", requirements));
        }
        prompt.push_str(&format!("\nCode:\n```\n{}\n```", request.code));

        let reply = self.complete(REVIEW_SYSTEM_PROMPT, prompt).await?;
        parse_feedback(&self.score_line, &reply)
    }
}
