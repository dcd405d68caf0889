//! # Analyzer
//! External capability that turns a company's collected evidence into
//! extracted labels and a confidence score against the research goal. The
//! engine never retries a failed analysis within a run; failures degrade
//! the company to a zero-confidence result.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::model::Evidence;

/// Output of one analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub labels: Vec<String>,
    pub confidence_score: f64,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, goal: &str, evidences: &[Evidence]) -> Result<Analysis>;
    fn name(&self) -> &'static str;
}

pub type SharedAnalyzer = Arc<dyn Analyzer>;

/// OpenAI chat-completions analyzer. Requires `OPENAI_API_KEY`.
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable is required")?;
        let http = reqwest::Client::builder()
            .user_agent("gtm-research-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            api_key,
            model: model.into(),
        })
    }

    fn build_prompt(goal: &str, evidences: &[Evidence]) -> String {
        let mut prompt = String::with_capacity(1024);
        prompt.push_str("Research goal: ");
        prompt.push_str(goal);
        prompt.push_str("\n\nEvidence collected about one company:\n");
        for (i, ev) in evidences.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. [{}] {} — {}\n",
                i + 1,
                ev.source_name,
                ev.title,
                ev.snippet
            ));
        }
        prompt.push_str(
            "\nExtract the technologies/signals this evidence supports and score how \
             confidently the company matches the research goal. Respond with ONLY a JSON \
             object: {\"labels\": [\"...\"], \"confidence_score\": 0.0}\n\
             confidence_score is a float in [0,1]. No prose, no markdown fences.",
        );
        prompt
    }

    /// Strict parse first; if the model wrapped the JSON in prose, salvage
    /// the outermost object before giving up.
    fn parse_analysis(content: &str) -> Result<Analysis> {
        if let Ok(parsed) = serde_json::from_str::<Analysis>(content.trim()) {
            return Ok(parsed);
        }
        let start = content.find('{');
        let end = content.rfind('}');
        if let (Some(start), Some(end)) = (start, end) {
            if start < end {
                if let Ok(parsed) = serde_json::from_str::<Analysis>(&content[start..=end]) {
                    return Ok(parsed);
                }
            }
        }
        Err(anyhow!("analyzer returned unparseable content"))
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, goal: &str, evidences: &[Evidence]) -> Result<Analysis> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = Self::build_prompt(goal, evidences);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: "You are an evidence analyst for a company research engine. \
                              You output strict JSON only.",
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.1,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("analyzer request failed")?
            .error_for_status()
            .context("analyzer returned an error status")?;
        let body: Resp = resp.json().await.context("parsing analyzer response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        let mut analysis = Self::parse_analysis(content)?;
        analysis.confidence_score = analysis.confidence_score.clamp(0.0, 1.0);
        Ok(analysis)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
