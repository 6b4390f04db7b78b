//! Offline Fallback
//!
//! Synthetic responses used when the answering service cannot be reached,
//! so the interface stays usable without a backend running.

use std::time::Duration;

use rand::seq::SliceRandom;
use serde_json::json;

use super::traits::QueryResponse;
use crate::messages::AuxRecord;

/// Default delay before a synthetic answer arrives
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(1000);

/// Default delay before a synthetic upload succeeds
pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_millis(1500);

/// Canned answers drawn from at random
pub const FALLBACK_ANSWERS: &[&str] = &[
    "I can help you analyze the transcript you uploaded. What specific information are you looking for? The document contains detailed discussions about various aspects of your project, including timelines, resource allocation, and strategic decisions that were made during the meeting.",
    "Based on the transcript, I found several key discussion points. The main topics covered were project timelines, budget considerations, and team responsibilities. The participants spent considerable time discussing implementation strategies and addressing potential challenges that could arise during the execution phase. There were also important decisions made regarding resource allocation and priority setting for different project components.",
    "The transcript shows that participants discussed implementation strategies and potential challenges in great detail. Would you like me to elaborate on any specific aspect? I noticed there were extensive conversations about technical requirements, stakeholder management, and risk mitigation strategies that could be particularly relevant to your current planning phase.",
    "From what I can see in the uploaded document, there were several action items and decisions made throughout the meeting. Let me break those down for you: First, the team established clear milestones and deadlines. Second, they allocated specific responsibilities to different team members. Third, they identified potential risks and developed mitigation strategies. Finally, they set up regular check-in meetings to monitor progress and address any issues that might arise.",
    "The conversation in the transcript covered both technical and business aspects of the project comprehensively. What particular area interests you most? I can provide detailed insights into the technical specifications discussed, the business requirements that were outlined, the budget constraints that were identified, or the timeline expectations that were established during this important planning session.",
];

/// Fixed auxiliary records returned with every synthetic answer
#[must_use]
pub fn fallback_records() -> Vec<AuxRecord> {
    [("Budget", true), ("Timeline", true), ("Resources", false)]
        .into_iter()
        .filter_map(|(topic, mentioned)| {
            json!({ "topic": topic, "mentioned": mentioned })
                .as_object()
                .cloned()
        })
        .collect()
}

/// Produces synthetic answers and upload confirmations
#[derive(Clone, Debug)]
pub struct FallbackResponder {
    query_delay: Duration,
    upload_delay: Duration,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_DELAY, DEFAULT_UPLOAD_DELAY)
    }
}

impl FallbackResponder {
    /// Create a responder with custom delays
    #[must_use]
    pub fn new(query_delay: Duration, upload_delay: Duration) -> Self {
        Self {
            query_delay,
            upload_delay,
        }
    }

    /// A synthetic answer after the query delay
    pub async fn answer(&self) -> QueryResponse {
        tokio::time::sleep(self.query_delay).await;
        let answer = FALLBACK_ANSWERS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(FALLBACK_ANSWERS[0]);
        QueryResponse {
            answer: answer.to_string(),
            data: Some(fallback_records()),
        }
    }

    /// Pretend to store a file
    pub async fn upload(&self) {
        tokio::time::sleep(self.upload_delay).await;
    }
}
