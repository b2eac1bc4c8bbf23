//! Response generator: maps a filtered assessment to an age-appropriate action and
//! notification payload. Delivery is left to the notification collaborator.

pub mod messages;

use crate::policy::AgeGroup;
use crate::risk::{Recommendation, ThreatAssessment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    Allow,
    Warn,
    Block,
    BlockAndAlert,
}

impl ResponseAction {
    pub fn from_recommendation(r: Recommendation) -> Self {
        match r {
            Recommendation::Allow | Recommendation::Monitor | Recommendation::EducateAndAllow => {
                ResponseAction::Allow
            }
            Recommendation::Warn | Recommendation::WarnAndEducate => ResponseAction::Warn,
            Recommendation::Block | Recommendation::BlockAndEducate => ResponseAction::Block,
            Recommendation::BlockAndAlert => ResponseAction::BlockAndAlert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseAction::Allow => "allow",
            ResponseAction::Warn => "warn",
            ResponseAction::Block => "block",
            ResponseAction::BlockAndAlert => "block_and_alert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationStyle {
    KidFriendly,
    PlainLanguage,
    Technical,
}

impl ExplanationStyle {
    pub fn for_age(group: AgeGroup) -> Self {
        match group {
            AgeGroup::Child => ExplanationStyle::KidFriendly,
            AgeGroup::Teen | AgeGroup::Senior => ExplanationStyle::PlainLanguage,
            AgeGroup::YoungAdult | AgeGroup::Adult => ExplanationStyle::Technical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Guardian,
    Family,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Payload for the external notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub audience: Vec<Audience>,
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatResponse {
    pub action: ResponseAction,
    pub recommendation: Recommendation,
    pub style: ExplanationStyle,
    pub title: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub educational_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub guidance_steps: Vec<String>,
    pub parental_notification: bool,
    pub family_notification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationPayload>,
}

/// Pure mapping from (assessment, age group) to a response.
pub fn generate(assessment: &ThreatAssessment, group: AgeGroup) -> ThreatResponse {
    let action = ResponseAction::from_recommendation(assessment.recommendation);
    let style = ExplanationStyle::for_age(group);
    let t = assessment.threat_type;
    let ann = &assessment.annotations;

    let explanation = match (&ann.simplified_explanation, style) {
        (Some(simple), ExplanationStyle::PlainLanguage) => simple.clone(),
        _ => messages::explanation(t, style).to_string(),
    };
    let title = messages::title(t, assessment.recommendation.is_blocking());

    let mut audience = Vec::new();
    if ann.parental_notification {
        audience.push(Audience::Guardian);
    }
    if ann.family_notification {
        audience.push(Audience::Family);
    }
    if action != ResponseAction::Allow {
        audience.push(Audience::User);
    }
    let notification = if audience.is_empty() {
        None
    } else {
        let priority = match action {
            ResponseAction::BlockAndAlert => Priority::High,
            ResponseAction::Block if ann.parental_notification => Priority::High,
            ResponseAction::Block | ResponseAction::Warn => Priority::Normal,
            ResponseAction::Allow => Priority::Low,
        };
        Some(NotificationPayload {
            audience,
            title: title.clone(),
            body: explanation.clone(),
            priority,
        })
    };

    ThreatResponse {
        action,
        recommendation: assessment.recommendation,
        style,
        title,
        explanation,
        educational_content: ann.educational_content.clone(),
        guidance_steps: ann.guidance_steps.clone(),
        parental_notification: ann.parental_notification,
        family_notification: ann.family_notification,
        notification,
    }
}
