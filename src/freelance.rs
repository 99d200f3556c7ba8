//! Typed requests for the tools the freelance server exposes.
//!
//! Each function builds a [`ToolCallRequest`] with the server's argument
//! names, its usual defaults and a failure label, so that
//! `client.call_tool(freelance::review_code("main.py", None))` reports
//! `Failed to review code: ...` when it goes wrong.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{call::ToolCallRequest, error::Result};

/// One entry of a profile's skill list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Skill {
    pub name: String,
    /// `beginner`, `intermediate`, `advanced` or `expert`.
    pub level: String,
    pub years_experience: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
}

impl Skill {
    pub fn new(name: impl Into<String>, level: impl Into<String>, years_experience: u32) -> Self {
        Self {
            name: name.into(),
            level: level.into(),
            years_experience,
            certifications: Vec::new(),
        }
    }
}

/// Arguments of `create_user_profile`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewProfile {
    pub name: String,
    pub title: String,
    #[serde(rename = "skills_data")]
    pub skills: Vec<Skill>,
    pub hourly_rate_min: f64,
    pub hourly_rate_max: f64,
    pub location: String,
    pub languages: Vec<String>,
}

pub fn create_user_profile(profile: &NewProfile) -> Result<ToolCallRequest> {
    Ok(ToolCallRequest::from_params("create_user_profile", profile)?
        .with_operation("create user profile"))
}

/// Empty platform lists are left out so the server searches everywhere.
pub fn search_gigs(
    skills: impl IntoIterator<Item = impl Into<String>>,
    max_budget: Option<f64>,
    platforms: Option<Vec<String>>,
) -> ToolCallRequest {
    let skills: Vec<String> = skills.into_iter().map(Into::into).collect();
    ToolCallRequest::new("search_gigs")
        .arg("skills", skills)
        .arg_opt("max_budget", max_budget)
        .arg_opt("platforms", platforms.filter(|p| !p.is_empty()))
        .with_operation("search gigs")
}

/// `review_type` defaults to `general`.
pub fn review_code(file_path: &str, review_type: Option<&str>) -> ToolCallRequest {
    ToolCallRequest::new("code_review")
        .arg("file_path", file_path)
        .arg("review_type", review_type.unwrap_or("general"))
        .with_operation("review code")
}

/// Asks for suggestions only (`fix_type: suggest`) with a backup, so the
/// server never rewrites the file unattended.
pub fn debug_code(file_path: &str, issue_description: &str) -> ToolCallRequest {
    ToolCallRequest::new("code_debug")
        .arg("file_path", file_path)
        .arg("issue_description", issue_description)
        .arg("fix_type", "suggest")
        .arg("backup", true)
        .with_operation("debug code")
}

pub fn generate_proposal(
    gig_id: &str,
    user_profile: &Map<String, Value>,
    tone: Option<&str>,
) -> ToolCallRequest {
    ToolCallRequest::new("generate_proposal")
        .arg("gig_id", gig_id)
        .arg("user_profile", user_profile.clone())
        .arg("tone", tone.unwrap_or("professional"))
        .arg("include_portfolio", true)
        .with_operation("generate proposal")
}

pub fn analyze_profile_fit(profile_data: &Map<String, Value>, gig_id: &str) -> ToolCallRequest {
    ToolCallRequest::new("analyze_profile_fit")
        .arg("profile_data", profile_data.clone())
        .arg("gig_id", gig_id)
        .with_operation("analyze profile fit")
}

pub fn negotiate_rate(
    current_rate: f64,
    target_rate: f64,
    justification_points: &[&str],
) -> ToolCallRequest {
    let points: Vec<Value> = justification_points.iter().map(|p| Value::from(*p)).collect();
    ToolCallRequest::new("negotiate_rate")
        .arg("current_rate", current_rate)
        .arg("target_rate", target_rate)
        .arg("project_complexity", "medium")
        .arg_opt("justification_points", (!points.is_empty()).then_some(points))
        .with_operation("negotiate rate")
}
