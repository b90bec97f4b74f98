//! Pattern-based authenticity analysis of target profiles.
//!
//! The analyzer starts every profile at full authenticity and subtracts a
//! fixed penalty per suspicious trait. Bot likelihood is the complement.

use crate::signal::{AuthenticitySignal, SignalError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use seed_types::{Clock, Platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

static BOT_USERNAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^[a-z]+\d{4,8}$",
        r"^user\d+$",
        r"^\w+_\d+$",
        r"^[a-z]{8,12}\d{2,4}$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static username pattern"))
    .collect()
});

const BIO_BOT_INDICATORS: &[&str] = &[
    "dm for promo",
    "follow for follow",
    "f4f",
    "l4l",
    "click link",
    "free followers",
    "bot",
    "automation",
    "crypto",
    "investment opportunity",
    "make money fast",
];

const MAX_FOLLOW_RATIO: f64 = 10.0;
const PERFECT_ENGAGEMENT: f64 = 0.95;
const ZERO_ENGAGEMENT: f64 = 0.001;
const NEW_ACCOUNT_DAYS: i64 = 7;

/// Public profile data of a target account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
    #[serde(default)]
    pub posts: u64,
    #[serde(default)]
    pub engagement_rate: f64,
    #[serde(default)]
    pub has_profile_picture: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticityLevel {
    Genuine,
    LikelyGenuine,
    Suspicious,
    LikelyBot,
    DefiniteBot,
}

impl AuthenticityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            AuthenticityLevel::Genuine
        } else if score >= 0.6 {
            AuthenticityLevel::LikelyGenuine
        } else if score >= 0.3 {
            AuthenticityLevel::Suspicious
        } else if score >= 0.1 {
            AuthenticityLevel::LikelyBot
        } else {
            AuthenticityLevel::DefiniteBot
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityReport {
    pub authenticity_score: f64,
    pub bot_likelihood: f64,
    pub level: AuthenticityLevel,
    pub red_flags: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicAuthenticityAnalyzer;

impl HeuristicAuthenticityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score a profile as of `now`.
    pub fn analyze(&self, profile: &ProfileSnapshot, now: DateTime<Utc>) -> AuthenticityReport {
        let mut score: f64 = 1.0;
        let mut red_flags = Vec::new();

        if username_score(&profile.username) < 0.5 {
            score -= 0.2;
            red_flags.push(format!("suspicious username pattern: {}", profile.username));
        }

        let bio = profile.bio.to_lowercase();
        let indicators = BIO_BOT_INDICATORS
            .iter()
            .filter(|indicator| bio.contains(*indicator))
            .count();
        if indicators > 0 {
            score -= (indicators as f64 * 0.1).min(0.3);
            red_flags.push(format!("bot-like bio content ({indicators} indicators)"));
        }

        if profile.followers > 0 {
            let ratio = profile.following as f64 / profile.followers as f64;
            if ratio > MAX_FOLLOW_RATIO {
                score -= 0.3;
                red_flags.push(format!("suspicious follow ratio: {ratio:.1}"));
            }
        }

        if profile.followers > 1000 && profile.posts == 0 {
            score -= 0.4;
            red_flags.push("high followers but zero posts".to_string());
        }

        if profile.engagement_rate > PERFECT_ENGAGEMENT {
            score -= 0.2;
            red_flags.push(format!(
                "suspiciously high engagement: {:.2}%",
                profile.engagement_rate * 100.0
            ));
        } else if profile.engagement_rate < ZERO_ENGAGEMENT && profile.followers > 100 {
            score -= 0.3;
            red_flags.push(format!(
                "suspiciously low engagement: {:.2}%",
                profile.engagement_rate * 100.0
            ));
        }

        if !profile.has_profile_picture {
            score -= 0.1;
            red_flags.push("no profile picture".to_string());
        }

        if let Some(created_at) = profile.created_at {
            let age_days = (now - created_at).num_days();
            if age_days < NEW_ACCOUNT_DAYS {
                score -= 0.2;
                red_flags.push(format!("very new account ({age_days} days)"));
            }
        }

        let authenticity_score = score.max(0.0);
        AuthenticityReport {
            authenticity_score,
            bot_likelihood: 1.0 - authenticity_score,
            level: AuthenticityLevel::from_score(authenticity_score),
            red_flags,
        }
    }
}

fn username_score(username: &str) -> f64 {
    let lower = username.to_lowercase();
    if BOT_USERNAME_PATTERNS.iter().any(|re| re.is_match(&lower)) {
        return 0.3;
    }

    let length = username.chars().count();
    if length > 15 {
        return 0.6;
    }
    if username.matches('_').count() > 2 {
        return 0.5;
    }
    let digits = username.chars().filter(char::is_ascii_digit).count();
    if digits as f64 > length as f64 * 0.5 {
        return 0.4;
    }
    1.0
}

/// Where profile snapshots come from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(
        &self,
        target: &str,
        platform: Platform,
    ) -> Result<Option<ProfileSnapshot>, SignalError>;
}

/// Profile table kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<(Platform, String), ProfileSnapshot>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        platform: Platform,
        target: impl Into<String>,
        profile: ProfileSnapshot,
    ) -> Result<(), SignalError> {
        self.profiles
            .write()
            .map_err(|_| SignalError::Unavailable("profile lock poisoned".into()))?
            .insert((platform, target.into()), profile);
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for InMemoryProfiles {
    async fn profile(
        &self,
        target: &str,
        platform: Platform,
    ) -> Result<Option<ProfileSnapshot>, SignalError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| SignalError::Unavailable("profile lock poisoned".into()))?;
        Ok(profiles.get(&(platform, target.to_string())).cloned())
    }
}

/// Authenticity signal computed from fetched profiles.
pub struct ProfileSignal {
    source: Arc<dyn ProfileSource>,
    analyzer: HeuristicAuthenticityAnalyzer,
    clock: Arc<dyn Clock>,
}

impl ProfileSignal {
    pub fn new(source: Arc<dyn ProfileSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            analyzer: HeuristicAuthenticityAnalyzer::new(),
            clock,
        }
    }
}

#[async_trait]
impl AuthenticitySignal for ProfileSignal {
    async fn bot_likelihood(&self, target: &str, platform: Platform) -> Result<f64, SignalError> {
        let profile = self
            .source
            .profile(target, platform)
            .await?
            .ok_or_else(|| SignalError::UnknownTarget(target.to_string()))?;
        Ok(self
            .analyzer
            .analyze(&profile, self.clock.now())
            .bot_likelihood)
    }
}
