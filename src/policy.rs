//! Deterministic post-processing of model replies.
//!
//! Literal substring matching against a deny-list of disclaimer and
//! referral phrasings. Misses are expected; a classifier can replace
//! `DenyListFilter` behind the same trait.

use crate::config::prompt::PolicyConfig;

pub trait ResponsePolicy: Send + Sync {
    fn filter(&self, response: &str, user_name: Option<&str>) -> String;
}

#[derive(Debug, Clone)]
pub struct DenyListFilter {
    deny_list: Vec<String>,
    fallback_reply: String,
    empty_reply: String,
    anonymous_name: String,
}

impl DenyListFilter {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            deny_list: config.deny_list
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            fallback_reply: config.fallback_reply.clone(),
            empty_reply: config.empty_reply.clone(),
            anonymous_name: config.anonymous_name.clone(),
        }
    }

    pub fn is_denied(&self, text: &str) -> bool {
        self.deny_list.iter().any(|pattern| text.contains(pattern.as_str()))
    }

    fn fallback_for(&self, user_name: Option<&str>) -> String {
        let name = user_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.anonymous_name.as_str());
        self.fallback_reply.replace("{name}", name)
    }
}

impl ResponsePolicy for DenyListFilter {
    fn filter(&self, response: &str, user_name: Option<&str>) -> String {
        let filtered = if self.is_denied(response) {
            self.fallback_for(user_name)
        } else {
            response.to_string()
        };

        if filtered.trim().is_empty() {
            return self.empty_reply.clone();
        }
        filtered
    }
}
