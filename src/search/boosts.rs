//! Heuristic boost rules applied after fusion.
//!
//! Each rule is independent: it looks at the analyzed query and one chunk and
//! may contribute an additive bonus together with a reason. Rules run in the
//! order they were registered.
use crate::config::BoostConfig;
use crate::indexer::languages::{LanguageConfig, LanguageFamily};
use crate::search::query::QueryAnalysis;
use crate::types::Chunk;

/// Contribution of one rule to one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Boost {
    pub rule: &'static str,
    pub score: f64,
    pub reason: String,
}

pub trait BoostRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, analysis: &QueryAnalysis, chunk: &Chunk) -> Option<Boost>;

    /// Files whose chunks must be considered even without any signal.
    fn pinned_files(&self) -> &[String] {
        &[]
    }
}

/// Bonus per quoted phrase found verbatim (case-insensitive) in the chunk.
pub struct QuotedTextBoost {
    pub bonus: f64,
}

impl BoostRule for QuotedTextBoost {
    fn name(&self) -> &'static str {
        "quoted_text"
    }

    fn apply(&self, analysis: &QueryAnalysis, chunk: &Chunk) -> Option<Boost> {
        if analysis.phrases.is_empty() {
            return None;
        }
        let content = chunk.content.to_lowercase();
        let found: Vec<&str> = analysis
            .phrases
            .iter()
            .filter(|p| content.contains(&p.to_lowercase()))
            .map(String::as_str)
            .collect();
        if found.is_empty() {
            return None;
        }
        Some(Boost {
            rule: self.name(),
            score: self.bonus * found.len() as f64,
            reason: format!("exact text match ('{}')", found.join("', '")),
        })
    }
}

/// Bonus for markup files when the query reads as a UI change.
pub struct UiTaskBoost {
    pub bonus: f64,
}

impl BoostRule for UiTaskBoost {
    fn name(&self) -> &'static str {
        "ui_task"
    }

    fn apply(&self, analysis: &QueryAnalysis, chunk: &Chunk) -> Option<Boost> {
        if !analysis.ui_intent {
            return None;
        }
        let family = LanguageConfig::get_by_name(&chunk.language).map(|l| l.family);
        (family == Some(LanguageFamily::Markup)).then(|| Boost {
            rule: self.name(),
            score: self.bonus,
            reason: "UI file".to_string(),
        })
    }
}

/// Keeps root-level project manifests in every result set.
pub struct EssentialConfigBoost {
    pub bonus: f64,
    pub manifests: Vec<String>,
}

impl BoostRule for EssentialConfigBoost {
    fn name(&self) -> &'static str {
        "essential_config"
    }

    fn apply(&self, _analysis: &QueryAnalysis, chunk: &Chunk) -> Option<Boost> {
        self.manifests.contains(&chunk.file_path).then(|| Boost {
            rule: self.name(),
            score: self.bonus,
            reason: "essential project config".to_string(),
        })
    }

    fn pinned_files(&self) -> &[String] {
        &self.manifests
    }
}

/// Ordered list of boost rules.
pub struct BoostPipeline {
    rules: Vec<Box<dyn BoostRule>>,
}

impl BoostPipeline {
    pub fn new(rules: Vec<Box<dyn BoostRule>>) -> Self {
        Self { rules }
    }

    /// Quoted text, UI task, essential config; zero-valued rules are left out.
    pub fn from_config(config: &BoostConfig, manifests: &[String]) -> Self {
        let mut rules: Vec<Box<dyn BoostRule>> = Vec::new();
        if config.quoted_text > 0.0 {
            rules.push(Box::new(QuotedTextBoost {
                bonus: config.quoted_text,
            }));
        }
        if config.ui_markup > 0.0 {
            rules.push(Box::new(UiTaskBoost {
                bonus: config.ui_markup,
            }));
        }
        if config.essential_config > 0.0 && !manifests.is_empty() {
            rules.push(Box::new(EssentialConfigBoost {
                bonus: config.essential_config,
                manifests: manifests.to_vec(),
            }));
        }
        Self::new(rules)
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn pinned_files(&self) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|r| r.pinned_files().iter().cloned())
            .collect()
    }

    pub fn apply(&self, analysis: &QueryAnalysis, chunk: &Chunk) -> Vec<Boost> {
        self.rules
            .iter()
            .filter_map(|rule| rule.apply(analysis, chunk))
            .collect()
    }
}
