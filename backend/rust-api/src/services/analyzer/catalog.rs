use std::collections::HashMap;

use crate::models::{Finding, Severity};

use super::{names, rules, syntax, RuleContext, INPUT_TOO_LARGE};

/// Bumped whenever a rule is added, removed or re-ranked.
pub const CATALOG_VERSION: &str = "2024.1";

/// Rank shared by syntax errors and oversize input: always shown first.
pub const BLOCKING_RANK: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMeta {
    pub id: &'static str,
    /// Category tag written into `Finding::kind`.
    pub kind: &'static str,
    pub severity: Severity,
    /// Lower ranks are shown first.
    pub rank: u8,
    /// What a learner should study when this rule fires.
    pub concept: &'static str,
}

pub trait Rule: Send + Sync {
    fn meta(&self) -> &'static RuleMeta;

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding>;
}

pub struct RuleCatalog {
    version: &'static str,
    rules: Vec<Box<dyn Rule>>,
}

impl RuleCatalog {
    pub fn standard() -> Self {
        Self {
            version: CATALOG_VERSION,
            rules: vec![
                Box::new(names::UndefinedName),
                Box::new(rules::ZeroDivision),
                Box::new(rules::IterateInt),
                Box::new(rules::OffByOne),
                Box::new(rules::MutableDefault),
                Box::new(rules::BareExcept),
                Box::new(rules::IdentityLiteral),
                Box::new(names::ShadowedBuiltin),
                Box::new(rules::NoneEquality),
                Box::new(names::UnusedVariable),
            ],
        }
    }

    /// Drops rules whose id is listed. Unknown ids are logged and ignored.
    pub fn without(mut self, disabled: &[String]) -> Self {
        for id in disabled {
            if !self.rules.iter().any(|rule| rule.meta().id == id) {
                tracing::warn!("Unknown rule id in disabled list: {}", id);
            }
        }
        self.rules
            .retain(|rule| !disabled.iter().any(|id| id == rule.meta().id));
        self
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|rule| rule.as_ref())
    }

    pub fn meta_for_kind(&self, kind: &str) -> Option<&'static RuleMeta> {
        self.rules
            .iter()
            .map(|rule| rule.meta())
            .find(|meta| meta.kind == kind)
    }

    /// Rank lookup used by the ranker. Covers every rule in the catalog plus
    /// the blocking categories.
    pub fn severity_table(&self) -> SeverityTable {
        let mut ranks = HashMap::new();
        ranks.insert(syntax::SYNTAX_ERROR.to_string(), BLOCKING_RANK);
        ranks.insert(INPUT_TOO_LARGE.to_string(), BLOCKING_RANK);
        for rule in &self.rules {
            let meta = rule.meta();
            ranks.entry(meta.kind.to_string()).or_insert(meta.rank);
        }
        SeverityTable { ranks }
    }
}

#[derive(Debug, Clone)]
pub struct SeverityTable {
    ranks: HashMap<String, u8>,
}

impl SeverityTable {
    /// Unknown categories sort after every known one.
    pub fn rank(&self, kind: &str) -> u8 {
        self.ranks.get(kind).copied().unwrap_or(u8::MAX)
    }
}
