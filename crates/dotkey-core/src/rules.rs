use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::models::{validate_command, validate_replacement, ExpansionRule};

/// Version the rules file must carry to be usable.
pub const RULES_FILE_VERSION: u32 = 1;

/// On-disk layout of the rules file. The file is owned by the rule-editing
/// layer; the engine only ever reads it.
#[derive(Serialize, Deserialize, Debug)]
pub struct RulesFile {
    pub version: u32,
    pub rules: Vec<ExpansionRule>,
}

/// Load rules from the given path.
///
/// A missing or empty file yields no rules. A version mismatch is treated as
/// "no usable rules" with a logged warning rather than an attempt to guess at
/// the format.
pub fn load_rules_file(path: &Path) -> Result<Vec<ExpansionRule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: RulesFile = serde_json::from_str(&content)?;
    if file.version != RULES_FILE_VERSION {
        warn!(
            found = file.version,
            expected = RULES_FILE_VERSION,
            "rules file version mismatch, ignoring rules"
        );
        return Ok(Vec::new());
    }

    Ok(file.rules)
}

/// An immutable snapshot of the active rules, keyed by lowercased command for
/// O(1) lookup on the keystroke path.
#[derive(Debug, Default)]
pub struct RuleTable {
    map: HashMap<String, ExpansionRule>,
}

impl RuleTable {
    /// Build a snapshot from a rule list, dropping invalid entries.
    ///
    /// Commands are unique at write time; if the store is ever found with a
    /// duplicate anyway, the most recently updated rule wins and the anomaly
    /// is logged.
    pub fn build(rules: Vec<ExpansionRule>) -> Self {
        let mut map: HashMap<String, ExpansionRule> = HashMap::with_capacity(rules.len());

        for rule in rules {
            if let Err(e) = validate_command(&rule.command) {
                warn!(rule_id = %rule.id, "skipping rule with invalid command: {}", e);
                continue;
            }
            if let Err(e) = validate_replacement(&rule.replacement_text) {
                warn!(rule_id = %rule.id, "skipping rule with invalid replacement: {}", e);
                continue;
            }

            let key = rule.normalized_command();
            match map.get(&key) {
                Some(existing) => {
                    warn!(command = %key, "duplicate command in rule store");
                    if rule.updated_at > existing.updated_at {
                        map.insert(key, rule);
                    }
                }
                None => {
                    map.insert(key, rule);
                }
            }
        }

        Self { map }
    }

    /// Case-insensitive exact lookup of a typed token.
    pub fn lookup(&self, token: &str) -> Option<&ExpansionRule> {
        self.map.get(&token.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
