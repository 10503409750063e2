//! Declarative sensitivity rules for record fields.
//!
//! A [`RuleTable`] answers one question: given a record type and a field name,
//! which [`DataClassification`] (if any) should the field be encrypted under?
//!
//! Two kinds of rules are consulted and the highest classification wins:
//!
//! - **Allow-lists** keyed by record type (`user`, `payment`, ...), naming
//!   fields explicitly.
//! - **Fragments** matched anywhere in a field name, whatever the record type.
//! - **Suffixes** matched against the trailing words of a field name. Words
//!   are split at `_`, `-` and camelCase humps, so the suffix `key` matches
//!   `sshKey` and `master_key` but not `monkey` or `keyboardLayout`.
//!
//! Field names and rule keys are compared in normalized form: lowercase with
//! `_` and `-` removed, so `api_key`, `API-Key` and `apiKey` are the same name.
//!
//! # File format
//!
//! ```yaml
//! fragments:
//!   - fragment: password
//!     classification: restricted
//! suffixes:
//!   - suffix: key
//!     classification: restricted
//! recordTypes:
//!   user:
//!     email: confidential
//! ```
//!
//! The same shape is accepted as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use common::DataClassification;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a rule table.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rule table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither the YAML nor the JSON parser accepted the input.
    #[error("invalid rule table: {0}")]
    Parse(String),

    /// A fragment or suffix normalizes to the empty string and would match
    /// every field.
    #[error("rule table contains an empty fragment or suffix")]
    EmptyFragment,
}

/// Field-name fragment that marks a field as sensitive in any record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRule {
    pub fragment: String,
    pub classification: DataClassification,
}

impl FragmentRule {
    fn new(fragment: &str, classification: DataClassification) -> Self {
        Self {
            fragment: fragment.to_owned(),
            classification,
        }
    }
}

/// Trailing word (or words) of a field name that marks it as sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub classification: DataClassification,
}

/// Fragment and suffix rules plus per-record-type allow-lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTable {
    #[serde(default)]
    pub fragments: Vec<FragmentRule>,
    #[serde(default)]
    pub suffixes: Vec<SuffixRule>,
    #[serde(default)]
    pub record_types: BTreeMap<String, BTreeMap<String, DataClassification>>,
}

impl RuleTable {
    /// Rules shipped with the library.
    ///
    /// There is no bare `key` fragment. A trailing `key` word is caught by a
    /// suffix rule instead, so `sshKey` and `license_key` are encrypted while
    /// `keyboardLayout` and `monkey` stay in plaintext.
    pub fn builtin() -> Self {
        use DataClassification::{Confidential, Restricted};

        let fragments: Vec<FragmentRule> = [
            ("password", Restricted),
            ("passwd", Restricted),
            ("secret", Restricted),
            ("token", Restricted),
            ("credential", Restricted),
            ("apikey", Restricted),
            ("privatekey", Restricted),
            ("secretkey", Restricted),
            ("accesskey", Restricted),
            ("signingkey", Restricted),
            ("encryptionkey", Restricted),
            ("ssn", Restricted),
            ("socialsecurity", Restricted),
            ("taxid", Restricted),
            ("cardnumber", Restricted),
            ("cvv", Restricted),
            ("accountnumber", Confidential),
            ("routingnumber", Confidential),
            ("iban", Confidential),
            ("bank", Confidential),
        ]
        .into_iter()
        .map(|(f, c)| FragmentRule::new(f, c))
        .collect();

        let suffixes = vec![SuffixRule {
            suffix: "key".to_owned(),
            classification: Restricted,
        }];

        let record_types: BTreeMap<String, BTreeMap<String, DataClassification>> = [
            (
                "user",
                &[
                    ("email", Confidential),
                    ("phone", Confidential),
                    ("dateOfBirth", Confidential),
                    ("address", Confidential),
                ][..],
            ),
            (
                "client",
                &[
                    ("email", Confidential),
                    ("phone", Confidential),
                    ("address", Confidential),
                    ("contactName", Confidential),
                ][..],
            ),
            (
                "integration",
                &[
                    ("clientId", Confidential),
                    ("webhookUrl", Confidential),
                ][..],
            ),
            (
                "payment",
                &[
                    ("cardholderName", Confidential),
                    ("billingAddress", Confidential),
                    ("expiry", Restricted),
                ][..],
            ),
        ]
        .into_iter()
        .map(|(record_type, fields)| {
            let fields: BTreeMap<String, DataClassification> = fields
                .iter()
                .map(|(name, class)| ((*name).to_owned(), *class))
                .collect();
            (record_type.to_owned(), fields)
        })
        .collect();

        let mut table = Self {
            fragments,
            suffixes,
            record_types,
        };
        table.normalize();
        table
    }

    /// Parse a rule table from YAML, falling back to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Parse`] if neither format parses and
    /// [`RuleError::EmptyFragment`] if a fragment or suffix is blank.
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let mut table: RuleTable = match serde_yaml::from_str(text) {
            Ok(table) => table,
            Err(yaml_err) => serde_json::from_str(text)
                .map_err(|json_err| RuleError::Parse(format!("yaml: {yaml_err}; json: {json_err}")))?,
        };
        table.normalize();
        if table.fragments.iter().any(|rule| rule.fragment.is_empty())
            || table.suffixes.iter().any(|rule| rule.suffix.is_empty())
        {
            return Err(RuleError::EmptyFragment);
        }
        Ok(table)
    }

    /// Read and parse a rule table file.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Io`] if the file cannot be read, otherwise the
    /// errors of [`RuleTable::parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Classification for `field` in a record of type `record_type`, or `None`
    /// if the field is not sensitive.
    pub fn classify(&self, record_type: &str, field: &str) -> Option<DataClassification> {
        let words = words(field);
        let normalized = words.concat();
        let listed = self
            .record_types
            .get(&normalize(record_type))
            .and_then(|fields| fields.get(&normalized))
            .copied();
        let matched = self
            .fragments
            .iter()
            .filter(|rule| normalized.contains(rule.fragment.as_str()))
            .map(|rule| rule.classification)
            .max();
        let trailing = self
            .suffixes
            .iter()
            .filter(|rule| ends_with_words(&words, &rule.suffix))
            .map(|rule| rule.classification)
            .max();
        listed.max(matched).max(trailing)
    }

    /// Number of record types with an allow-list.
    pub fn record_type_count(&self) -> usize {
        self.record_types.len()
    }

    /// Rewrite every fragment, record type and field name into normalized
    /// form. Idempotent.
    pub fn normalize(&mut self) {
        for rule in &mut self.fragments {
            rule.fragment = normalize(&rule.fragment);
        }
        for rule in &mut self.suffixes {
            rule.suffix = normalize(&rule.suffix);
        }
        self.record_types = std::mem::take(&mut self.record_types)
            .into_iter()
            .map(|(record_type, fields)| {
                let fields: BTreeMap<String, DataClassification> = fields
                    .into_iter()
                    .map(|(name, class)| (normalize(&name), class))
                    .collect();
                (normalize(&record_type), fields)
            })
            .collect();
    }
}

/// Lowercase `name` and drop `_` and `-`.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a field name into lowercase words at `_`, `-` and camelCase humps.
///
/// `sshKey`, `SSH_KEY` and `ssh-key` all give `["ssh", "key"]`.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let hump = c.is_uppercase()
            && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
        if hump && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Whether the last one or more `words` spell out `suffix` (normalized).
fn ends_with_words(words: &[String], suffix: &str) -> bool {
    (0..words.len()).any(|start| words[start..].concat() == suffix)
}
