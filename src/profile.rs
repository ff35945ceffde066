//
// profile.rs
// dicom-veil
//
// Per-session enable/override state over the dictionary, and its resolution into concrete codec actions.
//

use std::collections::BTreeMap;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::codec::{CodecAction, OperationType};
use crate::dictionary::{dictionary, ActionKind, TagKey};

const TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileEntry {
    pub enabled: bool,
    pub override_value: Option<String>,
}

/// User-adjustable layer over the static dictionary. Iterates in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationProfile {
    entries: BTreeMap<TagKey, ProfileEntry>,
}

impl Default for AnonymizationProfile {
    fn default() -> Self {
        Self::for_keys(&[])
    }
}

impl AnonymizationProfile {
    /// Profile over `keys` (or the whole catalog when empty) with the default enable state.
    pub fn for_keys(keys: &[TagKey]) -> Self {
        let entries = dictionary(Some(keys))
            .into_iter()
            .map(|descriptor| {
                let enabled = matches!(
                    descriptor.action,
                    ActionKind::Dummy | ActionKind::ZeroOrDummy | ActionKind::Remove
                );
                (
                    descriptor.key,
                    ProfileEntry {
                        enabled,
                        override_value: None,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn entry(&self, key: TagKey) -> Option<&ProfileEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (TagKey, &ProfileEntry)> {
        self.entries.iter().map(|(key, entry)| (*key, entry))
    }

    pub fn set_enabled(&mut self, key: TagKey, enabled: bool) {
        self.entries.entry(key).or_default().enabled = enabled;
    }

    pub fn toggle(&mut self, key: TagKey) {
        let entry = self.entries.entry(key).or_default();
        entry.enabled = !entry.enabled;
    }

    /// Sets (or clears, with `None`) the replacement value for a field.
    pub fn set_override(&mut self, key: TagKey, value: Option<String>) {
        self.entries.entry(key).or_default().override_value = value;
    }
}

/// What the codec should do with one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAction {
    pub key: TagKey,
    pub group: u16,
    pub element: u16,
    pub operation: Operation,
    pub value: Option<String>,
}

impl ResolvedAction {
    /// Wire form: the numeric address replaces the symbolic key.
    pub fn to_codec_action(&self) -> CodecAction {
        let operationtype = match self.operation {
            Operation::Update => OperationType::Update,
            Operation::Delete => OperationType::Delete,
        };
        CodecAction {
            group: self.group,
            element: self.element,
            operationtype,
            value: self.value.clone().unwrap_or_default(),
        }
    }
}

pub fn to_codec_actions(actions: &[ResolvedAction]) -> Vec<CodecAction> {
    actions.iter().map(ResolvedAction::to_codec_action).collect()
}

/// Source of short opaque replacement tokens.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    rng: StdRng,
}

impl TokenGenerator {
    /// Reproducible sequence for a pinned seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect::<String>()
            .to_uppercase()
    }
}

/// Turns a profile into the ordered action list for one run.
///
/// Disabled entries are dropped. `REMOVE` entries always delete, ignoring overrides.
/// `DUMMY`/`ZERO_OR_DUMMY` entries update with the non-empty override, or a fresh
/// token from `random_token` otherwise.
pub fn resolve<F>(profile: &AnonymizationProfile, mut random_token: F) -> Vec<ResolvedAction>
where
    F: FnMut() -> String,
{
    profile
        .entries()
        .filter(|(_, entry)| entry.enabled)
        .filter_map(|(key, entry)| {
            let descriptor = key.descriptor();
            let (operation, value) = match descriptor.action {
                ActionKind::Remove => (Operation::Delete, None),
                ActionKind::Dummy | ActionKind::ZeroOrDummy => {
                    let value = entry
                        .override_value
                        .as_deref()
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(&mut random_token);
                    (Operation::Update, Some(value))
                }
                ActionKind::Keep | ActionKind::Clean | ActionKind::Unique => return None,
            };
            Some(ResolvedAction {
                key,
                group: descriptor.group,
                element: descriptor.element,
                operation,
                value,
            })
        })
        .collect()
}
