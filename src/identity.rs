use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::record::{field, normalize_identifier, probe_bool, probe_str, sender_record};

pub const PROFESSIONAL_KEY_KEYWORDS: &[&str] = &["professional", "provider", "pro"];
pub const MAX_SCAN_DEPTH: usize = 3;

const PROFESSIONAL_ROLE_KEYWORDS: &[&str] = &["pro", "professional", "provider"];
const CLIENT_ROLE_KEYWORDS: &[&str] = &["client", "customer", "user"];

const MESSAGE_FLAG_KEYS: &[&str] = &["isFromProfessional", "fromProfessional", "fromPro", "isPro"];
const SENDER_FLAG_KEYS: &[&str] = &["isProfessional", "professional", "isPro"];
const SENDER_ROLE_KEYS: &[&str] = &["role", "type"];
const MESSAGE_ROLE_KEYS: &[&str] = &["senderRole", "role", "sender_type", "type"];
const PARTICIPANT_META_KEYS: &[&str] = &["participantsMeta", "participants_meta", "participantsInfo"];
const PARTICIPANT_FLAG_KEYS: &[&str] = &["is_professional", "isProfessional", "professional"];

/// Normalized identifiers believed to belong to professionals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfessionalIds {
    ids: BTreeSet<String>,
}

impl ProfessionalIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(professional_id: &str) -> Self {
        let mut ids = Self::new();
        if let Some(id) = normalize_identifier(&Value::String(professional_id.to_string())) {
            ids.ids.insert(id);
        }
        ids
    }

    pub fn insert(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn extend(&mut self, other: &ProfessionalIds) {
        self.ids.extend(other.ids.iter().cloned());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<String> for ProfessionalIds {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Professionals confirmed for a single conversation. Empty when the
/// conversation carries no role metadata of its own.
pub type ConversationScope = ProfessionalIds;

/// Decides who wrote a message when the schema gives no reliable foreign key.
///
/// Holds the identifiers learned so far for one computation; resolution
/// improves as more conversations and messages are scanned.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    known: ProfessionalIds,
}

impl IdentityResolver {
    pub fn new(seed: ProfessionalIds) -> Self {
        Self { known: seed }
    }

    pub fn known(&self) -> &ProfessionalIds {
        &self.known
    }

    /// Reads a conversation document. Only participant role metadata forms
    /// the conversation's own scope; identifiers found by the key scan go to
    /// the global set.
    pub fn learn_from_conversation(&mut self, conversation: &Value) -> ConversationScope {
        let scope = participant_meta_professionals(conversation);
        self.known.extend(&scope);
        for id in scan_professional_identifiers(conversation) {
            self.known.insert(id);
        }
        scope
    }

    pub fn learn_from_message(&mut self, message: &Value) {
        for id in scan_professional_identifiers(message) {
            self.known.insert(id);
        }
    }

    /// `Some(true)` for professional-authored, `Some(false)` for client,
    /// `None` when no heuristic is decisive.
    pub fn resolve(
        &self,
        message: &Value,
        sender_id: Option<&str>,
        scope: &ConversationScope,
    ) -> Option<bool> {
        let known = if scope.is_empty() { &self.known } else { scope };
        resolve_role(message, sender_id, known)
    }
}

pub fn resolve_role(message: &Value, sender_id: Option<&str>, known: &ProfessionalIds) -> Option<bool> {
    if !message.is_object() {
        return None;
    }

    if let Some(flag) = probe_bool(message, MESSAGE_FLAG_KEYS) {
        return Some(flag);
    }

    if let Some(sender) = sender_record(message) {
        if let Some(flag) = probe_bool(sender, SENDER_FLAG_KEYS) {
            return Some(flag);
        }
        if let Some(role) = probe_str(sender, SENDER_ROLE_KEYS).and_then(classify_role) {
            return Some(role);
        }
    }

    if let Some(role) = probe_str(message, MESSAGE_ROLE_KEYS).and_then(classify_role) {
        return Some(role);
    }

    let sender_id = sender_id?;
    if known.contains(sender_id) {
        return Some(true);
    }
    if !known.is_empty() {
        return Some(false);
    }
    None
}

pub fn classify_role(role: &str) -> Option<bool> {
    let role = role.to_lowercase();
    if PROFESSIONAL_ROLE_KEYWORDS.iter().any(|keyword| role.contains(keyword)) {
        return Some(true);
    }
    if CLIENT_ROLE_KEYWORDS.iter().any(|keyword| role.contains(keyword)) {
        return Some(false);
    }
    None
}

/// Participant ids flagged as professional in a `participantsMeta`-style map.
pub fn participant_meta_professionals(conversation: &Value) -> ProfessionalIds {
    let Some(meta) = PARTICIPANT_META_KEYS
        .iter()
        .filter_map(|key| field(conversation, key))
        .find_map(Value::as_object)
    else {
        return ProfessionalIds::new();
    };

    meta.iter()
        .filter(|(_, entry)| {
            PARTICIPANT_FLAG_KEYS
                .iter()
                .any(|key| entry.get(*key).and_then(Value::as_bool) == Some(true))
        })
        .filter_map(|(participant, _)| normalize_identifier(&Value::String(participant.clone())))
        .collect()
}

/// Collects identifiers stored under keys mentioning professional/provider/pro,
/// descending at most `MAX_SCAN_DEPTH` levels.
pub fn scan_professional_identifiers(document: &Value) -> Vec<String> {
    let mut found: BTreeSet<String> = BTreeSet::new();
    let mut visited: HashSet<*const Value> = HashSet::new();
    let mut stack: Vec<(&Value, usize)> = vec![(document, 0)];

    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_SCAN_DEPTH || !visited.insert(node as *const Value) {
            continue;
        }
        match node {
            Value::Array(items) => {
                stack.extend(items.iter().map(|item| (item, depth + 1)));
            }
            Value::Object(map) => {
                for (key, value) in map {
                    let key = key.to_lowercase();
                    let matches = PROFESSIONAL_KEY_KEYWORDS
                        .iter()
                        .any(|keyword| key.contains(keyword));
                    if !matches {
                        if value.is_object() || value.is_array() {
                            stack.push((value, depth + 1));
                        }
                        continue;
                    }
                    match value {
                        Value::String(_) | Value::Number(_) => {
                            found.extend(normalize_identifier(value));
                        }
                        Value::Array(items) => {
                            found.extend(items.iter().filter_map(normalize_identifier));
                        }
                        Value::Object(_) => {
                            found.extend(normalize_identifier(value));
                            stack.push((value, depth + 1));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    found.into_iter().collect()
}
