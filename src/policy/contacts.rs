//! Per-contact auto-send override lists.
//!
//! Each list is an ordered set of [`ContactPolicyEntry`]. The comma-joined
//! "flat" form older tools read is derived from the entries on demand.
//!
//! Identity rules:
//! - Contacts with at least [`STRONG_DIGITS_MIN`] digits are phone-like and
//!   identified by their digits. A national number with a trunk `0` equals
//!   its international form (`+61 412 345 678` and `0412345678` are the
//!   same number); anything else must match digit for digit.
//! - Everything else is identified by its label, case-insensitively.
//!
//! `matches` is looser than identity for label entries: a label matches any
//! contact string that contains it, unless the contact itself carries a
//! phone number, in which case only digits are compared.

use serde::{Deserialize, Serialize};

/// Minimum digit count for a contact to be matched by number.
pub const STRONG_DIGITS_MIN: usize = 7;

/// Which override list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    /// Never auto-send to these contacts.
    NeverAuto,
    /// Always auto-send to these contacts (except de-escalation drafts).
    AlwaysAuto,
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverAuto => write!(f, "never_auto"),
            Self::AlwaysAuto => write!(f, "always_auto"),
        }
    }
}

impl std::str::FromStr for ListKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never_auto" => Ok(Self::NeverAuto),
            "always_auto" => Ok(Self::AlwaysAuto),
            _ => Err(format!("Unknown list kind: {}", s)),
        }
    }
}

/// Reduce a contact string to its digit characters.
pub fn extract_digits(contact: &str) -> String {
    contact.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A national number needs this many digits after its trunk `0` before it is
/// matched against an international form.
const MIN_SIGNIFICANT_DIGITS: usize = 9;

/// Two-digit country calling codes. `1` and `7` are the only one-digit codes
/// and every other code has three digits; codes are prefix-free.
const TWO_DIGIT_COUNTRY_CODES: &[&str] = &[
    "20", "27", "30", "31", "32", "33", "34", "36", "39", "40", "41", "43", "44", "45", "46",
    "47", "48", "49", "51", "52", "53", "54", "55", "56", "57", "58", "60", "61", "62", "63",
    "64", "65", "66", "81", "82", "84", "86", "90", "91", "92", "93", "94", "95", "98",
];

fn country_code_len(international: &str) -> usize {
    match international.as_bytes().first() {
        Some(b'1' | b'7') => 1,
        _ if international
            .get(..2)
            .is_some_and(|prefix| TWO_DIGIT_COUNTRY_CODES.contains(&prefix)) =>
        {
            2
        }
        _ => 3,
    }
}

/// `0412345678` against `61412345678`: the trunk `0` is dropped and the
/// rest must follow the other number's country code exactly.
fn national_matches_international(national: &str, international: &str) -> bool {
    let Some(significant) = national.strip_prefix('0') else {
        return false;
    };
    if significant.len() < MIN_SIGNIFICANT_DIGITS
        || significant.starts_with('0')
        || international.starts_with('0')
    {
        return false;
    }
    international.get(country_code_len(international)..) == Some(significant)
}

/// Whether two digit strings denote the same phone number.
///
/// Numbers must be equal, after dropping a `00` international dialling
/// prefix. The one exception is a national number with a trunk `0`, which
/// equals the international form made of a country code plus the digits
/// after the `0`.
pub fn same_number(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a = a.strip_prefix("00").unwrap_or(a);
    let b = b.strip_prefix("00").unwrap_or(b);
    a == b || national_matches_international(a, b) || national_matches_international(b, a)
}

fn is_strong(digits: &str) -> bool {
    digits.len() >= STRONG_DIGITS_MIN
}

/// One contact on an override list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPolicyEntry {
    /// Digits-only form of the label; may be empty.
    pub canonical_digits: String,
    /// Contact as entered, trimmed.
    pub label: String,
    pub list_kind: ListKind,
}

impl ContactPolicyEntry {
    /// Build an entry from user input. Returns `None` for blank input.
    pub fn new(contact: &str, list_kind: ListKind) -> Option<Self> {
        let label = contact.trim();
        if label.is_empty() {
            return None;
        }
        Some(Self {
            canonical_digits: extract_digits(label),
            label: label.to_string(),
            list_kind,
        })
    }

    /// Digit-matchable entry.
    pub fn is_strong(&self) -> bool {
        is_strong(&self.canonical_digits)
    }

    /// Token used in the flat representation.
    pub fn token(&self) -> &str {
        if self.is_strong() {
            &self.canonical_digits
        } else {
            &self.label
        }
    }

    /// Human-readable form: `"label (digits)"` or just `label`.
    pub fn display(&self) -> String {
        if !self.canonical_digits.is_empty() && self.canonical_digits != self.label {
            format!("{} ({})", self.label, self.canonical_digits)
        } else {
            self.label.clone()
        }
    }

    /// Same contact as `label`/`digits` for insertion and removal purposes.
    fn same_identity(&self, label: &str, digits: &str) -> bool {
        if self.is_strong() && is_strong(digits) && same_number(&self.canonical_digits, digits) {
            return true;
        }
        self.label.to_lowercase() == label.to_lowercase()
    }
}

/// An ordered, duplicate-free override list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactList {
    kind: ListKind,
    entries: Vec<ContactPolicyEntry>,
}

impl ContactList {
    pub fn new(kind: ListKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Rebuild a list from stored entries, dropping blanks and duplicates.
    pub fn from_entries(kind: ListKind, entries: Vec<ContactPolicyEntry>) -> Self {
        let mut list = Self::new(kind);
        for entry in entries {
            list.insert(&entry.label);
        }
        list
    }

    /// Rebuild a list from the legacy comma-joined form.
    pub fn from_flat(kind: ListKind, flat: &str) -> Self {
        let mut list = Self::new(kind);
        for token in flat.split(',') {
            list.insert(token);
        }
        list
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn entries(&self) -> &[ContactPolicyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a contact. Returns `false` when blank or already present.
    pub fn insert(&mut self, contact: &str) -> bool {
        let Some(entry) = ContactPolicyEntry::new(contact, self.kind) else {
            return false;
        };
        if self
            .entries
            .iter()
            .any(|e| e.same_identity(&entry.label, &entry.canonical_digits))
        {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove every entry with the same identity as `contact`.
    /// Returns the number of entries removed.
    pub fn remove(&mut self, contact: &str) -> usize {
        let label = contact.trim();
        if label.is_empty() {
            return 0;
        }
        let digits = extract_digits(label);
        let before = self.entries.len();
        self.entries.retain(|e| !e.same_identity(label, &digits));
        before - self.entries.len()
    }

    /// Whether `contact` is covered by this list.
    pub fn matches(&self, contact: &str) -> bool {
        let digits = extract_digits(contact);
        if is_strong(&digits) {
            return self
                .entries
                .iter()
                .any(|e| e.is_strong() && same_number(&e.canonical_digits, &digits));
        }

        let lowered = contact.to_lowercase();
        self.entries
            .iter()
            .any(|e| lowered.contains(&e.label.to_lowercase()))
    }

    /// Entries rendered for display, joined by `", "`.
    pub fn display(&self) -> String {
        self.entries
            .iter()
            .map(ContactPolicyEntry::display)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Legacy flat form: canonical tokens joined by `","`.
    pub fn flat(&self) -> String {
        self.entries
            .iter()
            .map(ContactPolicyEntry::token)
            .collect::<Vec<_>>()
            .join(",")
    }
}
