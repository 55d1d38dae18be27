//! Field store – the flat set of named strings a confirmation is built from.
//!
//! The set of fields is closed: every [`FieldName`] is always present in a
//! [`FieldSet`], and updates addressed to any other name are dropped.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the fixed, recognised receipt fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldName {
    TransactionId,
    DateTime,
    Amount,
    FromAccount,
    BeneficiaryName,
    BeneficiaryAccount,
    Purpose,
    Comments,
    Channel,
}

impl FieldName {
    /// All fields, in the order the form presents them.
    pub const ALL: [FieldName; 9] = [
        FieldName::TransactionId,
        FieldName::DateTime,
        FieldName::Amount,
        FieldName::FromAccount,
        FieldName::BeneficiaryName,
        FieldName::BeneficiaryAccount,
        FieldName::Purpose,
        FieldName::Comments,
        FieldName::Channel,
    ];

    /// The camelCase key used by the form, the template and JSON input.
    pub fn key(self) -> &'static str {
        match self {
            FieldName::TransactionId => "transactionId",
            FieldName::DateTime => "dateTime",
            FieldName::Amount => "amount",
            FieldName::FromAccount => "fromAccount",
            FieldName::BeneficiaryName => "beneficiaryName",
            FieldName::BeneficiaryAccount => "beneficiaryAccount",
            FieldName::Purpose => "purpose",
            FieldName::Comments => "comments",
            FieldName::Channel => "channel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldName::TransactionId => "Transaction ID",
            FieldName::DateTime => "Date & Time",
            FieldName::Amount => "Amount",
            FieldName::FromAccount => "From Account",
            FieldName::BeneficiaryName => "Beneficiary Name",
            FieldName::BeneficiaryAccount => "Beneficiary Account",
            FieldName::Purpose => "Purpose",
            FieldName::Comments => "Comments",
            FieldName::Channel => "Channel",
        }
    }

    /// Exact, case-sensitive key lookup.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }

    fn default_value(self) -> &'static str {
        match self {
            FieldName::TransactionId => "FT25290QX7LM",
            FieldName::DateTime => "17 Oct 2025, 03:42 PM",
            FieldName::Amount => "9,000",
            FieldName::FromAccount => "HBL 0123-45678901-03",
            FieldName::BeneficiaryName => "ST MEDIA (PRIV",
            FieldName::BeneficiaryAccount => "MEEZAN 0102-0105678934",
            FieldName::Purpose => "Bill Payment",
            FieldName::Comments => "Invoice 2291",
            FieldName::Channel => "HBL Mobile",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Complete mapping from every [`FieldName`] to its current string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    values: BTreeMap<FieldName, String>,
}

impl FieldSet {
    pub fn get(&self, name: FieldName) -> &str {
        self.values.get(&name).map(String::as_str).unwrap_or("")
    }

    /// Replace one value. Always succeeds since `name` is a known field.
    pub fn set(&mut self, name: FieldName, value: impl Into<String>) {
        self.values.insert(name, value.into());
    }

    /// Iterate fields in form order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        FieldName::ALL.iter().map(move |&f| (f, self.get(f)))
    }

    /// Parse a flat JSON object of `key: value` strings on top of the
    /// defaults. Unknown keys are ignored, missing keys keep their default.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        let mut set = Self::default();
        for (key, value) in raw {
            match FieldName::from_key(&key) {
                Some(name) => set.set(name, value),
                None => log::debug!("Ignoring unknown field '{key}'"),
            }
        }
        Ok(set)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self {
            values: FieldName::ALL
                .iter()
                .map(|&f| (f, f.default_value().to_string()))
                .collect(),
        }
    }
}

impl Serialize for FieldSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(FieldName::ALL.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name.key(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut set = Self::default();
        for (key, value) in raw {
            if let Some(name) = FieldName::from_key(&key) {
                set.set(name, value);
            }
        }
        Ok(set)
    }
}

/// Session-lifetime owner of the current [`FieldSet`].
///
/// Every accepted update bumps [`FieldStore::revision`], which the preview
/// side compares against the revision it last rendered.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    fields: FieldSet,
    revision: u64,
}

impl FieldStore {
    pub fn new(fields: FieldSet) -> Self {
        Self {
            fields,
            revision: 0,
        }
    }

    pub fn get(&self) -> &FieldSet {
        &self.fields
    }

    /// Update a field by its key. Unknown keys are a silent no-op; the return
    /// value tells the caller whether a re-render is due.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match FieldName::from_key(key) {
            Some(name) => {
                self.fields.set(name, value);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
