use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::enums::{AdministrationRoute, VaccineCode, YesNo};

/// One line of the PEV vaccination calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineEntry {
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub administration: BTreeSet<AdministrationRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<YesNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
}

/// Vaccination checklist, stored as one JSON blob per consultation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaccinationChecklist(pub BTreeMap<VaccineCode, VaccineEntry>);

impl VaccinationChecklist {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, code: VaccineCode) -> Option<&VaccineEntry> {
        self.0.get(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VaccineCode, &VaccineEntry)> {
        self.0.iter()
    }

    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored blob. A blob that is not a checklist (the "RAS"
    /// sentinel written for an empty step) reads back as an empty checklist.
    pub fn from_blob(blob: &str) -> Self {
        serde_json::from_str(blob).unwrap_or_default()
    }
}
