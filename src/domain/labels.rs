//! Class index to tissue label mapping.
//!
//! The order of the table is the label encoding used at training time. Nothing
//! in a checkpoint records that encoding, so the table is configuration that
//! must ship alongside each checkpoint.

use std::borrow::Cow;
use std::fmt;

/// The eight colorectal tissue classes, in training index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TissueClass {
    /// Adipose tissue
    Adi,
    /// Debris
    Deb,
    /// Lymphocytes
    Lym,
    /// Mucus
    Muc,
    /// Smooth muscle
    Mus,
    /// Normal colon mucosa
    Nor,
    /// Cancer-associated stroma
    Str,
    /// Colorectal adenocarcinoma epithelium
    Tum,
}

impl TissueClass {
    /// All classes ordered by their integer index.
    pub const ALL: [TissueClass; 8] = [
        TissueClass::Adi,
        TissueClass::Deb,
        TissueClass::Lym,
        TissueClass::Muc,
        TissueClass::Mus,
        TissueClass::Nor,
        TissueClass::Str,
        TissueClass::Tum,
    ];

    /// Returns the class bound to `index`, if any.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the integer index of the class.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the three-letter tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TissueClass::Adi => "ADI",
            TissueClass::Deb => "DEB",
            TissueClass::Lym => "LYM",
            TissueClass::Muc => "MUC",
            TissueClass::Mus => "MUS",
            TissueClass::Nor => "NOR",
            TissueClass::Str => "STR",
            TissueClass::Tum => "TUM",
        }
    }
}

impl fmt::Display for TissueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the default label table as owned strings.
pub fn default_labels() -> Vec<String> {
    TissueClass::ALL
        .iter()
        .map(|class| class.as_str().to_string())
        .collect()
}

/// Lookup table from predicted class index to symbolic label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Creates a table from labels in training index order.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolves `index` to its label.
    ///
    /// Indices outside the table resolve to the decimal form of the index
    /// rather than failing.
    pub fn lookup(&self, index: usize) -> Cow<'_, str> {
        match self.labels.get(index) {
            Some(label) => Cow::Borrowed(label.as_str()),
            None => Cow::Owned(index.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(default_labels())
    }
}
