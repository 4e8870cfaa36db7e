use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

/// The 25 gestures the shipped model was trained on, by class index.
const STANDARD_LABELS: [&str; 25] = [
    "ぜろ",
    "いち",
    "に",
    "さん",
    "よん",
    "ご",
    "ろく",
    "なな",
    "はち",
    "きゅう",
    "ありがとう",
    "いいえ",
    "おはよう",
    "おめでとう",
    "おやすみ",
    "ごめんなさい",
    "こんにちわ",
    "こんばんわ",
    "さようなら",
    "すみません",
    "どういたしまして",
    "はい",
    "はじめまして",
    "またね",
    "もしもし",
];

/// Closed label set: label string <-> class index.
///
/// Indices need not be dense. An index without a label is a decode failure at
/// prediction time, not a construction error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelVocabulary {
    by_index: BTreeMap<usize, String>,
}

impl LabelVocabulary {
    pub fn standard() -> Self {
        Self {
            by_index: STANDARD_LABELS
                .iter()
                .enumerate()
                .map(|(i, label)| (i, label.to_string()))
                .collect(),
        }
    }

    /// Dense vocabulary: the label at position i maps to class i.
    pub fn from_ordered<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(
            labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| (label.into(), i)),
        )
    }

    /// Explicit `(label, index)` pairs. Labels and indices must both be unique.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut by_index = BTreeMap::new();
        for (label, index) in entries {
            let label = label.into();
            if label.trim().is_empty() {
                return Err(anyhow!("label for class {} is empty", index));
            }
            if by_index.values().any(|existing| existing == &label) {
                return Err(anyhow!("duplicate label '{}'", label));
            }
            if by_index.insert(index, label).is_some() {
                return Err(anyhow!("duplicate class index {}", index));
            }
        }
        if by_index.is_empty() {
            return Err(anyhow!("label vocabulary must not be empty"));
        }
        Ok(Self { by_index })
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.by_index
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(i, _)| *i)
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.by_index.iter().map(|(i, l)| (*i, l.as_str()))
    }
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::standard()
    }
}
