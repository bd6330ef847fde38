//! Side-by-side comparison of two history entries.
//!
//! [`CompareSelector`] tracks which entries are marked for comparison (at
//! most [`COMPARE_LIMIT`]). [`ComparisonSummary`] condenses two results into
//! the figures shown next to each other: risk, attachment, average emotion
//! per channel, and the defense mechanisms each one shows.

use serde::Serialize;

use crate::models::{AnalysisResult, EmotionPoint, HistoryItem, RiskLevel};

/// Maximum number of entries compared at once.
pub const COMPARE_LIMIT: usize = 2;

/// Result of [`CompareSelector::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Selection already full; nothing changed. The caller should tell the
    /// user rather than silently queueing.
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct CompareSelector {
    selected: Vec<HistoryItem>,
}

impl CompareSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, item: &HistoryItem) -> ToggleOutcome {
        if let Some(pos) = self.selected.iter().position(|i| i.id == item.id) {
            self.selected.remove(pos);
            return ToggleOutcome::Removed;
        }
        if self.selected.len() >= COMPARE_LIMIT {
            return ToggleOutcome::Full;
        }
        self.selected.push(item.clone());
        ToggleOutcome::Added
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn can_start_comparison(&self) -> bool {
        self.selected.len() == COMPARE_LIMIT
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.iter().any(|i| i.id == id)
    }

    /// Selected entries in selection order.
    pub fn items(&self) -> &[HistoryItem] {
        &self.selected
    }

    pub fn ids(&self) -> Vec<String> {
        self.selected.iter().map(|i| i.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Mean of each emotion channel over a trend.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EmotionAverages {
    pub happiness: f64,
    pub sadness: f64,
    pub anger: f64,
    pub anxiety: f64,
}

impl EmotionAverages {
    /// An empty trend averages to zero on every channel.
    pub fn from_trend(trend: &[EmotionPoint]) -> Self {
        let n = trend.len().max(1) as f64;
        let sum = |f: fn(&EmotionPoint) -> f64| trend.iter().map(f).sum::<f64>() / n;
        Self {
            happiness: sum(|p| p.happiness),
            sadness: sum(|p| p.sadness),
            anger: sum(|p| p.anger),
            anxiety: sum(|p| p.anxiety),
        }
    }
}

/// One side of a [`ComparisonSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct ComparedEntry {
    pub id: String,
    pub timestamp: i64,
    pub summary: String,
    pub risk_level: RiskLevel,
    pub attachment_style: String,
    pub attachment_confidence: f64,
    pub emotions: EmotionAverages,
    pub defense_mechanisms: Vec<String>,
    pub user_rating: i32,
}

impl ComparedEntry {
    fn from_item(item: &HistoryItem) -> Self {
        let data: &AnalysisResult = &item.data;
        Self {
            id: item.id.clone(),
            timestamp: item.timestamp,
            summary: item.summary.clone(),
            risk_level: data.risk_level,
            attachment_style: data.attachment_profile.style.clone(),
            attachment_confidence: data.attachment_profile.confidence,
            emotions: EmotionAverages::from_trend(&data.emotion_trend),
            defense_mechanisms: data
                .defense_mechanisms
                .iter()
                .map(|d| d.name.clone())
                .collect(),
            user_rating: item.user_rating,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSummary {
    pub a: ComparedEntry,
    pub b: ComparedEntry,
    /// Defense mechanisms named in both analyses.
    pub shared_defenses: Vec<String>,
}

impl ComparisonSummary {
    pub fn build(a: &HistoryItem, b: &HistoryItem) -> Self {
        let a = ComparedEntry::from_item(a);
        let b = ComparedEntry::from_item(b);
        let shared_defenses = a
            .defense_mechanisms
            .iter()
            .filter(|name| {
                b.defense_mechanisms
                    .iter()
                    .any(|other| other.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        Self {
            a,
            b,
            shared_defenses,
        }
    }

    /// Build from a selector holding exactly two entries.
    pub fn from_selection(selector: &CompareSelector) -> Option<Self> {
        match selector.items() {
            [a, b] => Some(Self::build(a, b)),
            _ => None,
        }
    }
}
