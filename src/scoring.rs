use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Perspective {
    Financial,
    Customer,
    #[serde(rename = "Internal Business Processes")]
    InternalBusinessProcesses,
    #[serde(rename = "Learning & Growth")]
    LearningAndGrowth,
}

impl Perspective {
    pub const ALL: [Perspective; 4] = [
        Perspective::Financial,
        Perspective::Customer,
        Perspective::InternalBusinessProcesses,
        Perspective::LearningAndGrowth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Perspective::Financial => "Financial",
            Perspective::Customer => "Customer",
            Perspective::InternalBusinessProcesses => "Internal Business Processes",
            Perspective::LearningAndGrowth => "Learning & Growth",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            Perspective::Financial => "Grow Revenue / Manage Costs",
            Perspective::Customer => "Retain Profitable Business / Satisfy Customer",
            Perspective::InternalBusinessProcesses => "Comply with SHEQ / Improve Efficiencies",
            Perspective::LearningAndGrowth => "Develop Staff Competencies / Increase Engagement",
        }
    }

    /// Form field suffix, also used as the folder name for evidence files.
    pub fn key(&self) -> &'static str {
        match self {
            Perspective::Financial => "financial",
            Perspective::Customer => "customer",
            Perspective::InternalBusinessProcesses => "internal",
            Perspective::LearningAndGrowth => "learning",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    pub fn weight(&self) -> f64 {
        0.25
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    #[serde(rename = "Extra Mile (Verified)")]
    ExtraMile,
    #[serde(rename = "Standard Performance")]
    Standard,
    #[serde(rename = "No Data")]
    NoData,
}

impl Rating {
    pub fn label(&self) -> &'static str {
        match self {
            Rating::ExtraMile => "Extra Mile (Verified)",
            Rating::Standard => "Standard Performance",
            Rating::NoData => "No Data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerspectiveScore {
    pub perspective: Perspective,
    pub action: String,
    pub evidence_count: usize,
    pub rating: Rating,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub perspectives: Vec<PerspectiveScore>,
    pub total: f64,
}

impl ScoreCard {
    pub fn get(&self, perspective: Perspective) -> Option<&PerspectiveScore> {
        self.perspectives.iter().find(|p| p.perspective == perspective)
    }

    pub fn score(&self, perspective: Perspective) -> f64 {
        self.get(perspective).map_or(0.0, |p| p.score)
    }

    pub fn action(&self, perspective: Perspective) -> &str {
        self.get(perspective).map_or("", |p| p.action.as_str())
    }
}

/// Scores the narrative as written. Length counts characters, and any
/// non-empty text, whitespace included, counts as an action.
pub fn score_perspective(perspective: Perspective, action: &str, evidence_count: usize) -> PerspectiveScore {
    let base = if action.chars().count() > 100 { 70.0 } else { 40.0 };

    let (rating, score) = if !action.is_empty() && evidence_count >= 2 {
        (Rating::ExtraMile, f64::min(base + 20.0, 100.0))
    } else if !action.is_empty() {
        (Rating::Standard, base)
    } else {
        (Rating::NoData, 0.0)
    };

    PerspectiveScore {
        perspective,
        action: action.to_string(),
        evidence_count,
        rating,
        score,
    }
}

/// Scores every perspective; missing entries count as "No Data".
pub fn score_submission(entries: &[(Perspective, String, usize)]) -> ScoreCard {
    let perspectives: Vec<PerspectiveScore> = Perspective::ALL
        .into_iter()
        .map(|p| {
            entries
                .iter()
                .find(|(ep, _, _)| *ep == p)
                .map(|(_, action, files)| score_perspective(p, action, *files))
                .unwrap_or_else(|| score_perspective(p, "", 0))
        })
        .collect();

    let weighted: f64 = perspectives
        .iter()
        .map(|s| s.score * s.perspective.weight())
        .sum();

    ScoreCard {
        perspectives,
        total: (weighted * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_action_with_evidence_is_extra_mile() {
        let action = "x".repeat(101);
        let s = score_perspective(Perspective::Financial, &action, 2);
        assert_eq!(s.rating, Rating::ExtraMile);
        assert_eq!(s.score, 90.0);
    }

    #[test]
    fn short_action_with_evidence_gets_bonus_on_low_base() {
        let s = score_perspective(Perspective::Customer, "Won a tender", 3);
        assert_eq!(s.rating, Rating::ExtraMile);
        assert_eq!(s.score, 60.0);
    }

    #[test]
    fn action_without_enough_evidence_is_standard() {
        let s = score_perspective(Perspective::Customer, &"y".repeat(150), 1);
        assert_eq!(s.rating, Rating::Standard);
        assert_eq!(s.score, 70.0);
    }

    #[test]
    fn empty_action_is_no_data_even_with_files() {
        let s = score_perspective(Perspective::LearningAndGrowth, "", 5);
        assert_eq!(s.rating, Rating::NoData);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn whitespace_action_is_scored_as_written() {
        let s = score_perspective(Perspective::Customer, "   ", 0);
        assert_eq!(s.rating, Rating::Standard);
        assert_eq!(s.score, 40.0);
        assert_eq!(s.action, "   ");

        let padded = format!("{}{}", "x".repeat(95), "\n".repeat(6));
        let s = score_perspective(Perspective::Customer, &padded, 0);
        assert_eq!(s.score, 70.0);
        assert_eq!(s.action, padded);
    }

    #[test]
    fn total_is_equally_weighted() {
        let card = score_submission(&[
            (Perspective::Financial, "a".repeat(120), 2),
            (Perspective::Customer, "short".into(), 0),
            (Perspective::InternalBusinessProcesses, "b".repeat(120), 0),
        ]);
        assert_eq!(card.perspectives.len(), 4);
        assert_eq!(card.score(Perspective::LearningAndGrowth), 0.0);
        // (90 + 40 + 70 + 0) / 4
        assert_eq!(card.total, 50.0);
    }

    #[test]
    fn keys_round_trip() {
        for p in Perspective::ALL {
            assert_eq!(Perspective::from_key(p.key()), Some(p));
        }
        assert_eq!(Perspective::from_key("marketing"), None);
    }
}
