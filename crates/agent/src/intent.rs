use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    PremiumCalculation,
    PolicyComparison,
    DocumentRetrieval,
    ProductListing,
    PremiumAndComparison,
    ComplexQuery,
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PremiumCalculation => "PREMIUM_CALCULATION",
            Self::PolicyComparison => "POLICY_COMPARISON",
            Self::DocumentRetrieval => "DOCUMENT_RETRIEVAL",
            Self::ProductListing => "PRODUCT_LISTING",
            Self::PremiumAndComparison => "PREMIUM_AND_COMPARISON",
            Self::ComplexQuery => "COMPLEX_QUERY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    /// 0..=100.
    pub confidence: u8,
    pub reasoning: String,
}

/// Keywords pulled from a misclassified query, remembered for its actual intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub keywords: Vec<String>,
    pub has_question: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub predicted: Intent,
    pub actual: Intent,
    pub was_correct: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_classifications: usize,
    pub feedback_received: usize,
    pub early_accuracy: f64,
    pub recent_accuracy: f64,
    pub improvement: f64,
    pub patterns_learned: BTreeMap<Intent, usize>,
    pub actual_intents: BTreeMap<Intent, usize>,
}

const LISTING_PHRASES: [&str; 5] =
    ["list products", "which products", "what products", "available products", "products available"];
const PREMIUM_KEYWORDS: [&str; 4] = ["calculate", "premium", "cost", "price"];
const COMPARISON_KEYWORDS: [&str; 3] = ["compare", "difference", "better"];
const STOP_WORDS: [&str; 10] = ["the", "a", "an", "is", "are", "what", "how", "can", "does", "do"];
const PATTERN_KEYWORDS: usize = 5;
const PATTERN_BOOST: u8 = 15;
/// Feedback window compared for the early/recent accuracy figures.
const ACCURACY_WINDOW: usize = 10;

#[derive(Default)]
struct LearningState {
    classifications: usize,
    feedback: Vec<Feedback>,
    patterns: BTreeMap<Intent, Vec<LearnedPattern>>,
}

/// Rule-based intent classifier that reinforces its confidence with patterns
/// learned from misclassifications.
#[derive(Default)]
pub struct IntentClassifier {
    state: Mutex<LearningState>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, query: &str) -> Classification {
        let normalized = query.to_lowercase();
        let mut classification = keyword_classification(&normalized);

        let mut state = self.lock_state();
        state.classifications += 1;
        let reinforced = state
            .patterns
            .get(&classification.intent)
            .is_some_and(|patterns| patterns.iter().any(|pattern| pattern_matches(pattern, &normalized)));
        if reinforced {
            classification.confidence = classification.confidence.saturating_add(PATTERN_BOOST).min(100);
            classification.reasoning.push_str(" (reinforced by learned patterns)");
            debug!(
                event_name = "agent.intent.reinforced",
                intent = classification.intent.as_str(),
                "learned pattern boosted confidence"
            );
        }
        classification
    }

    /// Records whether `predicted` matched the intent the run actually served.
    /// A miss stores the query's keywords as a pattern for `actual`.
    pub fn learn_from_feedback(&self, query: &str, predicted: Intent, actual: Intent) {
        let was_correct = predicted == actual;
        let mut state = self.lock_state();
        state.feedback.push(Feedback { predicted, actual, was_correct });

        if !was_correct {
            let pattern = extract_pattern(query);
            info!(
                event_name = "agent.intent.pattern_learned",
                predicted = predicted.as_str(),
                actual = actual.as_str(),
                keywords = %pattern.keywords.join(" "),
                "learned intent pattern"
            );
            state.patterns.entry(actual).or_default().push(pattern);
        }
    }

    pub fn stats(&self) -> LearningStats {
        let state = self.lock_state();
        let feedback = &state.feedback;

        let (early_accuracy, recent_accuracy) = if feedback.len() >= ACCURACY_WINDOW {
            (accuracy(&feedback[..ACCURACY_WINDOW]), accuracy(&feedback[feedback.len() - ACCURACY_WINDOW..]))
        } else {
            (0.0, 0.0)
        };

        let mut actual_intents = BTreeMap::new();
        for entry in feedback {
            *actual_intents.entry(entry.actual).or_insert(0) += 1;
        }

        LearningStats {
            total_classifications: state.classifications,
            feedback_received: feedback.len(),
            early_accuracy,
            recent_accuracy,
            improvement: recent_accuracy - early_accuracy,
            patterns_learned: state.patterns.iter().map(|(intent, patterns)| (*intent, patterns.len())).collect(),
            actual_intents,
        }
    }

    pub fn reset(&self) {
        *self.lock_state() = LearningState::default();
    }

    fn lock_state(&self) -> MutexGuard<'_, LearningState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The intent a finished run actually served, judged by the tools it used.
pub fn infer_intent(tools_used: &[String]) -> Intent {
    let used = |name: &str| tools_used.iter().any(|tool| tool == name);

    if tools_used.len() > 1 {
        if used("premium_calculator") && used("policy_comparator") {
            return Intent::PremiumAndComparison;
        }
        if used("document_retriever") {
            return Intent::ComplexQuery;
        }
    }

    match tools_used.first().map(String::as_str) {
        Some("premium_calculator") => Intent::PremiumCalculation,
        Some("policy_comparator") => Intent::PolicyComparison,
        Some("document_retriever") => Intent::DocumentRetrieval,
        Some("list_products") => Intent::ProductListing,
        _ => Intent::Unknown,
    }
}

fn keyword_classification(normalized: &str) -> Classification {
    let (intent, confidence, rule) = if contains_any(normalized, &LISTING_PHRASES) {
        (Intent::ProductListing, 70, "asks which products exist")
    } else if contains_any(normalized, &COMPARISON_KEYWORDS) {
        (Intent::PolicyComparison, 60, "mentions comparing policies")
    } else if contains_any(normalized, &PREMIUM_KEYWORDS) {
        (Intent::PremiumCalculation, 60, "mentions premium or cost")
    } else {
        (Intent::DocumentRetrieval, 50, "no pricing keywords; treated as a document question")
    };

    Classification { intent, confidence, reasoning: format!("keyword rule: {rule}") }
}

fn contains_any(normalized: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| normalized.contains(keyword))
}

fn extract_pattern(query: &str) -> LearnedPattern {
    let keywords = query
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(&word.as_str()))
        .take(PATTERN_KEYWORDS)
        .collect();

    LearnedPattern { keywords, has_question: query.contains('?') }
}

/// At least 60% of the pattern's keywords appear in the query.
fn pattern_matches(pattern: &LearnedPattern, normalized: &str) -> bool {
    if pattern.keywords.is_empty() {
        return false;
    }
    let hits = pattern.keywords.iter().filter(|keyword| normalized.contains(keyword.as_str())).count();
    hits * 5 >= pattern.keywords.len() * 3
}

fn accuracy(window: &[Feedback]) -> f64 {
    window.iter().filter(|entry| entry.was_correct).count() as f64 / window.len() as f64
}
