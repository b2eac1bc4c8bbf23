//! Keyword lexicon per threat type, plus obfuscation normalisation.

use crate::risk::ThreatType;
use std::collections::BTreeMap;

const LEXICON: &[(&str, ThreatType)] = &[
    ("verify your account", ThreatType::Phishing),
    ("confirm your password", ThreatType::Phishing),
    ("login to restore", ThreatType::Phishing),
    ("account suspended", ThreatType::Phishing),
    ("reset your password", ThreatType::Phishing),
    ("you have won", ThreatType::Scam),
    ("claim your prize", ThreatType::Scam),
    ("gift card", ThreatType::Scam),
    ("lottery", ThreatType::Scam),
    ("tech support", ThreatType::Scam),
    ("wire transfer", ThreatType::FinancialFraud),
    ("bank account", ThreatType::FinancialFraud),
    ("routing number", ThreatType::FinancialFraud),
    ("guaranteed return", ThreatType::FinancialFraud),
    ("crypto investment", ThreatType::FinancialFraud),
    ("nobody likes you", ThreatType::Cyberbullying),
    ("you are worthless", ThreatType::Cyberbullying),
    ("you loser", ThreatType::Cyberbullying),
    ("everyone hates you", ThreatType::Cyberbullying),
    ("explicit", ThreatType::InappropriateContent),
    ("nsfw", ThreatType::InappropriateContent),
    ("adult content", ThreatType::InappropriateContent),
    ("18+", ThreatType::InappropriateContent),
    ("home address", ThreatType::PrivacyViolation),
    ("share your location", ThreatType::PrivacyViolation),
    ("send a photo", ThreatType::PrivacyViolation),
    ("social security", ThreatType::PrivacyViolation),
    ("keep this secret", ThreatType::SocialEngineering),
    ("don't tell your parents", ThreatType::SocialEngineering),
    ("act now", ThreatType::SocialEngineering),
    ("urgent", ThreatType::SocialEngineering),
    ("download this", ThreatType::Malware),
    (".exe", ThreatType::Malware),
    ("install the update", ThreatType::Malware),
    ("enable macros", ThreatType::Malware),
    ("harvest now decrypt later", ThreatType::QuantumAttack),
    ("quantum downgrade", ThreatType::QuantumAttack),
    ("disable post-quantum", ThreatType::QuantumAttack),
];

const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];
const SEPARATORS: &[char] = &['.', '-', '_', '*', '|'];

/// Keyword hit counts per threat type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexiconHits {
    pub counts: BTreeMap<ThreatType, usize>,
}

impl LexiconHits {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, threat_type: ThreatType) -> usize {
        self.counts.get(&threat_type).copied().unwrap_or(0)
    }

    /// Type with the most hits. Ties resolve to the earlier type in `ThreatType` order.
    pub fn top(&self) -> Option<(ThreatType, usize)> {
        let mut best: Option<(ThreatType, usize)> = None;
        for (t, n) in &self.counts {
            if best.map_or(true, |(_, b)| *n > b) {
                best = Some((*t, *n));
            }
        }
        best
    }
}

pub fn scan(text: &str) -> LexiconHits {
    let lower = text.to_lowercase();
    let mut hits = LexiconHits::default();
    if lower.is_empty() {
        return hits;
    }
    for (kw, t) in LEXICON {
        let n = lower.matches(kw).count();
        if n > 0 {
            *hits.counts.entry(*t).or_insert(0) += n;
        }
    }
    hits
}

/// Undo common filter-evasion tricks: zero-width characters, leetspeak digits and
/// separator padding inside words (`f.r.e.e`).
pub fn normalize_obfuscation(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .map(|c| match c {
            '0' => 'o',
            '1' | '!' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' => 't',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();

    cleaned
        .split_whitespace()
        .map(collapse_padding)
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_padding(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let padded = chars.len() >= 3
        && chars
            .iter()
            .enumerate()
            .all(|(i, c)| if i % 2 == 1 { SEPARATORS.contains(c) } else { c.is_alphanumeric() });
    if padded {
        chars.iter().filter(|c| !SEPARATORS.contains(c)).collect()
    } else {
        token.to_string()
    }
}
