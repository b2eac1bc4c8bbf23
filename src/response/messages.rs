//! User-facing copy per threat type and explanation style.

use super::ExplanationStyle;
use crate::policy::AgeGroup;
use crate::risk::ThreatType;

pub fn plain_language(t: ThreatType) -> &'static str {
    match t {
        ThreatType::Malware => "This file or app could harm your device.",
        ThreatType::Phishing => "Someone is pretending to be a company to get your password.",
        ThreatType::Scam => "This looks like a trick to get your money.",
        ThreatType::Cyberbullying => "This message looks hurtful or threatening.",
        ThreatType::InappropriateContent => "This content is not suitable.",
        ThreatType::PrivacyViolation => "This asks for private information about you.",
        ThreatType::SocialEngineering => "Someone may be trying to pressure or fool you.",
        ThreatType::FinancialFraud => "This looks like an attempt to steal money from your accounts.",
        ThreatType::QuantumAttack => "This connection is trying to weaken your device's protection.",
        ThreatType::Unknown => "Something about this looks unusual.",
    }
}

pub fn kid_friendly(t: ThreatType) -> &'static str {
    match t {
        ThreatType::Malware => "This could make your device sick. Let's not open it!",
        ThreatType::Phishing => "Someone is pretending to be someone else. Never share your password!",
        ThreatType::Scam => "This is a trick. Real prizes don't come like this!",
        ThreatType::Cyberbullying => "This message isn't kind. It's not your fault, talk to a grown-up you trust.",
        ThreatType::InappropriateContent => "This isn't meant for kids, so we stopped it.",
        ThreatType::PrivacyViolation => "Your name, address and photos are yours to keep safe.",
        ThreatType::SocialEngineering => "Grown-ups you don't know shouldn't ask you to keep secrets.",
        ThreatType::FinancialFraud => "This is about money. Ask a grown-up before doing anything.",
        ThreatType::QuantumAttack => "Something is trying to break your device's lock. We blocked it.",
        ThreatType::Unknown => "This looks a little strange. Let's be careful.",
    }
}

pub fn technical(t: ThreatType) -> &'static str {
    match t {
        ThreatType::Malware => "Payload matches malware delivery indicators (executable lure / macro enablement).",
        ThreatType::Phishing => "Credential-harvesting indicators: impersonation language and suspicious link host.",
        ThreatType::Scam => "Advance-fee / prize scam indicators detected in message content.",
        ThreatType::Cyberbullying => "Harassment indicators and abnormal message-rate burst from sender.",
        ThreatType::InappropriateContent => "Content classified as age-restricted.",
        ThreatType::PrivacyViolation => "Request for personally identifying data (address, location, identifiers).",
        ThreatType::SocialEngineering => "Pressure and secrecy cues consistent with social-engineering pretexts.",
        ThreatType::FinancialFraud => "Payment redirection indicators (wire transfer, account details, return promises).",
        ThreatType::QuantumAttack => "Cryptographic downgrade indicators (post-quantum suite disabled / harvest-now pattern).",
        ThreatType::Unknown => "Anomalous activity without a confident classification.",
    }
}

pub fn explanation(t: ThreatType, style: ExplanationStyle) -> &'static str {
    match style {
        ExplanationStyle::KidFriendly => kid_friendly(t),
        ExplanationStyle::PlainLanguage => plain_language(t),
        ExplanationStyle::Technical => technical(t),
    }
}

pub fn guidance_steps(t: ThreatType) -> &'static [&'static str] {
    match t {
        ThreatType::Scam | ThreatType::FinancialFraud => &[
            "Do not send money, gift cards or bank details.",
            "Hang up or close the message.",
            "Call your bank using the number on your card.",
            "Tell a family member what happened.",
        ],
        ThreatType::Phishing => &[
            "Do not click the link.",
            "Open the company's app or website yourself to check your account.",
            "If you already typed your password, change it now.",
        ],
        _ => &[
            "Stop and do not reply.",
            "Ask someone you trust before doing anything.",
        ],
    }
}

pub fn educational_content(t: ThreatType, group: AgeGroup) -> &'static str {
    match (group, t) {
        (AgeGroup::Child, ThreatType::InappropriateContent) => {
            "Some things online are made for grown-ups. If you see something that feels weird, tell a parent."
        }
        (AgeGroup::Child, _) => "Online strangers can pretend to be anyone. Always check with a parent first.",
        (AgeGroup::Teen, ThreatType::PrivacyViolation) => {
            "Posts and photos can be copied forever. Think before sharing where you are or who you're with."
        }
        (AgeGroup::Teen, _) => "You can block and report accounts that pressure or hurt you. Screenshots help.",
        (AgeGroup::Senior, _) => "Real banks and agencies never ask you to pay with gift cards or keep calls secret.",
        _ => "Verify unexpected requests through a channel you already trust.",
    }
}

pub fn title(t: ThreatType, blocking: bool) -> String {
    let label = match t {
        ThreatType::Malware => "Harmful software",
        ThreatType::Phishing => "Phishing attempt",
        ThreatType::Scam => "Possible scam",
        ThreatType::Cyberbullying => "Hurtful message",
        ThreatType::InappropriateContent => "Inappropriate content",
        ThreatType::PrivacyViolation => "Privacy risk",
        ThreatType::SocialEngineering => "Manipulation attempt",
        ThreatType::FinancialFraud => "Financial fraud",
        ThreatType::QuantumAttack => "Encryption downgrade",
        ThreatType::Unknown => "Unusual activity",
    };
    if blocking {
        format!("{} blocked", label)
    } else {
        label.to_string()
    }
}
