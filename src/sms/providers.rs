/// Shekel markers as they show up in issuer alerts.
pub(crate) const SHEKEL: &str = r#"(?:ש"ח|ש״ח|ש''ח|₪|NIS|ILS|שקלים|שקל)"#;

/// Merchant text ends at a date clause, a sentence break, a comma or the
/// end of the message.
const MERCHANT_END: &str = r"\s*(?:בתאריך|\bon\s+\d|\.(?:\s|$)|[,\n]|$)";

/// Card issuers we recognize by wording. `Unknown` falls back to the
/// generic pattern lists only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Provider {
    Isracard,
    Cal,
    Max,
    Amex,
    Unknown,
}

/// Provider-specific extraction patterns. `None` means "use the generic
/// list straight away". Every pattern captures its value in group 1; date
/// patterns capture day, month and an optional year.
pub(crate) struct ProviderPatterns {
    pub(crate) card: Option<&'static str>,
    pub(crate) amount: Option<&'static str>,
    pub(crate) merchant: Option<&'static str>,
    pub(crate) date: Option<&'static str>,
}

impl Provider {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Isracard => "isracard",
            Self::Cal => "cal",
            Self::Max => "max",
            Self::Amex => "amex",
            Self::Unknown => "unknown",
        }
    }

    #[cfg(test)]
    pub(crate) fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "isracard" => Self::Isracard,
            "cal" => Self::Cal,
            "max" => Self::Max,
            "amex" => Self::Amex,
            _ => Self::Unknown,
        }
    }

    /// Detection order. Brands that are issued through another brand come
    /// first so the more specific name wins.
    pub(crate) fn known() -> &'static [Provider] {
        &[Self::Amex, Self::Cal, Self::Max, Self::Isracard]
    }

    /// Lowercase substrings that identify the issuer.
    fn fingerprints(&self) -> &'static [&'static str] {
        match self {
            Self::Amex => &["אמריקן אקספרס", "american express", "amex"],
            Self::Cal => &["ויזה כאל", "כאל:", "visa cal", "cal:", "cal-online"],
            Self::Max => &["max:", "מקס:", "max it", "לאומי קארד", "leumi card"],
            Self::Isracard => &["ישראכרט", "isracard", "בכרטיסך המסתיים"],
            Self::Unknown => &[],
        }
    }

    pub(crate) fn patterns(&self) -> ProviderPatterns {
        match self {
            Self::Isracard => ProviderPatterns {
                card: Some(r"בכרטיסך המסתיים\s*ב-?\s*(\d{4})"),
                amount: Some(r"בסך\s*(?:₪\s*)?([\d,]+(?:\.\d{1,2})?)"),
                merchant: Some(r"{SHEKEL}\s+ב-\s*([^\n,]+?){END}"),
                date: Some(r"בתאריך\s*(\d{1,2})[/.](\d{1,2})(?:[/.](\d{2,4}))?"),
            },
            Self::Cal => ProviderPatterns {
                card: Some(r"בכרטיס(?:\s*המסתיים\s*ב-?)?\s*(\d{4})"),
                amount: Some(r"עסקה\s*(?:על\s*)?ב?סך\s*([\d,]+(?:\.\d{1,2})?)"),
                merchant: Some(r"בכרטיס\s*\d{4}\s*(?:ב-?|אצל\s+)([^\n,]+?){END}"),
                date: Some(r"בתאריך\s*(\d{1,2})[/.](\d{1,2})(?:[/.](\d{2,4}))?"),
            },
            Self::Max => ProviderPatterns {
                card: Some(r"בכרטיס\s*(?:המסתיים\s*ב-?)?\s*(\d{4})"),
                amount: Some(r"בסך\s*(?:[$€£₪]\s*)?([\d,]+(?:\.\d{1,2})?)"),
                merchant: Some(r"ב-([^\d\s][^\n,]*?){END}"),
                date: Some(r"בתאריך\s*(\d{1,2})[/.](\d{1,2})(?:[/.](\d{2,4}))?"),
            },
            Self::Amex | Self::Unknown => ProviderPatterns {
                card: None,
                amount: None,
                merchant: None,
                date: None,
            },
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identify the issuer from its wording, `Unknown` when nothing matches.
pub(crate) fn detect_provider(text: &str) -> Provider {
    let lower = text.to_lowercase();
    Provider::known()
        .iter()
        .copied()
        .find(|p| p.fingerprints().iter().any(|f| lower.contains(f)))
        .unwrap_or(Provider::Unknown)
}

/// Fallback lists, tried in order after the provider pattern misses.
pub(crate) const GENERIC_CARD: &[&str] = &[
    r"(?:המסתיים|המסתיימת|שמסתיים|מסתיים)\s*ב-?\s*(\d{4})",
    r"(?i)\bending(?:\s+in|\s+with)?\s*[:#]?\s*[*x]*(\d{4})\b",
    r"[*xX]{2,}\s*(\d{4})\b",
    r"(?i)(?:בכרטיס|\bcard)\s*[:#]?\s*(\d{4})\b",
];

pub(crate) const GENERIC_AMOUNT: &[&str] = &[
    r"(?:בסך|סך|סכום)\s*:?\s*(?:[$€£₪]\s*)?([\d,]+(?:\.\d{1,2})?)",
    r"(?i)\b(?:amount|of)\s*:?\s*(?:[$€£₪]|USD|EUR|ILS|NIS)?\s*([\d,]+(?:\.\d{1,2})?)",
    r"([\d,]+\.\d{1,2})\s*(?:{SHEKEL}|USD|EUR|GBP|[$€£])",
    r"[$€£₪]\s*([\d,]+(?:\.\d{1,2})?)",
];

pub(crate) const GENERIC_MERCHANT: &[&str] = &[
    r"{SHEKEL}\s*ב-\s*([^\n,\d][^\n,]*?){END}",
    r"(?i)(?:בבית העסק|בבית עסק|אצל|\bmerchant:?|\bat)\s+([^\n,]+?){END}",
    r"ב-([^\d\s][^\n,]*?){END}",
];

pub(crate) const GENERIC_DATE: &[&str] = &[
    r"(?i)(?:בתאריך|תאריך|\bon)\s*:?\s*(\d{1,2})[/.](\d{1,2})(?:[/.](\d{2,4}))?",
    r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b",
];

/// Expand the shared placeholders in a pattern.
pub(crate) fn expand(pattern: &str) -> String {
    pattern
        .replace("{SHEKEL}", SHEKEL)
        .replace("{END}", MERCHANT_END)
}
