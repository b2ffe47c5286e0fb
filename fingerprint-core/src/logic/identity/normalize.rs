//! User-Agent Normalization
//!
//! Some in-app browsers (Alipay, UC, Nebula containers) embed build, channel
//! and SDK version tokens in the user agent that change between sessions on
//! the same device. These are replaced with fixed placeholder tokens; the rest
//! of the string is left untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// (pattern, replacement) pairs applied in order
const RULES: &[(&str, &str)] = &[
    (r"ChannelId\(\d+\)", "ChannelId(XX)"),
    (r"UWS/[\d.]+", "UWS/X.X.X"),
    (r"UCBS/[\d._]+", "UCBS/X.X.X"),
    (r"NebulaSDK/[\d.]+", "NebulaSDK/X.X.X"),
    (r"AliApp\(AP/[\d.]+\)", "AliApp(AP/X.X.X)"),
    (r"AlipayClient/[\d.]+", "AlipayClient/X.X.X"),
    // Embedded millisecond / second timestamps
    (r"\d{13}", "XXXXXXXXXXXXX"),
    (r"\d{10}", "XXXXXXXXXX"),
];

static COMPILED: Lazy<Option<Vec<(Regex, &'static str)>>> = Lazy::new(|| {
    let mut compiled = Vec::with_capacity(RULES.len());
    for (pattern, replacement) in RULES {
        match Regex::new(pattern) {
            Ok(re) => compiled.push((re, *replacement)),
            Err(e) => {
                log::warn!("UA normalization pattern {} failed to compile: {}", pattern, e);
                return None;
            }
        }
    }
    Some(compiled)
});

/// Replace volatile user-agent tokens with fixed placeholders
///
/// Idempotent: placeholders contain no digits, so a second pass finds
/// nothing to replace. Returns the input unchanged if the rule set is
/// unavailable.
pub fn normalize_user_agent(user_agent: &str) -> String {
    let Some(rules) = COMPILED.as_ref() else {
        return user_agent.to_string();
    };

    let mut normalized = user_agent.to_string();
    for (re, replacement) in rules {
        if re.is_match(&normalized) {
            normalized = re.replace_all(&normalized, *replacement).into_owned();
        }
    }

    if normalized != user_agent {
        log::debug!("UA normalized: {} -> {}", user_agent, normalized);
    }

    normalized
}
