//! Display masks for PII shown to operators. Never stored, never compared.
//!
//! All functions are total: malformed input degrades to a placeholder.

const STARS: &str = "***";
const PHONE_STARS: &str = "******";

/// `"John"` → `"J***"`, `""` → `"***"`.
pub fn mask_name(name: &str) -> String {
    match name.chars().next() {
        Some(first) => format!("{first}{STARS}"),
        None => STARS.to_owned(),
    }
}

/// `"+628123456789"` → `"******6789"`; fewer than four characters → `"******"`.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() < 4 {
        return PHONE_STARS.to_owned();
    }
    let last4: String = chars[chars.len() - 4..].iter().collect();
    format!("{PHONE_STARS}{last4}")
}

/// `"a@b.com"` → `"a***@b.com"`; no `@` → `"***"`; empty local part →
/// `"***@b.com"`.
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return STARS.to_owned();
    };
    match local.chars().next() {
        Some(first) => format!("{first}{STARS}@{domain}"),
        None => format!("{STARS}@{domain}"),
    }
}
