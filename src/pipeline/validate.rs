use std::collections::HashMap;

use regex::Regex;

use crate::models::ExtractedLead;

const DISPOSABLE_DOMAINS: [&str; 10] = [
    "tempmail.com",
    "throwaway.email",
    "guerrillamail.com",
    "mailinator.com",
    "10minutemail.com",
    "trashmail.com",
    "yopmail.com",
    "fakeinbox.com",
    "tempmails.org",
    "sharklasers.com",
];

const GENERIC_PREFIXES: [&str; 12] = [
    "info",
    "contact",
    "admin",
    "support",
    "sales",
    "hello",
    "help",
    "noreply",
    "no-reply",
    "donotreply",
    "webmaster",
    "postmaster",
];

const TEST_NAME_TOKENS: [&str; 5] = ["test", "demo", "example", "sample", "unknown"];

/// Result of validating one lead.
#[derive(Debug, Clone)]
pub struct LeadValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Partition of a lead batch. Input ordering is preserved in every bucket.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<ExtractedLead>,
    pub invalid: Vec<(ExtractedLead, Vec<String>)>,
    pub warnings: Vec<(ExtractedLead, Vec<String>)>,
}

/// Format checks, soft-quality warnings, scoring and duplicate detection.
/// Validation never fails a batch; it partitions it.
pub struct LeadValidator {
    email_regex: Regex,
    phone_regex: Regex,
    url_regex: Regex,
}

impl Default for LeadValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadValidator {
    pub fn new() -> Self {
        Self {
            email_regex: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap(),
            phone_regex: Regex::new(r"^\+?[\d\s()\-.]+$").unwrap(),
            url_regex: Regex::new(r"^https?://.+\..+").unwrap(),
        }
    }

    pub fn validate_lead(&self, lead: &ExtractedLead) -> LeadValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if lead.name.trim().is_empty() {
            errors.push("Name is required".to_string());
        }

        if let Some(email) = &lead.email {
            if !self.validate_email(email) {
                errors.push(format!("Invalid email format: {}", email));
            }
            if self.is_disposable_email(email) {
                warnings.push(format!("Disposable email detected: {}", email));
            }
            if self.is_generic_email(email) {
                warnings.push(format!("Generic email detected: {}", email));
            }
        }

        if let Some(phone) = &lead.phone {
            if !self.validate_phone(phone) {
                errors.push(format!("Invalid phone format: {}", phone));
            }
        }

        if let Some(url) = &lead.linkedin_url {
            if !self.validate_linkedin_url(url) {
                errors.push(format!("Invalid LinkedIn URL: {}", url));
            }
        }

        if lead.confidence < 0.3 {
            warnings.push("Low confidence score".to_string());
        }

        if !lead.name.trim().is_empty() {
            warnings.extend(self.name_issues(&lead.name));
        }

        LeadValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn validate_leads(&self, leads: Vec<ExtractedLead>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for lead in leads {
            let validation = self.validate_lead(&lead);
            if validation.is_valid {
                if !validation.warnings.is_empty() {
                    outcome.warnings.push((lead.clone(), validation.warnings));
                }
                outcome.valid.push(lead);
            } else {
                outcome.invalid.push((lead, validation.errors));
            }
        }
        outcome
    }

    /// RFC-light email checks: pattern match plus local-part/domain limits.
    pub fn validate_email(&self, email: &str) -> bool {
        if !self.email_regex.is_match(email) {
            return false;
        }
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };
        if local.len() > 64 || local.starts_with('.') || local.ends_with('.') || local.contains("..")
        {
            return false;
        }
        if domain.len() > 255
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return false;
        }
        true
    }

    /// 7 to 15 digits after stripping formatting.
    pub fn validate_phone(&self, phone: &str) -> bool {
        if !self.phone_regex.is_match(phone) {
            return false;
        }
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        (7..=15).contains(&digits)
    }

    pub fn validate_linkedin_url(&self, url: &str) -> bool {
        self.url_regex.is_match(url)
            && url.contains("linkedin.com")
            && (url.contains("/in/") || url.contains("/company/"))
    }

    pub fn is_disposable_email(&self, email: &str) -> bool {
        email
            .split_once('@')
            .map(|(_, domain)| DISPOSABLE_DOMAINS.iter().any(|d| domain.contains(d)))
            .unwrap_or(false)
    }

    pub fn is_generic_email(&self, email: &str) -> bool {
        email
            .split_once('@')
            .map(|(local, _)| GENERIC_PREFIXES.contains(&local.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn name_issues(&self, name: &str) -> Vec<String> {
        let mut issues = Vec::new();
        let lower = name.to_lowercase();

        if TEST_NAME_TOKENS.iter().any(|t| lower.contains(t)) {
            issues.push("Name appears to be test data".to_string());
        }
        if !name.contains(' ') {
            issues.push("Name appears to be incomplete (single word)".to_string());
        }
        if name.chars().any(|c| c.is_ascii_digit()) {
            issues.push("Name contains numbers".to_string());
        }
        if name
            .chars()
            .any(|c| !c.is_alphabetic() && !matches!(c, ' ' | '-' | '\'' | '.'))
        {
            issues.push("Name contains unusual characters".to_string());
        }
        if name.len() < 2 {
            issues.push("Name is too short".to_string());
        }
        if name.len() > 50 {
            issues.push("Name is unusually long".to_string());
        }
        issues
    }

    /// 0..=1 quality score: each populated factor contributes a normalized
    /// share and the total is averaged over the populated factors.
    pub fn calculate_quality_score(&self, lead: &ExtractedLead) -> f64 {
        let mut score = 0.0;
        let mut factors = 0u32;

        if let Some(email) = &lead.email {
            factors += 1;
            if self.validate_email(email) {
                score += 1.0;
                if !self.is_generic_email(email) {
                    score += 0.5;
                }
                if !self.is_disposable_email(email) {
                    score += 0.5;
                }
            }
        }

        if !lead.name.trim().is_empty() {
            factors += 1;
            match self.name_issues(&lead.name).len() {
                0 => score += 2.0,
                1 => score += 1.0,
                _ => {}
            }
        }

        if let Some(phone) = &lead.phone {
            factors += 1;
            if self.validate_phone(phone) {
                score += 1.0;
            }
        }

        if lead.title.is_some() {
            factors += 1;
            score += 1.0;
        }
        if lead.company.is_some() {
            factors += 1;
            score += 1.0;
        }
        if let Some(url) = &lead.linkedin_url {
            factors += 1;
            if self.validate_linkedin_url(url) {
                score += 1.0;
            }
        }

        if factors == 0 {
            0.0
        } else {
            score / (factors as f64 * 2.0)
        }
    }

    /// Groups of leads sharing a (lowercased) email address.
    pub fn find_duplicates(&self, leads: &[ExtractedLead]) -> HashMap<String, Vec<ExtractedLead>> {
        let mut groups: HashMap<String, Vec<ExtractedLead>> = HashMap::new();
        for lead in leads {
            if let Some(email) = &lead.email {
                groups
                    .entry(email.to_lowercase())
                    .or_default()
                    .push(lead.clone());
            }
        }
        groups.retain(|_, group| group.len() > 1);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str, email: Option<&str>) -> ExtractedLead {
        let mut lead = ExtractedLead::new(name, "https://acme.com");
        lead.email = email.map(str::to_string);
        lead.confidence = 0.8;
        lead
    }

    #[test]
    fn missing_name_is_a_hard_error() {
        let validator = LeadValidator::new();
        let result = validator.validate_lead(&lead("", Some("a@b.com")));
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("Name")));
    }

    #[test]
    fn email_format_rules() {
        let validator = LeadValidator::new();
        assert!(validator.validate_email("jane.doe@acme.com"));
        assert!(!validator.validate_email("no-at-sign"));
        assert!(!validator.validate_email(".leading@acme.com"));
        assert!(!validator.validate_email("double..dot@acme.com"));
        assert!(!validator.validate_email("trailing.@acme.com"));
        assert!(!validator.validate_email("jane@nodot"));
        let long_local = format!("{}@acme.com", "a".repeat(65));
        assert!(!validator.validate_email(&long_local));
    }

    #[test]
    fn phone_digit_range() {
        let validator = LeadValidator::new();
        assert!(validator.validate_phone("+1 (555) 123-4567"));
        assert!(validator.validate_phone("1234567"));
        assert!(!validator.validate_phone("123456"));
        assert!(!validator.validate_phone("1234567890123456"));
        assert!(!validator.validate_phone("call me"));
    }

    #[test]
    fn linkedin_url_rules() {
        let validator = LeadValidator::new();
        assert!(validator.validate_linkedin_url("https://linkedin.com/in/jane"));
        assert!(validator.validate_linkedin_url("https://www.linkedin.com/company/acme"));
        assert!(!validator.validate_linkedin_url("https://linkedin.com/feed"));
        assert!(!validator.validate_linkedin_url("https://example.com/in/jane"));
    }

    #[test]
    fn generic_and_disposable_emails_warn_but_pass() {
        let validator = LeadValidator::new();
        let result = validator.validate_lead(&lead("Jane Smith", Some("info@acme.com")));
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("Generic")));

        let result = validator.validate_lead(&lead("Jane Smith", Some("jane@mailinator.com")));
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("Disposable")));
    }

    #[test]
    fn low_confidence_and_name_quality_warn() {
        let validator = LeadValidator::new();
        let mut l = lead("Jane", None);
        l.confidence = 0.1;
        let result = validator.validate_lead(&l);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("Low confidence")));
        assert!(result.warnings.iter().any(|w| w.contains("single word")));
    }

    #[test]
    fn batch_partition_preserves_order() {
        let validator = LeadValidator::new();
        let leads = vec![
            lead("Jane Smith", Some("jane@acme.com")),
            lead("", Some("broken@acme.com")),
            lead("Bob Brown", Some("bob@acme.com")),
        ];
        let outcome = validator.validate_leads(leads);
        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.invalid.len(), 1);
        assert_eq!(outcome.valid[0].name, "Jane Smith");
        assert_eq!(outcome.valid[1].name, "Bob Brown");
    }

    #[test]
    fn quality_score_rewards_complete_records() {
        let validator = LeadValidator::new();
        let mut complete = lead("Jane Smith", Some("jane@acme.com"));
        complete.phone = Some("+15551234567".to_string());
        complete.title = Some("Chief Executive Officer".to_string());
        complete.company = Some("Acme".to_string());
        complete.linkedin_url = Some("https://linkedin.com/in/jane".to_string());

        let sparse = lead("x1", None);

        let high = validator.calculate_quality_score(&complete);
        let low = validator.calculate_quality_score(&sparse);
        assert!(high > 0.6, "complete lead scored {}", high);
        assert!(high > low);
        assert!(low < 0.3, "sparse lead scored {}", low);
        assert!(validator.calculate_quality_score(&ExtractedLead::new("", "u")) == 0.0);
    }

    #[test]
    fn duplicates_grouped_by_email() {
        let validator = LeadValidator::new();
        let leads = vec![
            lead("Jane Smith", Some("jane@acme.com")),
            lead("J Smith", Some("JANE@acme.com")),
            lead("Bob Brown", Some("bob@acme.com")),
        ];
        let duplicates = validator.find_duplicates(&leads);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates["jane@acme.com"].len(), 2);
    }
}
