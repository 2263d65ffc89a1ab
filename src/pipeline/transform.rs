use std::collections::HashMap;

use crate::models::{CompanyInfo, ExtractedLead};

/// Title abbreviations expanded before title-casing.
const TITLE_EXPANSIONS: [(&str, &str); 11] = [
    ("CEO", "Chief Executive Officer"),
    ("CTO", "Chief Technology Officer"),
    ("CFO", "Chief Financial Officer"),
    ("COO", "Chief Operating Officer"),
    ("VP", "Vice President"),
    ("Sr", "Senior"),
    ("Jr", "Junior"),
    ("Mgr", "Manager"),
    ("Dir", "Director"),
    ("Eng", "Engineer"),
    ("Dev", "Developer"),
];

const COMPANY_SUFFIXES: [&str; 10] = [
    ", Inc.", " Inc.", ", LLC", " LLC", ", Ltd.", " Ltd.", ", Corp.", " Corp.", ", Co.", " Co.",
];

const STATE_EXPANSIONS: [(&str, &str); 8] = [
    ("CA", "California"),
    ("NY", "New York"),
    ("TX", "Texas"),
    ("FL", "Florida"),
    ("WA", "Washington"),
    ("MA", "Massachusetts"),
    ("IL", "Illinois"),
    ("PA", "Pennsylvania"),
];

/// Normalizes extracted records into a canonical shape and merges duplicates.
#[derive(Default)]
pub struct LeadTransformer;

impl LeadTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform_lead(&self, mut lead: ExtractedLead) -> ExtractedLead {
        lead.name = normalize_name(&lead.name);
        lead.email = lead.email.as_deref().and_then(normalize_email);
        lead.phone = lead.phone.as_deref().map(normalize_phone);
        lead.title = lead.title.as_deref().map(normalize_title);
        lead.company = lead.company.as_deref().map(normalize_company);
        lead.location = lead.location.as_deref().map(normalize_location);
        lead
    }

    pub fn transform_leads(&self, leads: Vec<ExtractedLead>) -> Vec<ExtractedLead> {
        leads.into_iter().map(|l| self.transform_lead(l)).collect()
    }

    pub fn transform_company_info(&self, mut company: CompanyInfo) -> CompanyInfo {
        company.name = normalize_company(&company.name);
        company.domain = company
            .domain
            .trim_start_matches("www.")
            .to_lowercase();
        company.size = company.size.as_deref().map(normalize_company_size);
        company.location = company.location.as_deref().map(normalize_location);
        dedup_preserving_order(&mut company.technologies);
        dedup_preserving_order(&mut company.services);
        company
    }

    /// Group by lowercased email (name as fallback key) and merge
    /// field-by-field, preferring present values and the higher confidence.
    pub fn merge_leads(&self, leads: Vec<ExtractedLead>) -> Vec<ExtractedLead> {
        let mut merged: Vec<ExtractedLead> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for lead in leads {
            let key = lead
                .email
                .clone()
                .unwrap_or_else(|| lead.name.clone())
                .to_lowercase();

            match index_by_key.get(&key) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    if existing.name == "Unknown" && lead.name != "Unknown" {
                        existing.name = lead.name;
                    }
                    merge_field(&mut existing.email, lead.email);
                    merge_field(&mut existing.phone, lead.phone);
                    merge_field(&mut existing.title, lead.title);
                    merge_field(&mut existing.company, lead.company);
                    merge_field(&mut existing.linkedin_url, lead.linkedin_url);
                    merge_field(&mut existing.location, lead.location);
                    merge_field(&mut existing.department, lead.department);
                    if existing.seniority.is_none() {
                        existing.seniority = lead.seniority;
                    }
                    existing.confidence = existing.confidence.max(lead.confidence);
                }
                None => {
                    index_by_key.insert(key, merged.len());
                    merged.push(lead);
                }
            }
        }
        merged
    }
}

fn merge_field(existing: &mut Option<String>, incoming: Option<String>) {
    if existing.is_none() {
        *existing = incoming;
    }
}

/// Collapsed whitespace, title case.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased and trimmed; placeholder domains are dropped entirely.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.contains("example.com") || email.contains("test.com") {
        return None;
    }
    Some(email)
}

/// Digits with an optional leading `+`; bare US 10/11-digit numbers gain a
/// `+1` prefix.
pub fn normalize_phone(phone: &str) -> String {
    let mut normalized: String = phone
        .chars()
        .enumerate()
        .filter(|(i, c)| c.is_ascii_digit() || (*c == '+' && *i == 0))
        .map(|(_, c)| c)
        .collect();

    if normalized.len() == 10 && !normalized.starts_with('+') {
        normalized = format!("+1{}", normalized);
    } else if normalized.len() == 11 && normalized.starts_with('1') {
        normalized = format!("+{}", normalized);
    }
    normalized
}

pub fn normalize_title(title: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for word in title.trim().split_whitespace() {
        let expansion = TITLE_EXPANSIONS
            .iter()
            .find(|(abbr, _)| word.eq_ignore_ascii_case(abbr))
            .map(|(_, full)| *full);
        match expansion {
            Some(full) => words.extend(full.split(' ').map(|w| w.to_string())),
            None => words.push(word.to_string()),
        }
    }
    words
        .iter()
        .map(|w| title_case_word(w))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_company(company: &str) -> String {
    let mut normalized = company.trim().to_string();
    for suffix in COMPANY_SUFFIXES {
        if let Some(stripped) = normalized.strip_suffix(suffix) {
            normalized = stripped.to_string();
        }
    }
    normalized
}

pub fn normalize_location(location: &str) -> String {
    location
        .trim()
        .split_whitespace()
        .map(|word| {
            let bare = word.trim_end_matches(|c: char| !c.is_alphanumeric());
            STATE_EXPANSIONS
                .iter()
                .find(|(abbr, _)| bare == *abbr)
                .map(|(_, full)| word.replacen(bare, full, 1))
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bucket a raw company-size string into a canonical employee range.
pub fn normalize_company_size(size: &str) -> String {
    let digits: Vec<u64> = size
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();

    match digits.as_slice() {
        [low, high, ..] => format!("{}-{} employees", low, high),
        [n] => match n {
            0..=9 => "1-10 employees".to_string(),
            10..=49 => "11-50 employees".to_string(),
            50..=199 => "51-200 employees".to_string(),
            200..=499 => "201-500 employees".to_string(),
            500..=999 => "501-1000 employees".to_string(),
            1000..=4999 => "1001-5000 employees".to_string(),
            _ => "5000+ employees".to_string(),
        },
        [] => size.to_string(),
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
        }
        None => String::new(),
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedLead;

    #[test]
    fn name_is_title_cased_with_collapsed_whitespace() {
        assert_eq!(normalize_name("  jOHN   DOE "), "John Doe");
    }

    #[test]
    fn email_normalization_is_idempotent() {
        let once = normalize_email(" Jane.Doe@Acme.COM ").unwrap();
        assert_eq!(once, "jane.doe@acme.com");
        assert_eq!(normalize_email(&once).unwrap(), once);
    }

    #[test]
    fn placeholder_email_domains_are_dropped() {
        assert!(normalize_email("bob@example.com").is_none());
        assert!(normalize_email("bob@test.com").is_none());
    }

    #[test]
    fn phone_gains_us_prefix() {
        assert_eq!(normalize_phone("(555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone("1-555-123-4567"), "+15551234567");
        assert_eq!(normalize_phone("+44 20 7946 0958"), "+442079460958");
    }

    #[test]
    fn title_abbreviations_expand() {
        assert_eq!(normalize_title("CEO"), "Chief Executive Officer");
        assert_eq!(normalize_title("Sr Eng"), "Senior Engineer");
        assert_eq!(normalize_title("VP of sales"), "Vice President Of Sales");
    }

    #[test]
    fn company_suffixes_are_stripped() {
        assert_eq!(normalize_company("Acme, Inc."), "Acme");
        assert_eq!(normalize_company("Globex LLC"), "Globex");
        assert_eq!(normalize_company("Initech"), "Initech");
    }

    #[test]
    fn state_abbreviations_expand_in_location() {
        assert_eq!(normalize_location("Austin, TX"), "Austin, Texas");
        assert_eq!(normalize_location("San Francisco CA"), "San Francisco California");
    }

    #[test]
    fn company_size_buckets() {
        assert_eq!(normalize_company_size("10-50 employees"), "10-50 employees");
        assert_eq!(normalize_company_size("42 people"), "11-50 employees");
        assert_eq!(normalize_company_size("team of 7"), "1-10 employees");
        assert_eq!(normalize_company_size("huge"), "huge");
    }

    #[test]
    fn merge_keeps_higher_confidence_and_fills_gaps() {
        let transformer = LeadTransformer::new();
        let mut a = ExtractedLead::new("Jane Smith", "https://acme.com/team");
        a.email = Some("jane@acme.com".to_string());
        a.confidence = 0.7;

        let mut b = ExtractedLead::new("Jane Smith", "https://acme.com/contact");
        b.email = Some("jane@acme.com".to_string());
        b.phone = Some("+15551234567".to_string());
        b.title = Some("Chief Executive Officer".to_string());
        b.confidence = 0.4;

        let merged = transformer.merge_leads(vec![a, b]);
        assert_eq!(merged.len(), 1);
        let lead = &merged[0];
        assert_eq!(lead.phone.as_deref(), Some("+15551234567"));
        assert_eq!(lead.title.as_deref(), Some("Chief Executive Officer"));
        assert!((lead.confidence - 0.7).abs() < f32::EPSILON);
        // Already-set fields survive the merge.
        assert_eq!(lead.email.as_deref(), Some("jane@acme.com"));
    }

    #[test]
    fn merge_falls_back_to_name_key() {
        let transformer = LeadTransformer::new();
        let a = ExtractedLead::new("Bob Brown", "https://acme.com/a");
        let b = ExtractedLead::new("bob brown", "https://acme.com/b");
        let c = ExtractedLead::new("Alice Wong", "https://acme.com/c");
        assert_eq!(transformer.merge_leads(vec![a, b, c]).len(), 2);
    }

    #[test]
    fn transform_lead_applies_all_normalizations() {
        let transformer = LeadTransformer::new();
        let mut lead = ExtractedLead::new("jane   smith", "https://acme.com");
        lead.email = Some("Jane@ACME.com".to_string());
        lead.phone = Some("(555) 123-4567".to_string());
        lead.title = Some("CTO".to_string());
        lead.company = Some("Acme, Inc.".to_string());

        let lead = transformer.transform_lead(lead);
        assert_eq!(lead.name, "Jane Smith");
        assert_eq!(lead.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(lead.phone.as_deref(), Some("+15551234567"));
        assert_eq!(lead.title.as_deref(), Some("Chief Technology Officer"));
        assert_eq!(lead.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn company_transform_dedups_and_lowercases_domain() {
        let transformer = LeadTransformer::new();
        let company = CompanyInfo {
            name: "Acme Inc.".to_string(),
            domain: "www.Acme.COM".to_string(),
            description: None,
            industry: None,
            size: Some("42 people".to_string()),
            location: None,
            founded: None,
            website: "https://acme.com".to_string(),
            technologies: vec!["React".into(), "React".into(), "Node.js".into()],
            services: vec![],
            social_profiles: vec![],
        };
        let company = transformer.transform_company_info(company);
        assert_eq!(company.domain, "acme.com");
        assert_eq!(company.technologies, vec!["React".to_string(), "Node.js".to_string()]);
        assert_eq!(company.size.as_deref(), Some("11-50 employees"));
    }
}
