use std::collections::HashMap;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::models::{CompanyInfo, ExtractedLead, Seniority, SocialProfile};

const CONTEXT_WINDOW: usize = 200;

/// Pattern-based extraction of lead candidates and company facts from page
/// content. Regexes are compiled once at construction.
pub struct LeadExtractor {
    email_regex: Regex,
    linkedin_regex: Regex,
    phone_regexes: Vec<Regex>,
    name_regexes: Vec<Regex>,
    json_ld_regex: Regex,
    meta_regex: Regex,
}

impl Default for LeadExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadExtractor {
    pub fn new() -> Self {
        Self {
            email_regex: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),
            linkedin_regex: Regex::new(r"https?://(?:www\.)?linkedin\.com/in/[a-zA-Z0-9\-]+")
                .unwrap(),
            phone_regexes: vec![
                Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\d{3}[-.\s]\d{3}[-.\s]\d{4}").unwrap(),
                Regex::new(r"\+\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{3,4}[-.\s]?\d{3,4}").unwrap(),
            ],
            name_regexes: vec![
                Regex::new(r"(?:Mr\.|Mrs\.|Ms\.|Dr\.|Prof\.)\s+([A-Z][a-z]+\s+[A-Z][a-z]+)")
                    .unwrap(),
                Regex::new(
                    r"([A-Z][a-z]+\s+[A-Z][a-z]+)\s*,\s*(?:CEO|CTO|CFO|COO|President|Director|Manager|Lead|Founder)",
                )
                .unwrap(),
                Regex::new(r"Contact:\s*([A-Z][a-z]+\s+[A-Z][a-z]+)").unwrap(),
            ],
            json_ld_regex: Regex::new(
                r#"(?s)<script type="application/ld\+json">(.*?)</script>"#,
            )
            .unwrap(),
            meta_regex: Regex::new(r#"<meta\s+(?:name|property)="([^"]+)"\s+content="([^"]+)""#)
                .unwrap(),
        }
    }

    /// Produce lead candidates by locating emails, phones, LinkedIn URLs and
    /// capitalized names independently, then pairing them positionally.
    pub fn extract_leads(&self, content: &str, source_url: &str) -> Vec<ExtractedLead> {
        let emails: Vec<&str> = self
            .email_regex
            .find_iter(content)
            .map(|m| m.as_str())
            .collect();
        let phones = self.extract_phones(content);
        let linkedin_urls: Vec<&str> = self
            .linkedin_regex
            .find_iter(content)
            .map(|m| m.as_str())
            .collect();
        let names = self.extract_names(content);

        let count = emails.len().max(names.len());
        let mut leads = Vec::with_capacity(count);

        for i in 0..count {
            let name = names.get(i).cloned().unwrap_or_else(|| "Unknown".to_string());
            let mut lead = ExtractedLead::new(name, source_url);
            lead.email = emails.get(i).map(|e| e.to_string());
            lead.phone = phones.get(i).cloned();
            lead.linkedin_url = linkedin_urls.get(i).map(|u| u.to_string());
            lead.confidence = calculate_confidence(
                lead.email.is_some(),
                names.get(i).is_some(),
                lead.phone.is_some(),
            );

            if let Some(email) = &lead.email {
                let context = extract_context(content, email, CONTEXT_WINDOW);
                let role = infer_role(&context);
                lead.title = role.title;
                lead.department = role.department;
                lead.seniority = role.seniority;
                lead.context = Some(context);
            }

            leads.push(lead);
        }

        debug!("Extracted {} lead candidates from {}", leads.len(), source_url);
        leads
    }

    /// Company facts from domain, title/copyright patterns and keyword scans.
    /// Returns `None` when no name distinct from the bare domain was found.
    pub fn extract_company_info(&self, content: &str, url: &str) -> Option<CompanyInfo> {
        let domain = Url::parse(url)
            .ok()?
            .host_str()?
            .trim_start_matches("www.")
            .to_string();

        let name = self.extract_company_name(content, &domain);
        if name.is_empty() || name == domain {
            return None;
        }

        Some(CompanyInfo {
            name,
            domain,
            description: self.extract_description(content),
            industry: extract_industry(content),
            size: extract_company_size(content),
            location: extract_location(content),
            founded: extract_founded_year(content),
            website: url.to_string(),
            technologies: detect_technologies(content),
            services: extract_services(content),
            social_profiles: extract_social_profiles(content),
        })
    }

    /// JSON-LD blocks that parse as JSON; invalid blocks are skipped.
    pub fn extract_structured_data(&self, html: &str) -> Vec<serde_json::Value> {
        self.json_ld_regex
            .captures_iter(html)
            .filter_map(|caps| serde_json::from_str(caps[1].trim()).ok())
            .collect()
    }

    pub fn extract_meta_tags(&self, html: &str) -> HashMap<String, String> {
        self.meta_regex
            .captures_iter(html)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    }

    fn extract_phones(&self, content: &str) -> Vec<String> {
        let mut phones = Vec::new();
        for pattern in &self.phone_regexes {
            for m in pattern.find_iter(content) {
                let raw = m.as_str().trim();
                let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
                if (10..=15).contains(&digits.len()) && !phones.contains(&raw.to_string()) {
                    phones.push(raw.to_string());
                }
            }
        }
        phones
    }

    fn extract_names(&self, content: &str) -> Vec<String> {
        let mut names = Vec::new();
        for pattern in &self.name_regexes {
            for caps in pattern.captures_iter(content) {
                let name = caps[1].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn extract_company_name(&self, content: &str, domain: &str) -> String {
        let patterns = [
            r"<title>([^<]+)</title>",
            r"(?i)company[:\s]+([^,\n<]+)",
            r"(?:©|Copyright)\s+\d{4}\s+([^,\n<]+)",
        ];
        for pattern in patterns {
            if let Some(caps) = Regex::new(pattern).ok().and_then(|re| re.captures(content)) {
                let name = caps[1].trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }
        // Fall back to the first domain label.
        domain.split('.').next().unwrap_or(domain).to_string()
    }

    fn extract_description(&self, content: &str) -> Option<String> {
        Regex::new(r#"(?i)<meta\s+name="description"\s+content="([^"]+)""#)
            .ok()?
            .captures(content)
            .map(|caps| caps[1].to_string())
    }
}

struct InferredRole {
    title: Option<String>,
    department: Option<String>,
    seniority: Option<Seniority>,
}

/// Keyword-match a job title, department and seniority within a context
/// window around an email.
fn infer_role(context: &str) -> InferredRole {
    let title_levels: [(&[&str], Seniority); 4] = [
        (
            &["CEO", "CTO", "CFO", "COO", "President", "VP", "Vice President", "Director"],
            Seniority::Executive,
        ),
        (&["Senior", "Lead", "Principal", "Manager", "Head"], Seniority::Senior),
        (
            &["Developer", "Engineer", "Designer", "Analyst", "Specialist"],
            Seniority::Mid,
        ),
        (&["Junior", "Intern", "Associate", "Assistant"], Seniority::Entry),
    ];
    let departments: [(&str, &[&str]); 4] = [
        ("engineering", &["Engineering", "Development", "Technical", "IT"]),
        ("sales", &["Sales", "Business Development", "Account"]),
        ("marketing", &["Marketing", "Growth", "Brand", "Content"]),
        ("operations", &["Operations", "Admin", "HR", "Finance"]),
    ];

    let mut title = None;
    let mut seniority = None;
    for (keywords, level) in &title_levels {
        if let Some(keyword) = keywords.iter().find(|k| context.contains(**k)) {
            title = Some(keyword.to_string());
            seniority = Some(*level);
            break;
        }
    }

    let department = departments
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| context.contains(k)))
        .map(|(dept, _)| dept.to_string());

    InferredRole {
        title,
        department,
        seniority,
    }
}

fn calculate_confidence(has_email: bool, has_name: bool, has_phone: bool) -> f32 {
    let mut score = 0.0;
    if has_email {
        score += 0.4;
    }
    if has_name {
        score += 0.3;
    }
    if has_phone {
        score += 0.3;
    }
    f32::min(score, 1.0)
}

/// Window of up to `window` bytes on each side of `target`, clamped to char
/// boundaries.
fn extract_context(content: &str, target: &str, window: usize) -> String {
    let Some(index) = content.find(target) else {
        return String::new();
    };
    let mut start = index.saturating_sub(window);
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (index + target.len() + window).min(content.len());
    while !content.is_char_boundary(end) {
        end += 1;
    }
    content[start..end].to_string()
}

fn extract_industry(content: &str) -> Option<String> {
    const INDUSTRIES: [&str; 10] = [
        "Technology",
        "Software",
        "Healthcare",
        "Finance",
        "Education",
        "Retail",
        "Manufacturing",
        "Consulting",
        "Media",
        "Real Estate",
    ];
    let lower = content.to_lowercase();
    INDUSTRIES
        .iter()
        .find(|industry| lower.contains(&industry.to_lowercase()))
        .map(|s| s.to_string())
}

fn extract_company_size(content: &str) -> Option<String> {
    let patterns = [
        r"(?i)(\d+[-+]?\d*)\s*employees",
        r"(?i)team of\s+(\d+)",
        r"(?i)(\d+)\s*people",
    ];
    for pattern in patterns {
        if let Some(caps) = Regex::new(pattern).ok().and_then(|re| re.captures(content)) {
            return Some(format!("{} employees", &caps[1]));
        }
    }
    None
}

fn extract_location(content: &str) -> Option<String> {
    Regex::new(r"(?i)(?:Location|Headquarters|Based in)[:\s]+([^,\n<]+)")
        .ok()?
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
}

fn extract_founded_year(content: &str) -> Option<String> {
    let patterns = [r"(?i)(?:Founded|Established|Since)[:\s]+(\d{4})", r"©\s*(\d{4})"];
    for pattern in patterns {
        if let Some(caps) = Regex::new(pattern).ok().and_then(|re| re.captures(content)) {
            return Some(caps[1].to_string());
        }
    }
    None
}

fn extract_social_profiles(content: &str) -> Vec<SocialProfile> {
    let platforms = [
        ("linkedin", r"https?://(?:www\.)?linkedin\.com/company/[a-zA-Z0-9\-]+"),
        ("twitter", r"https?://(?:www\.)?twitter\.com/[a-zA-Z0-9_]+"),
        ("facebook", r"https?://(?:www\.)?facebook\.com/[a-zA-Z0-9.]+"),
        ("instagram", r"https?://(?:www\.)?instagram\.com/[a-zA-Z0-9_.]+"),
    ];
    platforms
        .iter()
        .filter_map(|(platform, pattern)| {
            Regex::new(pattern)
                .ok()
                .and_then(|re| re.find(content))
                .map(|m| SocialProfile {
                    platform: platform.to_string(),
                    url: m.as_str().to_string(),
                })
        })
        .collect()
}

fn detect_technologies(content: &str) -> Vec<String> {
    let indicators: [(&str, &[&str]); 7] = [
        ("React", &["react", "jsx", "useState"]),
        ("Angular", &["ng-", "angular"]),
        ("Vue", &["v-if", "v-for", "vue"]),
        ("WordPress", &["wp-content", "wordpress"]),
        ("Shopify", &["shopify", "myshopify"]),
        ("Next.js", &["_next", "nextjs"]),
        ("Node.js", &["node", "express"]),
    ];
    indicators
        .iter()
        .filter(|(_, needles)| needles.iter().any(|n| content.contains(n)))
        .map(|(tech, _)| tech.to_string())
        .collect()
}

fn extract_services(content: &str) -> Vec<String> {
    const KEYWORDS: [&str; 8] = [
        "consulting",
        "development",
        "design",
        "marketing",
        "analytics",
        "support",
        "training",
        "integration",
    ];
    let lower = content.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|keyword| lower.contains(**keyword))
        .map(|keyword| {
            let mut chars = keyword.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
