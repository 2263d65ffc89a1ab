use std::collections::HashMap;

use base64::Engine;
use chrono::Utc;
use serde_json::json;

use crate::error::{Result, ScraperError};
use crate::models::ExtractedLead;

const DEFAULT_FIELDS: [&str; 11] = [
    "name",
    "email",
    "phone",
    "title",
    "company",
    "department",
    "seniority",
    "linkedin_url",
    "location",
    "confidence",
    "source_url",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xml,
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
            ExportFormat::Excel => "xls",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrmTarget {
    Salesforce,
    Hubspot,
    Pipedrive,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Fields to include, in order. Empty means the default field set.
    pub fields: Vec<String>,
    /// Overrides for column headers, keyed by field name.
    pub custom_mapping: HashMap<String, String>,
    /// Wrap JSON output with export date / totals.
    pub include_metadata: bool,
}

/// Serializes lead sets to CSV/JSON/XML/Excel and CRM-shaped payloads.
#[derive(Default)]
pub struct ExportManager;

impl ExportManager {
    pub fn new() -> Self {
        Self
    }

    pub fn export(
        &self,
        leads: &[ExtractedLead],
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<String> {
        match format {
            ExportFormat::Csv => Ok(self.export_to_csv(leads, options)),
            ExportFormat::Json => self.export_to_json(leads, options),
            ExportFormat::Xml => Ok(self.export_to_xml(leads, options)),
            ExportFormat::Excel => Ok(self.export_to_excel(leads, options)),
        }
    }

    /// UTF-8 CSV with a BOM for Excel. Fields containing commas or quotes
    /// are quoted, embedded quotes doubled.
    pub fn export_to_csv(&self, leads: &[ExtractedLead], options: &ExportOptions) -> String {
        if leads.is_empty() {
            return String::new();
        }
        let fields = selected_fields(options);
        let headers: Vec<String> = fields
            .iter()
            .map(|f| header_for(f, &options.custom_mapping))
            .collect();

        let mut lines = vec![headers.join(",")];
        for lead in leads {
            let row: Vec<String> = fields
                .iter()
                .map(|f| csv_escape(&field_value(lead, f).unwrap_or_default()))
                .collect();
            lines.push(row.join(","));
        }
        format!("\u{feff}{}", lines.join("\n"))
    }

    pub fn export_to_json(&self, leads: &[ExtractedLead], options: &ExportOptions) -> Result<String> {
        let value = if options.include_metadata {
            json!({
                "exportDate": Utc::now().to_rfc3339(),
                "totalLeads": leads.len(),
                "fields": selected_fields(options),
                "leads": leads,
            })
        } else {
            serde_json::to_value(leads)?
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// One `<lead>` element per record with a child element per populated
    /// field, XML-escaped.
    pub fn export_to_xml(&self, leads: &[ExtractedLead], options: &ExportOptions) -> String {
        let fields = selected_fields(options);
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<leads>\n");
        for lead in leads {
            xml.push_str("  <lead>\n");
            for field in &fields {
                if let Some(value) = field_value(lead, field) {
                    xml.push_str(&format!(
                        "    <{field}>{}</{field}>\n",
                        xml_escape(&value)
                    ));
                }
            }
            xml.push_str("  </lead>\n");
        }
        xml.push_str("</leads>");
        xml
    }

    /// HTML-table flavor that Excel opens, base64-encoded.
    pub fn export_to_excel(&self, leads: &[ExtractedLead], options: &ExportOptions) -> String {
        let fields = selected_fields(options);
        let headers: Vec<String> = fields
            .iter()
            .map(|f| header_for(f, &options.custom_mapping))
            .collect();

        let mut html = String::from(
            "<html xmlns:o=\"urn:schemas-microsoft-com:office:office\" \
             xmlns:x=\"urn:schemas-microsoft-com:office:excel\">\
             <head><meta charset=\"utf-8\"></head><body><table><thead><tr>",
        );
        for header in &headers {
            html.push_str(&format!("<th>{}</th>", html_escape(header)));
        }
        html.push_str("</tr></thead><tbody>");
        for lead in leads {
            html.push_str("<tr>");
            for field in &fields {
                html.push_str(&format!(
                    "<td>{}</td>",
                    html_escape(&field_value(lead, field).unwrap_or_default())
                ));
            }
            html.push_str("</tr>");
        }
        html.push_str("</tbody></table></body></html>");

        base64::engine::general_purpose::STANDARD.encode(html)
    }

    /// Map leads into the shape a CRM import endpoint expects.
    pub fn format_for_crm(&self, leads: &[ExtractedLead], target: CrmTarget) -> Vec<serde_json::Value> {
        leads
            .iter()
            .map(|lead| {
                let (first, last) = split_name(&lead.name);
                match target {
                    CrmTarget::Salesforce => json!({
                        "FirstName": first,
                        "LastName": last,
                        "Email": lead.email,
                        "Phone": lead.phone,
                        "Title": lead.title,
                        "Company": lead.company,
                        "Department__c": lead.department,
                        "LinkedIn_URL__c": lead.linkedin_url,
                        "Lead_Score__c": (lead.confidence * 100.0).round() as i64,
                        "LeadSource": "Web Scraper",
                        "Status": "New",
                    }),
                    CrmTarget::Hubspot => json!({
                        "properties": {
                            "firstname": first,
                            "lastname": last,
                            "email": lead.email,
                            "phone": lead.phone,
                            "jobtitle": lead.title,
                            "company": lead.company,
                            "hs_lead_status": "NEW",
                            "lead_confidence_score": lead.confidence,
                            "linkedin_profile": lead.linkedin_url,
                        }
                    }),
                    CrmTarget::Pipedrive => json!({
                        "name": lead.name,
                        "email": lead.email.as_ref().map(|e| json!([{ "value": e, "primary": true }])).unwrap_or(json!([])),
                        "phone": lead.phone.as_ref().map(|p| json!([{ "value": p, "primary": true }])).unwrap_or(json!([])),
                        "org_name": lead.company,
                        "job_title": lead.title,
                        "custom_fields": {
                            "linkedin_url": lead.linkedin_url,
                            "confidence_score": lead.confidence,
                            "department": lead.department,
                        }
                    }),
                }
            })
            .collect()
    }

    pub fn generate_filename(&self, format: ExportFormat) -> String {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        format!("leads-export-{}.{}", timestamp, format.extension())
    }

    pub fn generate_summary(&self, leads: &[ExtractedLead]) -> String {
        let total = leads.len();
        if total == 0 {
            return "Export Summary:\n- Total Leads: 0".to_string();
        }
        let with_email = leads.iter().filter(|l| l.email.is_some()).count();
        let with_phone = leads.iter().filter(|l| l.phone.is_some()).count();
        let with_linkedin = leads.iter().filter(|l| l.linkedin_url.is_some()).count();
        let avg_confidence: f32 =
            leads.iter().map(|l| l.confidence).sum::<f32>() / total as f32;
        let pct = |n: usize| (n as f64 / total as f64 * 100.0).round();

        format!(
            "Export Summary:\n- Total Leads: {}\n- With Email: {} ({}%)\n- With Phone: {} ({}%)\n- With LinkedIn: {} ({}%)\n- Average Confidence: {:.1}%",
            total,
            with_email,
            pct(with_email),
            with_phone,
            pct(with_phone),
            with_linkedin,
            pct(with_linkedin),
            avg_confidence * 100.0,
        )
    }

    pub fn write_to_file(
        &self,
        leads: &[ExtractedLead],
        format: ExportFormat,
        options: &ExportOptions,
        directory: &str,
    ) -> Result<std::path::PathBuf> {
        let content = self.export(leads, format, options)?;
        let path = std::path::Path::new(directory).join(self.generate_filename(format));
        std::fs::create_dir_all(directory)
            .map_err(|e| ScraperError::Export(format!("cannot create {}: {}", directory, e)))?;
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

fn selected_fields(options: &ExportOptions) -> Vec<String> {
    if options.fields.is_empty() {
        DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
    } else {
        options.fields.clone()
    }
}

fn header_for(field: &str, mapping: &HashMap<String, String>) -> String {
    mapping
        .get(field)
        .cloned()
        .unwrap_or_else(|| humanize_field_name(field))
}

/// `linkedin_url` -> `Linkedin Url`
fn humanize_field_name(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn field_value(lead: &ExtractedLead, field: &str) -> Option<String> {
    match field {
        "name" => Some(lead.name.clone()),
        "email" => lead.email.clone(),
        "phone" => lead.phone.clone(),
        "title" => lead.title.clone(),
        "company" => lead.company.clone(),
        "department" => lead.department.clone(),
        "seniority" => lead
            .seniority
            .map(|s| format!("{:?}", s).to_lowercase()),
        "linkedin_url" => lead.linkedin_url.clone(),
        "location" => lead.location.clone(),
        "confidence" => Some(format!("{}", lead.confidence)),
        "source_url" => Some(lead.source_url.clone()),
        "context" => lead.context.clone(),
        _ => None,
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split(' ');
    let first = parts.next().unwrap_or("").to_string();
    let rest: Vec<&str> = parts.collect();
    let last = if rest.is_empty() {
        "Unknown".to_string()
    } else {
        rest.join(" ")
    };
    (first, last)
}
