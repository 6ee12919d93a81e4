use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

/// Attribute/class fragments of well-known contact form plugins.
const CONTACT_FORM_HINTS: &[&str] = &[
    "wpcf7",
    "wpforms",
    "hs-form",
    "hubspot",
    "formspree",
    "gravityforms",
    "contact-form",
];

/// Anchor labels that point at a contact page.
const CONTACT_LINK_LABELS: &[&str] = &["contact", "enquire", "enquiry", "get in touch", "email us"];

/// Inbox prefixes considered generic, i.e. addressed to the company rather
/// than a person.
const GENERIC_PREFIXES: &[&str] = &[
    "info", "contact", "hello", "enquiries", "inquiries", "sales", "office", "admin", "support",
    "mail", "team", "hi",
];

/// File endings that show up when the email regex trips over asset names
/// like `icon@2x.png`.
const JUNK_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico"];

#[derive(Debug, Clone)]
pub struct FoundEmail {
    pub address: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageContacts {
    pub emails: Vec<FoundEmail>,
    pub form_urls: Vec<String>,
}

pub struct ContactExtractor {
    email_re: Regex,
    mailto_re: Regex,
    cfemail_re: Regex,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactExtractor {
    pub fn new() -> Self {
        Self {
            email_re: Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,24}\b").unwrap(),
            mailto_re: Regex::new(r#"(?i)mailto:([^\s"'>?#]+)"#).unwrap(),
            cfemail_re: Regex::new(r#"data-cfemail="([0-9a-fA-F]+)""#).unwrap(),
        }
    }

    /// Scan one HTML page for email addresses and contact forms.
    pub fn extract(&self, html: &str, page_url: &str) -> PageContacts {
        let emails: Vec<FoundEmail> = self
            .gather_emails(html)
            .into_iter()
            .map(|address| FoundEmail {
                address,
                source_url: page_url.to_string(),
            })
            .collect();

        let document = Html::parse_document(html);
        let form_urls = find_contact_forms(&document, page_url);

        debug!(
            page = %page_url,
            emails = emails.len(),
            forms = form_urls.len(),
            "page scanned"
        );
        PageContacts { emails, form_urls }
    }

    /// Collect addresses from mailto links, visible text, and Cloudflare's
    /// data-cfemail obfuscation. BTreeSet keeps the result deterministic.
    fn gather_emails(&self, html: &str) -> BTreeSet<String> {
        let mut addresses = BTreeSet::new();

        for capture in self.mailto_re.captures_iter(html) {
            let addr = capture[1].split('?').next().unwrap_or("").trim().to_lowercase();
            if !addr.is_empty() && addr.contains('@') {
                addresses.insert(addr);
            }
        }

        for found in self.email_re.find_iter(html) {
            addresses.insert(found.as_str().to_lowercase());
        }

        for capture in self.cfemail_re.captures_iter(html) {
            if let Some(decoded) = decode_cfemail(&capture[1]) {
                if decoded.contains('@') {
                    addresses.insert(decoded.to_lowercase());
                }
            }
        }

        addresses.retain(|addr| !JUNK_SUFFIXES.iter().any(|s| addr.ends_with(s)));
        addresses
    }
}

/// Cloudflare email obfuscation: first byte is the XOR key, the rest the
/// encoded address.
pub fn decode_cfemail(hex: &str) -> Option<String> {
    if hex.len() < 4 || hex.len() % 2 != 0 {
        return None;
    }
    let bytes: Vec<u8> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let key = bytes[0];
    let decoded: Vec<u8> = bytes[1..].iter().map(|b| b ^ key).collect();
    String::from_utf8(decoded).ok()
}

fn find_contact_forms(document: &Html, page_url: &str) -> Vec<String> {
    let form_sel = Selector::parse("form").unwrap();
    let field_sel = Selector::parse("input, textarea, select").unwrap();
    let label_sel = Selector::parse("label").unwrap();
    let anchor_sel = Selector::parse("a[href]").unwrap();

    let mut urls: Vec<String> = Vec::new();

    for form in document.select(&form_sel) {
        let mut attrs = String::new();
        for (name, value) in form.value().attrs() {
            attrs.push_str(name);
            attrs.push('=');
            attrs.push_str(value);
            attrs.push(' ');
        }
        let attrs = attrs.to_lowercase();
        let plugin_hit = CONTACT_FORM_HINTS.iter().any(|hint| attrs.contains(hint));

        let mut fields = String::new();
        for input in form.select(&field_sel) {
            for attr in ["name", "id", "placeholder"] {
                if let Some(value) = input.value().attr(attr) {
                    fields.push_str(value);
                    fields.push(' ');
                }
            }
        }
        for label in form.select(&label_sel) {
            fields.push_str(&label.text().collect::<String>());
            fields.push(' ');
        }
        let fields = fields.to_lowercase();

        // A real contact form asks for an email and a message.
        if plugin_hit || (fields.contains("email") && fields.contains("message")) {
            urls.push(page_url.to_string());
            break;
        }
    }

    // Contact-labelled links count as a path to a form, resolved absolute.
    if let Ok(base) = Url::parse(page_url) {
        for anchor in document.select(&anchor_sel) {
            let label = anchor.text().collect::<String>().to_lowercase();
            if !CONTACT_LINK_LABELS.iter().any(|k| label.contains(k)) {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if let Ok(resolved) = base.join(href) {
                if resolved.scheme() == "http" || resolved.scheme() == "https" {
                    urls.push(resolved.to_string());
                }
            }
        }
    }

    dedup_keeping_order(urls)
}

fn dedup_keeping_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

pub fn is_generic_inbox(email: &str) -> bool {
    let local = email.split('@').next().unwrap_or("");
    GENERIC_PREFIXES.iter().any(|p| local == *p || local.starts_with(&format!("{}.", p)))
}

pub fn is_noreply(email: &str) -> bool {
    let local = email.split('@').next().unwrap_or("");
    local.contains("noreply") || local.contains("no-reply") || local.contains("donotreply") || local.contains("do-not-reply")
}

fn email_domain(email: &str) -> &str {
    email.rsplit('@').next().unwrap_or("")
}

fn on_site(email: &str, site_host: &str) -> bool {
    let domain = email_domain(email);
    let host = site_host.trim_start_matches("www.");
    domain == host
        || host.ends_with(&format!(".{}", domain))
        || domain.ends_with(&format!(".{}", host))
}

/// Order addresses best-first: generic inboxes over personal ones, the
/// company's own domain over others, noreply dead last. When
/// `prefer_company_domain` is set and anything on-domain exists, off-domain
/// addresses are dropped entirely.
pub fn rank_emails(
    mut emails: Vec<FoundEmail>,
    site_host: Option<&str>,
    prefer_company_domain: bool,
) -> Vec<FoundEmail> {
    if let Some(host) = site_host {
        if prefer_company_domain && emails.iter().any(|e| on_site(&e.address, host)) {
            emails.retain(|e| on_site(&e.address, host));
        }
    }
    emails.sort_by_key(|e| {
        let off_domain = site_host.map(|h| !on_site(&e.address, h)).unwrap_or(false);
        (
            is_noreply(&e.address),
            off_domain,
            !is_generic_inbox(&e.address),
            e.address.len(),
        )
    });
    emails
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> PageContacts {
        ContactExtractor::new().extract(html, "https://example.com/contact")
    }

    fn found(address: &str) -> FoundEmail {
        FoundEmail {
            address: address.to_string(),
            source_url: "https://example.com/contact".to_string(),
        }
    }

    #[test]
    fn finds_plain_text_emails() {
        let contacts = extract("<p>Reach us at contact@example.com for help.</p>");
        assert_eq!(contacts.emails.len(), 1);
        assert_eq!(contacts.emails[0].address, "contact@example.com");
    }

    #[test]
    fn finds_mailto_and_strips_query() {
        let contacts =
            extract(r#"<a href="mailto:Hello@Example.com?subject=Hi">Email us</a>"#);
        assert!(contacts
            .emails
            .iter()
            .any(|e| e.address == "hello@example.com"));
    }

    #[test]
    fn decodes_cloudflare_obfuscation() {
        // Encode "info@example.com" with XOR key 0x42 the way Cloudflare does.
        let key: u8 = 0x42;
        let mut hex = format!("{:02x}", key);
        for b in "info@example.com".bytes() {
            hex.push_str(&format!("{:02x}", b ^ key));
        }
        assert_eq!(decode_cfemail(&hex).as_deref(), Some("info@example.com"));

        let html = format!(r#"<span data-cfemail="{}">[email protected]</span>"#, hex);
        let contacts = extract(&html);
        assert!(contacts.emails.iter().any(|e| e.address == "info@example.com"));
    }

    #[test]
    fn rejects_malformed_cfemail() {
        assert_eq!(decode_cfemail(""), None);
        assert_eq!(decode_cfemail("4"), None);
        assert_eq!(decode_cfemail("zz42"), None);
    }

    #[test]
    fn asset_names_are_not_emails() {
        let contacts = extract(r#"<img src="logo@2x.png"> <p>mail us: team@acme.io</p>"#);
        assert_eq!(contacts.emails.len(), 1);
        assert_eq!(contacts.emails[0].address, "team@acme.io");
    }

    #[test]
    fn generic_inbox_beats_personal_address() {
        let ranked = rank_emails(
            vec![found("jane.doe@example.com"), found("contact@example.com")],
            Some("example.com"),
            true,
        );
        assert_eq!(ranked[0].address, "contact@example.com");
    }

    #[test]
    fn on_domain_beats_off_domain_without_strict_filter() {
        let ranked = rank_emails(
            vec![found("info@gmail.com"), found("press@acme.com")],
            Some("acme.com"),
            false,
        );
        assert_eq!(ranked[0].address, "press@acme.com");
    }

    #[test]
    fn strict_domain_preference_drops_off_domain() {
        let ranked = rank_emails(
            vec![found("info@gmail.com"), found("press@acme.com")],
            Some("acme.com"),
            true,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, "press@acme.com");
    }

    #[test]
    fn noreply_ranks_last() {
        let ranked = rank_emails(
            vec![found("noreply@acme.com"), found("jane@acme.com")],
            Some("acme.com"),
            true,
        );
        assert_eq!(ranked[0].address, "jane@acme.com");
        assert_eq!(ranked.last().unwrap().address, "noreply@acme.com");
    }

    #[test]
    fn detects_form_by_field_heuristic() {
        let html = r#"
            <form action="/send">
                <input name="your-email" placeholder="Email">
                <textarea name="message"></textarea>
            </form>"#;
        let contacts = extract(html);
        assert_eq!(contacts.form_urls, vec!["https://example.com/contact"]);
    }

    #[test]
    fn detects_form_by_plugin_hint() {
        let html = r#"<form class="wpcf7-form"><input name="f1"></form>"#;
        let contacts = extract(html);
        assert_eq!(contacts.form_urls, vec!["https://example.com/contact"]);
    }

    #[test]
    fn newsletter_form_is_not_a_contact_form() {
        let html = r#"<form><input name="email" placeholder="Subscribe"></form>"#;
        let contacts = extract(html);
        assert!(contacts.form_urls.is_empty());
    }

    #[test]
    fn contact_links_resolve_relative_hrefs() {
        let html = r#"<a href="/get-in-touch">Get in touch</a>"#;
        let contacts = extract(html);
        assert_eq!(contacts.form_urls, vec!["https://example.com/get-in-touch"]);
    }

    #[test]
    fn mailto_contact_links_are_not_form_urls() {
        let html = r#"<a href="mailto:info@example.com">Email us</a>"#;
        let contacts = extract(html);
        assert!(contacts.form_urls.is_empty());
        assert!(contacts.emails.iter().any(|e| e.address == "info@example.com"));
    }

    #[test]
    fn generic_prefix_matching_is_exact_on_local_part() {
        assert!(is_generic_inbox("info@acme.com"));
        assert!(is_generic_inbox("hello@acme.com"));
        assert!(!is_generic_inbox("information-desk@acme.com"));
        assert!(!is_generic_inbox("jane.doe@acme.com"));
    }
}
