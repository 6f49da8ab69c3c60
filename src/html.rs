// src/html.rs
//! Field extraction from SSO and portal pages.
//!
//! Regex-based on purpose: the pages are server-rendered templates with a
//! stable shape, and every extractor returns `None`/empty instead of failing
//! so the caller decides what is fatal.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::grades::{GradeRecord, Subject};

static RE_INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").unwrap());
static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .unwrap()
});
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_NAV: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<nav\b([^>]*)>(.*?)</nav>").unwrap());
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>").unwrap());
static RE_SLUG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\w{2}/etudiant/profil/(?P<slug>[a-zA-Z0-9._-]+\.[a-zA-Z0-9._-]+)/\w+").unwrap()
});

static RE_TBODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tbody\b[^>]*>(.*?)</tbody>").unwrap());
static RE_TR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static RE_TD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static RE_ABBR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<abbr\b([^>]*)>").unwrap());
static RE_BUTTON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<button\b([^>]*)>").unwrap());
static RE_GRADE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\w{2}/application/etudiant/note/details/(?P<id>\d+)").unwrap()
});
static RE_LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d+(?:[.,]\d+)?").unwrap());

/// Attribute name (lowercased) / entity-decoded value pairs of one start tag.
fn attributes(tag: &str) -> Vec<(String, String)> {
    RE_ATTR
        .captures_iter(tag)
        .map(|c| {
            let name = c[1].to_ascii_lowercase();
            let raw = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (name, html_escape::decode_html_entities(raw).to_string())
        })
        .collect()
}

fn attribute(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn has_class(attrs: &[(String, String)], class: &str) -> bool {
    attribute(attrs, "class")
        .map(|c| c.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// Visible text of an HTML fragment: tags stripped, entities decoded,
/// whitespace collapsed.
pub fn text_content(fragment: &str) -> String {
    let stripped = RE_TAGS.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&stripped).to_string();
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}

/// Every `<input type="hidden">` with a name, in document order.
pub fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    RE_INPUT
        .find_iter(html)
        .filter_map(|m| {
            let attrs = attributes(m.as_str());
            let is_hidden = attribute(&attrs, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
            if !is_hidden {
                return None;
            }
            let name = attribute(&attrs, "name").filter(|n| !n.is_empty())?;
            Some((name, attribute(&attrs, "value").unwrap_or_default()))
        })
        .collect()
}

/// Identity slug from the profile page: the first `a.nav-link` of a `nav.nav`
/// pointing at `/xx/etudiant/profil/<first.last>/...`.
pub fn identity_slug(html: &str) -> Option<String> {
    let href = RE_NAV
        .captures_iter(html)
        .filter(|nav| has_class(&attributes(&nav[1]), "nav"))
        .find_map(|nav| {
            let body = nav.get(2)?.as_str();
            RE_ANCHOR
                .captures_iter(body)
                .map(|a| attributes(&a[1]))
                .find(|attrs| has_class(attrs, "nav-link"))
        })
        .and_then(|attrs| attribute(&attrs, "href"))?;

    RE_SLUG
        .captures(&href)
        .map(|c| c["slug"].to_string())
}

/// Rows of every grades table body on the page, in page order.
pub fn grade_rows(html: &str) -> Vec<GradeRecord> {
    let mut out = Vec::new();
    for tbody in RE_TBODY.captures_iter(html) {
        for tr in RE_TR.captures_iter(&tbody[1]) {
            let cells: Vec<&str> = RE_TD
                .captures_iter(&tr[1])
                .filter_map(|td| td.get(1).map(|m| m.as_str()))
                .collect();
            if cells.is_empty() {
                continue;
            }
            out.push(grade_from_cells(&cells));
        }
    }
    out
}

fn grade_from_cells(cells: &[&str]) -> GradeRecord {
    let cell = |idx: usize| cells.get(idx).copied().unwrap_or_default();

    let full = RE_ABBR
        .captures(cell(0))
        .and_then(|c| attribute(&attributes(&c[1]), "title"))
        .filter(|t| !t.is_empty());

    let id = RE_BUTTON
        .captures_iter(cell(6))
        .filter_map(|b| attribute(&attributes(&b[1]), "data-modal-modal-url-value"))
        .find_map(|url| RE_GRADE_ID.captures(&url).map(|c| c["id"].to_string()));

    GradeRecord {
        subject: Subject {
            short: text_content(cell(0)),
            full,
        },
        evaluation: text_content(cell(1)),
        date: parse_french_date(&text_content(cell(2))),
        comment: text_content(cell(3)),
        grade: parse_decimal(&text_content(cell(4))),
        coefficient: parse_decimal(&text_content(cell(5))),
        id,
    }
}

/// French-notation number (`12,5`), reading the leading numeric part only.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let m = RE_LEADING_NUMBER.find(s.trim())?;
    m.as_str()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Long-form French date such as `5 janvier 2024` or `1er mars 2024`.
pub fn parse_french_date(s: &str) -> Option<NaiveDate> {
    let lower = s.trim().to_lowercase();
    let mut parts = lower.split_whitespace();
    let day: u32 = parts.next()?.trim_end_matches("er").parse().ok()?;
    let month = match parts.next()? {
        "janvier" => 1,
        "février" | "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "août" | "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "décembre" | "decembre" => 12,
        _ => return None,
    };
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <form method="post" id="fm1">
          <input type="text" name="username" value="">
          <input type="password" name="password">
          <input type="hidden" name="execution" value="e1s1&amp;x"/>
          <input name="_eventId" type='hidden' value='submit'>
          <input type="HIDDEN" name="geolocation" value="">
          <input type="hidden" value="nameless">
        </form>"#;

    const GRADES_PAGE: &str = r#"
      <table>
        <thead><tr><th>Matière</th><th>Évaluation</th></tr></thead>
        <tbody>
          <tr>
            <td>R1.01 <abbr title="Initiation au développement">(i)</abbr></td>
            <td>DS 1</td>
            <td>12 octobre 2023</td>
            <td>Bon travail</td>
            <td>15,5</td>
            <td>2</td>
            <td><button data-modal-modal-url-value="/fr/application/etudiant/note/details/4242">Voir</button></td>
          </tr>
          <tr>
            <td>R1.02</td>
            <td>TP noté</td>
            <td>pas de date</td>
            <td></td>
            <td>-</td>
            <td>1,5</td>
            <td></td>
          </tr>
        </tbody>
      </table>"#;

    #[test]
    fn hidden_inputs_are_collected_in_order() {
        let fields = hidden_inputs(LOGIN_PAGE);
        assert_eq!(
            fields,
            vec![
                ("execution".to_string(), "e1s1&x".to_string()),
                ("_eventId".to_string(), "submit".to_string()),
                ("geolocation".to_string(), String::new()),
            ]
        );
        assert!(hidden_inputs("<html><body>maintenance</body></html>").is_empty());
    }

    #[test]
    fn identity_slug_from_profile_nav() {
        let html = r#"
            <nav class="navbar"><a class="nav-link" href="/fr/accueil">Accueil</a></nav>
            <nav class="nav nav-tabs">
              <a class="nav-link active" href="/fr/etudiant/profil/jean.dupont/timeline">Profil</a>
              <a class="nav-link" href="/fr/etudiant/profil/jean.dupont/notes">Notes</a>
            </nav>"#;
        assert_eq!(identity_slug(html).as_deref(), Some("jean.dupont"));
        assert_eq!(identity_slug("<nav class=\"nav\"></nav>"), None);
    }

    #[test]
    fn grade_rows_extract_all_columns() {
        let rows = grade_rows(GRADES_PAGE);
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.subject.short, "R1.01 (i)");
        assert_eq!(
            first.subject.full.as_deref(),
            Some("Initiation au développement")
        );
        assert_eq!(first.evaluation, "DS 1");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2023, 10, 12));
        assert_eq!(first.comment, "Bon travail");
        assert_eq!(first.grade, Some(15.5));
        assert_eq!(first.coefficient, Some(2.0));
        assert_eq!(first.id.as_deref(), Some("4242"));
    }

    #[test]
    fn malformed_fields_become_null_not_dropped() {
        let rows = grade_rows(GRADES_PAGE);
        let second = &rows[1];
        assert_eq!(second.subject.full, None);
        assert_eq!(second.date, None);
        assert_eq!(second.grade, None);
        assert_eq!(second.coefficient, Some(1.5));
        assert_eq!(second.id, None);
    }

    #[test]
    fn french_dates_and_numbers() {
        assert_eq!(
            parse_french_date("1er février 2024"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            parse_french_date("31 Décembre 2023"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(parse_french_date("31 février 2024"), None);
        assert_eq!(parse_decimal("12,75/20"), Some(12.75));
        assert_eq!(parse_decimal("abs"), None);
    }
}
