//! `render_referral`: bilingual referral document (HTML) plus a plain-text
//! copy with the raw bundle appended.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::capability::TypedToolHandler;
use crate::error::PassportError;

pub const DEFAULT_TITLE: &str = "Medical Passport Referral";

/// "Key risks" style headings, dropped from summaries because the risks
/// are rendered as their own list.
const RISK_HEADINGS: &[&str] = &[
    // en
    "key risks", "risks", "main risks", "risk factors",
    // es
    "riesgos clave", "riesgos", "principales riesgos", "factores de riesgo",
    // fr
    "risques clés", "risques", "principaux risques", "facteurs de risque",
    // pt
    "riscos principais", "riscos chave", "riscos", "fatores de risco",
    // it
    "rischi chiave", "rischi principali", "rischi", "fattori di rischio",
    // de
    "zentrale risiken", "wichtige risiken", "hauptrisiken", "risiken", "risikofaktoren",
    // tr
    "ana riskler", "önemli riskler", "riskler", "risk faktörleri",
    // ru
    "ключевые риски", "основные риски", "риски", "факторы риска",
    // ar
    "المخاطر الرئيسية", "المخاطر",
    // fa
    "ریسک‌های کلیدی", "ریسک‌های اصلی", "ریسک‌ها", "عوامل خطر",
    // ur
    "اہم خطرات", "بنیادی خطرات", "خطرات", "خطر کے عوامل",
    // hi
    "मुख्य जोखिम", "प्रमुख जोखिम", "जोखिम", "जोखिम कारक",
    // bn
    "মূল ঝুঁকি", "প্রধান ঝুঁকি", "ঝুঁকি", "ঝুঁকির কারণ",
    // zh
    "关键风险", "主要风险", "风险", "风险因素", "關鍵風險", "主要風險", "風險", "風險因素",
    // id / ms
    "risiko utama", "risiko kunci", "risiko", "faktor risiko",
    // sw
    "hatari kuu", "hatari muhimu", "hatari", "vichocheo vya hatari",
    // tl
    "mahahalagang panganib", "pangunahing panganib", "mga panganib", "mga salik ng panganib",
];

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderInput {
    pub bundle: Map<String, Value>,
    pub summary_clinic: String,
    pub summary_patient: String,
    pub risks_clinic: Vec<String>,
    pub risks_patient: Vec<String>,
    #[schemars(length(min = 1))]
    pub clinic_lang: String,
    #[schemars(length(min = 1))]
    pub patient_lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderOutput {
    /// Formatted (HTML) referral document.
    pub document_path: String,
    /// Plain-text referral document.
    pub text_path: String,
    pub summary_clinic: String,
    pub summary_patient: String,
    pub risks_clinic: Vec<String>,
    pub risks_patient: Vec<String>,
}

// ─── Text helpers ───────────────────────────────────────────────────────

/// NFKC, lowercase, then strip combining marks: fullwidth, decomposed and
/// unaccented spellings of a heading compare equal.
fn normalize_heading(line: &str) -> String {
    let lowered = line.nfkc().collect::<String>().to_lowercase();
    let cleaned: String = lowered
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !matches!(c, '\u{00AD}' | '\u{200C}' | '\u{200D}'))
        .collect();
    let trimmed = cleaned
        .trim()
        .trim_matches(|c: char| matches!(c, ':' | '：' | '#' | '*'))
        .trim();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove lines that consist only of a "key risks" heading.
pub fn strip_risk_headings(text: &str) -> String {
    let headings: Vec<String> = RISK_HEADINGS.iter().map(|h| normalize_heading(h)).collect();
    text.lines()
        .filter(|line| !headings.contains(&normalize_heading(line)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// True when the text contains Hebrew, Arabic-script or presentation-form
/// characters.
pub fn is_rtl(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0x0590..=0x08FF).contains(&cp) || (0xFB1D..=0xFEFF).contains(&cp)
    })
}

fn text_at(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// One line per Condition / MedicationStatement / Procedure / Observation
/// entry that carries text. Other resources are skipped.
pub fn bundle_to_bullets(bundle: &Map<String, Value>) -> Vec<String> {
    let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| entry.get("resource"))
        .filter_map(|resource| {
            let line = match resource.get("resourceType").and_then(Value::as_str)? {
                "Condition" | "Procedure" => text_at(resource, "code"),
                "MedicationStatement" => text_at(resource, "medicationCodeableConcept"),
                "Observation" => {
                    let code = text_at(resource, "code");
                    let value = resource
                        .get("valueString")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim();
                    match (code.is_empty(), value.is_empty()) {
                        (_, true) => code,
                        (true, false) => value.to_string(),
                        (false, false) => format!("{}: {}", code, value),
                    }
                }
                _ => String::new(),
            };
            (!line.is_empty()).then_some(line)
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn dir_of(text: &str) -> &'static str {
    if is_rtl(text) {
        "rtl"
    } else {
        "ltr"
    }
}

// ─── Documents ──────────────────────────────────────────────────────────

/// Input after heading cleanup; what both documents are rendered from.
struct Referral<'a> {
    title: &'a str,
    generated: String,
    clinic_lang: &'a str,
    patient_lang: &'a str,
    summary_clinic: String,
    summary_patient: String,
    risks_clinic: &'a [String],
    risks_patient: &'a [String],
    bullets: Vec<String>,
    bundle: &'a Map<String, Value>,
}

fn html_section(out: &mut String, heading: &str, lang: &str, summary: &str, risks: &[String]) {
    let dir = dir_of(&format!("{}{}", summary, risks.concat()));
    out.push_str(&format!(
        "<section lang=\"{}\" dir=\"{}\">\n<h2>{}</h2>\n",
        escape_html(lang),
        dir,
        heading
    ));
    for paragraph in summary.split("\n\n").filter(|p| !p.trim().is_empty()) {
        out.push_str(&format!(
            "<p>{}</p>\n",
            escape_html(paragraph.trim()).replace('\n', "<br>")
        ));
    }
    if !risks.is_empty() {
        out.push_str("<h3>Key Risks</h3>\n<ul>\n");
        for risk in risks {
            out.push_str(&format!("<li>{}</li>\n", escape_html(risk)));
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</section>\n<hr>\n");
}

fn render_html(doc: &Referral<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n",
        escape_html(doc.clinic_lang),
        escape_html(doc.title)
    ));
    out.push_str(
        "<style>body{font-family:sans-serif;max-width:48em;margin:2em auto;line-height:1.4}\
         h1,.generated{text-align:center}[dir=rtl]{text-align:right}</style>\n</head>\n<body>\n",
    );
    out.push_str(&format!(
        "<h1>{}</h1>\n<p class=\"generated\">Generated {}</p>\n<hr>\n",
        escape_html(doc.title),
        doc.generated
    ));
    html_section(
        &mut out,
        "Clinical Summary",
        doc.clinic_lang,
        &doc.summary_clinic,
        doc.risks_clinic,
    );
    html_section(
        &mut out,
        "Patient Summary",
        doc.patient_lang,
        &doc.summary_patient,
        doc.risks_patient,
    );
    if !doc.bullets.is_empty() {
        out.push_str(&format!(
            "<section lang=\"{}\">\n<h2>Structured Clinical Data</h2>\n<ul>\n",
            escape_html(doc.clinic_lang)
        ));
        for bullet in &doc.bullets {
            out.push_str(&format!("<li>{}</li>\n", escape_html(bullet)));
        }
        out.push_str("</ul>\n</section>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn render_text(doc: &Referral<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\nGenerated {}\n\n", doc.title, doc.generated));

    out.push_str("=== Clinical Summary ===\n");
    out.push_str(&doc.summary_clinic);
    out.push_str("\n\n");
    if !doc.risks_clinic.is_empty() {
        out.push_str("=== Key Risks ===\n");
        for risk in doc.risks_clinic {
            out.push_str(&format!("- {}\n", risk));
        }
        out.push('\n');
    }

    out.push_str("=== Patient Summary ===\n");
    out.push_str(&doc.summary_patient);
    out.push_str("\n\n");
    if !doc.risks_patient.is_empty() {
        out.push_str("=== Key Risks (Patient) ===\n");
        for risk in doc.risks_patient {
            out.push_str(&format!("- {}\n", risk));
        }
        out.push('\n');
    }

    out.push_str("=== Structured Clinical Data ===\n");
    for bullet in &doc.bullets {
        out.push_str(&format!("- {}\n", bullet));
    }
    out.push_str("\n=== Bundle (RAW JSON) ===\n");
    out.push_str(&serde_json::to_string_pretty(doc.bundle).unwrap_or_else(|_| "{}".into()));
    out.push('\n');
    out
}

pub struct RenderReferralTool {
    output_dir: PathBuf,
}

impl RenderReferralTool {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), PassportError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PassportError::upstream(format!("failed to write {}: {}", path.display(), e)))
}

#[async_trait]
impl TypedToolHandler for RenderReferralTool {
    type Input = RenderInput;
    type Output = RenderOutput;

    const NAME: &'static str = "render_referral";
    const DESCRIPTION: &'static str = "Render a bilingual referral document (HTML) and a plain-text copy from a \
        bundle, two summaries and two risk lists.";

    async fn handle(&self, input: RenderInput) -> Result<RenderOutput, PassportError> {
        let now = Utc::now();
        let doc = Referral {
            title: input.title.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_TITLE),
            generated: now.format("%Y-%m-%d").to_string(),
            clinic_lang: &input.clinic_lang,
            patient_lang: &input.patient_lang,
            summary_clinic: strip_risk_headings(&input.summary_clinic),
            summary_patient: strip_risk_headings(&input.summary_patient),
            risks_clinic: &input.risks_clinic,
            risks_patient: &input.risks_patient,
            bullets: bundle_to_bullets(&input.bundle),
            bundle: &input.bundle,
        };

        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            PassportError::upstream(format!(
                "failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let stem = format!("referral-{}-{}", now.format("%Y%m%d-%H%M%S"), &id[..8]);
        let document_path = self.output_dir.join(format!("{}.html", stem));
        let text_path = self.output_dir.join(format!("{}.txt", stem));

        write_file(&text_path, &render_text(&doc)).await?;
        write_file(&document_path, &render_html(&doc)).await?;

        tracing::info!("[Tool] render_referral wrote {}", document_path.display());

        Ok(RenderOutput {
            document_path: document_path.display().to_string(),
            text_path: text_path.display().to_string(),
            summary_clinic: doc.summary_clinic,
            summary_patient: doc.summary_patient,
            risks_clinic: input.risks_clinic.clone(),
            risks_patient: input.risks_patient.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_bundle() -> Map<String, Value> {
        match json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [
                {"resource": {"resourceType": "Condition", "code": {"text": "Hypertension"}}},
                {"resource": {"resourceType": "MedicationStatement", "medicationCodeableConcept": {"text": "Lisinopril 10 mg"}}},
                {"resource": {"resourceType": "Procedure", "code": {"text": ""}}},
                {"resource": {"resourceType": "Observation", "code": {"text": "Blood pressure"}, "valueString": "160/100"}},
                {"resource": {"resourceType": "Patient", "name": "x"}}
            ]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_risk_headings_are_stripped_in_many_languages() {
        let text = "Summary line.\nKey risks:\n**Risks**\nالمخاطر الرئيسية\nRiesgos clave :\nStill here.";
        assert_eq!(strip_risk_headings(text), "Summary line.\nStill here.");
    }

    #[test]
    fn test_heading_match_ignores_unicode_form_and_accents() {
        // Decomposed accent, missing accent, fullwidth letters and colon.
        let text = "Intro.\nRISQUES CLE\u{0301}S\nrisques cles\n\u{FF2B}\u{FF45}\u{FF59} risks\u{FF1A}\nFin.";
        assert_eq!(strip_risk_headings(text), "Intro.\nFin.");
    }

    #[test]
    fn test_headings_inside_sentences_are_kept() {
        let text = "Key risks include stroke.";
        assert_eq!(strip_risk_headings(text), text);
    }

    #[test]
    fn test_rtl_detection() {
        assert!(is_rtl("ضغط الدم"));
        assert!(is_rtl("שלום"));
        assert!(!is_rtl("Blood pressure"));
    }

    #[test]
    fn test_bundle_bullets_cover_supported_resources() {
        assert_eq!(
            bundle_to_bullets(&sample_bundle()),
            vec!["Hypertension", "Lisinopril 10 mg", "Blood pressure: 160/100"]
        );
        assert!(bundle_to_bullets(&Map::new()).is_empty());
    }

    #[test]
    fn test_html_is_escaped() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[tokio::test]
    async fn test_render_writes_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RenderReferralTool::new(dir.path().join("out"));

        let out = tool
            .handle(RenderInput {
                bundle: sample_bundle(),
                summary_clinic: "Hypertensive patient.\nKey risks:".into(),
                summary_patient: "مريض يعاني من ارتفاع ضغط الدم.".into(),
                risks_clinic: vec!["Stroke".into()],
                risks_patient: vec!["سكتة دماغية".into()],
                clinic_lang: "en".into(),
                patient_lang: "ar".into(),
                title: None,
            })
            .await
            .unwrap();

        assert_eq!(out.summary_clinic, "Hypertensive patient.");

        let text = std::fs::read_to_string(&out.text_path).unwrap();
        assert!(text.starts_with(DEFAULT_TITLE));
        assert!(text.contains("=== Key Risks ===\n- Stroke"));
        assert!(text.contains("- Blood pressure: 160/100"));
        assert!(text.contains("=== Bundle (RAW JSON) ==="));
        assert!(text.contains("\"resourceType\": \"Bundle\""));

        let html = std::fs::read_to_string(&out.document_path).unwrap();
        assert!(html.contains("<section lang=\"ar\" dir=\"rtl\">"));
        assert!(html.contains("<section lang=\"en\" dir=\"ltr\">"));
        assert!(out.document_path.ends_with(".html"));
    }
}
