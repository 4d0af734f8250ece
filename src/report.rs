//! Consultation report: assembly from storage and PDF rendering.
//!
//! The report gathers the consultation row and its satellites into labeled
//! sections. Values are stored HTML-escaped and printed unescaped; empty and
//! `N/A` values are left out. Rendering uses `printpdf` built-in fonts on A4
//! pages, breaking to a new page when the cursor reaches the bottom margin.

use std::io::BufWriter;

use chrono::NaiveDateTime;
use printpdf::*;
use rusqlite::Connection;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::intake::sanitizer::unescape_html;
use crate::models::*;

pub const REPORT_TITLE: &str = "Rapport de Consultation Drepadata";
const FOOTER: &str = "Document généré par Drepadata Consultation App";
const DEFAULT_PATIENT_NAME: &str = "Patient";
const PHONE_PREFIX: &str = "+237";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("PDF save error: {0}")]
    Save(String),
}

// ─── Assembly ─────────────────────────────────────────────────────────────────

/// Everything stored for one consultation.
#[derive(Debug, Clone)]
pub struct ConsultationReport {
    pub consultation: Consultation,
    pub treatment: Option<TreatmentRecord>,
    pub exam: Option<ExamRecord>,
    pub observation: Option<ObservationRecord>,
    pub vaccinations: VaccinationChecklist,
}

/// A titled block of printable lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: &'static str,
    pub lines: Vec<String>,
}

/// Load a consultation and its satellites. `NotFound` when the root row is
/// missing; absent satellites are simply left out of the report.
pub fn assemble_report(
    conn: &Connection,
    id: ConsultationId,
) -> Result<ConsultationReport, DatabaseError> {
    let consultation = repository::get_consultation(conn, id)?
        .ok_or_else(|| repository::not_found(id))?;

    Ok(ConsultationReport {
        consultation,
        treatment: repository::get_satellite::<TreatmentRecord>(conn, id)?,
        exam: repository::get_satellite::<ExamRecord>(conn, id)?,
        observation: repository::get_satellite::<ObservationRecord>(conn, id)?,
        vaccinations: repository::get_vaccinations(conn, id)?,
    })
}

impl ConsultationReport {
    /// Patient name as typed, or "Patient" when none was recorded.
    pub fn patient_name(&self) -> String {
        printable(self.consultation.fields.full_name.as_deref())
            .unwrap_or_else(|| DEFAULT_PATIENT_NAME.to_string())
    }

    /// Report body, in print order. Satellite sections appear only when the
    /// record exists; vaccinations, exams and comments only when non-empty.
    pub fn sections(&self, generated_at: NaiveDateTime) -> Vec<ReportSection> {
        let fields = &self.consultation.fields;
        let mut sections = Vec::new();

        sections.push(ReportSection {
            title: "INFORMATIONS PATIENT",
            lines: vec![
                format!("Nom et Prénom: {}", self.patient_name()),
                format!("Date de génération: {}", generated_at.format("%d/%m/%Y %H:%M")),
            ],
        });

        sections.push(labeled(
            "1. INFORMATIONS ADMINISTRATIVES",
            fields,
            &[
                ("FOSA", "fosa"),
                ("Région", "region"),
                ("District", "district"),
                ("Date du diagnostic", "diagnostic_date"),
                ("IPP", "ipp"),
                ("Personnel", "personnel"),
                ("Référé", "referred"),
                ("Référé de", "referred_from"),
                ("Référé pour", "referred_for"),
                ("Evolution", "evolution"),
            ],
        ));

        let mut demographics = labeled(
            "2. DONNÉES DÉMOGRAPHIQUES",
            fields,
            &[
                ("Age", "age"),
                ("Date de naissance", "birth_date"),
                ("Sexe", "sex"),
                ("Adresse", "address"),
                ("Contact d'urgence", "emergency_contact_name"),
                ("Relation", "emergency_contact_relation"),
            ],
        );
        if let Some(phone) = printable(fields.emergency_contact_phone.as_deref()) {
            demographics.lines.push(format!("Téléphone: {}", format_phone(&phone)));
        }
        demographics.lines.extend(field_lines(
            fields,
            &[
                ("Vit avec", "lives_with"),
                ("Assurance", "insurance"),
                ("Groupe de soutien", "support_group"),
                ("Nom du groupe", "group_name"),
                ("Parents biologiques", "parents"),
                ("Rang fratrie", "sibling_rank"),
            ],
        ));
        sections.push(demographics);

        if let Some(treatment) = &self.treatment {
            sections.push(labeled(
                "3. TRAITEMENTS EN COURS",
                treatment,
                &[
                    ("Hydroxyurée", "hydroxyurea"),
                    ("Tolérance", "tolerance"),
                    ("Raisons non-utilisation", "hydroxyurea_reasons"),
                    ("Posologie hydroxyurée", "hydroxyurea_dosage"),
                    ("Acide folique", "folic_acid"),
                    ("Pénicilline", "penicillin"),
                    ("Transfusions régulières", "regular_transfusion"),
                    ("Type transfusion", "transfusion_type"),
                    ("Fréquence transfusion", "transfusion_frequency"),
                    ("Dernière transfusion", "last_transfusion_date"),
                    ("Autres traitements", "other_treatments"),
                ],
            ));
        }

        if let Some(exam) = &self.exam {
            sections.push(labeled(
                "4. ANTÉCÉDENTS MÉDICAUX",
                exam,
                &[
                    ("Type drépanocytose", "sickle_type"),
                    ("Age au diagnostic", "diagnosis_age"),
                    ("Circonstances du diagnostic", "diagnosis_circumstance"),
                    ("Antécédents familiaux", "family_history"),
                    ("Autres antécédents", "other_medical_history"),
                    ("Chirurgies antérieures", "previous_surgeries"),
                    ("Allergies", "allergies"),
                    ("Crises vaso-occlusives", "vocs"),
                    ("Hospitalisations", "hospitalizations"),
                ],
            ));
        }

        if let Some(observation) = &self.observation {
            sections.push(labeled(
                "5. SUIVI PSYCHOSOCIAL",
                observation,
                &[
                    ("Impact scolaire", "impact_scolaire"),
                    ("Accompagnement psychologique", "accompagnement_psychologique"),
                    ("Soutien social", "soutien_social"),
                    ("Famille informée", "famille_informee"),
                    ("Plan de suivi", "plan_suivi_personnalise"),
                    ("Prochaine consultation", "date_prochaine_consultation"),
                    ("Prochaine consultation (plan)", "date_prochaine_consultation_plan"),
                    ("Éducation thérapeutique", "education_therapeutique"),
                ],
            ));
        }

        if !self.vaccinations.is_empty() {
            let lines = self
                .vaccinations
                .iter()
                .map(|(code, entry)| vaccine_line(*code, entry))
                .collect();
            sections.push(ReportSection { title: "6. VACCINATIONS", lines });
        }

        let exams: Vec<String> = fields
            .planned_exams()
            .iter()
            .filter_map(|exam| printable(Some(exam)))
            .map(|exam| format!("• {exam}"))
            .collect();
        if !exams.is_empty() {
            sections.push(ReportSection { title: "7. EXAMENS À RÉALISER", lines: exams });
        }

        if let Some(comments) = printable(fields.commentaires.as_deref()) {
            sections.push(ReportSection { title: "8. COMMENTAIRES", lines: vec![comments] });
        }

        sections
    }
}

fn labeled<R: RecordFields>(
    title: &'static str,
    record: &R,
    labels: &[(&str, &str)],
) -> ReportSection {
    ReportSection { title, lines: field_lines(record, labels) }
}

/// `Label: value` lines for the printable columns of a record.
fn field_lines<R: RecordFields>(record: &R, labels: &[(&str, &str)]) -> Vec<String> {
    labels
        .iter()
        .filter_map(|(label, column)| {
            printable(record.get(column)).map(|value| format!("{label}: {value}"))
        })
        .collect()
}

fn vaccine_line(code: VaccineCode, entry: &VaccineEntry) -> String {
    let mut parts = Vec::new();
    if let Some(received) = entry.received {
        parts.push(format!("Reçu: {received}"));
    }
    if let Some(date) = printable(entry.date.as_deref()) {
        parts.push(format!("Date: {date}"));
    }
    if !entry.administration.is_empty() {
        let routes: Vec<&str> = entry.administration.iter().map(|r| r.as_str()).collect();
        parts.push(format!("Voie: {}", routes.join(", ")));
    }
    if let Some(observations) = printable(entry.observations.as_deref()) {
        parts.push(format!("Observations: {observations}"));
    }
    if parts.is_empty() {
        format!("Vaccin: {}", code.label())
    } else {
        format!("Vaccin: {} ({})", code.label(), parts.join(", "))
    }
}

/// Unescaped value, or `None` for empty and `N/A` values.
fn printable(value: Option<&str>) -> Option<String> {
    let value = unescape_html(value?.trim());
    (!value.is_empty() && value != "N/A").then_some(value)
}

/// Local numbers are printed with the country prefix; anything else
/// (the RAS placeholder) as stored.
fn format_phone(phone: &str) -> String {
    if !phone.is_empty() && phone.chars().all(|c| c.is_ascii_digit()) {
        format!("{PHONE_PREFIX}{phone}")
    } else {
        phone.to_string()
    }
}

/// `consultation_report_<name>_<YYYY-mm-dd_HH-MM-SS>.pdf`, with every
/// character outside `[A-Za-z0-9_-]` in the name replaced by `_`.
pub fn report_filename(patient_name: String, generated_at: NaiveDateTime) -> String {
    let safe: String = patient_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!(
        "consultation_report_{safe}_{}.pdf",
        generated_at.format("%Y-%m-%d_%H-%M-%S")
    )
}

// ─── PDF generation ───────────────────────────────────────────────────────────

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM_MARGIN: f32 = 20.0;
const LINE_CHARS: usize = 90;

/// Writes lines top to bottom, adding a page when the next line would cross
/// the bottom margin.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: Mm,
    font: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PageWriter<'_> {
    fn ensure_room(&mut self, height: f32) {
        if self.y - Mm(height) < Mm(BOTTOM_MARGIN) {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = Mm(TOP);
        }
    }

    fn text(&mut self, text: &str, size: f32, x: f32, bold: bool, advance: f32) {
        self.ensure_room(advance);
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), self.y, font);
        self.y -= Mm(advance);
    }

    fn wrapped(&mut self, text: &str) {
        for line in wrap_text(text, LINE_CHARS) {
            self.text(&line, 10.0, 25.0, false, 5.0);
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= Mm(height);
    }
}

/// Render the report. Returns PDF bytes.
pub fn render_pdf(
    report: &ConsultationReport,
    generated_at: NaiveDateTime,
) -> Result<Vec<u8>, ReportError> {
    let (doc, page1, layer1) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Font(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Font(e.to_string()))?;

    let mut writer = PageWriter {
        layer: doc.get_page(page1).get_layer(layer1),
        doc: &doc,
        y: Mm(TOP),
        font,
        bold,
    };

    writer.text(REPORT_TITLE, 16.0, 20.0, true, 12.0);

    for section in report.sections(generated_at) {
        writer.ensure_room(16.0);
        writer.text(section.title, 12.0, 20.0, true, 7.0);
        for line in &section.lines {
            writer.wrapped(line);
        }
        writer.gap(5.0);
    }

    writer.gap(5.0);
    writer.text(FOOTER, 9.0, 20.0, false, 5.0);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| ReportError::Save(e.to_string()))?;
    buf.into_inner().map_err(|e| ReportError::Save(e.to_string()))
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    fn seeded() -> (Connection, ConsultationId) {
        let conn = open_memory_database().unwrap();
        let id = repository::insert_consultation(&conn).unwrap();
        repository::apply_consultation_patch(
            &conn,
            id,
            ConsultationPatch {
                full_name: Some("Jean Kamga".into()),
                fosa: Some("CSI &amp; Maternité".into()),
                region: Some("N/A".into()),
                emergency_contact_phone: Some("690001122".into()),
                examens_avant_consultation: Some(r#"["NFS","Electrophorèse"]"#.into()),
                commentaires: Some("Patient stable".into()),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, id)
    }

    fn section<'a>(sections: &'a [ReportSection], title: &str) -> Option<&'a ReportSection> {
        sections.iter().find(|s| s.title == title)
    }

    #[test]
    fn missing_consultation_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = assemble_report(&conn, ConsultationId(5)).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn sections_skip_empty_and_na_values() {
        let (conn, id) = seeded();
        let report = assemble_report(&conn, id).unwrap();
        let sections = report.sections(generated_at());

        let admin = section(&sections, "1. INFORMATIONS ADMINISTRATIVES").unwrap();
        assert_eq!(admin.lines, vec!["FOSA: CSI & Maternité".to_string()]);

        let patient = section(&sections, "INFORMATIONS PATIENT").unwrap();
        assert_eq!(patient.lines[0], "Nom et Prénom: Jean Kamga");
        assert_eq!(patient.lines[1], "Date de génération: 14/03/2025 09:05");
    }

    #[test]
    fn phone_is_printed_with_country_code() {
        let (conn, id) = seeded();
        let sections = assemble_report(&conn, id).unwrap().sections(generated_at());
        let demographics = section(&sections, "2. DONNÉES DÉMOGRAPHIQUES").unwrap();
        assert!(demographics.lines.contains(&"Téléphone: +237690001122".to_string()));
    }

    #[test]
    fn exams_and_comments_sections() {
        let (conn, id) = seeded();
        let sections = assemble_report(&conn, id).unwrap().sections(generated_at());
        let exams = section(&sections, "7. EXAMENS À RÉALISER").unwrap();
        assert_eq!(exams.lines, vec!["• NFS".to_string(), "• Electrophorèse".to_string()]);
        let comments = section(&sections, "8. COMMENTAIRES").unwrap();
        assert_eq!(comments.lines, vec!["Patient stable".to_string()]);
    }

    #[test]
    fn satellite_sections_only_when_present() {
        let (conn, id) = seeded();
        let sections = assemble_report(&conn, id).unwrap().sections(generated_at());
        assert!(section(&sections, "3. TRAITEMENTS EN COURS").is_none());
        assert!(section(&sections, "6. VACCINATIONS").is_none());

        repository::upsert_satellite(
            &conn,
            id,
            &TreatmentRecord { hydroxyurea: Some("Oui".into()), ..Default::default() },
        )
        .unwrap();
        let mut checklist = VaccinationChecklist::default();
        checklist.0.insert(
            VaccineCode::Bcg,
            VaccineEntry {
                selected: true,
                received: Some(YesNo::Oui),
                date: Some("2020-01-15".into()),
                ..Default::default()
            },
        );
        repository::upsert_vaccinations(&conn, id, &checklist).unwrap();

        let sections = assemble_report(&conn, id).unwrap().sections(generated_at());
        let treatments = section(&sections, "3. TRAITEMENTS EN COURS").unwrap();
        assert_eq!(treatments.lines, vec!["Hydroxyurée: Oui".to_string()]);
        let vaccinations = section(&sections, "6. VACCINATIONS").unwrap();
        assert_eq!(
            vaccinations.lines,
            vec!["Vaccin: BCG (Reçu: Oui, Date: 2020-01-15)".to_string()]
        );
    }

    #[test]
    fn default_patient_name() {
        let conn = open_memory_database().unwrap();
        let id = repository::insert_consultation(&conn).unwrap();
        let report = assemble_report(&conn, id).unwrap();
        assert_eq!(report.patient_name(), "Patient");
    }

    #[test]
    fn filename_replaces_unsafe_characters() {
        let name = report_filename("Jean Kamga-Ndé".into(), generated_at());
        assert_eq!(name, "consultation_report_Jean_Kamga-Nd__2025-03-14_09-05-07.pdf");
    }

    #[test]
    fn render_produces_pdf_bytes() {
        let (conn, id) = seeded();
        let report = assemble_report(&conn, id).unwrap();
        let bytes = render_pdf(&report, generated_at()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_comments_span_pages() {
        let (conn, id) = seeded();
        let long = "observation clinique détaillée ".repeat(600);
        repository::apply_consultation_patch(
            &conn,
            id,
            ConsultationPatch { commentaires: Some(long), ..Default::default() },
        )
        .unwrap();
        let report = assemble_report(&conn, id).unwrap();
        assert!(render_pdf(&report, generated_at()).is_ok());
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("un deux trois quatre cinq", 10);
        assert!(lines.iter().all(|line| line.chars().count() <= 10));
        assert_eq!(lines.join(" "), "un deux trois quatre cinq");
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
