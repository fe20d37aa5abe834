use crate::routes::PlanSession;
use printpdf::*;
use std::io::BufWriter;

/// Minimal PDF (text-only): one summary page plus one page per stage
/// concept. Drawings stay in the JSON payload as data URIs.
pub fn generate_pdf(session: &PlanSession) -> Vec<u8> {
    let (doc, page, layer) = PdfDocument::new(
        format!("House Plan {}", session.id),
        Mm(210.0),
        Mm(297.0),
        "Layer 1",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).unwrap();

    let summary = doc.get_page(page).get_layer(layer);
    summary.use_text("BrickAi Conceptual House Plan", 20.0, Mm(15.0), Mm(275.0), &font);
    if let Some(req) = session.workflow.requirements() {
        summary.use_text(truncate(&req.property_details, 140), 11.0, Mm(15.0), Mm(260.0), &font);
        summary.use_text(
            format!("Floors: {}  Rooms (BHK): {}  Budget: {}  Purpose: {}", req.floors, req.rooms, req.budget_range, req.purpose),
            10.0,
            Mm(15.0),
            Mm(248.0),
            &font,
        );
    }
    summary.use_text("(Drawings not embedded; see the exported concepts)", 8.0, Mm(15.0), Mm(236.0), &font);

    if let Some(civil) = session.workflow.civil() {
        let lines = [
            ("Floor allocation", civil.floor_allocation.as_str()),
            ("Room sizes", civil.room_sizes.as_str()),
            ("Stairs and wet areas", civil.stair_and_wet_area_logic.as_str()),
            ("Assumptions", civil.assumptions.as_str()),
            ("Disclaimer", civil.disclaimer.as_str()),
        ];
        add_concept_page(&doc, &font, "Civil Engineering Concept", &lines);
    }

    if let Some(arch) = session.workflow.architectural() {
        let lines = [
            ("Zoning", arch.zoning.as_str()),
            ("Light and ventilation", arch.light_and_ventilation.as_str()),
            ("Style notes", arch.architectural_style_notes.as_str()),
            ("Disclaimer", arch.disclaimer.as_str()),
        ];
        add_concept_page(&doc, &font, "Architectural Concept", &lines);
    }

    if let Some(interior) = session.workflow.interior() {
        let lines = [
            ("Color palette", interior.color_palette.as_str()),
            ("Materials", interior.material_suggestions.as_str()),
            ("Lighting", interior.lighting_concept.as_str()),
            ("Disclaimer", interior.disclaimer.as_str()),
        ];
        add_concept_page(&doc, &font, "Interior Design Concept", &lines);
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).ok();
    }
    buf
}

fn add_concept_page(doc: &PdfDocumentReference, font: &IndirectFontRef, title: &str, lines: &[(&str, &str)]) {
    let (page, layer) = doc.add_page(Mm(210.0), Mm(297.0), title);
    let layer_ref = doc.get_page(page).get_layer(layer);
    layer_ref.use_text(title, 16.0, Mm(15.0), Mm(275.0), font);
    let mut y = 260.0;
    for (label, text) in lines {
        layer_ref.use_text(*label, 11.0, Mm(15.0), Mm(y), font);
        layer_ref.use_text(truncate(text, 180), 9.0, Mm(15.0), Mm(y - 6.0), font);
        y -= 18.0;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
