//! Font loading and text measurement using `ttf-parser`.
//!
//! Measurement feeds Taffy with intrinsic text sizes; the rasterizer reads
//! the same font bytes for glyph outlines so layout and paint agree. With no
//! real font loaded, heuristic Helvetica-like metrics are used.

use std::collections::HashMap;
use std::path::Path;

/// Families tried, in order, when picking a system sans-serif face.
const SANS_SERIF_FAMILIES: &[fontdb::Family<'static>] = &[
    fontdb::Family::Name("Helvetica"),
    fontdb::Family::Name("Arial"),
    fontdb::Family::Name("Liberation Sans"),
    fontdb::Family::Name("DejaVu Sans"),
    fontdb::Family::Name("Noto Sans"),
    fontdb::Family::SansSerif,
];

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    /// Face index within a collection (`.ttc`).
    pub face_index: u32,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

/// Manages loaded fonts.
#[derive(Clone)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// Fallback key when a requested face is missing.
    default_key: FontKey,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
        }
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            default_key: FontKey::new("Helvetica", false),
        }
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, bytes: Vec<u8>) -> Result<(), String> {
        self.load_font_face(family, bold, bytes, 0)
    }

    /// Load one face of a font file or collection from bytes.
    pub fn load_font_face(
        &mut self,
        family: &str,
        bold: bool,
        bytes: Vec<u8>,
        face_index: u32,
    ) -> Result<(), String> {
        let face = ttf_parser::Face::parse(&bytes, face_index)
            .map_err(|e| format!("Failed to parse font: {e}"))?;

        let data = FontData {
            face_index,
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };

        // Synthetic placeholders of this family would shadow the real face.
        self.fonts
            .retain(|k, d| !(k.family == family && d.bytes.is_empty()));

        let key = FontKey::new(family, bold);
        if !self.has_real_fonts() && !bold {
            self.default_key = key.clone();
        }
        self.fonts.insert(key, data);
        Ok(())
    }

    /// Load a font file from disk.
    pub fn load_font_file(&mut self, family: &str, bold: bool, path: &Path) -> Result<(), String> {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("Failed to read font '{}': {e}", path.display()))?;
        self.load_font(family, bold, bytes)
    }

    /// Register synthetic Helvetica-like metrics for the regular and bold
    /// faces when nothing is loaded.
    pub fn ensure_default(&mut self) {
        if !self.fonts.is_empty() {
            return;
        }
        for bold in [false, true] {
            self.fonts
                .entry(FontKey::new("Helvetica", bold))
                .or_insert_with(|| SYNTHETIC.clone());
        }
    }

    /// Register the installed sans-serif regular/bold pair under the
    /// default family. Falls back to synthetic metrics.
    pub fn with_system_fonts() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        log::debug!("Font database holds {} faces", db.len());
        Self::from_database(&db)
    }

    /// Pick regular and bold sans-serif faces out of `db`.
    pub fn from_database(db: &fontdb::Database) -> Self {
        let mut mgr = Self::new();
        let regular = query_face(db, fontdb::Weight::NORMAL);
        if let Some(id) = regular {
            mgr.load_from_database(db, id, false);
            // A database without a bold face answers with the regular one.
            match query_face(db, fontdb::Weight::BOLD) {
                Some(bold) if bold != id => mgr.load_from_database(db, bold, true),
                _ => log::debug!("No bold companion; bold text uses the regular face"),
            }
        }
        if !mgr.has_real_fonts() {
            log::warn!("No system font found; text will be painted as placeholder runs");
        }
        mgr.ensure_default();
        mgr
    }

    fn load_from_database(&mut self, db: &fontdb::Database, id: fontdb::ID, bold: bool) {
        let loaded = db.with_face_data(id, |bytes, index| {
            self.load_font_face("Helvetica", bold, bytes.to_vec(), index)
        });
        match loaded {
            Some(Ok(())) => {
                if let Some(info) = db.face(id) {
                    let family = info.families.first().map(|(n, _)| n.as_str()).unwrap_or("?");
                    log::debug!("Using system font '{family}' (bold: {bold})");
                }
            }
            Some(Err(e)) => log::warn!("{e}"),
            None => log::warn!("Font data for face {id:?} is unavailable"),
        }
    }

    /// Get font data for a key. A missing bold face falls back to the
    /// regular face of the same family, then to the default.
    pub fn get(&self, key: &FontKey) -> &FontData {
        self.fonts
            .get(key)
            .or_else(|| self.fonts.get(&FontKey::new(&key.family, false)))
            .or_else(|| self.fonts.get(&self.default_key))
            .or_else(|| self.fonts.values().next())
            .unwrap_or(&SYNTHETIC)
    }

    /// Measure the width of a string at a given font size (in px).
    /// With real font bytes we sum glyph advances; otherwise an average
    /// character width heuristic (0.5 × font_size, bold 0.55) is used.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool, family: &str) -> f32 {
        let data = self.get(&FontKey::new(family, bold));

        if data.bytes.is_empty() {
            return heuristic_width(text, font_size, bold);
        }

        match ttf_parser::Face::parse(&data.bytes, data.face_index) {
            Ok(face) => {
                let scale = font_size / data.units_per_em;
                text.chars()
                    .map(|ch| match face.glyph_index(ch) {
                        Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                        None => font_size * 0.5,
                    })
                    .sum()
            }
            Err(_) => heuristic_width(text, font_size, bold),
        }
    }

    /// Measure the line height in px.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Get the ascender in px for the given font.
    pub fn ascender_px(&self, font_size: f32, bold: bool, family: &str) -> f32 {
        let data = self.get(&FontKey::new(family, bold));
        data.ascender * font_size / data.units_per_em
    }

    /// Check if real font bytes are loaded for the default font.
    pub fn has_real_fonts(&self) -> bool {
        self.fonts
            .get(&self.default_key)
            .map(|d| !d.bytes.is_empty())
            .unwrap_or(false)
    }

    /// Parsed face for glyph outlines, if a real face backs this key.
    pub fn face(&self, family: &str, bold: bool) -> Option<ttf_parser::Face<'_>> {
        let data = self.get(&FontKey::new(family, bold));
        if data.bytes.is_empty() {
            return None;
        }
        ttf_parser::Face::parse(&data.bytes, data.face_index).ok()
    }
}

fn query_face(db: &fontdb::Database, weight: fontdb::Weight) -> Option<fontdb::ID> {
    db.query(&fontdb::Query {
        families: SANS_SERIF_FAMILIES,
        weight,
        stretch: fontdb::Stretch::Normal,
        style: fontdb::Style::Normal,
    })
}

/// Helvetica-like metrics used when no face is loaded.
static SYNTHETIC: FontData = FontData {
    bytes: Vec::new(),
    face_index: 0,
    units_per_em: 1000.0,
    ascender: 750.0,
    descender: -250.0,
    line_gap: 0.0,
};

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

fn heuristic_width(text: &str, font_size: f32, bold: bool) -> f32 {
    let avg = if bold { 0.55 } else { 0.5 };
    text.chars().count() as f32 * font_size * avg
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current_line, word)
            };
            let w = fonts.measure_text_width(&candidate, font_size, bold, family);
            if w > max_width && !current_line.is_empty() {
                lines.push(current_line);
                current_line = word.to_string();
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 16.0, false, "Helvetica");
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        let bold = mgr.measure_text_width("Hello", 16.0, true, "Helvetica");
        assert!(bold > w);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, "Helvetica", 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn unknown_family_falls_back() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("abcd", 10.0, false, "Comic Sans");
        assert!((w - 20.0).abs() < 0.1);
        assert!(mgr.face("Helvetica", false).is_none());
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut mgr = FontManager::new();
        assert!(mgr.load_font("Broken", false, vec![0, 1, 2, 3]).is_err());
        assert!(!mgr.has_real_fonts());
    }

    #[test]
    fn empty_database_falls_back_to_synthetic_metrics() {
        let mgr = FontManager::from_database(&fontdb::Database::new());
        assert!(!mgr.has_real_fonts());
        let w = mgr.measure_text_width("Hello", 16.0, false, "Helvetica");
        assert!((w - 40.0).abs() < 0.1);
    }

    #[test]
    fn unparseable_database_data_is_ignored() {
        let mut db = fontdb::Database::new();
        db.load_font_data(vec![0; 64]);
        assert_eq!(db.len(), 0);
        let mgr = FontManager::from_database(&db);
        assert!(!mgr.has_real_fonts());
        assert!(mgr.face("Helvetica", true).is_none());
    }

    #[test]
    fn system_fonts_always_yield_usable_metrics() {
        let mgr = FontManager::with_system_fonts();
        let w = mgr.measure_text_width("Transfer", 14.0, true, "Helvetica");
        assert!(w > 0.0);
        assert_eq!(mgr.has_real_fonts(), mgr.face("Helvetica", false).is_some());
    }
}
