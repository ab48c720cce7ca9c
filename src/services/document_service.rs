use crate::models::language::Language;
use crate::models::question_group::ParsedQuiz;
use crate::models::quiz::RenderedDocument;
use image::{ImageFormat, Rgb, RgbImage};
use printpdf::lopdf::{Document as LoDocument, Object, StringFormat};
use printpdf::{Mm, OffsetDateTime, PdfDocument};
use rusttype::{point, Font, Scale};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

// US Letter, in PDF points.
pub const PAGE_WIDTH_PT: f32 = 612.0;
pub const PAGE_HEIGHT_PT: f32 = 792.0;
pub const FONT_SIZE: f32 = 12.0;
pub const LEADING: f32 = 14.5;
pub const LEFT_MARGIN: f32 = 50.0;
pub const TOP_Y: f32 = 750.0;
pub const BOTTOM_MARGIN: f32 = 50.0;
pub const PREVIEW_DPI: f32 = 150.0;

const LAYER_NAME: &str = "Layer 1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("font resource unavailable: {0}")]
    MissingFontResource(String),

    #[error("document I/O failure: {0}")]
    IoFailure(String),
}

/// A TrueType font loaded once and shared between the PDF writer and the
/// preview rasterizer.
#[derive(Clone)]
pub struct FontResource {
    name: String,
    bytes: Arc<Vec<u8>>,
    glyphs: Font<'static>,
}

impl FontResource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                RenderError::MissingFontResource(path.display().to_string())
            }
            _ => RenderError::IoFailure(format!("reading {}: {}", path.display(), e)),
        })?;
        Self::from_bytes(path.display().to_string(), bytes)
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, RenderError> {
        let name = name.into();
        let glyphs = Font::try_from_vec(bytes.clone()).ok_or_else(|| {
            RenderError::MissingFontResource(format!("{} is not a usable TrueType font", name))
        })?;
        Ok(Self {
            name,
            bytes: Arc::new(bytes),
            glyphs,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Title,
    Question,
    Option,
    AnswerKeyHeading,
    AnswerKeyLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub text: String,
    pub kind: LineKind,
    pub baseline: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<LayoutLine>,
}

/// Page-by-page placement of every line of a quiz document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
    pub answer_key_page: usize,
}

impl DocumentLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|p| p.lines.len()).sum()
    }

    /// Lines that come from the quiz content, i.e. everything except the
    /// title and the answer-key heading.
    pub fn content_line_count(&self) -> usize {
        self.lines()
            .filter(|l| !matches!(l.kind, LineKind::Title | LineKind::AnswerKeyHeading))
            .count()
    }

    pub fn lines(&self) -> impl Iterator<Item = &LayoutLine> {
        self.pages.iter().flat_map(|p| p.lines.iter())
    }

    pub fn text(&self) -> String {
        self.lines()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct LayoutCursor {
    finished: Vec<PageLayout>,
    current: PageLayout,
    y: f32,
}

impl LayoutCursor {
    fn new() -> Self {
        Self {
            finished: Vec::new(),
            current: PageLayout::default(),
            y: TOP_Y,
        }
    }

    fn start_page(&mut self) {
        self.finished.push(std::mem::take(&mut self.current));
        self.y = TOP_Y;
    }

    fn page_index(&self) -> usize {
        self.finished.len()
    }

    fn write_line(&mut self, text: &str, kind: LineKind) {
        if self.y < BOTTOM_MARGIN {
            self.start_page();
        }
        self.current.lines.push(LayoutLine {
            text: text.to_string(),
            kind,
            baseline: self.y,
        });
        self.y -= LEADING;
    }

    fn skip_lines(&mut self, count: usize) {
        self.y -= LEADING * count as f32;
    }

    fn finish(mut self) -> Vec<PageLayout> {
        self.finished.push(self.current);
        self.finished
    }
}

/// Places the title, every question with its options, and the answer key.
///
/// A new page is started whenever the cursor has dropped below the bottom
/// margin before a line is written. Questions may be split across pages. The
/// answer key always begins on a page of its own.
pub fn layout_document(
    parsed: &ParsedQuiz,
    title: &str,
    answer_key_raw: &str,
    language: Language,
) -> DocumentLayout {
    let mut cursor = LayoutCursor::new();

    cursor.write_line(&format!("{}{}", language.title_prefix(), title), LineKind::Title);
    cursor.skip_lines(2);

    for group in parsed.question_groups() {
        cursor.write_line(group.question(), LineKind::Question);
        for option in group.options() {
            cursor.write_line(option, LineKind::Option);
        }
        cursor.skip_lines(1);
    }

    cursor.start_page();
    let answer_key_page = cursor.page_index();
    cursor.write_line(language.answer_key_delimiter(), LineKind::AnswerKeyHeading);
    cursor.skip_lines(2);

    for line in answer_key_raw.lines() {
        cursor.write_line(line, LineKind::AnswerKeyLine);
    }

    DocumentLayout {
        pages: cursor.finish(),
        answer_key_page,
    }
}

enum FontSource {
    Path(PathBuf),
    Loaded(FontResource),
}

/// Synthesizes the quiz PDF and its first-page preview.
#[derive(Clone)]
pub struct DocumentRenderer {
    font: Arc<FontSource>,
}

impl DocumentRenderer {
    /// The font is read on every render, so a missing file fails the request
    /// rather than the process.
    pub fn from_font_path(path: impl Into<PathBuf>) -> Self {
        Self {
            font: Arc::new(FontSource::Path(path.into())),
        }
    }

    pub fn with_font(font: FontResource) -> Self {
        Self {
            font: Arc::new(FontSource::Loaded(font)),
        }
    }

    fn font(&self) -> Result<FontResource, RenderError> {
        match self.font.as_ref() {
            FontSource::Path(path) => FontResource::load(path),
            FontSource::Loaded(font) => Ok(font.clone()),
        }
    }

    pub fn render(
        &self,
        parsed: &ParsedQuiz,
        title: &str,
        answer_key_raw: &str,
        language: Language,
    ) -> Result<RenderedDocument, RenderError> {
        let font = self.font()?;
        let layout = layout_document(parsed, title, answer_key_raw, language);

        let text = layout.text();
        let bytes = write_pdf(&layout, title, &text, &font)?;
        let first_page = layout
            .pages
            .first()
            .ok_or_else(|| RenderError::IoFailure("document has no pages".to_string()))?;
        let preview_image = rasterize_page(first_page, &font)?;

        tracing::debug!(
            pages = layout.page_count(),
            lines = layout.line_count(),
            pdf_bytes = bytes.len(),
            "quiz document rendered"
        );

        Ok(RenderedDocument {
            bytes,
            preview_image,
            text,
            page_count: layout.page_count(),
        })
    }
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

/// Identifier for the trailer `/ID`, derived from the document's text so that
/// identical quizzes produce identical files.
fn document_id(title: &str, text: &str) -> String {
    let name = format!("{}\n{}", title, text);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
        .simple()
        .to_string()
}

fn write_pdf(
    layout: &DocumentLayout,
    title: &str,
    text: &str,
    font: &FontResource,
) -> Result<Vec<u8>, RenderError> {
    let width = pt_to_mm(PAGE_WIDTH_PT);
    let height = pt_to_mm(PAGE_HEIGHT_PT);
    let id = document_id(title, text);
    let (doc, first_page, first_layer) = PdfDocument::new(title, width, height, LAYER_NAME);
    let doc = doc
        .with_document_id(id.clone())
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_metadata_date(OffsetDateTime::UNIX_EPOCH);

    let pdf_font = doc
        .add_external_font(Cursor::new(font.bytes.as_slice()))
        .map_err(|e| RenderError::MissingFontResource(format!("{}: {}", font.name, e)))?;

    for (idx, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if idx == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(width, height, LAYER_NAME)
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);

        // Each page gets a fresh content stream with font and leading re-applied.
        layer.begin_text_section();
        layer.set_font(&pdf_font, FONT_SIZE);
        layer.set_line_height(LEADING);
        layer.set_text_cursor(pt_to_mm(LEFT_MARGIN), pt_to_mm(TOP_Y));

        let mut cursor_y = TOP_Y;
        for line in &page.lines {
            let breaks = ((cursor_y - line.baseline) / LEADING).round() as usize;
            for _ in 0..breaks {
                layer.add_line_break();
            }
            layer.write_text(line.text.clone(), &pdf_font);
            cursor_y = line.baseline;
        }
        layer.end_text_section();
    }

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| RenderError::IoFailure(format!("writing PDF: {}", e)))?;
    pin_trailer_id(&bytes, &id)
}

// printpdf always writes a random instance id into the trailer.
fn pin_trailer_id(bytes: &[u8], id: &str) -> Result<Vec<u8>, RenderError> {
    let mut pdf = LoDocument::load_mem(bytes)
        .map_err(|e| RenderError::IoFailure(format!("reading PDF: {}", e)))?;
    let id = Object::String(id.as_bytes().to_vec(), StringFormat::Literal);
    pdf.trailer.set("ID", Object::Array(vec![id.clone(), id]));

    let mut out = Vec::with_capacity(bytes.len());
    pdf.save_to(&mut out)
        .map_err(|e| RenderError::IoFailure(format!("writing PDF: {}", e)))?;
    Ok(out)
}

fn rasterize_page(page: &PageLayout, font: &FontResource) -> Result<Vec<u8>, RenderError> {
    let factor = PREVIEW_DPI / 72.0;
    let width = (PAGE_WIDTH_PT * factor).round() as u32;
    let height = (PAGE_HEIGHT_PT * factor).round() as u32;
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let scale = Scale::uniform(FONT_SIZE * factor);

    for line in &page.lines {
        let origin = point(
            LEFT_MARGIN * factor,
            (PAGE_HEIGHT_PT - line.baseline) * factor,
        );
        for glyph in font.glyphs.layout(&line.text, scale, origin) {
            let Some(bounds) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let x = bounds.min.x + gx as i32;
                let y = bounds.min.y + gy as i32;
                if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
                    return;
                }
                let shade = (255.0 * (1.0 - coverage.clamp(0.0, 1.0))) as u8;
                let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                let value = pixel.0[0].min(shade);
                *pixel = Rgb([value, value, value]);
            });
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    canvas
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| RenderError::IoFailure(format!("encoding preview: {}", e)))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser_service::parse_response;

    const FONT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/fonts/DejaVuSans.ttf");

    fn parsed_quiz(questions: usize, language: Language) -> ParsedQuiz {
        let mut text = String::new();
        for i in 1..=questions {
            text.push_str(&format!(
                "{i}. Question number {i}\nA. alpha\nB. beta\nC. gamma\nD. delta\n\n"
            ));
        }
        text.push_str(language.answer_key_delimiter());
        text.push('\n');
        for i in 1..=questions {
            text.push_str(&format!("{i}. alpha\n"));
        }
        parse_response(&text, language).unwrap()
    }

    #[test]
    fn single_question_fits_on_one_page_plus_answer_page() {
        let parsed = parsed_quiz(1, Language::En);
        let layout = layout_document(&parsed, "Basics", parsed.answer_key_raw(), Language::En);

        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.answer_key_page, 1);

        let first = &layout.pages[0].lines;
        assert_eq!(first[0].text, "Quiz Title: Basics");
        assert_eq!(first[0].baseline, TOP_Y);
        // title plus two blank lines
        assert_eq!(first[1].baseline, TOP_Y - LEADING * 3.0);
        assert_eq!(first.len(), 6);

        let answers = &layout.pages[1].lines;
        assert_eq!(answers[0].kind, LineKind::AnswerKeyHeading);
        assert_eq!(answers[0].text, "Answer Key:");
        assert_eq!(answers[1].text, "1. alpha");
    }

    #[test]
    fn overflowing_content_paginates_without_dropping_lines() {
        let parsed = parsed_quiz(40, Language::En);
        let layout = layout_document(&parsed, "Long", parsed.answer_key_raw(), Language::En);

        let answer_lines = parsed.answer_key_raw().lines().count();
        assert_eq!(layout.content_line_count(), 40 * 5 + answer_lines);
        assert!(layout.answer_key_page > 1);

        for line in layout.lines() {
            assert!(line.baseline >= BOTTOM_MARGIN, "line below margin: {:?}", line);
            assert!(line.baseline <= TOP_Y);
        }
    }

    #[test]
    fn answer_key_starts_on_a_fresh_page() {
        for questions in [1, 7, 8, 9, 25] {
            let parsed = parsed_quiz(questions, Language::En);
            let layout = layout_document(&parsed, "T", parsed.answer_key_raw(), Language::En);

            let page = &layout.pages[layout.answer_key_page];
            assert_eq!(page.lines[0].kind, LineKind::AnswerKeyHeading);
            assert_eq!(page.lines[0].baseline, TOP_Y);
            assert!(layout.pages[..layout.answer_key_page]
                .iter()
                .flat_map(|p| p.lines.iter())
                .all(|l| matches!(l.kind, LineKind::Title | LineKind::Question | LineKind::Option)));
        }
    }

    #[test]
    fn long_answer_key_paginates_too() {
        let parsed = parsed_quiz(2, Language::En);
        let answer_key: String = (1..=120).map(|i| format!("{i}. answer\n")).collect();
        let layout = layout_document(&parsed, "T", answer_key.trim(), Language::En);

        let answer_lines = layout
            .lines()
            .filter(|l| l.kind == LineKind::AnswerKeyLine)
            .count();
        assert_eq!(answer_lines, 120);
        assert!(layout.page_count() >= layout.answer_key_page + 3);
    }

    #[test]
    fn blank_answer_key_lines_are_kept() {
        let parsed = parsed_quiz(1, Language::En);
        let layout = layout_document(&parsed, "T", "1. a\r\n\r\n2. b", Language::En);

        let answer_lines: Vec<&str> = layout
            .lines()
            .filter(|l| l.kind == LineKind::AnswerKeyLine)
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(answer_lines, vec!["1. a", "", "2. b"]);
    }

    #[test]
    fn layout_is_deterministic() {
        let parsed = parsed_quiz(33, Language::Bg);
        let first = layout_document(&parsed, "Тест", parsed.answer_key_raw(), Language::Bg);
        let second = layout_document(&parsed, "Тест", parsed.answer_key_raw(), Language::Bg);

        assert_eq!(first, second);
        assert_eq!(first.pages[0].lines[0].text, "Заглавие на теста: Тест");
    }

    #[test]
    fn renders_pdf_and_png_preview() {
        let renderer = DocumentRenderer::from_font_path(FONT_PATH);
        let parsed = parsed_quiz(12, Language::Bg);

        let rendered = renderer
            .render(&parsed, "Столици", parsed.answer_key_raw(), Language::Bg)
            .unwrap();

        assert!(rendered.bytes.starts_with(b"%PDF"));
        assert!(rendered.preview_image.starts_with(&[0x89, b'P', b'N', b'G']));
        assert!(rendered.text.starts_with("Заглавие на теста: Столици"));
        assert!(rendered.page_count >= 2);

        let again = renderer
            .render(&parsed, "Столици", parsed.answer_key_raw(), Language::Bg)
            .unwrap();
        assert_eq!(again.page_count, rendered.page_count);
        assert_eq!(again.text, rendered.text);
        assert_eq!(again.bytes, rendered.bytes);
    }

    #[test]
    fn different_titles_get_different_document_ids() {
        let a = document_id("Rivers", "1. Longest river?");
        assert_eq!(a.len(), 32);
        assert_eq!(a, document_id("Rivers", "1. Longest river?"));
        assert_ne!(a, document_id("Lakes", "1. Longest river?"));
    }

    #[test]
    fn missing_font_fails_the_render() {
        let renderer = DocumentRenderer::from_font_path("/nonexistent/fonts/Missing.ttf");
        let parsed = parsed_quiz(1, Language::En);

        let err = renderer
            .render(&parsed, "T", parsed.answer_key_raw(), Language::En)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingFontResource(_)));
    }

    #[test]
    fn rejects_bytes_that_are_not_a_font() {
        let err = FontResource::from_bytes("junk", vec![0u8; 64]).err().unwrap();
        assert!(matches!(err, RenderError::MissingFontResource(_)));
    }
}
