use crate::error::FolioError;
use crate::fragment::Fragment;
use crate::pagetree::{content_refs, inherited_attribute, media_box, owned_dict};
use crate::render::win_ansi_bytes;
use crate::types::Color;
use lopdf::content::{Content, Operation};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, StringFormat, dictionary};
use rayon::prelude::*;
use std::path::Path;

const FOOTER_FONT_RESOURCE: &str = "FolioFooter";

/// Running "page / total" footer drawn near the bottom-right of every page.
#[derive(Debug, Clone, PartialEq)]
pub struct FooterSpec {
    pub base_font: String,
    pub font_size: f32,
    pub color: Color,
    /// Distance of the text origin from the right edge of the media box.
    pub right_inset: f32,
    /// Baseline height above the bottom edge of the media box.
    pub y_from_bottom: f32,
}

impl Default for FooterSpec {
    fn default() -> Self {
        Self {
            base_font: "Courier".to_string(),
            font_size: 11.0,
            color: Color::rgb(0.3, 0.3, 0.3),
            right_inset: 50.0,
            y_from_bottom: 10.0,
        }
    }
}

pub fn footer_text(page_number: usize, total_pages: usize) -> String {
    format!("{page_number} / {total_pages}")
}

/// Grand total and the first global page number of every fragment.
/// Fragments without a location or page count take no numbers.
pub fn footer_plan(fragments: &[Fragment]) -> (usize, Vec<usize>) {
    let mut firsts = Vec::with_capacity(fragments.len());
    let mut next = 1usize;
    for fragment in fragments {
        firsts.push(next);
        if fragment.location.is_some() {
            next += fragment.page_count.unwrap_or(0);
        }
    }
    (next - 1, firsts)
}

/// Stamps every page of `doc`, numbering from `first_page`. Returns the
/// number of pages stamped.
pub fn stamp_page_footers(
    doc: &mut LoDocument,
    first_page: usize,
    total_pages: usize,
    footer: &FooterSpec,
) -> Result<usize, FolioError> {
    let page_ids: Vec<LoObjectId> = doc.get_pages().values().copied().collect();
    if page_ids.is_empty() {
        return Ok(0);
    }
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => footer.base_font.as_str(),
        "Encoding" => "WinAnsiEncoding",
    });
    let save_id = doc.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec()));

    for (idx, page_id) in page_ids.iter().enumerate() {
        let text = footer_text(first_page + idx, total_pages);
        attach_footer_font(doc, *page_id, font_id)?;

        let [_, y0, x1, _] = media_box(doc, *page_id);
        let content = footer_content(&text, x1 - footer.right_inset, y0 + footer.y_from_bottom, footer);
        // Streams of one page are concatenated before parsing; the leading
        // newline keeps the page's last operator apart from our `Q`.
        let mut data = b"\n".to_vec();
        data.extend(content.encode()?);
        let footer_id = doc.add_object(LoStream::new(dictionary! {}, data));

        // Wrap the existing content in q/Q so transforms it leaves behind
        // cannot move the footer.
        let mut contents = vec![LoObject::Reference(save_id)];
        contents.extend(content_refs(doc, *page_id));
        contents.push(LoObject::Reference(footer_id));
        doc.get_dictionary_mut(*page_id)?
            .set("Contents", LoObject::Array(contents));
    }
    Ok(page_ids.len())
}

fn attach_footer_font(doc: &mut LoDocument, page_id: LoObjectId, font_id: LoObjectId) -> Result<(), FolioError> {
    let resources_obj = inherited_attribute(doc, page_id, b"Resources");
    let mut resources = owned_dict(doc, resources_obj.as_ref());
    let mut fonts = owned_dict(doc, resources.get(b"Font").ok());
    fonts.set(FOOTER_FONT_RESOURCE, LoObject::Reference(font_id));
    resources.set("Font", LoObject::Dictionary(fonts));
    doc.get_dictionary_mut(page_id)?
        .set("Resources", LoObject::Dictionary(resources));
    Ok(())
}

fn footer_content(text: &str, x: f32, y: f32, footer: &FooterSpec) -> Content {
    let c = footer.color;
    Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("rg", vec![c.r.into(), c.g.into(), c.b.into()]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    LoObject::Name(FOOTER_FONT_RESOURCE.as_bytes().to_vec()),
                    footer.font_size.into(),
                ],
            ),
            Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![LoObject::String(win_ansi_bytes(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    }
}

/// Loads the PDF at `path`, stamps it and writes it back in place.
pub fn stamp_pdf_file(
    path: &Path,
    first_page: usize,
    total_pages: usize,
    footer: &FooterSpec,
) -> Result<usize, FolioError> {
    let mut doc = LoDocument::load(path)?;
    let stamped = stamp_page_footers(&mut doc, first_page, total_pages, footer)?;
    doc.compress();
    doc.save(path)?;
    Ok(stamped)
}

/// Stamps the body fragments in place. Numbering follows fragment order, so
/// the assembler must keep the same order.
pub fn stamp_body_fragments(fragments: Vec<Fragment>, footer: &FooterSpec) -> Result<Vec<Fragment>, FolioError> {
    let (total, firsts) = footer_plan(&fragments);
    fragments
        .into_par_iter()
        .zip(firsts.into_par_iter())
        .map(|(fragment, first)| -> Result<Fragment, FolioError> {
            let Some(location) = fragment.location.as_deref() else {
                return Ok(fragment);
            };
            let stamped = stamp_pdf_file(location, first, total, footer)?;
            log::debug!(
                "{}: stamped pages {}..={} of {total}",
                fragment.kind.label(),
                first,
                first + stamped.saturating_sub(1)
            );
            Ok(fragment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{LopdfTextExtractor, TextExtractor};
    use crate::fragment::FragmentKind;
    use crate::render::testing::write_text_pdf;

    fn body(index: usize, path: &Path, pages: usize) -> Fragment {
        Fragment::new(FragmentKind::Body(index), Some(path.to_path_buf())).with_page_count(pages)
    }

    fn footer_lines(path: &Path) -> Vec<String> {
        LopdfTextExtractor
            .extract_pages(path)
            .expect("extract")
            .iter()
            .map(|page| {
                page.lines()
                    .map(str::trim)
                    .filter(|l| l.contains(" / "))
                    .last()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn footer_plan_numbers_fragments_consecutively() {
        let frags = vec![
            body(0, Path::new("a.pdf"), 3),
            Fragment::new(FragmentKind::Body(1), None),
            body(2, Path::new("c.pdf"), 2),
        ];
        let (total, firsts) = footer_plan(&frags);
        assert_eq!(total, 5);
        assert_eq!(firsts, vec![1, 4, 4]);
    }

    #[test]
    fn stamping_numbers_pages_across_fragments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("000.pdf");
        let b = dir.path().join("001.pdf");
        write_text_pdf(&a, &[&["a1"], &["a2"], &["a3"]]);
        write_text_pdf(&b, &[&["b1"], &["b2"]]);

        let frags = stamp_body_fragments(vec![body(0, &a, 3), body(1, &b, 2)], &FooterSpec::default())
            .expect("stamp");
        assert_eq!(frags.len(), 2);
        assert_eq!(footer_lines(&a), vec!["1 / 5", "2 / 5", "3 / 5"]);
        assert_eq!(footer_lines(&b), vec!["4 / 5", "5 / 5"]);
    }

    #[test]
    fn stamping_keeps_page_count_and_original_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("000.pdf");
        write_text_pdf(&a, &[&["Intro"], &["Background"]]);
        stamp_pdf_file(&a, 1, 2, &FooterSpec::default()).expect("stamp");

        let pages = LopdfTextExtractor.extract_pages(&a).expect("extract");
        assert_eq!(pages.len(), 2);
        assert!(pages[0].lines().any(|l| l.trim() == "Intro"));
        assert!(pages[1].lines().any(|l| l.trim() == "Background"));
    }

    #[test]
    fn footer_is_placed_relative_to_media_box() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("000.pdf");
        write_text_pdf(&a, &[&["x"]]);
        let mut doc = LoDocument::load(&a).expect("load");
        stamp_page_footers(&mut doc, 7, 9, &FooterSpec::default()).expect("stamp");

        let page_id = *doc.get_pages().values().next().expect("page");
        let footer_ref = content_refs(&doc, page_id)
            .last()
            .and_then(|obj| obj.as_reference().ok())
            .expect("footer stream");
        let footer = doc
            .get_object(footer_ref)
            .and_then(LoObject::as_stream)
            .expect("stream");
        let ops = Content::decode(&footer.content).expect("decode").operations;
        let tm = ops.iter().find(|op| op.operator == "Tm").expect("Tm");
        let float = |obj: &LoObject| match obj {
            LoObject::Integer(v) => *v as f32,
            LoObject::Real(v) => *v as f32,
            _ => f32::NAN,
        };
        let x = float(&tm.operands[4]);
        let y = float(&tm.operands[5]);
        assert!((x - 562.0).abs() < 0.01);
        assert!((y - 10.0).abs() < 0.01);
        assert_eq!(footer_text(7, 9), "7 / 9");
    }

    fn page_operators(path: &Path) -> Vec<String> {
        let doc = LoDocument::load(path).expect("load");
        let page_id = *doc.get_pages().values().next().expect("page");
        let bytes = doc.get_page_content(page_id).expect("content");
        Content::decode(&bytes)
            .expect("decode")
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect()
    }

    fn assert_text_object_closed_before_footer(ops: &[String]) {
        assert!(!ops.iter().any(|op| op == "ETQ"), "{ops:?}");
        assert!(
            ops.windows(2).any(|pair| pair[0] == "ET" && pair[1] == "Q"),
            "{ops:?}"
        );
    }

    #[test]
    fn stamped_page_keeps_operators_apart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("000.pdf");
        write_text_pdf(&a, &[&["Intro"]]);
        stamp_pdf_file(&a, 1, 1, &FooterSpec::default()).expect("stamp");

        assert_text_object_closed_before_footer(&page_operators(&a));
        let pages = LopdfTextExtractor.extract_pages(&a).expect("extract");
        let lines: Vec<&str> = pages[0].lines().map(str::trim).collect();
        assert!(lines.contains(&"Intro"), "{lines:?}");
        assert!(lines.contains(&"1 / 1"), "{lines:?}");
    }

    #[test]
    fn stamping_content_without_trailing_whitespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tight.pdf");

        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let content_id = doc.add_object(LoStream::new(
            dictionary! {},
            b"BT /F1 12 Tf 72 720 Td (Body) Tj ET".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(&path).expect("save");

        stamp_pdf_file(&path, 4, 6, &FooterSpec::default()).expect("stamp");

        assert_text_object_closed_before_footer(&page_operators(&path));
        assert_eq!(footer_lines(&path), vec!["4 / 6"]);
        let pages = LopdfTextExtractor.extract_pages(&path).expect("extract");
        assert!(pages[0].lines().any(|l| l.trim() == "Body"), "{pages:?}");
    }
}
