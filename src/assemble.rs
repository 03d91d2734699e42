use crate::error::FolioError;
use crate::fragment::Fragment;
use crate::pagetree::{deref, flatten_inherited, root_pages_id};
use crate::pdfinspect::{PdfInspectError, PdfInspectErrorCode};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, dictionary};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A document that whole page runs are appended to or prepended onto.
///
/// Imported pages are attached directly under the root `Pages` node, so page
/// order is exactly the order of the calls that brought them in.
pub struct PageBook {
    doc: LoDocument,
    pages_id: LoObjectId,
}

impl PageBook {
    pub fn empty() -> Self {
        let mut doc = LoDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<LoObject>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Self { doc, pages_id }
    }

    /// Reuses an existing document, keeping its pages as the first run.
    pub fn from_document(doc: LoDocument) -> Result<Self, FolioError> {
        reject_encrypted(&doc)?;
        let pages_id = root_pages_id(&doc)?;
        Ok(Self { doc, pages_id })
    }

    pub fn load(path: &Path) -> Result<Self, FolioError> {
        Self::from_document(LoDocument::load(path)?)
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Appends every page of `src` in physical order. Returns the number of
    /// pages added.
    pub fn append(&mut self, src: LoDocument) -> Result<usize, FolioError> {
        let page_ids = self.import_pages(src)?;
        let added = page_ids.len();
        self.splice_kids(page_ids, false)?;
        Ok(added)
    }

    /// Puts every page of `src` in front of the current pages, keeping the
    /// internal order of `src`.
    pub fn prepend(&mut self, src: LoDocument) -> Result<usize, FolioError> {
        let page_ids = self.import_pages(src)?;
        let added = page_ids.len();
        self.splice_kids(page_ids, true)?;
        Ok(added)
    }

    pub fn append_path(&mut self, path: &Path) -> Result<usize, FolioError> {
        self.append(LoDocument::load(path)?)
    }

    pub fn prepend_path(&mut self, path: &Path) -> Result<usize, FolioError> {
        self.prepend(LoDocument::load(path)?)
    }

    /// Moves the objects of `src` into this document and re-parents its pages
    /// under the root page node. The pages are not yet in `Kids`.
    fn import_pages(&mut self, mut src: LoDocument) -> Result<Vec<LoObjectId>, FolioError> {
        reject_encrypted(&src)?;
        src.renumber_objects_with(self.doc.max_id + 1);
        let page_ids: Vec<LoObjectId> = src.get_pages().values().copied().collect();
        for page_id in &page_ids {
            flatten_inherited(&mut src, *page_id)?;
            src.get_dictionary_mut(*page_id)?
                .set("Parent", LoObject::Reference(self.pages_id));
        }
        if src.max_id > self.doc.max_id {
            self.doc.max_id = src.max_id;
        }
        self.doc.objects.extend(src.objects);
        Ok(page_ids)
    }

    fn splice_kids(&mut self, page_ids: Vec<LoObjectId>, at_front: bool) -> Result<(), FolioError> {
        let refs = page_ids.into_iter().map(LoObject::Reference);
        let mut kids = match self.doc.get_dictionary(self.pages_id)?.get(b"Kids") {
            Ok(obj) => match deref(&self.doc, obj) {
                LoObject::Array(items) => items.clone(),
                _ => Vec::new(),
            },
            Err(_) => Vec::new(),
        };
        if at_front {
            kids.splice(0..0, refs);
        } else {
            kids.extend(refs);
        }
        self.doc
            .get_dictionary_mut(self.pages_id)?
            .set("Kids", LoObject::Array(kids));
        // Recounted from the tree; the stored Count may be indirect or absent.
        let count = self.doc.get_pages().len() as i64;
        self.doc
            .get_dictionary_mut(self.pages_id)?
            .set("Count", count);
        Ok(())
    }

    /// Serializes the book, dropping objects no page references any more.
    pub fn finish(mut self) -> Result<Vec<u8>, FolioError> {
        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();
        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}

fn reject_encrypted(doc: &LoDocument) -> Result<(), FolioError> {
    if doc.is_encrypted() {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "cannot assemble an encrypted pdf".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Everything the assembler needs, in final document order.
#[derive(Debug, Clone)]
pub struct AssemblyPlan<'a> {
    pub body: &'a [Fragment],
    pub toc: Option<&'a Path>,
    pub cover: Option<&'a Path>,
    pub back_cover: Option<&'a Path>,
    pub output: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblySummary {
    pub output: PathBuf,
    pub cover_pages: usize,
    pub toc_pages: usize,
    pub body_pages: usize,
    pub back_cover_pages: usize,
    pub total_pages: usize,
    pub bytes: usize,
    pub sha256: String,
}

/// Concatenates the fragments into `plan.output`:
/// cover, table of contents, body fragments in order, back cover.
///
/// The output only appears once it is fully written.
pub fn assemble(plan: &AssemblyPlan<'_>) -> Result<AssemblySummary, FolioError> {
    let mut body = plan.body.iter();
    let mut book = match plan.body.first().and_then(|f| f.location.as_deref()) {
        Some(first) => {
            body.next();
            PageBook::load(first)?
        }
        None => {
            log::info!("first body fragment has no location; starting from an empty document");
            PageBook::empty()
        }
    };
    for fragment in body {
        if let Some(location) = fragment.location.as_deref() {
            book.append_path(location)?;
        }
    }
    let body_pages = book.page_count();

    let toc_pages = match plan.toc {
        Some(path) => book.prepend_path(path)?,
        None => 0,
    };
    let cover_pages = match plan.cover {
        Some(path) => book.prepend_path(path)?,
        None => 0,
    };
    let back_cover_pages = match plan.back_cover {
        Some(path) => book.append_path(path)?,
        None => 0,
    };
    let total_pages = book.page_count();

    let bytes = book.finish()?;
    let sha256 = hex_digest(&bytes);
    write_atomically(plan.output, &bytes)?;

    Ok(AssemblySummary {
        output: plan.output.to_path_buf(),
        cover_pages,
        toc_pages,
        body_pages,
        back_cover_pages,
        total_pages,
        bytes: bytes.len(),
        sha256,
    })
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), FolioError> {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FolioError::InvalidConfiguration(format!("output path has no file name: {}", output.display()))
        })?;
    let partial = output.with_file_name(format!(".{file_name}.partial"));
    std::fs::write(&partial, bytes)?;
    if let Err(err) = std::fs::rename(&partial, output) {
        let _ = std::fs::remove_file(&partial);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{LopdfTextExtractor, TextExtractor};
    use crate::fragment::FragmentKind;
    use crate::render::testing::write_text_pdf;

    fn first_lines(path: &Path) -> Vec<String> {
        LopdfTextExtractor
            .extract_pages(path)
            .expect("extract")
            .iter()
            .map(|p| p.lines().next().unwrap_or_default().trim().to_string())
            .collect()
    }

    fn write(dir: &Path, name: &str, labels: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let pages: Vec<[&str; 1]> = labels.iter().map(|l| [*l]).collect();
        let refs: Vec<&[&str]> = pages.iter().map(|p| &p[..]).collect();
        write_text_pdf(&path, &refs);
        path
    }

    fn body(index: usize, path: Option<PathBuf>) -> Fragment {
        Fragment::new(FragmentKind::Body(index), path)
    }

    #[test]
    fn assembles_cover_toc_body_and_back_cover_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        let b0 = write(d, "000.pdf", &["b0p1", "b0p2"]);
        let b1 = write(d, "001.pdf", &["b1p1"]);
        let b2 = write(d, "002.pdf", &["b2p1", "b2p2", "b2p3"]);
        let toc = write(d, "toc.pdf", &["t1", "t2"]);
        let cover = write(d, "cover.pdf", &["c1", "c2"]);
        let back = write(d, "backcover.pdf", &["k1"]);
        let output = d.join("out.pdf");

        let body_frags = vec![body(0, Some(b0)), body(1, Some(b1)), body(2, Some(b2))];
        let summary = assemble(&AssemblyPlan {
            body: &body_frags,
            toc: Some(toc.as_path()),
            cover: Some(cover.as_path()),
            back_cover: Some(back.as_path()),
            output: &output,
        })
        .expect("assemble");

        assert_eq!(summary.total_pages, 11);
        assert_eq!(
            (summary.cover_pages, summary.toc_pages, summary.body_pages, summary.back_cover_pages),
            (2, 2, 6, 1)
        );
        assert_eq!(
            first_lines(&output),
            vec!["c1", "c2", "t1", "t2", "b0p1", "b0p2", "b1p1", "b2p1", "b2p2", "b2p3", "k1"]
        );
        assert_eq!(summary.sha256.len(), 64);
        let written = std::fs::read(&output).expect("read");
        assert_eq!(written.len(), summary.bytes);
    }

    #[test]
    fn missing_first_location_starts_from_empty_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        let b1 = write(d, "001.pdf", &["x1", "x2"]);
        let output = d.join("out.pdf");
        let frags = vec![body(0, None), body(1, Some(b1))];

        let summary = assemble(&AssemblyPlan {
            body: &frags,
            toc: None,
            cover: None,
            back_cover: None,
            output: &output,
        })
        .expect("assemble");
        assert_eq!(summary.total_pages, 2);
        assert_eq!(first_lines(&output), vec!["x1", "x2"]);
    }

    #[test]
    fn prepend_keeps_internal_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        let base = write(d, "base.pdf", &["base"]);
        let front = write(d, "front.pdf", &["f1", "f2", "f3"]);
        let mut book = PageBook::load(&base).expect("load");
        assert_eq!(book.prepend_path(&front).expect("prepend"), 3);
        let bytes = book.finish().expect("finish");
        let out = d.join("out.pdf");
        std::fs::write(&out, bytes).expect("write");
        assert_eq!(first_lines(&out), vec!["f1", "f2", "f3", "base"]);
    }

    #[test]
    fn corrupt_fragment_aborts_without_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = dir.path();
        let b0 = write(d, "000.pdf", &["ok"]);
        let bad = d.join("001.pdf");
        std::fs::write(&bad, b"not a pdf").expect("write");
        let output = d.join("out.pdf");
        let frags = vec![body(0, Some(b0)), body(1, Some(bad))];

        let err = assemble(&AssemblyPlan {
            body: &frags,
            toc: None,
            cover: None,
            back_cover: None,
            output: &output,
        })
        .expect_err("corrupt");
        assert!(matches!(err, FolioError::Pdf(_)));
        assert!(!output.exists());
    }

    #[test]
    fn empty_book_serializes_with_zero_pages() {
        let book = PageBook::empty();
        assert_eq!(book.page_count(), 0);
        let bytes = book.finish().expect("finish");
        let reloaded = LoDocument::load_mem(&bytes).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 0);
    }

    #[test]
    fn root_count_follows_kids_when_stored_count_is_indirect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extra = write(dir.path(), "extra.pdf", &["e1", "e2"]);

        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let count_id = doc.add_object(LoObject::Integer(1));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => count_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut book = PageBook::from_document(doc).expect("book");
        assert_eq!(book.append_path(&extra).expect("append"), 2);
        assert_eq!(book.page_count(), 3);
        let count = book
            .doc
            .get_dictionary(book.pages_id)
            .and_then(|pages| pages.get(b"Count"))
            .and_then(LoObject::as_i64)
            .expect("count");
        assert_eq!(count, 3);
    }
}
