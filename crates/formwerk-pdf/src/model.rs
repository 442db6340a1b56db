// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document model — the page tree, widget annotations, and interactive-form
// dictionary of a template, read and written with `lopdf`.

use std::path::Path;

use formwerk_core::error::{FormwerkError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, instrument};

/// Reference chains and parent walks never go deeper than this.
pub(crate) const MAX_DEPTH: usize = 32;

/// A template loaded for one fill operation.
///
/// Owns the whole `lopdf::Document`; the processing stages mutate it in place
/// and it is serialised once at the end.
pub struct FormDocument {
    document: Document,
}

impl FormDocument {
    // -- Construction ---------------------------------------------------------

    /// Open a template from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref).map_err(|err| {
            FormwerkError::TemplateRead(format!("failed to read {}: {}", path_ref.display(), err))
        })?;
        Self::from_bytes(&data)
    }

    /// Parse a template already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            FormwerkError::TemplateRead(format!("failed to parse PDF: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "Template loaded");
        Ok(Self { document })
    }

    /// Wrap an existing `lopdf` document.
    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    // -- Object access --------------------------------------------------------

    /// Follow indirect references until a direct object is reached.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        let mut current = object;
        for _ in 0..MAX_DEPTH {
            match current {
                Object::Reference(id) => current = self.document.get_object(*id).ok()?,
                other => return Some(other),
            }
        }
        None
    }

    /// Resolve an object to a dictionary (a stream yields its dictionary).
    pub fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(object)? {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    /// Look up `key` in `dict` and resolve the value.
    pub fn lookup<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        self.resolve(dict.get(key).ok()?)
    }

    pub fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        match self.document.get_object(id).ok()? {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        match self.document.get_object_mut(id) {
            Ok(Object::Dictionary(dict)) => Ok(dict),
            Ok(Object::Stream(stream)) => Ok(&mut stream.dict),
            Ok(_) => Err(FormwerkError::PdfError(format!(
                "object {:?} is not a dictionary",
                id
            ))),
            Err(err) => Err(FormwerkError::PdfError(format!(
                "cannot read object {:?}: {}",
                id, err
            ))),
        }
    }

    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        self.document.add_object(object)
    }

    /// Reserve an id whose object is inserted later with [`Self::insert_object`].
    pub fn reserve_object_id(&mut self) -> ObjectId {
        self.document.new_object_id()
    }

    pub fn insert_object(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.document.objects.insert(id, object.into());
    }

    // -- Pages ----------------------------------------------------------------

    /// Pages in document order as `(1-based page number, page object id)`.
    pub fn pages(&self) -> Vec<(u32, ObjectId)> {
        self.document.get_pages().into_iter().collect()
    }

    /// The raw entries of a page's `/Annots` array (usually references).
    pub fn annotation_entries(&self, page_id: ObjectId) -> Vec<Object> {
        self.dict(page_id)
            .and_then(|page| self.lookup(page, b"Annots"))
            .and_then(|annots| match annots {
                Object::Array(entries) => Some(entries.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// The page's effective `/Resources`, following inheritance through the
    /// page tree. Returned as an owned copy to be edited and written back.
    pub fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        let mut node = self.dict(page_id);
        for _ in 0..MAX_DEPTH {
            let Some(dict) = node else { break };
            if let Some(resources) = dict.get(b"Resources").ok().and_then(|r| self.resolve_dict(r)) {
                return resources.clone();
            }
            node = dict.get(b"Parent").ok().and_then(|p| self.resolve_dict(p));
        }
        Dictionary::new()
    }

    /// Register `value` under a fresh name in the page's resource `category`
    /// (e.g. `Font`, `XObject`) and return the name.
    pub fn add_page_resource(
        &mut self,
        page_id: ObjectId,
        category: &[u8],
        prefix: &str,
        value: Object,
    ) -> Result<String> {
        let mut resources = self.page_resources(page_id);
        let mut entries = resources
            .get(category)
            .ok()
            .and_then(|c| self.resolve_dict(c))
            .cloned()
            .unwrap_or_default();

        let name = (1..)
            .map(|n| format!("{prefix}{n}"))
            .find(|candidate| !entries.has(candidate.as_bytes()))
            .unwrap_or_else(|| prefix.to_string());
        entries.set(name.clone(), value);
        resources.set(category.to_vec(), Object::Dictionary(entries));

        self.dict_mut(page_id)?
            .set("Resources", Object::Dictionary(resources));
        Ok(name)
    }

    /// Wrap the page's existing content in `q … Q` and append `overlay` after
    /// it, so the overlay starts from the default graphics state.
    pub fn wrap_and_append_content(&mut self, page_id: ObjectId, overlay: Vec<u8>) -> Result<()> {
        let mut contents = Vec::new();
        let existing = self
            .dict(page_id)
            .and_then(|page| page.get(b"Contents").ok())
            .cloned();
        match existing {
            Some(Object::Reference(id)) => match self.document.get_object(id) {
                Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
                _ => contents.push(Object::Reference(id)),
            },
            Some(Object::Array(items)) => contents.extend(items),
            _ => {}
        }

        let open_id = self.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut closing = b"Q\n".to_vec();
        closing.extend_from_slice(&overlay);
        let close_id = self.add_object(Stream::new(Dictionary::new(), closing));

        let mut wrapped = Vec::with_capacity(contents.len() + 2);
        wrapped.push(Object::Reference(open_id));
        wrapped.extend(contents);
        wrapped.push(Object::Reference(close_id));

        self.dict_mut(page_id)?.set("Contents", Object::Array(wrapped));
        Ok(())
    }

    // -- Widgets --------------------------------------------------------------

    pub fn is_widget(dict: &Dictionary) -> bool {
        matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Widget")
    }

    /// Drop every widget from the page's `/Annots`, keeping all other
    /// annotations in their original order. Returns how many were removed.
    pub fn remove_widget_annotations(&mut self, page_id: ObjectId) -> Result<usize> {
        let entries = self.annotation_entries(page_id);
        let kept: Vec<Object> = entries
            .iter()
            .filter(|entry| {
                !self
                    .resolve_dict(entry)
                    .is_some_and(FormDocument::is_widget)
            })
            .cloned()
            .collect();

        let removed = entries.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let page = self.dict_mut(page_id)?;
        if kept.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", Object::Array(kept));
        }
        Ok(removed)
    }

    // -- Interactive form -----------------------------------------------------

    fn catalog_id(&self) -> Result<ObjectId> {
        match self.document.trailer.get(b"Root") {
            Ok(Object::Reference(id)) => Ok(*id),
            _ => Err(FormwerkError::PdfError(
                "trailer has no /Root reference".into(),
            )),
        }
    }

    /// The `/AcroForm` dictionary, if the document has one.
    pub fn acroform(&self) -> Option<&Dictionary> {
        let catalog = self.dict(self.catalog_id().ok()?)?;
        self.lookup(catalog, b"AcroForm").and_then(|form| match form {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        })
    }

    /// The form's default resources (`/DR`), used by appearance streams that
    /// carry no resources of their own.
    pub fn default_resources(&self) -> Option<Dictionary> {
        let form = self.acroform()?;
        self.lookup(form, b"DR").and_then(|dr| match dr {
            Object::Dictionary(dict) => Some(dict.clone()),
            _ => None,
        })
    }

    /// Ask viewers to regenerate field appearances (interactive output only).
    pub fn set_need_appearances(&mut self) -> Result<()> {
        let catalog_id = self.catalog_id()?;
        let target = match self.dict(catalog_id).and_then(|c| c.get(b"AcroForm").ok()) {
            Some(Object::Reference(id)) => Some(*id),
            Some(Object::Dictionary(_)) => None,
            _ => return Ok(()),
        };
        let form = match target {
            Some(id) => self.dict_mut(id)?,
            None => match self.dict_mut(catalog_id)?.get_mut(b"AcroForm") {
                Ok(Object::Dictionary(dict)) => dict,
                _ => return Ok(()),
            },
        };
        form.set("NeedAppearances", Object::Boolean(true));
        Ok(())
    }

    /// Remove `/AcroForm` from the catalog entirely. Returns whether one existed.
    pub fn remove_acroform(&mut self) -> Result<bool> {
        let catalog_id = self.catalog_id()?;
        Ok(self.dict_mut(catalog_id)?.remove(b"AcroForm").is_some())
    }

    /// Check the flattening postcondition: no `/AcroForm` and no widget left
    /// in any page's `/Annots`.
    pub fn verify_flattened(&self) -> Result<()> {
        let catalog = self
            .dict(self.catalog_id()?)
            .ok_or_else(|| FormwerkError::PdfError("catalog is not a dictionary".into()))?;
        if catalog.has(b"AcroForm") {
            return Err(FormwerkError::FlattenInvariant(
                "catalog still has /AcroForm".into(),
            ));
        }
        for (page_number, page_id) in self.pages() {
            let widgets = self
                .annotation_entries(page_id)
                .iter()
                .filter(|entry| self.resolve_dict(entry).is_some_and(FormDocument::is_widget))
                .count();
            if widgets > 0 {
                return Err(FormwerkError::FlattenInvariant(format!(
                    "page {} still has {} widget annotation(s)",
                    page_number, widgets
                )));
            }
        }
        Ok(())
    }

    // -- Output ---------------------------------------------------------------

    /// Drop objects no longer reachable from the trailer (old widgets and the
    /// field tree after flattening).
    pub fn prune(&mut self) {
        let pruned = self.document.prune_objects();
        debug!(pruned = pruned.len(), "Unreachable objects removed");
    }

    /// Serialise the document.
    pub fn to_bytes(&mut self, compress: bool) -> Result<Vec<u8>> {
        if compress {
            self.document.compress();
        }
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            FormwerkError::OutputWrite(format!("failed to serialise PDF: {}", err))
        })?;
        info!(output_bytes = output.len(), "Document serialised");
        Ok(output)
    }
}
