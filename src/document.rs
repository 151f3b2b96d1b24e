//! Shared, read-only handles over libxml2 documents.
//!
//! An [`XmlDocument`] is reference counted: cloning it retains the underlying
//! `xmlDoc`, dropping the last clone frees it. The handle exposes no way to
//! mutate the tree, which is what lets schema entries hand their backing
//! document out to callers without giving up ownership.

use std::ffi::CStr;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{LibXml2Error, Result, SchemaCacheError};
use crate::libxml2::{
    self, XML_ELEMENT_NODE, XmlDoc, xmlBufferContent, xmlBufferCreate, xmlBufferFree,
    xmlCopyDoc, xmlDocGetRootElement, xmlFreeDoc, xmlNewDoc, xmlNodeDump,
};

/// Name and namespace of a document's root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootElement {
    /// Local name of the element
    pub name: String,
    /// Namespace URI the element is bound to, if any
    pub namespace: Option<String>,
}

impl RootElement {
    /// Check whether this element is `name` in the namespace `namespace`
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }
}

/// Reference-counted handle to an immutable libxml2 document
#[derive(Clone)]
pub struct XmlDocument {
    inner: Arc<XmlDocumentInner>,
}

struct XmlDocumentInner {
    ptr: *mut XmlDoc,
    _phantom: PhantomData<XmlDoc>,
}

// Safety: the handle never mutates the tree after construction, and libxml2
// supports concurrent readers of a document.
unsafe impl Send for XmlDocumentInner {}
unsafe impl Sync for XmlDocumentInner {}

impl Drop for XmlDocumentInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

impl XmlDocument {
    /// Take ownership of a document allocated by libxml2.
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid `xmlDoc` that nothing else will free.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlDoc) -> std::result::Result<Self, LibXml2Error> {
        if ptr.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        Ok(XmlDocument {
            inner: Arc::new(XmlDocumentInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    /// Parse a document from in-memory XML text.
    ///
    /// # Errors
    ///
    /// Returns `SchemaCacheError::SchemaParsing` with location `<memory>` when the
    /// text is not well-formed XML.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let ptr = libxml2::read_document_memory(data).map_err(|e| parse_error("<memory>", e))?;
        Ok(unsafe { Self::from_raw(ptr)? })
    }

    /// Read a document from a file path or a URL libxml2 can resolve.
    pub fn read(location: &str) -> Result<Self> {
        let ptr = libxml2::read_document_file(location).map_err(|e| parse_error(location, e))?;
        Ok(unsafe { Self::from_raw(ptr)? })
    }

    /// Create a document with no root element.
    pub fn empty() -> Result<Self> {
        libxml2::ensure_initialized();
        let ptr = unsafe { xmlNewDoc(c"1.0".as_ptr()) };
        Ok(unsafe { Self::from_raw(ptr)? })
    }

    /// Make a deep, independent copy of this document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaCacheError::ResourceExhaustion` if libxml2 cannot allocate
    /// the copy.
    pub fn deep_copy(&self) -> Result<Self> {
        let ptr = libxml2::with_parser_lock(|| unsafe { xmlCopyDoc(self.as_ptr(), 1) });
        if ptr.is_null() {
            return Err(SchemaCacheError::ResourceExhaustion {
                resource: "document copy".to_string(),
                details: "xmlCopyDoc returned null".to_string(),
            });
        }
        Ok(unsafe { Self::from_raw(ptr)? })
    }

    /// Name and namespace of the root element, or `None` for an empty document.
    pub fn root_element(&self) -> Option<RootElement> {
        unsafe {
            let root = xmlDocGetRootElement(self.as_ptr());
            if root.is_null() || (*root).node_type != XML_ELEMENT_NODE || (*root).name.is_null() {
                return None;
            }

            let name = CStr::from_ptr((*root).name).to_string_lossy().into_owned();
            let ns = (*root).ns;
            let namespace = if ns.is_null() || (*ns).href.is_null() {
                None
            } else {
                Some(CStr::from_ptr((*ns).href).to_string_lossy().into_owned())
            };

            Some(RootElement { name, namespace })
        }
    }

    /// Serialize the root element and its subtree; empty for a document with
    /// no root.
    pub fn to_xml_string(&self) -> Result<String> {
        unsafe {
            let root = xmlDocGetRootElement(self.as_ptr());
            if root.is_null() {
                return Ok(String::new());
            }

            let buffer = xmlBufferCreate();
            if buffer.is_null() {
                return Err(LibXml2Error::MemoryAllocation.into());
            }

            let written = xmlNodeDump(buffer, self.as_ptr(), root, 0, 0);
            let content = xmlBufferContent(buffer);
            let result = if written < 0 || content.is_null() {
                Err(LibXml2Error::MemoryAllocation.into())
            } else {
                Ok(CStr::from_ptr(content).to_string_lossy().into_owned())
            };

            xmlBufferFree(buffer);
            result
        }
    }

    /// Check whether two handles share the same underlying document
    pub fn ptr_eq(&self, other: &XmlDocument) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this document
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Get the raw pointer for FFI calls. The caller must not free it.
    pub(crate) fn as_ptr(&self) -> *mut XmlDoc {
        self.inner.ptr
    }
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument")
            .field("root", &self.root_element())
            .field("handles", &self.handle_count())
            .finish()
    }
}

fn parse_error(location: &str, err: LibXml2Error) -> SchemaCacheError {
    match err {
        LibXml2Error::DocumentParseFailed { details } => SchemaCacheError::SchemaParsing {
            location: location.to_string(),
            details,
        },
        LibXml2Error::InvalidArgument { details } => SchemaCacheError::InvalidInput { details },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK_XML: &str = r#"<?xml version="1.0"?>
<bk:book xmlns:bk="urn:example:books"><bk:title>Dune</bk:title></bk:book>"#;

    #[test]
    fn test_parse_and_inspect_root() {
        let document = XmlDocument::parse(BOOK_XML.as_bytes()).unwrap();
        let root = document.root_element().unwrap();

        assert_eq!(root.name, "book");
        assert_eq!(root.namespace.as_deref(), Some("urn:example:books"));
        assert!(root.is("book", "urn:example:books"));
        assert!(!root.is("book", "urn:other"));
    }

    #[test]
    fn test_root_without_namespace() {
        let document = XmlDocument::parse(b"<plain/>").unwrap();
        let root = document.root_element().unwrap();

        assert_eq!(root.name, "plain");
        assert_eq!(root.namespace, None);
    }

    #[test]
    fn test_empty_document_has_no_root() {
        let document = XmlDocument::empty().unwrap();
        assert!(document.root_element().is_none());
        assert_eq!(document.to_xml_string().unwrap(), "");
    }

    #[test]
    fn test_malformed_text_is_a_parse_error() {
        let err = XmlDocument::parse(b"<book><title></book>").unwrap_err();
        match err {
            SchemaCacheError::SchemaParsing { location, details } => {
                assert_eq!(location, "<memory>");
                assert!(!details.is_empty());
            }
            other => panic!("Expected SchemaParsing, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = XmlDocument::parse(BOOK_XML.as_bytes()).unwrap();
        let copy = original.deep_copy().unwrap();

        assert!(!copy.ptr_eq(&original));
        assert_eq!(copy.root_element(), original.root_element());
        assert_eq!(
            copy.to_xml_string().unwrap(),
            original.to_xml_string().unwrap()
        );

        drop(original);
        assert_eq!(copy.root_element().unwrap().name, "book");
    }

    #[test]
    fn test_clone_retains_document() {
        let document = XmlDocument::parse(BOOK_XML.as_bytes()).unwrap();
        assert_eq!(document.handle_count(), 1);

        let retained = document.clone();
        assert!(retained.ptr_eq(&document));
        assert_eq!(document.handle_count(), 2);

        drop(retained);
        assert_eq!(document.handle_count(), 1);
    }

    #[test]
    fn test_serialization_contains_content() {
        let document = XmlDocument::parse(BOOK_XML.as_bytes()).unwrap();
        let xml = document.to_xml_string().unwrap();

        assert!(xml.starts_with("<bk:book"));
        assert!(xml.contains("Dune"));
    }

    #[test]
    fn test_read_missing_file() {
        let err = XmlDocument::read("/nonexistent/file.xml").unwrap_err();
        assert!(err.is_construction_failure());
    }
}
