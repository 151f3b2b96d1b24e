//! LibXML2 FFI Wrapper Module
//!
//! This module provides a safe wrapper around the libxml2 calls the schema cache
//! relies on: reading and copying documents, compiling XML Schemas from those
//! documents, and validating instance documents against a compiled schema.
//!
//! ## Thread Safety Strategy
//!
//! libxml2 documents its validation entry points as thread-safe for distinct
//! validation contexts, and compiled `xmlSchema` structures as safe to read from
//! many threads once parsing has finished. Its parser is a different story, so:
//!
//! - **Initialization**: guarded by `std::sync::Once`
//! - **Parsing** (documents, document copies, schemas): serialized behind
//!   [`PARSER_LOCK`]
//! - **Validation**: fully parallel, one validation context per call
//!
//! Compiled schemas and documents are wrapped in `Arc`-backed handles so they
//! can be shared across threads and are freed exactly once.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Once};

use libc::{c_char, c_int, c_uint, c_void};
use parking_lot::Mutex;

use crate::document::XmlDocument;
use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are NOT thread-safe, so they run exactly
/// once behind `std::sync::Once`.
static LIBXML2_INIT: Once = Once::new();

/// Serializes every call into the libxml2 parser.
static PARSER_LOCK: Mutex<()> = parking_lot::const_mutex(());

// Parser options (see libxml/parser.h, xmlParserOption)
pub const XML_PARSE_NOERROR: c_int = 1 << 5;
pub const XML_PARSE_NOWARNING: c_int = 1 << 6;

/// Options used for every document read: diagnostics are collected through
/// `xmlGetLastError` instead of being printed on stderr.
const READ_OPTIONS: c_int = XML_PARSE_NOERROR | XML_PARSE_NOWARNING;

/// `XML_ELEMENT_NODE` from `xmlElementType`
pub const XML_ELEMENT_NODE: c_int = 1;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBuffer {
    _private: [u8; 0],
}

/// Leading fields of libxml2's `xmlNode`. Only ever accessed through pointers
/// handed out by libxml2, so the trailing fields can stay undeclared.
#[repr(C)]
pub struct XmlNode {
    pub _private: *mut c_void,
    pub node_type: c_int,
    pub name: *const c_char,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlNode,
    pub prev: *mut XmlNode,
    pub doc: *mut XmlDoc,
    pub ns: *mut XmlNs,
}

/// Leading fields of libxml2's `xmlNs`.
#[repr(C)]
pub struct XmlNs {
    pub next: *mut XmlNs,
    pub ns_type: c_int,
    pub href: *const c_char,
    pub prefix: *const c_char,
}

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Document functions
    pub fn xmlReadFile(filename: *const c_char, encoding: *const c_char, options: c_int)
    -> *mut XmlDoc;
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlNewDoc(version: *const c_char) -> *mut XmlDoc;
    pub fn xmlCopyDoc(doc: *mut XmlDoc, recursive: c_int) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;

    // Serialization
    pub fn xmlBufferCreate() -> *mut XmlBuffer;
    pub fn xmlBufferFree(buf: *mut XmlBuffer);
    pub fn xmlBufferContent(buf: *const XmlBuffer) -> *const c_char;
    pub fn xmlNodeDump(
        buf: *mut XmlBuffer,
        doc: *mut XmlDoc,
        cur: *mut XmlNode,
        level: c_int,
        format: c_int,
    ) -> c_int;

    // Error reporting
    pub fn xmlGetLastError() -> *const xmlError;
    pub fn xmlResetLastError();

    // Schema parsing functions
    pub fn xmlSchemaNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateFile(
        ctxt: *const XmlSchemaValidCtxt,
        file_name: *const c_char,
        options: c_uint,
    ) -> c_int;
    pub fn xmlSchemaValidateDoc(ctxt: *const XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
}

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

/// Callback for libxml2 to report parser and validation errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    let errors = unsafe { &mut *(user_data as *mut Vec<String>) };

    if !error.is_null()
        && let Some(message) = unsafe { error_message(error) }
    {
        errors.push(message);
    }
}

/// Read the trimmed message of a libxml2 error record.
///
/// # Safety
///
/// `error` must be null or point to a live `xmlError`.
unsafe fn error_message(error: *const xmlError) -> Option<String> {
    if error.is_null() {
        return None;
    }
    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return None;
    }
    let c_str = unsafe { CStr::from_ptr(msg_ptr) };
    Some(c_str.to_string_lossy().trim().to_string())
}

/// Initialize libxml2 exactly once, in a thread-safe manner.
pub(crate) fn ensure_initialized() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
        xmlInitGlobals();
    });
}

/// Run `f` while holding the process-wide parser lock.
pub(crate) fn with_parser_lock<T>(f: impl FnOnce() -> T) -> T {
    ensure_initialized();
    let _guard = PARSER_LOCK.lock();
    f()
}

/// Describe the last libxml2 error on this thread, falling back to `fallback`.
///
/// Must be called with the parser lock held, right after the failing call.
pub(crate) fn last_error_message(fallback: &str) -> String {
    unsafe {
        let message = error_message(xmlGetLastError());
        xmlResetLastError();
        message.unwrap_or_else(|| fallback.to_string())
    }
}

/// Read a document from a file path or URL.
pub(crate) fn read_document_file(location: &str) -> LibXml2Result<*mut XmlDoc> {
    let c_location = CString::new(location).map_err(|_| LibXml2Error::InvalidArgument {
        details: format!("location contains a NUL byte: {:?}", location),
    })?;

    with_parser_lock(|| unsafe {
        let doc = xmlReadFile(c_location.as_ptr(), std::ptr::null(), READ_OPTIONS);
        if doc.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                details: last_error_message("failed to load document"),
            });
        }
        Ok(doc)
    })
}

/// Parse a document from an in-memory buffer.
pub(crate) fn read_document_memory(data: &[u8]) -> LibXml2Result<*mut XmlDoc> {
    let size = c_int::try_from(data.len()).map_err(|_| LibXml2Error::InvalidArgument {
        details: format!("document of {} bytes is too large", data.len()),
    })?;

    with_parser_lock(|| unsafe {
        let doc = xmlReadMemory(
            data.as_ptr() as *const c_char,
            size,
            std::ptr::null(),
            std::ptr::null(),
            READ_OPTIONS,
        );
        if doc.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                details: last_error_message("document is not well-formed"),
            });
        }
        Ok(doc)
    })
}

/// Thread-safe wrapper for a compiled libxml2 schema with proper resource management
///
/// The compiled schema keeps a reference to the document it was parsed from;
/// libxml2 does not free documents handed to `xmlSchemaNewDocParserCtxt`, so the
/// document is released by this wrapper right after the schema itself.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    document: XmlDocument,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// Create a new XmlSchemaPtr from a raw pointer and its source document
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - The pointer is valid and points to a properly initialized xmlSchema
    /// - The pointer was allocated by libxml2 and should be freed with xmlSchemaFree
    /// - The schema was parsed from `document`, which libxml2 will not free
    /// - No other code will free this pointer
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema, document: XmlDocument) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed { messages: vec![] });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                document,
                _phantom: PhantomData,
            }),
        })
    }

    /// Get the raw pointer for FFI calls
    ///
    /// The returned pointer is only valid as long as this XmlSchemaPtr exists.
    /// The caller must not free this pointer.
    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    /// The document this schema was compiled from
    pub fn document(&self) -> &XmlDocument {
        &self.inner.document
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        // The Arc ensures this runs exactly once per schema. The document field
        // is dropped after this body, once the schema no longer points into it.
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Validation result from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        errors: Vec<String>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    /// Create ValidationResult from libxml2 return code and captured errors
    pub fn from_code(code: c_int, errors: Vec<String>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                errors,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    /// Check if validation was successful
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Check if validation failed due to schema violations
    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    /// Check if an internal error occurred
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

/// RAII guard for a validation context with a structured error sink attached.
struct ValidationContext {
    ctxt: *mut XmlSchemaValidCtxt,
    // Boxed so the address handed to libxml2 stays put while the guard moves.
    errors: Box<Vec<String>>,
}

impl ValidationContext {
    fn new(schema: &XmlSchemaPtr) -> LibXml2Result<Self> {
        let ctxt = unsafe { xmlSchemaNewValidCtxt(schema.as_ptr()) };
        if ctxt.is_null() {
            return Err(LibXml2Error::ValidationContextCreationFailed);
        }

        let mut context = ValidationContext {
            ctxt,
            errors: Box::new(Vec::new()),
        };
        let errors_ptr = context.errors.as_mut() as *mut Vec<String> as *mut c_void;
        unsafe {
            xmlSchemaSetValidStructuredErrors(ctxt, Some(structured_error_callback), errors_ptr);
        }
        Ok(context)
    }

    fn finish(mut self, code: c_int) -> ValidationResult {
        let errors = std::mem::take(self.errors.as_mut());
        ValidationResult::from_code(code, errors)
    }
}

impl Drop for ValidationContext {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeValidCtxt(self.ctxt) };
    }
}

/// LibXML2 wrapper providing safe access to schema compilation and validation
///
/// - Schema compilation is serialized through the parser lock
/// - Validation runs in parallel, each call with its own validation context
/// - Resources are released via RAII (Arc + Drop)
#[derive(Debug, Clone, Copy)]
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a new LibXML2 wrapper instance
    ///
    /// This initializes libxml2 if not already initialized. It's safe to call
    /// this multiple times - initialization happens exactly once.
    pub fn new() -> Self {
        ensure_initialized();

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile an XML Schema from a parsed document
    ///
    /// libxml2 prunes whitespace and comments from the tree it compiles, so
    /// callers that need to keep their document intact must hand in a copy.
    /// The returned schema owns a reference to `document`.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::SchemaParseFailed` carrying the parser's messages if
    /// the document is not a valid schema.
    /// Returns `LibXml2Error::MemoryAllocation` if the parser context cannot be created.
    pub fn parse_schema_from_document(&self, document: XmlDocument) -> LibXml2Result<XmlSchemaPtr> {
        let mut messages: Vec<String> = Vec::new();

        let schema_ptr = with_parser_lock(|| unsafe {
            let parser_ctxt = xmlSchemaNewDocParserCtxt(document.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                &mut messages as *mut Vec<String> as *mut c_void,
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);

            // Always free the parser context
            xmlSchemaFreeParserCtxt(parser_ctxt);
            xmlResetLastError();

            Ok(schema_ptr)
        })?;

        if schema_ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed { messages });
        }

        unsafe { XmlSchemaPtr::from_raw(schema_ptr, document) }
    }

    /// Validate an XML file against a schema
    ///
    /// Thread-safe: the schema is read-only and every call creates its own
    /// validation context.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::ValidationContextCreationFailed` if validation context creation fails.
    /// Returns `LibXml2Error::ValidationFailed` if libxml2 reports an internal error.
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
    ) -> LibXml2Result<ValidationResult> {
        let path_str = file_path
            .to_str()
            .ok_or_else(|| LibXml2Error::ValidationFailed {
                code: -1,
                file: file_path.to_path_buf(),
            })?;

        let c_path = CString::new(path_str).map_err(|_| LibXml2Error::ValidationFailed {
            code: -1,
            file: file_path.to_path_buf(),
        })?;

        let context = ValidationContext::new(schema)?;
        let result_code = unsafe { xmlSchemaValidateFile(context.ctxt, c_path.as_ptr(), 0) };
        let result = context.finish(result_code);

        if let ValidationResult::InternalError { code } = result {
            return Err(LibXml2Error::ValidationFailed {
                code,
                file: file_path.to_path_buf(),
            });
        }

        Ok(result)
    }

    /// Validate an already parsed document against a schema
    ///
    /// `name` is only used to label internal errors.
    pub fn validate_document(
        &self,
        schema: &XmlSchemaPtr,
        document: &XmlDocument,
        name: Option<&Path>,
    ) -> LibXml2Result<ValidationResult> {
        let context = ValidationContext::new(schema)?;
        let result_code = unsafe { xmlSchemaValidateDoc(context.ctxt, document.as_ptr()) };
        let result = context.finish(result_code);

        if let ValidationResult::InternalError { code } = result {
            return Err(LibXml2Error::ValidationFailed {
                code,
                file: name
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| "<memory>".into()),
            });
        }

        Ok(result)
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
