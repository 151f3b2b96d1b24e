#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use xml_schema_cache::{SchemaSource, XmlDocument};

pub const BOOKS_NS: &str = "urn:example:books";
pub const AUTHORS_NS: &str = "urn:example:authors";

pub const BOOKS_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:books"
           elementFormDefault="qualified">
    <xs:element name="book">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="title" type="xs:string"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

pub const AUTHORS_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:authors">
    <xs:element name="author" type="xs:string"/>
</xs:schema>"#;

pub const XDR_SCHEMA: &str = r#"<?xml version="1.0"?>
<Schema xmlns="urn:schemas-microsoft-com:xml-data" name="books">
    <ElementType name="title" content="textOnly"/>
</Schema>"#;

/// Well-formed XML that is not a schema document
pub const NOT_A_SCHEMA: &str = r#"<catalog xmlns="urn:example:catalog"/>"#;

/// Not well-formed at all
pub const MALFORMED_XSD: &str =
    r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="x">"#;

pub const VALID_BOOK: &str = r#"<?xml version="1.0"?>
<book xmlns="urn:example:books"><title>Dune</title></book>"#;

pub const INVALID_BOOK: &str = r#"<?xml version="1.0"?>
<book xmlns="urn:example:books"><author>Herbert</author></book>"#;

pub fn markup(xml: &str) -> SchemaSource {
    SchemaSource::Markup(xml.as_bytes().to_vec())
}

pub fn document(xml: &str) -> XmlDocument {
    XmlDocument::parse(xml.as_bytes()).expect("test document should be well-formed")
}

/// Temporary directory holding schema and instance files
pub struct Fixtures {
    pub dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn location(&self, name: &str, content: &str) -> String {
        self.write(name, content).to_string_lossy().into_owned()
    }
}
