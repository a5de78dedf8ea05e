//! Paragraph text from Office Open XML documents.

use roxmltree::{Document, Node};
use std::io::{Read, Seek};

/// Transitional and strict WordprocessingML namespaces.
const WORDML_NAMESPACES: [&str; 2] = [
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    "http://purl.oclc.org/ooxml/wordprocessingml/main",
];

/// One `w:p` paragraph of a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxParagraph {
    /// Style id from `w:pPr/w:pStyle`, such as `Heading1` or `Title`.
    pub style: Option<String>,
    /// Whether the first run carrying text is bold.
    pub bold: bool,
    pub text: String,
}

/// Reads `word/document.xml` and returns one line per paragraph.
pub fn docx_text<R: Read + Seek>(reader: R) -> Result<String, String> {
    let xml = read_document_xml(reader)?;
    document_xml_text(&xml)
}

/// Reads `word/document.xml` and returns its paragraphs in order.
pub fn docx_paragraphs<R: Read + Seek>(reader: R) -> Result<Vec<DocxParagraph>, String> {
    let xml = read_document_xml(reader)?;
    document_paragraphs(&xml)
}

fn read_document_xml<R: Read + Seek>(reader: R) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| format!("not a DOCX archive: {}", e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing document body: {}", e))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable document body: {}", e))?;
    Ok(xml)
}

/// Text of a WordprocessingML body, each paragraph ending in a newline.
///
/// Tabs become `\t`; line, page and carriage-return breaks become `\n`.
pub fn document_xml_text(xml: &str) -> Result<String, String> {
    let mut out = String::new();
    for paragraph in document_paragraphs(xml)? {
        out.push_str(&paragraph.text);
        out.push('\n');
    }
    Ok(out)
}

/// Parses every paragraph of a WordprocessingML body.
///
/// Paragraphs nested in text boxes or tables are listed on their own and
/// are not folded into the paragraph that contains them.
pub fn document_paragraphs(xml: &str) -> Result<Vec<DocxParagraph>, String> {
    let doc = Document::parse(xml).map_err(|e| format!("malformed document body: {}", e))?;
    Ok(doc
        .descendants()
        .filter(|n| is_wordml(n, "p"))
        .map(paragraph)
        .collect())
}

fn is_wordml(node: &Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node
            .tag_name()
            .namespace()
            .is_some_and(|ns| WORDML_NAMESPACES.contains(&ns))
}

fn wordml_child<'a, 'input>(node: &Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| is_wordml(c, local))
}

fn wordml_val<'a>(node: &Node<'a, '_>) -> Option<&'a str> {
    node.attributes()
        .find(|a| {
            a.name() == "val" && a.namespace().is_some_and(|ns| WORDML_NAMESPACES.contains(&ns))
        })
        .map(|a| a.value())
}

fn paragraph(node: Node) -> DocxParagraph {
    let style = wordml_child(&node, "pPr")
        .and_then(|ppr| wordml_child(&ppr, "pStyle"))
        .and_then(|s| wordml_val(&s))
        .map(str::to_string);

    let mut text = String::new();
    let mut bold = None;
    collect_runs(node, &mut text, &mut bold);

    DocxParagraph {
        style,
        bold: bold.unwrap_or(false),
        text,
    }
}

fn collect_runs(node: Node, text: &mut String, bold: &mut Option<bool>) {
    for child in node.children().filter(|c| c.is_element()) {
        if is_wordml(&child, "p") {
            continue;
        }
        if is_wordml(&child, "r") && bold.is_none() && run_has_text(&child) {
            *bold = Some(run_is_bold(&child));
        }
        if is_wordml(&child, "t") {
            text.push_str(child.text().unwrap_or(""));
        } else if is_wordml(&child, "tab") {
            text.push('\t');
        } else if is_wordml(&child, "br") || is_wordml(&child, "cr") {
            text.push('\n');
        } else {
            collect_runs(child, text, bold);
        }
    }
}

fn run_has_text(run: &Node) -> bool {
    run.children()
        .any(|c| is_wordml(&c, "t") && c.text().is_some_and(|t| !t.trim().is_empty()))
}

fn run_is_bold(run: &Node) -> bool {
    wordml_child(run, "rPr")
        .and_then(|rpr| wordml_child(&rpr, "b"))
        .map(|b| !matches!(wordml_val(&b), Some("0" | "false")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{docx_bytes, wordml_document};
    use std::io::Cursor;

    #[test]
    fn test_document_xml_text() {
        let xml = wordml_document(
            r#"<w:p><w:r><w:t>Scope &amp; goals</w:t></w:r></w:p><w:p><w:r><w:t>Budget</w:t><w:tab/><w:t>$10</w:t></w:r></w:p>"#,
        );
        assert_eq!(document_xml_text(&xml).unwrap(), "Scope & goals\nBudget\t$10\n");
    }

    #[test]
    fn test_numeric_references_and_typed_breaks() {
        let xml = wordml_document(
            r#"<w:p><w:r><w:t>It&#8217;s</w:t><w:br w:type="page"/><w:t>Next</w:t></w:r></w:p><w:p><w:r><w:t>2019&#x2013;2020</w:t><w:cr/><w:t>end</w:t></w:r></w:p>"#,
        );
        assert_eq!(
            document_xml_text(&xml).unwrap(),
            "It\u{2019}s\nNext\n2019\u{2013}2020\nend\n"
        );
    }

    #[test]
    fn test_empty_paragraphs_keep_their_line() {
        let xml = wordml_document(
            r#"<w:p><w:r><w:t>One</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>Two</w:t></w:r></w:p>"#,
        );
        assert_eq!(document_xml_text(&xml).unwrap(), "One\n\nTwo\n");
    }

    #[test]
    fn test_deleted_text_and_field_codes_are_skipped() {
        let xml = wordml_document(
            r#"<w:p><w:r><w:delText>old</w:delText></w:r><w:r><w:instrText>PAGE</w:instrText></w:r><w:r><w:t xml:space="preserve">kept </w:t></w:r></w:p>"#,
        );
        assert_eq!(document_xml_text(&xml).unwrap(), "kept \n");
    }

    #[test]
    fn test_paragraph_style_and_bold() {
        let xml = wordml_document(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Scope</w:t></w:r></w:p><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Budget</w:t></w:r></w:p><w:p><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>plain</w:t></w:r></w:p>"#,
        );
        let paragraphs = document_paragraphs(&xml).unwrap();
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0].style.as_deref(), Some("Heading1"));
        assert!(!paragraphs[0].bold);
        assert_eq!(paragraphs[1].style, None);
        assert!(paragraphs[1].bold);
        assert!(!paragraphs[2].bold);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(document_xml_text("<w:p><w:t>open").is_err());
    }

    #[test]
    fn test_docx_text_from_archive() {
        let bytes = docx_bytes(&["First paragraph", "Second paragraph"]);
        let text = docx_text(Cursor::new(bytes)).unwrap();
        assert!(text.contains("First paragraph\n"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_docx_text_rejects_non_zip() {
        assert!(docx_text(Cursor::new(b"plain text".to_vec())).is_err());
    }
}
