//! Small helpers over `quick-xml` events shared by the streaming parsers.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart};

/// Element name as an owned string.
pub(crate) fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Value of attribute `key`, with entities resolved.
pub(crate) fn attribute(start: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| {
            attr.unescape_value().map_or_else(
                |_| String::from_utf8_lossy(&attr.value).into_owned(),
                std::borrow::Cow::into_owned,
            )
        })
}

/// Append the text a general reference (`&amp;`, `&#38;`) stands for.
///
/// Unknown entities are kept verbatim.
pub(crate) fn push_reference(text: &mut String, reference: &BytesRef<'_>) {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        text.push(ch);
        return;
    }
    let name = String::from_utf8_lossy(reference.as_ref());
    match resolve_predefined_entity(&name) {
        Some(resolved) => text.push_str(resolved),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub(crate) fn normalise_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use quick_xml::events::Event;
    use rstest::rstest;

    fn text_of(xml: &str) -> String {
        let mut reader = Reader::from_str(xml);
        let mut text = String::new();
        loop {
            match reader.read_event().expect("valid xml") {
                Event::Text(t) => text.push_str(&String::from_utf8_lossy(t.as_ref())),
                Event::GeneralRef(r) => push_reference(&mut text, &r),
                Event::Eof => break,
                _ => {}
            }
        }
        text
    }

    #[rstest]
    #[case("<a>Fish &amp; Chips</a>", "Fish & Chips")]
    #[case("<a>caf&#233;</a>", "caf\u{e9}")]
    #[case("<a>&custom;</a>", "&custom;")]
    fn resolves_references(#[case] xml: &str, #[case] expected: &str) {
        assert_eq!(text_of(xml), expected);
    }

    #[rstest]
    fn reads_escaped_attributes() {
        let mut reader = Reader::from_str(r#"<tag k="name" v="A &amp; B"/>"#);
        let Event::Empty(start) = reader.read_event().expect("valid xml") else {
            panic!("expected an empty element");
        };
        assert_eq!(element_name(&start), "tag");
        assert_eq!(attribute(&start, b"v").as_deref(), Some("A & B"));
        assert_eq!(attribute(&start, b"missing"), None);
    }

    #[rstest]
    fn collapses_whitespace() {
        assert_eq!(normalise_whitespace("  Mon-Fri\n\t 9am  "), "Mon-Fri 9am");
    }
}
